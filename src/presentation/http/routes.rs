use axum::routing::{get, post};
use axum::Router;

use super::{handlers, AppState};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(handlers::query))
        .route("/health", get(handlers::health))
        .route("/facilities", get(handlers::facilities))
        .route("/stats", get(handlers::stats))
        .route("/specialties", get(handlers::specialties))
        .route("/planning/scenarios", get(handlers::planning_scenarios))
        .route("/planning/execute", post(handlers::planning_execute))
        .route("/routing-map", post(handlers::routing_map))
        .route("/mlops/status", get(handlers::mlops_status))
        .route("/mlops/pipeline", get(handlers::mlops_pipeline))
        .with_state(state)
}
