mod application;
mod config;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Instant};

use application::services::Orchestrator;
use axum::Router;
use config::Settings;
use domain::facility_store::FacilityTable;
use infrastructure::connectors::{CsvFacilitySource, FacilitySource, FixtureFacilitySource};
use infrastructure::llm_classifier::DisabledLlmClassifier;
use infrastructure::synthesizer::FallbackSynthesizer;
use infrastructure::vector_backend::InProcessVectorBackend;
use presentation::http::{rate_limit::RateLimiter, routes::build_router, AppState};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::from_env();

    let source: Box<dyn FacilitySource> = match &settings.data_source_path {
        Some(path) => Box::new(CsvFacilitySource::new(path.clone())),
        None => Box::new(FixtureFacilitySource),
    };

    let raw_rows = source.fetch_facilities().await.unwrap_or_else(|err| {
        error!(error = %err, source = source.source_name(), "facility source failed; starting with an empty table");
        Vec::new()
    });

    let table = Arc::new(FacilityTable::build(raw_rows));
    info!(facility_count = table.len(), "facility store built");

    let vector_backend = Arc::new(InProcessVectorBackend::new(table.clone()));
    let synthesizer = Arc::new(FallbackSynthesizer);
    // No real LLM endpoint is wired into this repository; `llm_supervisor_enabled`
    // (spec.md §6) still has an effect, gating whether the orchestrator even
    // attempts this call versus falling straight through to the semantic
    // retriever (see `Orchestrator::handle_query_with_cancellation`).
    let llm_classifier = Arc::new(DisabledLlmClassifier);

    let orchestrator = Arc::new(Orchestrator::with_timeouts(
        table.clone(),
        vector_backend,
        synthesizer,
        llm_classifier,
        settings.semantic_top_k,
        std::time::Duration::from_secs(settings.vector_search_timeout_secs),
        std::time::Duration::from_secs(settings.synthesis_timeout_secs),
        settings.bounding_box(),
        settings.llm_supervisor_enabled,
    ));

    let app_state = AppState {
        orchestrator,
        table,
        settings: Arc::new(settings.clone()),
        rate_limiter: RateLimiter::new(settings.max_concurrent_requests, std::time::Duration::from_secs(60)),
        started_at: Arc::new(Instant::now()),
    };

    let app = app_router(app_state, &settings);
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(address = %addr, "medbridge engine listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn app_router(state: AppState, settings: &Settings) -> Router {
    let allow_origin = settings
        .cors_origin
        .parse::<axum::http::HeaderValue>()
        .unwrap_or_else(|_| axum::http::HeaderValue::from_static("http://localhost:5173"));

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    build_router(state).layer(TraceLayer::new_for_http()).layer(cors)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medbridge_engine=info,tower_http=info".into()),
        )
        .init();
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "unable to listen for shutdown signal");
    }

    info!("shutdown signal received");
}
