pub mod handlers;
pub mod rate_limit;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use crate::application::services::Orchestrator;
use crate::config::Settings;
use crate::domain::entities::FacilityTable;
use rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub table: Arc<FacilityTable>,
    pub settings: Arc<Settings>,
    pub rate_limiter: RateLimiter,
    pub started_at: Arc<Instant>,
}
