//! Request/response shapes for the HTTP shell (spec.md §6). These are pure
//! data: the orchestrator and agents never depend on axum types directly.

use serde::{Deserialize, Serialize};

use crate::domain::entities::{AgentName, Citation, Intent, QueryContext, TraceEntry};

#[derive(Clone, Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub context: Option<QueryContext>,
}

#[derive(Clone, Debug, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub intent: Intent,
    pub response: serde_json::Value,
    pub summary: String,
    pub trace: Vec<TraceEntry>,
    pub citations: Vec<Citation>,
    pub agents_used: Vec<AgentName>,
    pub total_duration_ms: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlanningExecuteRequest {
    pub scenario: String,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub equipment_type: Option<String>,
    #[serde(default)]
    pub origin_city: Option<String>,
    #[serde(default)]
    pub use_quantum: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RoutingMapRequest {
    pub scenario: String,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub origin_city: Option<String>,
}
