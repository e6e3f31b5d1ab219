use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Re-exported so agent modules can pull `Facility`, `Citation`, and
/// `FacilityTable` from one `entities` path.
pub use crate::domain::facility_store::FacilityTable;

/// A facility's broad organizational classification.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrgType {
    Facility,
    Ngo,
}

impl OrgType {
    pub fn from_str_loose(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "facility" => Some(Self::Facility),
            "ngo" => Some(Self::Ngo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facility => "facility",
            Self::Ngo => "ngo",
        }
    }
}

/// A raw, unmerged record as it arrives from an external [`crate::infrastructure::connectors::FacilitySource`].
///
/// List fields carry whatever order the source produced; `FacilityTable::build`
/// is responsible for deduplication, union-by-`pk_unique_id`, and ordering.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawFacilityRow {
    pub pk_unique_id: String,
    pub unique_id: String,
    pub name: String,
    pub organization_type: Option<String>,
    pub facility_type: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub beds: Option<f64>,
    pub doctors: Option<f64>,
    pub year_established: Option<i32>,
    pub area: Option<f64>,
    pub specialties: Vec<String>,
    pub procedures: Vec<String>,
    pub equipment: Vec<String>,
    pub capabilities: Vec<String>,
    pub source_url: Option<String>,
}

/// Canonical, immutable facility record held by the Facility Store (C1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Facility {
    pub pk_unique_id: String,
    pub unique_id: String,
    pub name: String,
    pub org_type: Option<OrgType>,
    pub facility_type: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub coords: Option<(f64, f64)>,
    pub beds: Option<f64>,
    pub doctors: Option<f64>,
    pub year_established: Option<i32>,
    pub area: Option<f64>,
    pub specialties: Vec<String>,
    pub procedures: Vec<String>,
    pub equipment: Vec<String>,
    pub capabilities: Vec<String>,
    pub source_url: Option<String>,
    /// Stable composed text used by the Validator's scanners and the
    /// Semantic Retriever's query-rewriting, see SPEC_FULL.md §3.
    pub document: String,
}

impl Facility {
    pub fn has_specialty(&self, specialty: &str) -> bool {
        self.specialties.iter().any(|s| s.eq_ignore_ascii_case(specialty))
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coords.map(|(lat, _)| lat)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coords.map(|(_, lng)| lng)
    }

    /// Concatenated lowercase text used for fuzzy-containment checks:
    /// procedures + equipment + capabilities + document.
    pub fn searchable_text(&self) -> String {
        let mut text = String::new();
        for part in self
            .procedures
            .iter()
            .chain(self.equipment.iter())
            .chain(self.capabilities.iter())
        {
            text.push_str(part);
            text.push(' ');
        }
        text.push_str(&self.document);
        text.to_ascii_lowercase()
    }
}

/// The closed set of intents the Supervisor (C9) can classify an utterance into.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Counting,
    Services,
    Region,
    Nearby,
    CoverageGap,
    EquipmentVerification,
    SuspiciousClaims,
    Correlation,
    Workforce,
    ResourceDistribution,
    DesertDetection,
    Ngo,
    GeneralSearch,
}

impl Intent {
    /// Deterministic enum order, used to break classification score ties.
    pub fn all() -> &'static [Intent] {
        use Intent::*;
        &[
            Counting,
            Services,
            Region,
            Nearby,
            CoverageGap,
            EquipmentVerification,
            SuspiciousClaims,
            Correlation,
            Workforce,
            ResourceDistribution,
            DesertDetection,
            Ngo,
            GeneralSearch,
        ]
    }
}

/// The five domain agents composable by the orchestrator (C10).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    Tabular,
    Semantic,
    Validator,
    Geospatial,
    Planner,
}

impl AgentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tabular => "tabular",
            Self::Semantic => "semantic",
            Self::Validator => "validator",
            Self::Geospatial => "geospatial",
            Self::Planner => "planner",
        }
    }
}

/// Caller-supplied request context (spec.md §6).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryContext {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub use_quantum: Option<bool>,
}

/// Per-request mutable state threaded through the orchestrator.
///
/// `cancel` carries the request's cancellation signal (spec.md §5): every
/// CPU-bound long loop and the orchestrator's agent dispatch loop observe it
/// between iterations and discard partial results rather than return them.
#[derive(Clone, Debug)]
pub struct QueryState {
    pub utterance: String,
    pub context: QueryContext,
    pub intent: Option<Intent>,
    pub required_agents: Vec<AgentName>,
    pub agent_cursor: usize,
    pub results: Vec<AgentResult>,
    pub trace: Vec<TraceEntry>,
    pub citations: Vec<Citation>,
    pub cancel: CancellationToken,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            utterance: String::new(),
            context: QueryContext::default(),
            intent: None,
            required_agents: Vec::new(),
            agent_cursor: 0,
            results: Vec::new(),
            trace: Vec::new(),
            citations: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }
}

/// The payload an agent node contributes to `QueryState::results`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: AgentName,
    pub action: String,
    pub payload: serde_json::Value,
    pub duration_ms: f64,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: usize,
    pub agent: String,
    pub action: String,
    pub duration_ms: f64,
    pub summary: String,
    #[serde(flatten)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: String,
    pub field: String,
    pub evidence: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_type_parses_case_insensitively() {
        assert_eq!(OrgType::from_str_loose("NGO"), Some(OrgType::Ngo));
        assert_eq!(OrgType::from_str_loose("Facility"), Some(OrgType::Facility));
        assert_eq!(OrgType::from_str_loose("clinic"), None);
    }

    #[test]
    fn intent_enum_order_is_stable() {
        assert_eq!(Intent::all()[0], Intent::Counting);
        assert_eq!(Intent::all().last(), Some(&Intent::GeneralSearch));
    }
}
