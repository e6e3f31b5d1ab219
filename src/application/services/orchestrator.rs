//! Orchestrator (C10): runs Supervisor → agents → Aggregator, threading
//! state, merging the map overlay, and calling the external synthesizer.
//!
//! State machine and map-overlay key list grounded in spec.md §4.9 /
//! SPEC_FULL.md §4's note on the response wrapper key (`multi_agent`, not
//! `multi_agent_response`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::entities::{AgentName, AgentResult, Citation, FacilityTable, Intent, QueryContext, TraceEntry};
use crate::domain::errors::EngineError;
use crate::domain::geocoding::{self, BoundingBox};
use crate::infrastructure::llm_classifier::LlmIntentClassifier;
use crate::infrastructure::synthesizer::Synthesizer;
use crate::infrastructure::vector_backend::VectorBackend;

use super::geospatial_analyst::GeospatialAnalyst;
use super::planner::Planner;
use super::semantic_retriever::SemanticRetriever;
use super::supervisor::Supervisor;
use super::tabular_analyst::TabularAnalyst;
use super::validator::Validator;

const MAP_OVERLAY_LIST_KEYS: &[&str] = &[
    "facilities",
    "results",
    "stops",
    "placements",
    "suggestions",
    "worst_cold_spots",
    "alternatives",
    "regions",
    "anomalies",
    "gaps",
    "deserts",
];

const MAP_OVERLAY_SINGLETON_KEYS: &[&str] = &["primary_facility", "backup_facility"];

const LAT_ALIASES: &[&str] = &["lat", "latitude", "center_lat", "suggested_lat", "grid_lat"];
const LNG_ALIASES: &[&str] = &["lng", "longitude", "center_lng", "suggested_lng", "grid_lng", "lon"];

pub struct Orchestrator {
    table: Arc<FacilityTable>,
    vector_backend: Arc<dyn VectorBackend>,
    synthesizer: Arc<dyn Synthesizer>,
    llm_classifier: Arc<dyn LlmIntentClassifier>,
    top_k: usize,
    vector_timeout: Duration,
    synthesis_timeout: Duration,
    bbox: BoundingBox,
    llm_supervisor_enabled: bool,
}

pub struct QueryOutcome {
    pub query: String,
    pub intent: Intent,
    pub response: Value,
    pub summary: String,
    pub trace: Vec<TraceEntry>,
    pub citations: Vec<Citation>,
    pub agents_used: Vec<AgentName>,
    pub total_duration_ms: f64,
}

impl Orchestrator {
    pub fn new(
        table: Arc<FacilityTable>,
        vector_backend: Arc<dyn VectorBackend>,
        synthesizer: Arc<dyn Synthesizer>,
        llm_classifier: Arc<dyn LlmIntentClassifier>,
        top_k: usize,
    ) -> Self {
        Self::with_timeouts(table, vector_backend, synthesizer, llm_classifier, top_k, Duration::from_secs(30), Duration::from_secs(10), geocoding::BOUNDING_BOX, false)
    }

    /// Per-leg deadlines (spec.md §5): 30s is the vector backend's own
    /// spec-mandated default; `synthesis_timeout` is caller-configurable.
    /// `llm_supervisor_enabled` gates whether the Supervisor's LLM fallback
    /// is even attempted when pattern scoring is ambiguous (spec.md §6).
    #[allow(clippy::too_many_arguments)]
    pub fn with_timeouts(
        table: Arc<FacilityTable>,
        vector_backend: Arc<dyn VectorBackend>,
        synthesizer: Arc<dyn Synthesizer>,
        llm_classifier: Arc<dyn LlmIntentClassifier>,
        top_k: usize,
        vector_timeout: Duration,
        synthesis_timeout: Duration,
        bbox: BoundingBox,
        llm_supervisor_enabled: bool,
    ) -> Self {
        Self { table, vector_backend, synthesizer, llm_classifier, top_k, vector_timeout, synthesis_timeout, bbox, llm_supervisor_enabled }
    }

    pub async fn handle_query(&self, utterance: &str, context: QueryContext) -> Result<QueryOutcome, EngineError> {
        self.handle_query_with_cancellation(utterance, context, &CancellationToken::new()).await
    }

    /// Same as [`Self::handle_query`], but observes `cancel` between every
    /// agent dispatch step and during synthesis (spec.md §5 MUST): partial
    /// results accumulated so far are discarded, not returned, on cancel.
    pub async fn handle_query_with_cancellation(&self, utterance: &str, context: QueryContext, cancel: &CancellationToken) -> Result<QueryOutcome, EngineError> {
        let trimmed = utterance.trim();
        if trimmed.is_empty() || trimmed.chars().count() > 2000 {
            return Err(EngineError::InputValidation("query must be 1..2000 characters".to_owned()));
        }

        let started = Instant::now();

        // Step 1: Supervisor. The LLM fallback is a control-plane call, given
        // the same 10s deadline as other control-plane status checks (spec.md §5).
        let classification = match Supervisor::classify(trimmed) {
            Some(c) => c,
            None if !self.llm_supervisor_enabled => {
                warn!("LLM supervisor disabled; routing directly to semantic retriever fallback");
                Supervisor::fallback()
            }
            None => match tokio::time::timeout(Duration::from_secs(10), self.llm_classifier.classify(trimmed)).await {
                Ok(Ok(llm)) => Supervisor::from_llm(llm).unwrap_or_else(Supervisor::fallback),
                Ok(Err(_)) => Supervisor::fallback(),
                Err(_) => {
                    warn!("LLM supervisor fallback timed out; routing to semantic retriever");
                    Supervisor::fallback()
                }
            },
        };

        let intent = classification.intent;
        let required_agents = classification.agents;

        let mut trace = Vec::with_capacity(required_agents.len() + 1);
        trace.push(TraceEntry {
            step: 0,
            agent: "supervisor".to_owned(),
            action: "classify".to_owned(),
            duration_ms: 0.0,
            summary: format!("classified intent as {:?}", intent),
            metadata: HashMap::from([("agents_planned".to_owned(), json!(required_agents.iter().map(|a| a.as_str()).collect::<Vec<_>>()))]),
        });

        // Step 2/3: Dispatch loop.
        let mut results: Vec<AgentResult> = Vec::with_capacity(required_agents.len());
        let mut citations: Vec<Citation> = Vec::new();
        let context_point = context.lat.zip(context.lng);
        let use_quantum = context.use_quantum.unwrap_or(false);

        for (cursor, &agent_name) in required_agents.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(EngineError::Internal("request cancelled before completion; partial results discarded".to_owned()));
            }

            let step_started = Instant::now();
            let derived = derive_context(&results);

            let dispatch = match agent_name {
                AgentName::Tabular => Some(TabularAnalyst::execute(trimmed, &self.table)),
                AgentName::Semantic => Some(SemanticRetriever::execute_with_deadline(trimmed, self.vector_backend.as_ref(), self.top_k, self.vector_timeout).await),
                AgentName::Validator => Some(Validator::execute(trimmed, &self.table)),
                AgentName::Geospatial => GeospatialAnalyst::execute(trimmed, &self.table, context_point, self.bbox, cancel),
                AgentName::Planner => Planner::execute(trimmed, &self.table, use_quantum, self.bbox, cancel),
            };

            let Some((action, mut payload, agent_citations)) = dispatch else {
                return Err(EngineError::Internal("request cancelled before completion; partial results discarded".to_owned()));
            };

            if let Value::Object(ref mut map) = payload {
                if !derived.is_empty() {
                    map.insert("prior_context".to_owned(), Value::Object(derived));
                }
            }

            let duration_ms = step_started.elapsed().as_secs_f64() * 1000.0;

            trace.push(TraceEntry {
                step: cursor + 1,
                agent: agent_name.as_str().to_owned(),
                action: action.clone(),
                duration_ms,
                summary: trace_summary(agent_name, &action, &payload),
                metadata: HashMap::new(),
            });

            citations.extend(agent_citations.clone());

            results.push(AgentResult { agent_name, action, payload, duration_ms, citations: agent_citations });
        }

        // Step 4: Aggregate.
        if cancel.is_cancelled() {
            return Err(EngineError::Internal("request cancelled before synthesis; partial results discarded".to_owned()));
        }
        let aggregate_started = Instant::now();
        let response = aggregate_response(&results);
        let summary = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(EngineError::Internal("request cancelled during synthesis; partial results discarded".to_owned()));
            }
            result = tokio::time::timeout(self.synthesis_timeout, self.synthesizer.synthesize(trimmed, &results, &trace, &citations, intent)) => match result {
                Ok(Ok(summary)) => summary,
                Ok(Err(err)) => {
                    warn!(error = %err, "synthesizer failed; summary left empty");
                    String::new()
                }
                Err(_) => {
                    warn!(deadline_secs = self.synthesis_timeout.as_secs(), "synthesizer timed out; summary left empty");
                    String::new()
                }
            }
        };

        let agents_used: Vec<AgentName> = results.iter().map(|r| r.agent_name).collect();

        trace.push(TraceEntry {
            step: required_agents.len() + 1,
            agent: "aggregator".to_owned(),
            action: "aggregate".to_owned(),
            duration_ms: aggregate_started.elapsed().as_secs_f64() * 1000.0,
            summary: format!("aggregated {} agent result(s) into the response", results.len()),
            metadata: HashMap::new(),
        });

        let total_duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(QueryOutcome { query: trimmed.to_owned(), intent, response, summary, trace, citations, agents_used, total_duration_ms })
    }
}

/// Auxiliary input visible to the validator and planner: prior geospatial
/// deserts/cold-spots and tabular counts (spec.md §4.9 step 3).
fn derive_context(prior: &[AgentResult]) -> Map<String, Value> {
    let mut derived = Map::new();
    for result in prior {
        match result.agent_name {
            AgentName::Geospatial => {
                if let Some(deserts) = result.payload.get("deserts") {
                    derived.insert("geospatial_deserts".to_owned(), deserts.clone());
                }
                if let Some(cold_spots) = result.payload.get("worst_cold_spots") {
                    derived.insert("geospatial_cold_spots".to_owned(), cold_spots.clone());
                }
            }
            AgentName::Tabular => {
                if let Some(count) = result.payload.get("count") {
                    derived.insert("tabular_count".to_owned(), count.clone());
                }
            }
            _ => {}
        }
    }
    derived
}

fn trace_summary(agent: AgentName, action: &str, payload: &Value) -> String {
    let count = payload
        .get("count")
        .and_then(|v| v.as_u64())
        .or_else(|| payload.get("facilities").and_then(|v| v.as_array()).map(|a| a.len() as u64));
    match count {
        Some(n) => format!("{} ran {} ({} result(s))", agent.as_str(), action, n),
        None => format!("{} ran {}", agent.as_str(), action),
    }
}

fn aggregate_response(results: &[AgentResult]) -> Value {
    if results.len() == 1 {
        let mut payload = results[0].payload.clone();
        attach_map_overlay(&mut payload, results);
        return payload;
    }

    let mut by_agent = Map::new();
    for result in results {
        by_agent.insert(result.agent_name.as_str().to_owned(), result.payload.clone());
    }

    let mut wrapper = json!({ "multi_agent": true, "results": by_agent });
    attach_map_overlay(&mut wrapper, results);
    wrapper
}

fn attach_map_overlay(wrapper: &mut Value, results: &[AgentResult]) {
    let overlay = build_map_overlay(results);
    if let Value::Object(map) = wrapper {
        map.insert("map_overlay".to_owned(), overlay);
    }
}

/// Collects every dict under the known list keys plus the singleton fields,
/// normalizes coordinate aliases, and dedupes by entity name (spec.md §4.9
/// step 4).
fn build_map_overlay(results: &[AgentResult]) -> Value {
    let payloads: Vec<&Value> = results.iter().map(|r| &r.payload).collect();
    map_overlay_for_payloads(&payloads)
}

/// Same collection rule as [`build_map_overlay`], applied directly to one or
/// more agent payloads. Exposed for the `/routing-map` endpoint (spec.md
/// §6), which renders a single Planner payload without running the full
/// orchestrator pipeline.
pub fn map_overlay_for_payloads(payloads: &[&Value]) -> Value {
    let mut entries: Vec<Value> = Vec::new();
    let mut seen_names: Vec<String> = Vec::new();

    for payload in payloads {
        let Value::Object(payload) = payload else { continue };

        for &key in MAP_OVERLAY_LIST_KEYS {
            let Some(Value::Array(items)) = payload.get(key) else { continue };
            for item in items {
                push_overlay_entry(item, &mut entries, &mut seen_names);
            }
        }

        for &key in MAP_OVERLAY_SINGLETON_KEYS {
            if let Some(item) = payload.get(key) {
                push_overlay_entry(item, &mut entries, &mut seen_names);
            }
        }
    }

    json!({ "points": entries, "count": entries.len() })
}

fn push_overlay_entry(item: &Value, entries: &mut Vec<Value>, seen_names: &mut Vec<String>) {
    let Value::Object(obj) = item else { return };

    let Some((lat, lng)) = normalize_coordinates(obj) else { return };

    let name = obj.get("name").and_then(|v| v.as_str()).unwrap_or("").to_owned();
    if !name.is_empty() && seen_names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
        return;
    }
    if !name.is_empty() {
        seen_names.push(name.clone());
    }

    entries.push(json!({ "name": name, "lat": lat, "lng": lng }));
}

fn normalize_coordinates(obj: &Map<String, Value>) -> Option<(f64, f64)> {
    let lat = LAT_ALIASES.iter().find_map(|key| obj.get(*key)).and_then(find_number);
    let lng = LNG_ALIASES.iter().find_map(|key| obj.get(*key)).and_then(find_number);

    match (lat, lng) {
        (Some(lat), Some(lng)) => Some((lat, lng)),
        _ => {
            // Some payloads carry `[lat, lng]` pair fields (e.g. `center`, `origin`).
            for key in ["center", "origin", "coords"] {
                if let Some(Value::Array(pair)) = obj.get(key) {
                    if pair.len() == 2 {
                        if let (Some(lat), Some(lng)) = (pair[0].as_f64(), pair[1].as_f64()) {
                            return Some((lat, lng));
                        }
                    }
                }
            }
            None
        }
    }
}

fn find_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::RawFacilityRow;
    use crate::infrastructure::llm_classifier::DisabledLlmClassifier;
    use crate::infrastructure::synthesizer::FallbackSynthesizer;
    use crate::infrastructure::vector_backend::InProcessVectorBackend;

    fn table() -> Arc<FacilityTable> {
        Arc::new(FacilityTable::build(vec![
            RawFacilityRow { pk_unique_id: "1".into(), unique_id: "1".into(), name: "Korle Bu Teaching Hospital".into(), latitude: Some(5.60), longitude: Some(-0.19), region: Some("Greater Accra".into()), beds: Some(2000.0), doctors: Some(400.0), specialties: vec!["cardiology".into()], ..Default::default() },
            RawFacilityRow { pk_unique_id: "2".into(), unique_id: "2".into(), name: "Tamale Teaching Hospital".into(), latitude: Some(9.40), longitude: Some(-0.84), region: Some("Northern".into()), beds: Some(800.0), doctors: Some(100.0), specialties: vec!["ophthalmology".into()], ..Default::default() },
        ]))
    }

    fn orchestrator() -> Orchestrator {
        let table = table();
        Orchestrator::new(
            table.clone(),
            Arc::new(InProcessVectorBackend::new(table)),
            Arc::new(FallbackSynthesizer),
            Arc::new(DisabledLlmClassifier),
            5,
        )
    }

    #[tokio::test]
    async fn cancelled_request_is_discarded_not_partially_returned() {
        let orchestrator = orchestrator();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orchestrator
            .handle_query_with_cancellation("coverage gap for cardiology in the region", QueryContext::default(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "internal");
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let orchestrator = orchestrator();
        let err = orchestrator.handle_query("   ", QueryContext::default()).await.unwrap_err();
        assert_eq!(err.category(), "input_validation");
    }

    #[tokio::test]
    async fn counting_query_routes_single_agent_and_skips_multi_agent_wrapper() {
        let orchestrator = orchestrator();
        let outcome = orchestrator.handle_query("How many hospitals offer cardiology services?", QueryContext::default()).await.unwrap();
        assert_eq!(outcome.intent, Intent::Counting);
        assert_eq!(outcome.agents_used, vec![AgentName::Tabular]);
        assert!(outcome.response.get("multi_agent").is_none());
        assert!(outcome.response.get("map_overlay").is_some());
    }

    #[tokio::test]
    async fn multi_agent_query_wraps_results_under_multi_agent_key() {
        let orchestrator = orchestrator();
        let outcome = orchestrator.handle_query("coverage gap for cardiology in the region", QueryContext::default()).await.unwrap();
        assert!(outcome.agents_used.len() >= 2);
        assert_eq!(outcome.response["multi_agent"], json!(true));
        assert!(outcome.response["results"].is_object());
    }

    #[tokio::test]
    async fn trace_and_citations_are_in_execution_order() {
        let orchestrator = orchestrator();
        let outcome = orchestrator.handle_query("coverage gap for cardiology in the region", QueryContext::default()).await.unwrap();
        for (i, entry) in outcome.trace.iter().enumerate() {
            assert_eq!(entry.step, i);
        }
    }

    #[tokio::test]
    async fn trace_always_covers_supervisor_every_agent_and_aggregator() {
        let orchestrator = orchestrator();
        let outcome = orchestrator.handle_query("How many hospitals offer cardiology services?", QueryContext::default()).await.unwrap();
        assert!(outcome.trace.len() >= 1 + outcome.agents_used.len() + 1);
        assert_eq!(outcome.trace.last().unwrap().agent, "aggregator");
    }

    #[test]
    fn map_overlay_dedupes_same_name_across_agents() {
        let results = vec![
            AgentResult {
                agent_name: AgentName::Tabular,
                action: "a".to_owned(),
                payload: json!({ "facilities": [{ "name": "Korle Bu", "lat": 5.6, "lng": -0.19 }] }),
                duration_ms: 0.0,
                citations: Vec::new(),
            },
            AgentResult {
                agent_name: AgentName::Geospatial,
                action: "b".to_owned(),
                payload: json!({ "facilities": [{ "name": "Korle Bu", "lat": 5.6, "lng": -0.19 }] }),
                duration_ms: 0.0,
                citations: Vec::new(),
            },
        ];
        let overlay = build_map_overlay(&results);
        assert_eq!(overlay["count"], json!(1));
    }

    #[test]
    fn map_overlay_skips_entries_missing_coordinates() {
        let results = vec![AgentResult {
            agent_name: AgentName::Tabular,
            action: "a".to_owned(),
            payload: json!({ "facilities": [{ "name": "No Coords" }] }),
            duration_ms: 0.0,
            citations: Vec::new(),
        }];
        let overlay = build_map_overlay(&results);
        assert_eq!(overlay["count"], json!(0));
    }
}
