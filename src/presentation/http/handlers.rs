//! HTTP handlers for the external interface (spec.md §6). Thin translation
//! layer: every handler defers to the orchestrator or a domain agent and
//! shapes the result into a JSON response; no business logic lives here.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::application::dto::{PlanningExecuteRequest, QueryRequest, QueryResponse, RoutingMapRequest};
use crate::application::services::{map_overlay_for_payloads, Planner};

use super::AppState;

type HandlerResult<T> = Result<T, (StatusCode, String)>;

fn extract_client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_owned())
        .unwrap_or_else(|| "anonymous".to_owned())
}

pub async fn query(State(state): State<AppState>, headers: HeaderMap, Json(request): Json<QueryRequest>) -> HandlerResult<Json<QueryResponse>> {
    let client_key = extract_client_key(&headers);
    if !state.rate_limiter.allow(&client_key).await {
        return Err((StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded".to_owned()));
    }

    let context = request.context.unwrap_or_default();
    let outcome = state
        .orchestrator
        .handle_query(&request.query, context)
        .await
        .map_err(|err| (status_for_category(err.category()), err.to_string()))?;

    Ok(Json(QueryResponse {
        query: outcome.query,
        intent: outcome.intent,
        response: outcome.response,
        summary: outcome.summary,
        trace: outcome.trace,
        citations: outcome.citations,
        agents_used: outcome.agents_used,
        total_duration_ms: outcome.total_duration_ms,
    }))
}

fn status_for_category(category: &str) -> StatusCode {
    match category {
        "input_validation" => StatusCode::BAD_REQUEST,
        "not_found" => StatusCode::NOT_FOUND,
        "resource_limit" => StatusCode::PAYLOAD_TOO_LARGE,
        "dependency_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "facility_count": state.table.len(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct FacilitiesQuery {
    pub specialty: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

pub async fn facilities(State(state): State<AppState>, Query(params): Query<FacilitiesQuery>) -> Json<Value> {
    let mut matched: Vec<&crate::domain::entities::Facility> = state
        .table
        .all()
        .iter()
        .filter(|f| params.specialty.as_deref().is_none_or(|s| f.has_specialty(s)))
        .filter(|f| params.region.as_deref().is_none_or(|r| f.region.as_deref().is_some_and(|fr| fr.eq_ignore_ascii_case(r))))
        .filter(|f| params.city.as_deref().is_none_or(|c| f.city.as_deref().is_some_and(|fc| fc.eq_ignore_ascii_case(c))))
        .collect();

    let total = matched.len();
    let offset = params.offset.unwrap_or(0).min(total);
    let limit = params.limit.unwrap_or(50).min(200);
    matched = matched.into_iter().skip(offset).take(limit).collect();

    Json(json!({
        "total": total,
        "offset": offset,
        "limit": limit,
        "facilities": matched,
    }))
}

pub async fn stats(State(state): State<AppState>) -> Json<Value> {
    let all = state.table.all();
    let total_beds: f64 = all.iter().filter_map(|f| f.beds).sum();
    let total_doctors: f64 = all.iter().filter_map(|f| f.doctors).sum();

    let mut regions: Vec<String> = all.iter().filter_map(|f| f.region.clone()).collect();
    regions.sort();
    regions.dedup();

    Json(json!({
        "total_facilities": all.len(),
        "total_beds": total_beds,
        "total_doctors": total_doctors,
        "with_coordinates": state.table.with_coordinates().len(),
        "region_count": regions.len(),
        "regions": regions,
    }))
}

pub async fn specialties(State(state): State<AppState>) -> Json<Value> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for f in state.table.all() {
        for s in &f.specialties {
            let key = s.to_ascii_lowercase();
            match counts.iter_mut().find(|(k, _)| *k == key) {
                Some((_, c)) => *c += 1,
                None => counts.push((key, 1)),
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    Json(json!({
        "specialties": counts.into_iter().map(|(s, c)| json!({ "specialty": s, "count": c })).collect::<Vec<_>>(),
    }))
}

const PLANNING_SCENARIOS: &[&str] = &["emergency_routing", "specialist_rotation", "equipment_distribution", "new_facility_placement", "capacity_planning"];

pub async fn planning_scenarios() -> Json<Value> {
    Json(json!({ "scenarios": PLANNING_SCENARIOS }))
}

fn scenario_utterance(scenario: &str, specialty: Option<&str>, equipment_type: Option<&str>, origin_city: Option<&str>) -> String {
    let specialty = specialty.unwrap_or("cardiology");
    let equipment_type = equipment_type.unwrap_or("ct scanner");
    let origin = origin_city.map(|c| format!(" from {c}")).unwrap_or_default();

    match scenario {
        "specialist_rotation" => format!("plan a specialist rotation deploying {specialty}{origin}"),
        "equipment_distribution" => format!("equipment distribution for {equipment_type}"),
        "new_facility_placement" => format!("where should a new {specialty} facility be placed"),
        "capacity_planning" => "capacity planning review".to_owned(),
        _ => format!("emergency routing for {specialty}{origin}"),
    }
}

pub async fn planning_execute(State(state): State<AppState>, Json(request): Json<PlanningExecuteRequest>) -> HandlerResult<Json<Value>> {
    if !PLANNING_SCENARIOS.contains(&request.scenario.as_str()) {
        return Err((StatusCode::BAD_REQUEST, format!("unknown scenario '{}'", request.scenario)));
    }

    let utterance = scenario_utterance(&request.scenario, request.specialty.as_deref(), request.equipment_type.as_deref(), request.origin_city.as_deref());
    let Some((action, payload, _citations)) = Planner::execute(&utterance, &state.table, request.use_quantum, state.settings.bounding_box(), &CancellationToken::new()) else {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "planner did not complete".to_owned()));
    };

    Ok(Json(json!({ "scenario": request.scenario, "action": action, "result": payload })))
}

pub async fn routing_map(State(state): State<AppState>, Json(request): Json<RoutingMapRequest>) -> HandlerResult<Json<Value>> {
    if !PLANNING_SCENARIOS.contains(&request.scenario.as_str()) {
        return Err((StatusCode::BAD_REQUEST, format!("unknown scenario '{}'", request.scenario)));
    }

    let utterance = scenario_utterance(&request.scenario, request.specialty.as_deref(), None, request.origin_city.as_deref());
    let Some((_, payload, _citations)) = Planner::execute(&utterance, &state.table, false, state.settings.bounding_box(), &CancellationToken::new()) else {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "planner did not complete".to_owned()));
    };
    let overlay = map_overlay_for_payloads(&[&payload]);

    Ok(Json(json!({ "scenario": request.scenario, "map_overlay": overlay })))
}

pub async fn mlops_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "vector_backend": state.settings.vector_backend,
        "llm_supervisor_enabled": state.settings.llm_supervisor_enabled,
        "status": "nominal",
    }))
}

pub async fn mlops_pipeline(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "stages": [
            { "name": "facility_store", "description": "dedupe and geocode the raw facility rows", "status": "ready" },
            { "name": "spatial_index", "description": "k-d tree over facilities with known coordinates", "status": "ready" },
            { "name": "vector_backend", "description": state.settings.vector_backend, "status": "ready" },
        ],
        "last_run": Value::Null,
    }))
}
