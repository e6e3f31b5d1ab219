//! Semantic Retriever (C5): multi-vector search with Reciprocal Rank Fusion.
//!
//! Query routing, weighting, and fusion rules grounded in SPEC_FULL.md §4's
//! note pointing at the original's vector-search agent; the vector backend
//! itself is an external collaborator (spec.md §6).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tracing::warn;

use crate::domain::entities::Citation;
use crate::infrastructure::vector_backend::{VectorBackend, VectorHit, VectorSearchFilters};

const VECTOR_NAMES: &[&str] = &["full_document", "clinical_detail", "specialties_context"];
const RRF_K: f64 = 60.0;

const KNOWN_CITIES: &[&str] = &[
    "accra", "tema", "kumasi", "obuasi", "takoradi", "sekondi", "cape coast", "winneba", "koforidua", "nkawkaw", "tamale",
    "yendi", "bolgatanga", "bawku", "wa", "ho", "hohoe", "sunyani", "techiman",
];

const CLINICAL_KEYWORDS: &[&str] = &["surgery", "procedure", "dialysis", "chemotherapy", "scan", "treatment", "operation"];
const SPECIALTY_KEYWORDS: &[&str] = &["cardiology", "ophthalmology", "neurosurgery", "oncology", "pediatrics", "specialist", "specialty"];

pub struct SemanticRetriever;

#[derive(Default)]
struct ExtractedFilters {
    org_type: Option<String>,
    facility_type: Option<String>,
    city: Option<String>,
    specialties: Vec<String>,
}

/// Per-call deadline for vector backend searches (spec.md §5: "30s vector").
/// `Err` distinguishes a hard I/O failure (timeout or backend error) from a
/// legitimate zero-hit result, so a caller can tell "nothing matched" apart
/// from "the backend didn't answer" (spec.md §7).
async fn search_with_deadline(
    backend: &dyn VectorBackend,
    query: &str,
    vector_name: &str,
    top_k: usize,
    filters: &VectorSearchFilters,
    deadline: Duration,
) -> Result<Vec<VectorHit>, String> {
    match tokio::time::timeout(deadline, backend.search(query, vector_name, top_k, filters)).await {
        Ok(Ok(hits)) => Ok(hits),
        Ok(Err(err)) => {
            warn!(vector = vector_name, error = %err, "vector backend search failed");
            Err(err.to_string())
        }
        Err(_) => {
            warn!(vector = vector_name, deadline_secs = deadline.as_secs(), "vector backend search timed out");
            Err(format!("timed out after {}s", deadline.as_secs()))
        }
    }
}

impl SemanticRetriever {
    pub async fn execute(utterance: &str, backend: &dyn VectorBackend, top_k: usize) -> (String, Value, Vec<Citation>) {
        Self::execute_with_deadline(utterance, backend, top_k, Duration::from_secs(30)).await
    }

    pub async fn execute_with_deadline(utterance: &str, backend: &dyn VectorBackend, top_k: usize, vector_deadline: Duration) -> (String, Value, Vec<Citation>) {
        let started = Instant::now();
        let lower = utterance.to_ascii_lowercase();
        let extracted = extract_filters(&lower);
        let filters = VectorSearchFilters {
            org_type: extracted.org_type.clone(),
            facility_type: extracted.facility_type.clone(),
            city: extracted.city.clone(),
            specialties: extracted.specialties.clone(),
        };

        let weights = compute_weights(&lower);
        let fetch_k = (top_k * 3).min(30);

        let mut per_vector: HashMap<&str, Vec<VectorHit>> = HashMap::new();
        let mut failures: Vec<String> = Vec::new();
        for &vector_name in VECTOR_NAMES {
            let rewritten = rewrite_query(utterance, vector_name);
            match search_with_deadline(backend, &rewritten, vector_name, fetch_k, &filters, vector_deadline).await {
                Ok(hits) => {
                    per_vector.insert(vector_name, hits);
                }
                Err(reason) => {
                    failures.push(format!("{vector_name}: {reason}"));
                    per_vector.insert(vector_name, Vec::new());
                }
            }
        }

        // One-shot unfiltered retry if every vector legitimately came back
        // empty with filters applied — but not if the backend is simply down.
        let all_empty = failures.is_empty() && per_vector.values().all(|hits| hits.is_empty());
        if all_empty && !filters_are_empty(&filters) {
            for &vector_name in VECTOR_NAMES {
                let rewritten = rewrite_query(utterance, vector_name);
                match search_with_deadline(backend, &rewritten, vector_name, fetch_k, &VectorSearchFilters::default(), vector_deadline).await {
                    Ok(hits) => {
                        per_vector.insert(vector_name, hits);
                    }
                    Err(reason) => {
                        failures.push(format!("{vector_name}: {reason}"));
                    }
                }
            }
        }

        // Every leg failed outright (as opposed to legitimately matching
        // nothing): surface a node-level error payload instead of a
        // misleadingly empty result set (spec.md §7 propagation policy).
        if failures.len() == VECTOR_NAMES.len() {
            return (
                "semantic_search".to_owned(),
                json!({ "error": failures.join("; "), "action": "semantic_search" }),
                Vec::new(),
            );
        }

        let fused = fuse(&per_vector, &weights, top_k);

        let citations = fused
            .iter()
            .map(|(hit, score)| Citation {
                source_id: hit.id.clone(),
                field: "document".to_owned(),
                evidence: json!({ "name": hit.name }),
                score: Some(*score),
            })
            .collect();

        let payload = json!({
            "query": utterance,
            "vector_weights": weights,
            "results": fused.iter().map(|(hit, score)| {
                json!({
                    "id": hit.id,
                    "name": hit.name,
                    "city": hit.city,
                    "region": hit.region,
                    "specialties": hit.specialties,
                    "fused_score": score,
                })
            }).collect::<Vec<_>>(),
            "count": fused.len(),
            "duration_ms": started.elapsed().as_secs_f64() * 1000.0,
        });

        ("semantic_search".to_owned(), payload, citations)
    }

    /// Dedicated "service in region" shortcut (spec.md §4.4 step 6): a
    /// single clinical-vector search with the region applied as a filter.
    pub async fn service_in_region(
        specialty: &str,
        region_city: &str,
        backend: &dyn VectorBackend,
        top_k: usize,
    ) -> (String, Value, Vec<Citation>) {
        Self::service_in_region_with_deadline(specialty, region_city, backend, top_k, Duration::from_secs(30)).await
    }

    pub async fn service_in_region_with_deadline(
        specialty: &str,
        region_city: &str,
        backend: &dyn VectorBackend,
        top_k: usize,
        vector_deadline: Duration,
    ) -> (String, Value, Vec<Citation>) {
        let filters = VectorSearchFilters { city: Some(region_city.to_owned()), ..Default::default() };
        let rewritten = rewrite_query(specialty, "clinical_detail");
        let hits = search_with_deadline(backend, &rewritten, "clinical_detail", top_k, &filters, vector_deadline).await;

        let citations = hits
            .iter()
            .map(|hit| Citation { source_id: hit.id.clone(), field: "document".to_owned(), evidence: json!({ "name": hit.name }), score: Some(hit.score) })
            .collect();

        (
            "semantic_service_in_region".to_owned(),
            json!({
                "specialty": specialty,
                "region": region_city,
                "results": hits.iter().map(|h| json!({ "id": h.id, "name": h.name, "score": h.score })).collect::<Vec<_>>(),
                "count": hits.len(),
            }),
            citations,
        )
    }
}

fn filters_are_empty(filters: &VectorSearchFilters) -> bool {
    filters.org_type.is_none() && filters.facility_type.is_none() && filters.city.is_none() && filters.specialties.is_empty()
}

fn extract_filters(lower: &str) -> ExtractedFilters {
    let mut out = ExtractedFilters::default();

    if lower.contains("ngo") {
        out.org_type = Some("ngo".to_owned());
    } else if lower.contains("facility") {
        out.org_type = Some("facility".to_owned());
    }

    for t in ["hospital", "clinic", "pharmacy", "dentist"] {
        if lower.contains(t) {
            out.facility_type = Some(t.to_owned());
            break;
        }
    }

    let mut cities: Vec<&str> = KNOWN_CITIES.to_vec();
    cities.sort_by_key(|c| std::cmp::Reverse(c.len()));
    for city in cities {
        let pattern = format!(r"\b{}\b", regex::escape(city));
        if let Ok(re) = regex::Regex::new(&pattern) {
            if re.is_match(lower) {
                out.city = Some(city.to_owned());
                break;
            }
        }
    }

    const SPECIALTY_IDS: &[&str] = &["cardiology", "ophthalmology", "neurosurgery", "oncology", "pediatrics", "orthopedics", "nephrology"];
    out.specialties = SPECIALTY_IDS.iter().filter(|s| lower.contains(*s)).map(|s| s.to_string()).collect();

    out
}

/// Per-vector weight: base 1 + min(hits, 3) for topic keywords, normalized
/// to sum to exactly 3.0 (spec.md §4.4 step 2).
fn compute_weights(lower: &str) -> HashMap<&'static str, f64> {
    let clinical_hits = CLINICAL_KEYWORDS.iter().filter(|k| lower.contains(*k)).count().min(3);
    let specialty_hits = SPECIALTY_KEYWORDS.iter().filter(|k| lower.contains(*k)).count().min(3);

    let mut raw: HashMap<&'static str, f64> = HashMap::new();
    raw.insert("full_document", 1.0);
    raw.insert("clinical_detail", 1.0 + clinical_hits as f64);
    raw.insert("specialties_context", 1.0 + specialty_hits as f64);

    let sum: f64 = raw.values().sum();
    let scale = 3.0 / sum;
    raw.into_iter().map(|(k, v)| (k, v * scale)).collect()
}

fn rewrite_query(query: &str, vector_name: &str) -> String {
    match vector_name {
        "clinical_detail" => format!("Procedures: {query} | Equipment: {query}"),
        "specialties_context" => format!("facility with specialties: {query}"),
        _ => query.to_owned(),
    }
}

/// Reciprocal Rank Fusion, K=60 (spec.md §4.4 step 4 / §8). Returns the
/// top `top_k` documents by descending fused score, ties broken by
/// insertion (first-seen) order.
fn fuse<'a>(per_vector: &'a HashMap<&str, Vec<VectorHit>>, weights: &HashMap<&'static str, f64>, top_k: usize) -> Vec<(VectorHit, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut richest: HashMap<String, VectorHit> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for &vector_name in VECTOR_NAMES {
        let Some(hits) = per_vector.get(vector_name) else { continue };
        let weight = *weights.get(vector_name).unwrap_or(&0.0);
        for (rank, hit) in hits.iter().enumerate() {
            let contribution = weight / (RRF_K + rank as f64 + 1.0);
            *scores.entry(hit.id.clone()).or_insert(0.0) += contribution;
            if !order.contains(&hit.id) {
                order.push(hit.id.clone());
            }
            richest
                .entry(hit.id.clone())
                .and_modify(|existing| {
                    if payload_richness(hit) > payload_richness(existing) {
                        *existing = hit.clone();
                    }
                })
                .or_insert_with(|| hit.clone());
        }
    }

    let mut ranked: Vec<(VectorHit, f64)> = order
        .into_iter()
        .map(|id| {
            let score = *scores.get(&id).unwrap_or(&0.0);
            let hit = richest.remove(&id).expect("id present in both maps");
            (hit, score)
        })
        .collect();

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    ranked.truncate(top_k);
    ranked
}

fn payload_richness(hit: &VectorHit) -> usize {
    hit.specialties.len() + hit.procedures.len() + hit.equipment.len() + hit.capabilities.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubBackend {
        hits_by_vector: HashMap<&'static str, Vec<VectorHit>>,
    }

    fn hit(id: &str, score: f64) -> VectorHit {
        VectorHit {
            id: id.to_owned(),
            score,
            name: format!("Facility {id}"),
            org_type: None,
            facility_type: None,
            city: None,
            region: None,
            specialties: vec![],
            procedures: vec![],
            equipment: vec![],
            capabilities: vec![],
            beds: None,
            doctors: None,
            lat: None,
            lng: None,
            document_text: String::new(),
        }
    }

    #[async_trait]
    impl VectorBackend for StubBackend {
        async fn search(&self, _query: &str, vector_name: &str, _top_k: usize, _filters: &VectorSearchFilters) -> anyhow::Result<Vec<VectorHit>> {
            Ok(self.hits_by_vector.get(vector_name).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn vector_weights_sum_to_three() {
        let weights = compute_weights("cardiology specialist surgery dialysis scan");
        let sum: f64 = weights.values().sum();
        assert!((sum - 3.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn same_single_document_across_vectors_fuses_to_sum_of_weight_over_k_plus_one() {
        let mut hits_by_vector = HashMap::new();
        for v in VECTOR_NAMES {
            hits_by_vector.insert(*v, vec![hit("1", 1.0)]);
        }
        let backend = StubBackend { hits_by_vector };
        let (_, payload, _) = SemanticRetriever::execute("generic query", &backend, 5).await;

        let weights = payload["vector_weights"].as_object().unwrap();
        let expected: f64 = weights.values().map(|w| w.as_f64().unwrap() / (RRF_K + 1.0)).sum();

        let fused_score = payload["results"][0]["fused_score"].as_f64().unwrap();
        assert!((fused_score - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_backend_results_never_panic() {
        let backend = StubBackend { hits_by_vector: HashMap::new() };
        let (_, payload, citations) = SemanticRetriever::execute("cardiology in Accra", &backend, 5).await;
        assert_eq!(payload["count"], json!(0));
        assert!(citations.is_empty());
    }

    struct SlowBackend;

    #[async_trait]
    impl VectorBackend for SlowBackend {
        async fn search(&self, _query: &str, _vector_name: &str, _top_k: usize, _filters: &VectorSearchFilters) -> anyhow::Result<Vec<VectorHit>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn vector_search_timeout_on_every_leg_yields_error_payload_not_hang() {
        let backend = SlowBackend;
        let (action, payload, citations) = SemanticRetriever::execute_with_deadline("cardiology", &backend, 5, Duration::from_millis(10)).await;
        assert_eq!(action, "semantic_search");
        assert!(payload["error"].is_string());
        assert!(citations.is_empty());
    }

    struct FlakyBackend;

    #[async_trait]
    impl VectorBackend for FlakyBackend {
        async fn search(&self, _query: &str, vector_name: &str, _top_k: usize, _filters: &VectorSearchFilters) -> anyhow::Result<Vec<VectorHit>> {
            if vector_name == "full_document" {
                return Ok(vec![VectorHit {
                    id: "1".to_owned(),
                    score: 0.9,
                    name: "Korle Bu".to_owned(),
                    org_type: None,
                    facility_type: None,
                    city: Some("Accra".to_owned()),
                    region: Some("Greater Accra".to_owned()),
                    specialties: vec!["cardiology".to_owned()],
                    procedures: Vec::new(),
                    equipment: Vec::new(),
                    capabilities: Vec::new(),
                    beds: None,
                    doctors: None,
                    lat: None,
                    lng: None,
                    document_text: String::new(),
                }]);
            }
            anyhow::bail!("vector unavailable")
        }
    }

    #[tokio::test]
    async fn one_failing_leg_still_returns_results_from_the_others() {
        let backend = FlakyBackend;
        let (action, payload, citations) = SemanticRetriever::execute_with_deadline("cardiology", &backend, 5, Duration::from_secs(30)).await;
        assert_eq!(action, "semantic_search");
        assert!(payload["error"].is_null());
        assert_eq!(payload["count"], json!(1));
        assert_eq!(citations.len(), 1);
    }
}
