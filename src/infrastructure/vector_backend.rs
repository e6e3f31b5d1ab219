//! External collaborator (spec.md §1/§6): named-vector similarity search
//! over facility documents. The trait is the transport boundary a real
//! Qdrant/Databricks Model-Serving client would implement; this module also
//! ships one reference in-process implementation so the pipeline is
//! exercisable end-to-end without that external dependency, per
//! SPEC_FULL.md §4's Semantic Retriever note.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::entities::{Facility, FacilityTable};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VectorSearchFilters {
    pub org_type: Option<String>,
    pub facility_type: Option<String>,
    pub city: Option<String>,
    pub specialties: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f64,
    pub name: String,
    pub org_type: Option<String>,
    pub facility_type: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub specialties: Vec<String>,
    pub procedures: Vec<String>,
    pub equipment: Vec<String>,
    pub capabilities: Vec<String>,
    pub beds: Option<f64>,
    pub doctors: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub document_text: String,
}

/// `search(query, vector_name, top_k, filters) -> ranked hits`, spec.md §6's
/// vector backend contract. A per-call failure is caught by the caller and
/// treated as an empty result (spec.md §4.4 step 3) — this trait itself may
/// return `Err` to model that.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn search(
        &self,
        query: &str,
        vector_name: &str,
        top_k: usize,
        filters: &VectorSearchFilters,
    ) -> anyhow::Result<Vec<VectorHit>>;
}

/// Token-overlap cosine-like scoring over the three named vectors, held
/// entirely in process memory. Vectors are never literally embedded; each
/// named vector instead reads from a different slice of the facility's
/// composed text, matching the three-vector split spec.md §4.4 describes
/// (full_document / clinical_detail / specialties_context).
pub struct InProcessVectorBackend {
    table: Arc<FacilityTable>,
}

impl InProcessVectorBackend {
    pub fn new(table: Arc<FacilityTable>) -> Self {
        Self { table }
    }

    fn vector_text(facility: &Facility, vector_name: &str) -> String {
        match vector_name {
            "clinical_detail" => format!(
                "{} {}",
                facility.procedures.join(" "),
                facility.equipment.join(" ")
            ),
            "specialties_context" => facility.specialties.join(" "),
            _ => facility.document.clone(),
        }
    }

    fn matches_filters(facility: &Facility, filters: &VectorSearchFilters) -> bool {
        if let Some(org_type) = &filters.org_type {
            if !facility.org_type.as_ref().is_some_and(|o| o.as_str().eq_ignore_ascii_case(org_type)) {
                return false;
            }
        }
        if let Some(facility_type) = &filters.facility_type {
            if !facility.facility_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(facility_type)) {
                return false;
            }
        }
        if let Some(city) = &filters.city {
            if !facility.city.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(city)) {
                return false;
            }
        }
        if !filters.specialties.is_empty() && !filters.specialties.iter().any(|s| facility.has_specialty(s)) {
            return false;
        }
        true
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_ascii_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_owned())
        .collect()
}

/// Jaccard-style overlap, stood in for a true cosine score since there is no
/// real embedding model in process; both are bounded similarity measures in
/// `[0, 1]` which is all the RRF fusion step (spec.md §4.4 step 4) needs.
fn overlap_score(query_tokens: &HashSet<String>, doc_tokens: &HashSet<String>) -> f64 {
    if query_tokens.is_empty() || doc_tokens.is_empty() {
        return 0.0;
    }
    let intersection = query_tokens.intersection(doc_tokens).count();
    if intersection == 0 {
        return 0.0;
    }
    intersection as f64 / (query_tokens.len() as f64).sqrt() / (doc_tokens.len() as f64).sqrt()
}

#[async_trait]
impl VectorBackend for InProcessVectorBackend {
    async fn search(
        &self,
        query: &str,
        vector_name: &str,
        top_k: usize,
        filters: &VectorSearchFilters,
    ) -> anyhow::Result<Vec<VectorHit>> {
        let query_tokens = tokenize(query);

        let mut scored: Vec<(f64, &Facility)> = self
            .table
            .all()
            .iter()
            .filter(|f| Self::matches_filters(f, filters))
            .map(|f| {
                let doc_tokens = tokenize(&Self::vector_text(f, vector_name));
                (overlap_score(&query_tokens, &doc_tokens), f)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then(a.1.pk_unique_id.cmp(&b.1.pk_unique_id)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, f)| VectorHit {
                id: f.pk_unique_id.clone(),
                score,
                name: f.name.clone(),
                org_type: f.org_type.map(|o| o.as_str().to_owned()),
                facility_type: f.facility_type.clone(),
                city: f.city.clone(),
                region: f.region.clone(),
                specialties: f.specialties.clone(),
                procedures: f.procedures.clone(),
                equipment: f.equipment.clone(),
                capabilities: f.capabilities.clone(),
                beds: f.beds,
                doctors: f.doctors,
                lat: f.latitude(),
                lng: f.longitude(),
                document_text: f.document.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::RawFacilityRow;

    fn table() -> Arc<FacilityTable> {
        Arc::new(FacilityTable::build(vec![RawFacilityRow {
            pk_unique_id: "1".into(),
            unique_id: "1".into(),
            name: "Korle Bu".into(),
            specialties: vec!["cardiology".into()],
            procedures: vec!["bypass surgery".into()],
            ..Default::default()
        }]))
    }

    #[tokio::test]
    async fn scores_matching_document_above_zero() {
        let backend = InProcessVectorBackend::new(table());
        let hits = backend
            .search("cardiology bypass surgery", "full_document", 5, &VectorSearchFilters::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.0);
    }

    #[tokio::test]
    async fn filter_excludes_non_matching_facility_type() {
        let backend = InProcessVectorBackend::new(table());
        let filters = VectorSearchFilters { facility_type: Some("clinic".into()), ..Default::default() };
        let hits = backend.search("cardiology", "full_document", 5, &filters).await.unwrap();
        assert!(hits.is_empty());
    }
}
