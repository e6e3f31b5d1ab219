use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::entities::RawFacilityRow;
use crate::infrastructure::connectors::FacilitySource;

/// Reads the facility catalog from a CSV file at a configured path. CSV
/// loading is declared out of scope for the core engine (spec.md §1) but a
/// reference `FacilitySource` implementation keeps the trait boundary real
/// rather than aspirational.
pub struct CsvFacilitySource {
    path: PathBuf,
}

impl CsvFacilitySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    pk_unique_id: String,
    unique_id: String,
    name: String,
    organization_type: Option<String>,
    facility_type: Option<String>,
    city: Option<String>,
    region: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    beds: Option<f64>,
    doctors: Option<f64>,
    year_established: Option<i32>,
    area: Option<f64>,
    specialties: Option<String>,
    procedures: Option<String>,
    equipment: Option<String>,
    capabilities: Option<String>,
    source_url: Option<String>,
}

/// Tolerant list parsing: accepts JSON-array syntax (`["a", "b"]`),
/// literal-Python-ish single-quoted syntax (`['a', 'b']`), or a bare
/// comma-separated string, and treats `null`/`None`/`[]`/empty as absent —
/// per spec.md §4.1.
fn parse_list_field(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else { return Vec::new() };
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") || trimmed.eq_ignore_ascii_case("none") || trimmed == "[]" {
        return Vec::new();
    }

    let inner = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')).unwrap_or(trimmed);

    inner
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_owned())
        .collect()
}

#[async_trait]
impl FacilitySource for CsvFacilitySource {
    fn source_name(&self) -> &'static str {
        "csv_catalog"
    }

    async fn fetch_facilities(&self) -> anyhow::Result<Vec<RawFacilityRow>> {
        let path = self.path.clone();
        let rows = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<RawFacilityRow>> {
            let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(&path)?;
            let mut out = Vec::new();
            for record in reader.deserialize::<CsvRow>() {
                let row: CsvRow = record?;
                out.push(RawFacilityRow {
                    pk_unique_id: row.pk_unique_id,
                    unique_id: row.unique_id,
                    name: row.name,
                    organization_type: row.organization_type,
                    facility_type: row.facility_type,
                    city: row.city,
                    region: row.region,
                    latitude: row.latitude,
                    longitude: row.longitude,
                    beds: row.beds,
                    doctors: row.doctors,
                    year_established: row.year_established,
                    area: row.area,
                    specialties: parse_list_field(row.specialties.as_deref()),
                    procedures: parse_list_field(row.procedures.as_deref()),
                    equipment: parse_list_field(row.equipment.as_deref()),
                    capabilities: parse_list_field(row.capabilities.as_deref()),
                    source_url: row.source_url,
                });
            }
            Ok(out)
        })
        .await??;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_and_python_literal_lists_the_same_way() {
        assert_eq!(parse_list_field(Some("[\"cardiology\", \"ophthalmology\"]")), vec!["cardiology", "ophthalmology"]);
        assert_eq!(parse_list_field(Some("['cardiology', 'ophthalmology']")), vec!["cardiology", "ophthalmology"]);
    }

    #[test]
    fn treats_null_like_values_as_absent() {
        assert!(parse_list_field(Some("null")).is_empty());
        assert!(parse_list_field(Some("None")).is_empty());
        assert!(parse_list_field(Some("[]")).is_empty());
        assert!(parse_list_field(Some("")).is_empty());
        assert!(parse_list_field(None).is_empty());
    }
}
