//! Facility Store (C1): builds the canonical, immutable `FacilityTable` from
//! raw rows supplied by an external [`crate::infrastructure::connectors::FacilitySource`].
//!
//! Grounded in `original_source/backend/core/preprocessing.py`'s merge rule
//! and spec.md §4.1/§3.

use std::collections::HashMap;

use crate::domain::{entities::*, geocoding};

/// Ordered, indexed collection of facilities with O(1) positional access.
/// Built once at start-up and never mutated afterwards (spec.md §5).
#[derive(Clone, Debug, Default)]
pub struct FacilityTable {
    facilities: Vec<Facility>,
}

impl FacilityTable {
    pub fn build(raw_rows: Vec<RawFacilityRow>) -> Self {
        let mut by_id: HashMap<String, RawFacilityRow> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for row in raw_rows {
            if row.pk_unique_id.is_empty() {
                continue;
            }
            match by_id.get_mut(&row.pk_unique_id) {
                Some(existing) => merge_rows(existing, row),
                None => {
                    order.push(row.pk_unique_id.clone());
                    by_id.insert(row.pk_unique_id.clone(), row);
                }
            }
        }

        let facilities = order
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .map(finalize_facility)
            .collect();

        Self { facilities }
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    pub fn all(&self) -> &[Facility] {
        &self.facilities
    }

    pub fn get(&self, index: usize) -> Option<&Facility> {
        self.facilities.get(index)
    }

    pub fn find_by_pk(&self, pk_unique_id: &str) -> Option<&Facility> {
        self.facilities.iter().find(|f| f.pk_unique_id == pk_unique_id)
    }

    /// The subset of facilities that carry both coordinates.
    pub fn with_coordinates(&self) -> Vec<&Facility> {
        self.facilities.iter().filter(|f| f.coords.is_some()).collect()
    }

    /// The subset claiming `specialty`, optionally restricted further to
    /// those that also carry coordinates (used by specialty-scoped spatial
    /// queries, spec.md §4.2/§4.6).
    pub fn with_specialty(&self, specialty: &str) -> Vec<&Facility> {
        self.facilities.iter().filter(|f| f.has_specialty(specialty)).collect()
    }
}

/// Richness rule: count of non-empty scalar + list fields, used to decide
/// which of two merging rows "wins" scalar conflicts (spec.md §3 invariant).
fn richness(row: &RawFacilityRow) -> usize {
    let mut score = 0;
    if row.organization_type.is_some() {
        score += 1;
    }
    if row.facility_type.is_some() {
        score += 1;
    }
    if row.city.is_some() {
        score += 1;
    }
    if row.region.is_some() {
        score += 1;
    }
    if row.latitude.is_some() && row.longitude.is_some() {
        score += 1;
    }
    if row.beds.is_some() {
        score += 1;
    }
    if row.doctors.is_some() {
        score += 1;
    }
    score + row.specialties.len() + row.procedures.len() + row.equipment.len() + row.capabilities.len()
}

fn merge_rows(existing: &mut RawFacilityRow, incoming: RawFacilityRow) {
    if richness(&incoming) > richness(existing) {
        // The richer row's scalars win; list fields still get unioned below.
        let merged_specialties = union_preserve_order(&existing.specialties, &incoming.specialties);
        let merged_procedures = union_preserve_order(&existing.procedures, &incoming.procedures);
        let merged_equipment = union_preserve_order(&existing.equipment, &incoming.equipment);
        let merged_capabilities = union_preserve_order(&existing.capabilities, &incoming.capabilities);
        *existing = incoming;
        existing.specialties = merged_specialties;
        existing.procedures = merged_procedures;
        existing.equipment = merged_equipment;
        existing.capabilities = merged_capabilities;
    } else {
        existing.specialties = union_preserve_order(&existing.specialties, &incoming.specialties);
        existing.procedures = union_preserve_order(&existing.procedures, &incoming.procedures);
        existing.equipment = union_preserve_order(&existing.equipment, &incoming.equipment);
        existing.capabilities = union_preserve_order(&existing.capabilities, &incoming.capabilities);
    }
}

fn union_preserve_order(a: &[String], b: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    for item in a.iter().chain(b.iter()) {
        if !out.iter().any(|existing: &String| existing.eq_ignore_ascii_case(item)) {
            out.push(item.clone());
        }
    }
    out
}

fn finalize_facility(row: RawFacilityRow) -> Facility {
    let coords = match (row.latitude, row.longitude) {
        (Some(lat), Some(lng)) => Some((lat, lng)),
        _ => geocoding::geocode(row.city.as_deref(), row.region.as_deref()),
    };

    let document = build_document(&row);

    Facility {
        pk_unique_id: row.pk_unique_id,
        unique_id: row.unique_id,
        name: row.name,
        org_type: row.organization_type.as_deref().and_then(OrgType::from_str_loose),
        facility_type: row.facility_type,
        city: row.city,
        region: row.region,
        coords,
        beds: row.beds,
        doctors: row.doctors,
        year_established: row.year_established,
        area: row.area,
        specialties: row.specialties,
        procedures: row.procedures,
        equipment: row.equipment,
        capabilities: row.capabilities,
        source_url: row.source_url,
        document,
    }
}

fn build_document(row: &RawFacilityRow) -> String {
    let mut parts = vec![row.name.clone()];
    if let Some(city) = &row.city {
        parts.push(city.clone());
    }
    if let Some(region) = &row.region {
        parts.push(region.clone());
    }
    if !row.specialties.is_empty() {
        parts.push(format!("Specialties: {}", row.specialties.join(", ")));
    }
    if !row.procedures.is_empty() {
        parts.push(format!("Procedures: {}", row.procedures.join(", ")));
    }
    if !row.equipment.is_empty() {
        parts.push(format!("Equipment: {}", row.equipment.join(", ")));
    }
    if !row.capabilities.is_empty() {
        parts.push(format!("Capabilities: {}", row.capabilities.join(", ")));
    }
    parts.join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pk: &str, specialties: &[&str]) -> RawFacilityRow {
        RawFacilityRow {
            pk_unique_id: pk.to_string(),
            unique_id: pk.to_string(),
            name: format!("Facility {pk}"),
            specialties: specialties.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn dedupes_by_pk_and_unions_list_fields() {
        let a = row("1", &["cardiology"]);
        let b = row("1", &["ophthalmology", "cardiology"]);
        let table = FacilityTable::build(vec![a, b]);
        assert_eq!(table.len(), 1);
        let facility = table.get(0).unwrap();
        assert_eq!(facility.specialties.len(), 2);
        assert!(facility.has_specialty("cardiology"));
        assert!(facility.has_specialty("ophthalmology"));
    }

    #[test]
    fn richer_row_scalars_win() {
        let mut poor = row("1", &[]);
        poor.city = None;
        let mut rich = row("1", &["cardiology"]);
        rich.city = Some("Accra".into());
        rich.region = Some("Greater Accra".into());
        rich.beds = Some(50.0);

        let table = FacilityTable::build(vec![poor, rich]);
        let facility = table.get(0).unwrap();
        assert_eq!(facility.city.as_deref(), Some("Accra"));
        assert_eq!(facility.beds, Some(50.0));
    }

    #[test]
    fn missing_coordinates_are_backfilled_by_geocoding() {
        let mut r = row("1", &[]);
        r.city = Some("Accra".into());
        let table = FacilityTable::build(vec![r]);
        assert_eq!(table.get(0).unwrap().coords, Some((5.6037, -0.1870)));
    }

    #[test]
    fn ids_are_unique_after_build() {
        let rows = vec![row("1", &["a"]), row("2", &["b"]), row("1", &["c"])];
        let table = FacilityTable::build(rows);
        assert_eq!(table.len(), 2);
    }
}
