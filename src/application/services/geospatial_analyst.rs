//! Geospatial Analyst (C7): radius / k-NN / coverage-grid / medical-desert /
//! equity / city-distance queries against the Spatial Index (C3).
//!
//! Handler semantics grounded in SPEC_FULL.md §4's pointer at the original's
//! geospatial agent — the spatial-index-backed variant only, per spec.md §9
//! ("the indexed variant is authoritative").

use std::time::Instant;

use regex::Regex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::domain::entities::{Citation, Facility, FacilityTable};
use crate::domain::geocoding::{self, BoundingBox};
use crate::domain::spatial_index::{SpatialIndex, haversine_km_deg};

pub struct GeospatialAnalyst;

impl GeospatialAnalyst {
    /// Returns `None` if `cancel` fires mid-computation (spec.md §5): the
    /// caller discards whatever partial state it was assembling rather than
    /// returning it.
    pub fn execute(utterance: &str, table: &FacilityTable, context_point: Option<(f64, f64)>, bbox: BoundingBox, cancel: &CancellationToken) -> Option<(String, Value, Vec<Citation>)> {
        let started = Instant::now();
        let lower = utterance.to_ascii_lowercase();

        let specialty = extract_specialty(&lower);
        let radius_km = extract_radius_km(&lower);
        let point = context_point.or_else(|| geocoding::find_city_mention(&lower).map(|(_, lat, lng)| (lat, lng)));

        let (action, mut payload, citations) = if lower.contains("distance between") || (lower.contains("distance") && lower.contains(" and ")) {
            distance_between_cities(&lower)
        } else if lower.contains("equity") {
            regional_equity(table)
        } else if lower.contains("desert") {
            medical_deserts(table, specialty.as_deref(), 75.0)
        } else if lower.contains("gap") || lower.contains("coverage") {
            coverage_gap(table, specialty.as_deref(), 0.5, 50.0, bbox, cancel)?
        } else if lower.contains("nearest") || lower.contains("closest") {
            let k = extract_k(&lower).unwrap_or(5);
            match point {
                Some((lat, lng)) => nearest(table, lat, lng, k, specialty.as_deref()),
                None => missing_location_error(),
            }
        } else if lower.contains("within") || lower.contains("near") {
            match point {
                Some((lat, lng)) => within_radius(table, lat, lng, radius_km.unwrap_or(25.0), specialty.as_deref()),
                None => missing_location_error(),
            }
        } else {
            coverage_gap(table, specialty.as_deref(), 0.5, 50.0, bbox, cancel)?
        };

        if let Value::Object(ref mut map) = payload {
            map.insert("duration_ms".to_owned(), json!(started.elapsed().as_secs_f64() * 1000.0));
        }

        Some((action, payload, citations))
    }
}

/// Human-readable reason for an empty coordinate subset (spec.md §8
/// boundary behavior: "not an error"), so callers can distinguish a
/// legitimate zero-match result from a backend failure.
fn no_match_explanation(specialty: Option<&str>) -> String {
    match specialty {
        Some(s) => format!("no facilities with coordinates offer {s}; nothing to index or query"),
        None => "no facilities with coordinates are available to index or query".to_owned(),
    }
}

fn missing_location_error() -> (String, Value, Vec<Citation>) {
    ("geospatial_missing_location".to_owned(), json!({ "error": "no coordinates or recognizable city in request", "facilities": [] }), Vec::new())
}

fn extract_specialty(lower: &str) -> Option<String> {
    const SPECIALTIES: &[&str] = &["cardiology", "ophthalmology", "neurosurgery", "oncology", "nephrology", "orthopedics", "pediatrics", "obstetrics"];
    SPECIALTIES.iter().find(|s| lower.contains(*s)).map(|s| s.to_string())
}

fn extract_radius_km(lower: &str) -> Option<f64> {
    let re = Regex::new(r"(\d+)\s*km").ok()?;
    re.captures(lower).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse::<f64>().ok())
}

fn extract_k(lower: &str) -> Option<usize> {
    let re = Regex::new(r"(\d+)\s*(nearest|closest)").ok()?;
    re.captures(lower).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse::<usize>().ok())
}

fn coordinate_subset(table: &FacilityTable, specialty: Option<&str>) -> Vec<(usize, &Facility)> {
    table
        .all()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.coords.is_some() && specialty.is_none_or(|s| f.has_specialty(s)))
        .collect()
}

fn build_index(subset: &[(usize, &Facility)]) -> SpatialIndex {
    let points: Vec<(f64, f64, usize)> = subset
        .iter()
        .enumerate()
        .map(|(local_idx, (_, f))| {
            let (lat, lng) = f.coords.expect("filtered to have coords");
            (lat, lng, local_idx)
        })
        .collect();
    SpatialIndex::build(&points)
}

fn facility_with_distance(f: &Facility, distance_km: f64) -> Value {
    json!({
        "pk_unique_id": f.pk_unique_id,
        "name": f.name,
        "city": f.city,
        "region": f.region,
        "specialties": f.specialties,
        "distance_km": distance_km,
    })
}

fn within_radius(table: &FacilityTable, lat: f64, lng: f64, radius_km: f64, specialty: Option<&str>) -> (String, Value, Vec<Citation>) {
    let subset = coordinate_subset(table, specialty);
    if subset.is_empty() {
        return (
            "within_radius".to_owned(),
            json!({ "facilities": [], "count": 0, "explanation": no_match_explanation(specialty) }),
            Vec::new(),
        );
    }
    let index = build_index(&subset);
    let mut hits = index.within_radius(lat, lng, radius_km);
    hits.truncate(30);

    let citations = hits
        .iter()
        .map(|(local_idx, _)| {
            let (_, f) = subset[*local_idx];
            Citation { source_id: f.pk_unique_id.clone(), field: "coords".to_owned(), evidence: json!({ "name": f.name }), score: None }
        })
        .collect();

    let facilities: Vec<Value> = hits.iter().map(|(local_idx, distance)| facility_with_distance(subset[*local_idx].1, *distance)).collect();

    ("within_radius".to_owned(), json!({ "origin": [lat, lng], "radius_km": radius_km, "count": facilities.len(), "facilities": facilities }), citations)
}

fn nearest(table: &FacilityTable, lat: f64, lng: f64, k: usize, specialty: Option<&str>) -> (String, Value, Vec<Citation>) {
    let subset = coordinate_subset(table, specialty);
    if subset.is_empty() {
        return (
            "nearest".to_owned(),
            json!({ "facilities": [], "count": 0, "explanation": no_match_explanation(specialty) }),
            Vec::new(),
        );
    }
    let index = build_index(&subset);
    let effective_k = k.min(subset.len());
    let hits = index.k_nearest(lat, lng, effective_k);

    let citations = hits
        .iter()
        .map(|(local_idx, _)| {
            let (_, f) = subset[*local_idx];
            Citation { source_id: f.pk_unique_id.clone(), field: "coords".to_owned(), evidence: json!({ "name": f.name }), score: None }
        })
        .collect();

    let facilities: Vec<Value> = hits.iter().map(|(local_idx, distance)| facility_with_distance(subset[*local_idx].1, *distance)).collect();

    ("nearest".to_owned(), json!({ "origin": [lat, lng], "k": effective_k, "facilities": facilities }), citations)
}

/// Returns `None` if `cancel` fires before the grid scan completes
/// (spec.md §5): the caller discards the partial cell/cold-spot scan.
fn coverage_gap(table: &FacilityTable, specialty: Option<&str>, grid_deg: f64, max_km: f64, bbox: BoundingBox, cancel: &CancellationToken) -> Option<(String, Value, Vec<Citation>)> {
    let subset = coordinate_subset(table, specialty);
    if subset.is_empty() {
        return Some((
            "coverage_gap_detection".to_owned(),
            json!({ "gaps": [], "coverage_pct": 0.0, "explanation": no_match_explanation(specialty) }),
            Vec::new(),
        ));
    }
    let index = build_index(&subset);

    let mut cells = Vec::new();
    let mut lat = bbox.south;
    while lat <= bbox.north {
        if cancel.is_cancelled() {
            return None;
        }
        let mut lng = bbox.west;
        while lng <= bbox.east {
            cells.push((lat, lng));
            lng += grid_deg;
        }
        lat += grid_deg;
    }

    let mut worst: Vec<(f64, f64, f64)> = Vec::new();
    let mut covered = 0usize;

    for (i, (lat, lng)) in cells.iter().enumerate() {
        if i % 64 == 0 && cancel.is_cancelled() {
            return None;
        }
        let hit = index.k_nearest(*lat, *lng, 1);
        let Some((_, distance)) = hit.first() else { continue };
        if *distance > max_km {
            worst.push((*lat, *lng, *distance));
        } else {
            covered += 1;
        }
    }

    worst.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap());
    worst.truncate(15);

    let coverage_pct = if cells.is_empty() { 0.0 } else { 100.0 * covered as f64 / cells.len() as f64 };

    Some((
        "coverage_gap_detection".to_owned(),
        json!({
            "grid_deg": grid_deg,
            "max_km": max_km,
            "total_cells": cells.len(),
            "coverage_pct": coverage_pct,
            "worst_cold_spots": worst.into_iter().map(|(lat, lng, distance)| json!({ "lat": lat, "lng": lng, "distance_km": distance })).collect::<Vec<_>>(),
        }),
        Vec::new(),
    ))
}

fn medical_deserts(table: &FacilityTable, specialty: Option<&str>, threshold_km: f64) -> (String, Value, Vec<Citation>) {
    let subset = coordinate_subset(table, specialty);
    if subset.is_empty() {
        return (
            "medical_desert_detection".to_owned(),
            json!({ "deserts_found": 0, "deserts": [], "explanation": no_match_explanation(specialty) }),
            Vec::new(),
        );
    }
    let index = build_index(&subset);

    let mut region_points: Vec<(String, f64, f64, usize)> = Vec::new();
    for f in table.all() {
        let Some(region) = &f.region else { continue };
        let Some((lat, lng)) = f.coords else { continue };
        match region_points.iter_mut().find(|(r, ..)| r == region) {
            Some((_, sum_lat, sum_lng, count)) => {
                *sum_lat += lat;
                *sum_lng += lng;
                *count += 1;
            }
            None => region_points.push((region.clone(), lat, lng, 1)),
        }
    }

    let mut deserts = Vec::new();
    for (region, sum_lat, sum_lng, count) in region_points {
        let (lat, lng) = geocoding::region_centroid(&region).unwrap_or((sum_lat / count as f64, sum_lng / count as f64));
        let hit = index.k_nearest(lat, lng, 1);
        let Some((_, distance)) = hit.first() else { continue };
        if *distance > threshold_km {
            let severity = if *distance > 150.0 {
                "critical"
            } else if *distance > 100.0 {
                "high"
            } else {
                "medium"
            };
            deserts.push(json!({
                "region": region,
                "center": [lat, lng],
                "nearest_distance_km": distance,
                "severity": severity,
            }));
        }
    }

    deserts.sort_by(|a, b| b["nearest_distance_km"].as_f64().partial_cmp(&a["nearest_distance_km"].as_f64()).unwrap());

    ("medical_desert_detection".to_owned(), json!({ "deserts_found": deserts.len(), "deserts": deserts }), Vec::new())
}

fn regional_equity(table: &FacilityTable) -> (String, Value, Vec<Citation>) {
    let mut by_region: Vec<(String, Vec<&Facility>)> = Vec::new();
    for f in table.all() {
        let Some(region) = &f.region else { continue };
        match by_region.iter_mut().find(|(r, _)| r == region) {
            Some((_, facilities)) => facilities.push(f),
            None => by_region.push((region.clone(), vec![f])),
        }
    }

    let mut report = Vec::new();
    for (region, facilities) in by_region {
        let total_beds: f64 = facilities.iter().filter_map(|f| f.beds).sum();
        let total_doctors: f64 = facilities.iter().filter_map(|f| f.doctors).sum();
        let mut specialty_counts: Vec<(String, usize)> = Vec::new();
        for f in &facilities {
            for s in &f.specialties {
                let key = s.to_ascii_lowercase();
                match specialty_counts.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, c)) => *c += 1,
                    None => specialty_counts.push((key, 1)),
                }
            }
        }
        specialty_counts.sort_by(|a, b| b.1.cmp(&a.1));
        let top_specialties: Vec<Value> = specialty_counts.iter().take(10).map(|(s, c)| json!({ "specialty": s, "count": c })).collect();
        let unique_specialty_count = specialty_counts.len();

        report.push(json!({
            "region": region,
            "facility_count": facilities.len(),
            "total_beds": total_beds,
            "total_doctors": total_doctors,
            "unique_specialty_count": unique_specialty_count,
            "top_specialties": top_specialties,
            "beds_per_facility": if facilities.is_empty() { 0.0 } else { total_beds / facilities.len() as f64 },
        }));
    }

    report.sort_by(|a, b| a["region"].as_str().cmp(&b["region"].as_str()));

    ("regional_equity".to_owned(), json!({ "regions": report }), Vec::new())
}

fn distance_between_cities(lower: &str) -> (String, Value, Vec<Citation>) {
    let mut cities: Vec<(&'static str, f64, f64)> = Vec::new();
    let mut remaining = lower.to_owned();
    for _ in 0..2 {
        if let Some((name, lat, lng)) = geocoding::find_city_mention(&remaining) {
            cities.push((name, lat, lng));
            remaining = remaining.replacen(name, "", 1);
        }
    }

    if cities.len() < 2 {
        return (
            "distance_between_cities".to_owned(),
            json!({ "error": "could not recognize two cities in request" }),
            Vec::new(),
        );
    }

    let distance_km = haversine_km_deg(cities[0].1, cities[0].2, cities[1].1, cities[1].2);

    (
        "distance_between_cities".to_owned(),
        json!({
            "city_a": cities[0].0,
            "city_b": cities[1].0,
            "distance_km": distance_km,
        }),
        Vec::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::RawFacilityRow;

    fn sample_table() -> FacilityTable {
        FacilityTable::build(vec![
            RawFacilityRow { pk_unique_id: "1".into(), unique_id: "1".into(), name: "Accra Hospital".into(), latitude: Some(5.6037), longitude: Some(-0.1870), region: Some("Greater Accra".into()), specialties: vec!["cardiology".into()], ..Default::default() },
            RawFacilityRow { pk_unique_id: "2".into(), unique_id: "2".into(), name: "Kumasi Hospital".into(), latitude: Some(6.6885), longitude: Some(-1.6244), region: Some("Ashanti".into()), specialties: vec!["cardiology".into()], ..Default::default() },
        ])
    }

    #[test]
    fn within_radius_caps_distance() {
        let table = sample_table();
        let (action, payload, _) = within_radius(&table, 5.60, -0.19, 30.0, Some("cardiology"));
        assert_eq!(action, "within_radius");
        let facilities = payload["facilities"].as_array().unwrap();
        for f in facilities {
            assert!(f["distance_km"].as_f64().unwrap() <= 30.0);
            assert!(f["specialties"].as_array().unwrap().iter().any(|s| s == "cardiology"));
        }
    }

    #[test]
    fn nearest_caps_k_at_subset_len() {
        let table = sample_table();
        let (_, payload, _) = nearest(&table, 5.60, -0.19, 10, None);
        assert_eq!(payload["k"], json!(2));
    }

    #[test]
    fn empty_specialty_subset_reports_zero_deserts_not_error() {
        let table = sample_table();
        let (_, payload, _) = medical_deserts(&table, Some("neurosurgery"), 75.0);
        assert_eq!(payload["deserts_found"], json!(0));
        assert!(payload["explanation"].is_string());
    }

    #[test]
    fn empty_subset_payloads_all_carry_an_explanation() {
        let table = sample_table();
        let (_, within, _) = within_radius(&table, 5.60, -0.19, 30.0, Some("neurosurgery"));
        assert!(within["explanation"].is_string());
        let (_, near, _) = nearest(&table, 5.60, -0.19, 5, Some("neurosurgery"));
        assert!(near["explanation"].is_string());
        let (_, gap, _) = coverage_gap(&table, Some("neurosurgery"), 0.5, 50.0, geocoding::BOUNDING_BOX, &CancellationToken::new()).unwrap();
        assert!(gap["explanation"].is_string());
    }

    #[test]
    fn coverage_gap_returns_none_when_cancelled() {
        let table = sample_table();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(coverage_gap(&table, Some("cardiology"), 0.5, 50.0, geocoding::BOUNDING_BOX, &cancel).is_none());
    }

    #[test]
    fn distance_between_known_cities_is_positive() {
        let (_, payload, _) = distance_between_cities("distance between accra and kumasi");
        assert!(payload["distance_km"].as_f64().unwrap() > 100.0);
    }
}
