//! Validator (C6): rule-based capability checks, two-stage statistical
//! outlier detection, and textual red-flag scanning.
//!
//! Rule table, fuzzy containment rule, anomaly detection strategy, and
//! red-flag pattern table grounded in SPEC_FULL.md §4's pointer at the
//! original's medical-reasoning agent and config module.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use regex::Regex;
use serde_json::{Value, json};

use crate::domain::entities::{Citation, Facility, FacilityTable};
use crate::domain::geocoding;

// ---------------------------------------------------------------------
// Rule table (spec.md §4.5.1)
// ---------------------------------------------------------------------

struct ProcedureRequirement {
    class: &'static str,
    equipment: &'static [&'static str],
    capabilities: &'static [&'static str],
    min_beds: f64,
}

const PROCEDURE_REQUIREMENTS: &[ProcedureRequirement] = &[
    ProcedureRequirement { class: "cardiac_surgery", equipment: &["ct scanner", "ecg machine"], capabilities: &["icu", "operating theatre"], min_beds: 50.0 },
    ProcedureRequirement { class: "neuro_surgery", equipment: &["ct scanner", "mri scanner"], capabilities: &["icu", "operating theatre"], min_beds: 100.0 },
    ProcedureRequirement { class: "oncology_treatment", equipment: &["linear accelerator"], capabilities: &[], min_beds: 30.0 },
    ProcedureRequirement { class: "dialysis_care", equipment: &["dialysis machine"], capabilities: &[], min_beds: 10.0 },
    ProcedureRequirement { class: "eye_surgery", equipment: &[], capabilities: &["operating theatre"], min_beds: 5.0 },
];

const SPECIALTY_PROCEDURE_CLASSES: &[(&str, &[&str])] = &[
    ("cardiology", &["cardiac_surgery"]),
    ("neurosurgery", &["neuro_surgery"]),
    ("oncology", &["oncology_treatment"]),
    ("nephrology", &["dialysis_care"]),
    ("ophthalmology", &["eye_surgery"]),
];

#[derive(Clone, Debug, serde::Serialize)]
struct Issue {
    #[serde(rename = "type")]
    kind: String,
    severity: &'static str,
    specialty: String,
    requirement: String,
    message: String,
}

fn requirement_for(class: &str) -> Option<&'static ProcedureRequirement> {
    PROCEDURE_REQUIREMENTS.iter().find(|r| r.class == class)
}

/// Exact substring OR sliding-window token-set similarity >= 75 (spec.md
/// §4.5.1). Windows of `haystack`'s tokens, matching `needle`'s token
/// count, are compared to `needle` with an edit-distance-based ratio.
fn fuzzy_contains(haystack: &str, needle: &str) -> bool {
    if haystack.contains(needle) {
        return true;
    }

    let needle_tokens: Vec<&str> = needle.split_whitespace().collect();
    if needle_tokens.is_empty() {
        return false;
    }
    let haystack_tokens: Vec<&str> = haystack.split_whitespace().collect();
    if haystack_tokens.len() < needle_tokens.len() {
        return false;
    }

    for window in haystack_tokens.windows(needle_tokens.len()) {
        let candidate = window.join(" ");
        if similarity_ratio(&candidate, needle) >= 75 {
            return true;
        }
    }
    false
}

fn similarity_ratio(a: &str, b: &str) -> u32 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100;
    }
    let dist = geocoding::levenshtein_distance(a, b);
    (100.0 * (1.0 - dist as f64 / max_len as f64)).round().max(0.0) as u32
}

fn validate_facility(facility: &Facility) -> (Vec<Issue>, f64) {
    let text = facility.searchable_text();
    let mut issues = Vec::new();

    for specialty in &facility.specialties {
        let Some((_, classes)) = SPECIALTY_PROCEDURE_CLASSES.iter().find(|(s, _)| s.eq_ignore_ascii_case(specialty)) else { continue };
        for class in *classes {
            let Some(requirement) = requirement_for(class) else { continue };

            for equipment in requirement.equipment {
                if !fuzzy_contains(&text, equipment) {
                    issues.push(Issue {
                        kind: "missing_equipment".to_owned(),
                        severity: "high",
                        specialty: specialty.clone(),
                        requirement: equipment.to_string(),
                        message: format!("{specialty} claimed without evidence of {equipment}"),
                    });
                }
            }
            for capability in requirement.capabilities {
                if !fuzzy_contains(&text, capability) {
                    issues.push(Issue {
                        kind: "missing_capability".to_owned(),
                        severity: "high",
                        specialty: specialty.clone(),
                        requirement: capability.to_string(),
                        message: format!("{specialty} claimed without evidence of {capability}"),
                    });
                }
            }
            if let Some(beds) = facility.beds {
                if beds < requirement.min_beds {
                    issues.push(Issue {
                        kind: "insufficient_beds".to_owned(),
                        severity: "medium",
                        specialty: specialty.clone(),
                        requirement: format!("min_beds={}", requirement.min_beds),
                        message: format!("{specialty} typically requires >= {} beds, facility reports {beds}", requirement.min_beds),
                    });
                }
            }
        }
    }

    let confidence = confidence_from_issues(facility, &issues);
    (issues, confidence)
}

fn confidence_from_issues(facility: &Facility, issues: &[Issue]) -> f64 {
    let total_claims = facility.specialties.len() + facility.procedures.len() + facility.equipment.len() + facility.capabilities.len();
    let data_completeness = (total_claims as f64 / 10.0).min(1.0);

    if issues.is_empty() {
        return 0.7 + 0.3 * data_completeness;
    }

    let high_count = issues.iter().filter(|i| i.severity == "high").count();
    let medium_count = issues.iter().filter(|i| i.severity == "medium").count();

    let high_penalty: f64 = penalty_sum(high_count, &[0.15, 0.10, 0.05], 0.05);
    let medium_penalty: f64 = penalty_sum(medium_count, &[0.08, 0.04], 0.04);

    (1.0 - high_penalty - medium_penalty).clamp(0.10, 0.95)
}

fn penalty_sum(count: usize, explicit: &[f64], tail: f64) -> f64 {
    (0..count).map(|i| explicit.get(i).copied().unwrap_or(tail)).sum()
}

pub struct Validator;

impl Validator {
    pub fn execute(utterance: &str, table: &FacilityTable) -> (String, Value, Vec<Citation>) {
        let started = Instant::now();
        let lower = utterance.to_ascii_lowercase();

        let (action, mut payload, citations) = if lower.contains("coverage gap") || (lower.contains("gap") && lower.contains("specialt")) {
            coverage_gap(&lower, table)
        } else if lower.contains("single point of failure") || lower.contains("spof") {
            single_point_of_failure_rollup(table)
        } else if lower.contains("suspicious") || lower.contains("red flag") || lower.contains("overstat") {
            red_flag_scan(table)
        } else if lower.contains("anomal") || lower.contains("outlier") {
            let (_, payload, citations) = anomaly_detection(table);
            ("anomaly_detection".to_owned(), payload, citations)
        } else {
            default_validation(table)
        };

        if let Value::Object(ref mut map) = payload {
            map.insert("duration_ms".to_owned(), json!(started.elapsed().as_secs_f64() * 1000.0));
        }

        (action, payload, citations)
    }
}

fn default_validation(table: &FacilityTable) -> (String, Value, Vec<Citation>) {
    let (constraint_results, constraint_citations) = constraint_validation_all(table);
    let (anomaly_action, anomaly_payload, anomaly_citations) = anomaly_detection(table);

    let mut citations = constraint_citations;
    citations.extend(anomaly_citations);

    (
        "constraint_and_anomaly_validation".to_owned(),
        json!({
            "constraint_validation": constraint_results,
            anomaly_action: anomaly_payload,
        }),
        citations,
    )
}

fn constraint_validation_all(table: &FacilityTable) -> (Value, Vec<Citation>) {
    let mut flagged = Vec::new();
    let mut citations = Vec::new();

    for facility in table.all() {
        let (issues, confidence) = validate_facility(facility);
        if issues.is_empty() {
            continue;
        }
        for issue in &issues {
            citations.push(Citation {
                source_id: facility.pk_unique_id.clone(),
                field: "specialties".to_owned(),
                evidence: json!({ "issue": issue.message }),
                score: None,
            });
        }
        flagged.push(json!({
            "pk_unique_id": facility.pk_unique_id,
            "name": facility.name,
            "issues": issues,
            "confidence": confidence,
        }));
    }

    (json!({ "flagged_facilities": flagged, "count": flagged.len() }), citations)
}

// ---------------------------------------------------------------------
// Two-stage anomaly detection (spec.md §4.5.2)
// ---------------------------------------------------------------------

#[derive(Clone, Debug)]
struct FeatureRow {
    facility_index: usize,
    values: Vec<f64>,
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 { (sorted[mid - 1] + sorted[mid]) / 2.0 } else { sorted[mid] }
}

fn build_feature_rows(table: &FacilityTable) -> Vec<FeatureRow> {
    let beds_known: Vec<f64> = table.all().iter().filter_map(|f| f.beds).collect();
    let doctors_known: Vec<f64> = table.all().iter().filter_map(|f| f.doctors).collect();
    let median_beds = median(&beds_known);
    let median_doctors = median(&doctors_known);

    table
        .all()
        .iter()
        .enumerate()
        .map(|(idx, f)| FeatureRow {
            facility_index: idx,
            values: vec![
                f.specialties.len() as f64,
                f.procedures.len() as f64,
                f.equipment.len() as f64,
                f.capabilities.len() as f64,
                f.beds.unwrap_or(median_beds),
                f.doctors.unwrap_or(median_doctors),
            ],
        })
        .collect()
}

fn z_score(rows: &[FeatureRow]) -> Vec<Vec<f64>> {
    let n_features = rows.first().map(|r| r.values.len()).unwrap_or(0);
    let n = rows.len() as f64;
    let mut means = vec![0.0; n_features];
    for row in rows {
        for (i, v) in row.values.iter().enumerate() {
            means[i] += v;
        }
    }
    for m in &mut means {
        *m /= n.max(1.0);
    }

    let mut stds = vec![0.0; n_features];
    for row in rows {
        for (i, v) in row.values.iter().enumerate() {
            stds[i] += (v - means[i]).powi(2);
        }
    }
    for s in &mut stds {
        *s = (*s / n.max(1.0)).sqrt();
        if *s < 1e-9 {
            *s = 1.0;
        }
    }

    rows.iter()
        .map(|row| row.values.iter().enumerate().map(|(i, v)| (v - means[i]) / stds[i]).collect())
        .collect()
}

struct IsoNode {
    split_feature: usize,
    split_value: f64,
    left: Option<Box<IsoNode>>,
    right: Option<Box<IsoNode>>,
    depth: usize,
}

fn build_iso_tree(data: &[Vec<f64>], indices: Vec<usize>, depth: usize, max_depth: usize, rng: &mut StdRng) -> Option<Box<IsoNode>> {
    if indices.len() <= 1 || depth >= max_depth {
        return None;
    }
    let n_features = data[0].len();
    let split_feature = rng.gen_range(0..n_features);

    let mut min_v = f64::INFINITY;
    let mut max_v = f64::NEG_INFINITY;
    for &i in &indices {
        let v = data[i][split_feature];
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if (max_v - min_v).abs() < 1e-12 {
        return None;
    }
    let split_value = rng.gen_range(min_v..max_v);

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices.into_iter().partition(|&i| data[i][split_feature] < split_value);

    Some(Box::new(IsoNode {
        split_feature,
        split_value,
        left: build_iso_tree(data, left_idx, depth + 1, max_depth, rng),
        right: build_iso_tree(data, right_idx, depth + 1, max_depth, rng),
        depth,
    }))
}

fn path_length(node: &Option<Box<IsoNode>>, point: &[f64], depth: usize) -> f64 {
    match node {
        None => depth as f64,
        Some(n) => {
            if point[n.split_feature] < n.split_value {
                path_length(&n.left, point, depth + 1)
            } else {
                path_length(&n.right, point, depth + 1)
            }
        }
    }
}

/// Average path length normalization constant c(n) for isolation forest
/// score conversion (Liu, Ting & Zhou 2008).
fn average_path_normalizer(n: usize) -> f64 {
    if n <= 1 {
        return 1.0;
    }
    let n = n as f64;
    let harmonic = (1..n as usize).map(|i| 1.0 / i as f64).sum::<f64>() + 0.5772156649;
    2.0 * harmonic - (2.0 * (n - 1.0) / n)
}

/// Stage 1: isolation-forest-style scoring, 200 trees, data-driven
/// contamination (spec.md §4.5.2).
fn isolation_forest_scores(data: &[Vec<f64>]) -> Vec<f64> {
    const N_TREES: usize = 200;
    let n = data.len();
    if n == 0 {
        return Vec::new();
    }
    let sample_size = n.min(256);
    let max_depth = (sample_size as f64).log2().ceil() as usize + 1;
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    let mut path_sums = vec![0.0; n];
    for _ in 0..N_TREES {
        let mut indices: Vec<usize> = (0..n).collect();
        // Subsample without replacement via partial Fisher-Yates.
        for i in 0..sample_size.min(n) {
            let j = rng.gen_range(i..n);
            indices.swap(i, j);
        }
        let sample: Vec<usize> = indices[..sample_size.min(n)].to_vec();
        let tree = build_iso_tree(data, sample.clone(), 0, max_depth, &mut rng);

        for &i in &sample {
            path_sums[i] += path_length(&tree, &data[i], 0);
        }
    }

    let c = average_path_normalizer(sample_size);
    let avg_paths: Vec<f64> = path_sums.iter().map(|s| s / N_TREES as f64).collect();
    avg_paths.iter().map(|p| 2f64.powf(-p / c.max(1e-9))).collect()
}

/// Data-driven contamination: facilities whose isolation score exceeds
/// mean + 1.5*std of the score distribution are flagged (-1), others +1.
fn isolation_forest_labels(scores: &[f64]) -> Vec<i32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
    let std = variance.sqrt();
    let threshold = mean + 1.5 * std;
    scores.iter().map(|s| if *s > threshold { -1 } else { 1 }).collect()
}

/// Chi-square critical values at p=0.99 for small degrees of freedom;
/// Wilson-Hilferty approximation otherwise.
fn chi_square_critical_99(df: usize) -> f64 {
    const TABLE: &[f64] = &[0.0, 6.635, 9.210, 11.345, 13.277, 15.086, 16.812, 18.475, 20.090, 21.666, 23.209];
    if df < TABLE.len() {
        return TABLE[df];
    }
    let k = df as f64;
    let z = 2.326_348; // z_0.99
    k * (1.0 - 2.0 / (9.0 * k) + z * (2.0 / (9.0 * k)).sqrt()).powi(3)
}

fn mahalanobis_squared(point: &DVector<f64>, mean: &DVector<f64>, inv_cov: &DMatrix<f64>) -> f64 {
    let diff = point - mean;
    (diff.transpose() * inv_cov * &diff)[(0, 0)]
}

fn anomaly_detection(table: &FacilityTable) -> (String, Value, Vec<Citation>) {
    let rows = build_feature_rows(table);
    if rows.is_empty() {
        return ("anomaly_detection".to_owned(), json!({ "anomalies": [] }), Vec::new());
    }

    let z_scored = z_score(&rows);
    let stage1_scores = isolation_forest_scores(&z_scored);
    let stage1_labels = isolation_forest_labels(&stage1_scores);

    let n_features = rows[0].values.len();
    let n = rows.len() as f64;

    let mut mean = vec![0.0; n_features];
    for row in &rows {
        for (i, v) in row.values.iter().enumerate() {
            mean[i] += v;
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    let mut cov = DMatrix::<f64>::zeros(n_features, n_features);
    for row in &rows {
        let diff = DVector::from_vec(row.values.iter().enumerate().map(|(i, v)| v - mean[i]).collect::<Vec<_>>());
        cov += &diff * diff.transpose();
    }
    cov /= n;

    let inv_cov = cov.clone().try_inverse().unwrap_or_else(|| cov.pseudo_inverse(1e-9).unwrap_or_else(|_| DMatrix::identity(n_features, n_features)));
    let mean_vec = DVector::from_vec(mean.clone());
    let critical = chi_square_critical_99(n_features);

    let mut anomalies = Vec::new();
    let mut citations = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        if stage1_labels[idx] != -1 {
            continue;
        }
        let point = DVector::from_vec(row.values.clone());
        let d2 = mahalanobis_squared(&point, &mean_vec, &inv_cov);
        if d2 <= critical {
            continue;
        }

        let facility = table.get(row.facility_index).expect("index within table");
        let reasons = explain_anomaly(facility, &row.values, &mean);

        citations.push(Citation {
            source_id: facility.pk_unique_id.clone(),
            field: "anomaly".to_owned(),
            evidence: json!({ "mahalanobis_sq": d2 }),
            score: Some(stage1_scores[idx]),
        });

        anomalies.push(json!({
            "pk_unique_id": facility.pk_unique_id,
            "name": facility.name,
            "isolation_score": stage1_scores[idx],
            "mahalanobis_sq": d2,
            "chi_square_critical": critical,
            "reasons": reasons,
        }));
    }

    ("anomaly_detection".to_owned(), json!({ "anomalies": anomalies, "count": anomalies.len() }), citations)
}

fn explain_anomaly(facility: &Facility, values: &[f64], mean: &[f64]) -> Vec<String> {
    let mut reasons = Vec::new();
    if values[1] > mean[1] * 2.0 && values[2] < mean[2] * 0.5 {
        reasons.push("high procedure count but minimal equipment".to_owned());
    }
    if let (Some(beds), Some(doctors)) = (facility.beds, facility.doctors) {
        if doctors > 0.0 {
            let ratio = beds / doctors;
            if ratio > 50.0 || ratio < 0.5 {
                reasons.push(format!("extreme bed/doctor ratio ({ratio:.1})"));
            }
        }
    }
    if values[0] > mean[0] * 2.5 {
        reasons.push("excessive specialty breadth relative to peers".to_owned());
    }
    if reasons.is_empty() {
        reasons.push("statistically atypical feature profile".to_owned());
    }
    reasons
}

// ---------------------------------------------------------------------
// Red-flag textual scanner (spec.md §4.5.3)
// ---------------------------------------------------------------------

const RED_FLAG_PATTERNS: &[(&str, &[&str])] = &[
    (
        "visiting_specialist",
        &[r"visit(?:ing|s)\s+(?:specialist|surgeon|doctor)", r"(?:weekly|monthly|quarterly)\s+(?:clinic|service)", r"outreach\s+(?:program|service|clinic)"],
    ),
    (
        "temporary_service",
        &[r"(?:surgical|medical)\s+camp", r"mission\s+(?:trip|team|group)", r"temporary\s+(?:service|clinic|facility)", r"mobile\s+(?:unit|clinic|service)"],
    ),
    (
        "vague_claim",
        &[r"(?:all|any|every)\s+(?:type|kind)\s+of\s+(?:surgery|procedure|service)", r"comprehensive\s+(?:care|service|treatment)", r"world.class", r"state.of.the.art"],
    ),
];

fn red_flag_scan(table: &FacilityTable) -> (String, Value, Vec<Citation>) {
    let mut flagged = Vec::new();
    let mut citations = Vec::new();

    for facility in table.all() {
        let text = format!("{} {} {}", facility.document, facility.procedures.join(" "), facility.capabilities.join(" ")).to_ascii_lowercase();
        let mut flags = Vec::new();
        for (category, patterns) in RED_FLAG_PATTERNS {
            for pattern in *patterns {
                let Ok(re) = Regex::new(pattern) else { continue };
                if let Some(m) = re.find(&text) {
                    flags.push(json!({
                        "category": category,
                        "pattern": pattern,
                        "matched_text": m.as_str(),
                    }));
                }
            }
        }
        if flags.is_empty() {
            continue;
        }

        citations.push(Citation {
            source_id: facility.pk_unique_id.clone(),
            field: "document".to_owned(),
            evidence: json!({ "flag_count": flags.len() }),
            score: None,
        });

        let categories: Vec<&str> = flags.iter().filter_map(|f| f["category"].as_str()).collect();
        flagged.push(json!({
            "pk_unique_id": facility.pk_unique_id,
            "name": facility.name,
            "flags": flags,
            "flag_count": categories.len(),
            "recommendations": recommendations_for(&categories),
        }));
    }

    flagged.sort_by(|a, b| b["flag_count"].as_u64().cmp(&a["flag_count"].as_u64()));

    ("red_flag_scan".to_owned(), json!({ "flagged_facilities": flagged, "count": flagged.len() }), citations)
}

fn recommendations_for(categories: &[&str]) -> Vec<String> {
    let mut recs = Vec::new();
    if categories.contains(&"visiting_specialist") {
        recs.push("confirm the specialist's on-site schedule before referral".to_owned());
    }
    if categories.contains(&"temporary_service") {
        recs.push("confirm current operating status before referral".to_owned());
    }
    if categories.contains(&"vague_claim") {
        recs.push("request independent verification of marketing claims".to_owned());
    }
    recs
}

// ---------------------------------------------------------------------
// Rollups (spec.md §4.5.4)
// ---------------------------------------------------------------------

fn coverage_gap(lower: &str, table: &FacilityTable) -> (String, Value, Vec<Citation>) {
    const SPECIALTIES: &[&str] = &["cardiology", "ophthalmology", "neurosurgery", "oncology", "nephrology", "orthopedics", "pediatrics"];
    let specialty = SPECIALTIES.iter().find(|s| lower.contains(*s)).copied().unwrap_or("cardiology");

    let mut by_region: Vec<(String, usize)> = Vec::new();
    for f in table.all() {
        let Some(region) = &f.region else { continue };
        let entry = by_region.iter_mut().find(|(r, _)| r == region);
        let has = f.has_specialty(specialty);
        match entry {
            Some((_, count)) => {
                if has {
                    *count += 1;
                }
            }
            None => by_region.push((region.clone(), if has { 1 } else { 0 })),
        }
    }

    let gaps: Vec<Value> = by_region
        .iter()
        .filter(|(_, count)| *count <= 1)
        .map(|(region, count)| {
            json!({
                "region": region,
                "facility_count": count,
                "centroid": geocoding::region_centroid(region),
            })
        })
        .collect();

    (
        "coverage_gap".to_owned(),
        json!({ "specialty": specialty, "gaps": gaps, "count": gaps.len() }),
        Vec::new(),
    )
}

fn single_point_of_failure_rollup(table: &FacilityTable) -> (String, Value, Vec<Citation>) {
    let mut by_specialty: Vec<(String, Vec<&Facility>)> = Vec::new();
    for f in table.all() {
        for specialty in &f.specialties {
            let key = specialty.to_ascii_lowercase();
            match by_specialty.iter_mut().find(|(s, _)| *s == key) {
                Some((_, facilities)) => facilities.push(f),
                None => by_specialty.push((key, vec![f])),
            }
        }
    }

    let mut spof: Vec<Value> = by_specialty
        .into_iter()
        .filter(|(_, facilities)| facilities.len() <= 3)
        .map(|(specialty, facilities)| {
            let severity = match facilities.len() {
                1 => "critical",
                2 => "high",
                _ => "medium",
            };
            let regions: Vec<String> = {
                let mut r: Vec<String> = facilities.iter().filter_map(|f| f.region.clone()).collect();
                r.sort();
                r.dedup();
                r
            };
            json!({
                "specialty": specialty,
                "count": facilities.len(),
                "severity": severity,
                "covering_regions": regions,
            })
        })
        .collect();

    spof.sort_by(|a, b| a["count"].as_u64().cmp(&b["count"].as_u64()));

    ("single_point_of_failure".to_owned(), json!({ "single_points_of_failure": spof, "count": spof.len() }), Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::RawFacilityRow;

    fn table_with_neurosurgery_but_no_ct() -> FacilityTable {
        FacilityTable::build(vec![RawFacilityRow {
            pk_unique_id: "1".into(),
            unique_id: "1".into(),
            name: "Claimed Neuro Center".into(),
            beds: Some(5.0),
            specialties: vec!["neurosurgery".into()],
            ..Default::default()
        }])
    }

    #[test]
    fn flags_missing_equipment_for_claimed_specialty() {
        let table = table_with_neurosurgery_but_no_ct();
        let facility = table.get(0).unwrap();
        let (issues, confidence) = validate_facility(facility);
        assert!(issues.iter().any(|i| i.requirement == "ct scanner"));
        assert!(confidence <= 0.85);
    }

    #[test]
    fn fuzzy_contains_matches_exact_substring() {
        assert!(fuzzy_contains("has a ct scanner onsite", "ct scanner"));
    }

    #[test]
    fn fuzzy_contains_matches_near_miss_tokens() {
        assert!(fuzzy_contains("has a ct scaner onsite", "ct scanner"));
    }

    #[test]
    fn no_issues_yields_high_confidence_floor() {
        let row = RawFacilityRow {
            pk_unique_id: "2".into(),
            unique_id: "2".into(),
            name: "General Clinic".into(),
            specialties: vec!["internal medicine".into()],
            ..Default::default()
        };
        let table = FacilityTable::build(vec![row]);
        let (issues, confidence) = validate_facility(table.get(0).unwrap());
        assert!(issues.is_empty());
        assert!(confidence >= 0.7);
    }

    #[test]
    fn red_flag_scanner_empty_for_plain_text() {
        let row = RawFacilityRow {
            pk_unique_id: "3".into(),
            unique_id: "3".into(),
            name: "Plain Clinic".into(),
            ..Default::default()
        };
        let table = FacilityTable::build(vec![row]);
        let (_, payload, citations) = red_flag_scan(&table);
        assert_eq!(payload["count"], json!(0));
        assert!(citations.is_empty());
    }

    #[test]
    fn red_flag_scanner_flags_visiting_specialist_language() {
        let row = RawFacilityRow {
            pk_unique_id: "4".into(),
            unique_id: "4".into(),
            name: "Roadside Clinic".into(),
            capabilities: vec!["weekly visiting specialist clinic".into()],
            ..Default::default()
        };
        let table = FacilityTable::build(vec![row]);
        let (_, payload, citations) = red_flag_scan(&table);
        assert_eq!(payload["count"], json!(1));
        let flagged = payload["flagged_facilities"].as_array().unwrap();
        let categories: Vec<&str> = flagged[0]["flags"].as_array().unwrap().iter().filter_map(|f| f["category"].as_str()).collect();
        assert!(categories.contains(&"visiting_specialist"));
        assert_eq!(citations.len(), 1);
    }

    #[test]
    fn single_point_of_failure_severity_is_count_based() {
        let rows = vec![
            RawFacilityRow { pk_unique_id: "1".into(), unique_id: "1".into(), name: "A".into(), region: Some("Volta".into()), specialties: vec!["rare_specialty".into()], ..Default::default() },
        ];
        let table = FacilityTable::build(rows);
        let (_, payload, _) = single_point_of_failure_rollup(&table);
        let entries = payload["single_points_of_failure"].as_array().unwrap();
        assert_eq!(entries[0]["severity"], "critical");
    }

    #[test]
    fn chi_square_table_matches_known_value_for_six_df() {
        assert!((chi_square_critical_99(6) - 16.812).abs() < 1e-6);
    }
}
