//! Tabular Analyst (C4): structured filter/aggregate/ratio queries over the
//! Facility Store, dispatched from keyword cues in the utterance.
//!
//! Extraction helpers and dispatch cues are grounded in SPEC_FULL.md §4's
//! note that the original's `_extract_specialty`/`_extract_facility_type`/
//! `_extract_region`/`_extract_procedure`/negation-detection helpers shape
//! this module; keyword tables are a representative subset, not the full
//! original gazetteer.

use std::time::Instant;

use serde_json::{Value, json};

use crate::domain::entities::{Citation, Facility, FacilityTable};

const KNOWN_SPECIALTIES: &[&str] = &[
    "cardiology",
    "ophthalmology",
    "neurosurgery",
    "orthopedics",
    "pediatrics",
    "obstetrics",
    "gynecology",
    "oncology",
    "dermatology",
    "psychiatry",
    "urology",
    "radiology",
    "dentistry",
    "general surgery",
    "internal medicine",
    "emergency medicine",
    "nephrology",
    "pulmonology",
    "endocrinology",
    "gastroenterology",
];

const KNOWN_FACILITY_TYPES: &[&str] = &["hospital", "clinic", "pharmacy", "dentist", "health center", "maternity home"];

const NEGATION_PATTERNS: &[&str] = &["without", "don't", "dont", "no ", "lack", "missing", "absent", "not "];

pub struct TabularAnalyst;

impl TabularAnalyst {
    pub fn execute(utterance: &str, table: &FacilityTable) -> (String, Value, Vec<Citation>) {
        let started = Instant::now();
        let lower = utterance.to_ascii_lowercase();

        let specialty = extract_specialty(&lower);
        let facility_type = extract_facility_type(&lower);
        let region = extract_region(&lower, table);
        let procedure = extract_procedure(&lower);
        let negated = detect_negation(&lower);

        let (action, mut payload, citations) = if is_ranking(&lower) {
            region_aggregation(table, true)
        } else if is_distribution(&lower) {
            specialty_distribution(table)
        } else if is_ratio_anomaly(&lower) {
            anomaly_bed_doctor_ratio(table)
        } else if is_spof(&lower) {
            single_point_of_failure(table)
        } else if let Some(proc) = procedure.clone() {
            facilities_with_procedure(table, &proc, region.as_deref())
        } else if region.is_some() && specialty.is_none() && facility_type.is_none() {
            let region = region.unwrap();
            region_or_city_facilities(table, &region, None, None, None)
        } else if region.is_some() {
            let region = region.unwrap();
            region_or_city_facilities(table, &region, specialty.as_deref(), None, facility_type.as_deref())
        } else if let Some(spec) = specialty {
            count_with_specialty(table, &spec, facility_type.as_deref(), negated)
        } else {
            // No recognizable filter: fall back to a plain count of everything.
            count_with_specialty_generic(table)
        };

        if let Value::Object(ref mut map) = payload {
            map.insert("utterance".to_owned(), json!(utterance));
            map.insert("duration_ms".to_owned(), json!(started.elapsed().as_secs_f64() * 1000.0));
        }

        (action, payload, citations)
    }
}

fn detect_negation(lower: &str) -> bool {
    NEGATION_PATTERNS.iter().any(|p| lower.contains(p))
}

fn extract_specialty(lower: &str) -> Option<String> {
    KNOWN_SPECIALTIES.iter().find(|s| lower.contains(*s)).map(|s| s.to_string())
}

fn extract_facility_type(lower: &str) -> Option<String> {
    KNOWN_FACILITY_TYPES.iter().find(|t| lower.contains(*t)).map(|t| t.to_string())
}

fn extract_procedure(lower: &str) -> Option<String> {
    const PROCEDURE_KEYWORDS: &[&str] = &[
        "bypass surgery",
        "dialysis",
        "chemotherapy",
        "c-section",
        "cesarean",
        "cataract surgery",
        "angioplasty",
        "biopsy",
        "endoscopy",
        "mri scan",
        "ct scan",
    ];
    PROCEDURE_KEYWORDS.iter().find(|p| lower.contains(*p)).map(|p| p.to_string())
}

fn extract_region(lower: &str, table: &FacilityTable) -> Option<String> {
    let mut candidates: Vec<&str> = table
        .all()
        .iter()
        .filter_map(|f| f.region.as_deref())
        .chain(table.all().iter().filter_map(|f| f.city.as_deref()))
        .collect();
    candidates.sort_unstable();
    candidates.dedup();
    candidates.sort_by_key(|c| std::cmp::Reverse(c.len()));
    candidates.into_iter().find(|c| lower.contains(&c.to_ascii_lowercase()))
}

fn is_ranking(lower: &str) -> bool {
    lower.contains("which region") && (lower.contains("most") || lower.contains("top") || lower.contains("rank"))
        || lower.contains("distribution by region")
        || lower.contains("rank region")
}

fn is_distribution(lower: &str) -> bool {
    lower.contains("distribution") && lower.contains("specialt")
}

fn is_ratio_anomaly(lower: &str) -> bool {
    (lower.contains("ratio") || lower.contains("anomal") || lower.contains("outlier")) && lower.contains("bed")
}

fn is_spof(lower: &str) -> bool {
    lower.contains("single point of failure") || lower.contains("spof") || (lower.contains("only") && lower.contains("specialt"))
}

fn matched_citations(facilities: &[&Facility], field: &str) -> Vec<Citation> {
    facilities
        .iter()
        .map(|f| Citation {
            source_id: f.pk_unique_id.clone(),
            field: field.to_owned(),
            evidence: json!({ "name": f.name }),
            score: None,
        })
        .collect()
}

fn count_with_specialty(table: &FacilityTable, specialty: &str, facility_type: Option<&str>, negated: bool) -> (String, Value, Vec<Citation>) {
    let matched: Vec<&Facility> = table
        .all()
        .iter()
        .filter(|f| {
            let has = f.has_specialty(specialty);
            let spec_ok = if negated { !has } else { has };
            let type_ok = facility_type.is_none_or(|t| f.facility_type.as_deref().is_some_and(|ft| ft.eq_ignore_ascii_case(t)));
            spec_ok && type_ok
        })
        .collect();

    let pseudo_sql = format!(
        "SELECT * FROM facilities WHERE '{specialty}' {} IN specialties{}",
        if negated { "NOT" } else { "" },
        facility_type.map(|t| format!(" AND facility_type = '{t}'")).unwrap_or_default()
    );

    let citations = matched_citations(&matched, "specialties");
    let facilities: Vec<&Facility> = matched.clone();

    (
        "count_with_specialty".to_owned(),
        json!({
            "pseudo_sql": pseudo_sql,
            "count": facilities.len(),
            "facilities": facilities.iter().map(|f| facility_summary(f)).collect::<Vec<_>>(),
        }),
        citations,
    )
}

fn count_with_specialty_generic(table: &FacilityTable) -> (String, Value, Vec<Citation>) {
    (
        "count_all".to_owned(),
        json!({
            "pseudo_sql": "SELECT COUNT(*) FROM facilities",
            "count": table.len(),
        }),
        Vec::new(),
    )
}

fn region_or_city_facilities(
    table: &FacilityTable,
    region: &str,
    specialty: Option<&str>,
    procedure: Option<&str>,
    facility_type: Option<&str>,
) -> (String, Value, Vec<Citation>) {
    let region_lower = region.to_ascii_lowercase();
    let matched: Vec<&Facility> = table
        .all()
        .iter()
        .filter(|f| {
            let region_ok = f.city.as_deref().is_some_and(|c| c.to_ascii_lowercase().contains(&region_lower))
                || f.region.as_deref().is_some_and(|r| r.to_ascii_lowercase().contains(&region_lower));
            let spec_ok = specialty.is_none_or(|s| f.has_specialty(s));
            let proc_ok = procedure.is_none_or(|p| {
                f.procedures.iter().any(|x| x.eq_ignore_ascii_case(p)) || f.capabilities.iter().any(|x| x.eq_ignore_ascii_case(p))
            });
            let type_ok = facility_type.is_none_or(|t| f.facility_type.as_deref().is_some_and(|ft| ft.eq_ignore_ascii_case(t)));
            region_ok && spec_ok && proc_ok && type_ok
        })
        .collect();

    let citations = matched_citations(&matched, "region");

    (
        "facilities_in_region".to_owned(),
        json!({
            "pseudo_sql": format!("SELECT * FROM facilities WHERE city LIKE '%{region}%' OR region LIKE '%{region}%'"),
            "count": matched.len(),
            "facilities": matched.iter().map(|f| facility_summary(f)).collect::<Vec<_>>(),
        }),
        citations,
    )
}

fn region_aggregation(table: &FacilityTable, by_region: bool) -> (String, Value, Vec<Citation>) {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for f in table.all() {
        let key = if by_region { f.region.clone() } else { f.city.clone() };
        let Some(key) = key else { continue };
        match counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, c)) => *c += 1,
            None => counts.push((key, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let top = counts.first().cloned();
    (
        "region_aggregation".to_owned(),
        json!({
            "pseudo_sql": "SELECT region, COUNT(*) FROM facilities GROUP BY region ORDER BY COUNT(*) DESC",
            "top": top.map(|(region, count)| json!({ "region": region, "count": count })),
            "aggregation": counts.into_iter().map(|(region, count)| json!({ "region": region, "count": count })).collect::<Vec<_>>(),
        }),
        Vec::new(),
    )
}

fn specialty_distribution(table: &FacilityTable) -> (String, Value, Vec<Citation>) {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for f in table.all() {
        for s in &f.specialties {
            let key = s.to_ascii_lowercase();
            match counts.iter_mut().find(|(k, _)| *k == key) {
                Some((_, c)) => *c += 1,
                None => counts.push((key, 1)),
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    counts.truncate(30);

    (
        "specialty_distribution".to_owned(),
        json!({
            "pseudo_sql": "SELECT specialty, COUNT(*) FROM facilities_specialties GROUP BY specialty ORDER BY COUNT(*) DESC LIMIT 30",
            "distribution": counts.into_iter().map(|(s, c)| json!({ "specialty": s, "count": c })).collect::<Vec<_>>(),
        }),
        Vec::new(),
    )
}

fn facilities_with_procedure(table: &FacilityTable, procedure: &str, region: Option<&str>) -> (String, Value, Vec<Citation>) {
    let region_lower = region.map(|r| r.to_ascii_lowercase());
    let matched: Vec<&Facility> = table
        .all()
        .iter()
        .filter(|f| {
            let proc_ok = f.procedures.iter().any(|p| p.eq_ignore_ascii_case(procedure))
                || f.capabilities.iter().any(|c| c.eq_ignore_ascii_case(procedure));
            let region_ok = region_lower
                .as_ref()
                .is_none_or(|r| f.city.as_deref().is_some_and(|c| c.to_ascii_lowercase().contains(r.as_str())) || f.region.as_deref().is_some_and(|rg| rg.to_ascii_lowercase().contains(r.as_str())));
            proc_ok && region_ok
        })
        .collect();

    let citations = matched_citations(&matched, "procedures");

    (
        "facilities_with_procedure".to_owned(),
        json!({
            "pseudo_sql": format!("SELECT * FROM facilities WHERE '{procedure}' IN procedures OR '{procedure}' IN capabilities"),
            "count": matched.len(),
            "facilities": matched.iter().map(|f| facility_summary(f)).collect::<Vec<_>>(),
        }),
        citations,
    )
}

/// Threshold = max(Q3 + 1.5*IQR, 20), per spec.md §4.3 — the floor is kept
/// verbatim even though it is not the statistically "clean" outlier rule.
fn anomaly_bed_doctor_ratio(table: &FacilityTable) -> (String, Value, Vec<Citation>) {
    let mut ratios: Vec<(&Facility, f64)> = table
        .all()
        .iter()
        .filter_map(|f| match (f.beds, f.doctors) {
            (Some(beds), Some(doctors)) if beds > 0.0 && doctors > 0.0 => Some((f, beds / doctors)),
            _ => None,
        })
        .collect();

    if ratios.is_empty() {
        return (
            "anomaly_bed_doctor_ratio".to_owned(),
            json!({
                "pseudo_sql": "SELECT *, beds/doctors AS ratio FROM facilities WHERE beds > 0 AND doctors > 0",
                "facilities": Vec::<Value>::new(),
                "threshold": Value::Null,
            }),
            Vec::new(),
        );
    }

    let mut values: Vec<f64> = ratios.iter().map(|(_, r)| *r).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let q1 = percentile(&values, 25.0);
    let q3 = percentile(&values, 75.0);
    let iqr = q3 - q1;
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let threshold = (q3 + 1.5 * iqr).max(20.0);

    ratios.retain(|(_, r)| *r > threshold);
    ratios.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    let citations = matched_citations(&ratios.iter().map(|(f, _)| *f).collect::<Vec<_>>(), "beds,doctors");

    (
        "anomaly_bed_doctor_ratio".to_owned(),
        json!({
            "pseudo_sql": "SELECT *, beds/doctors AS ratio FROM facilities WHERE beds > 0 AND doctors > 0",
            "q1": q1,
            "q3": q3,
            "iqr": iqr,
            "mean": mean,
            "threshold": threshold,
            "facilities": ratios.iter().map(|(f, r)| {
                let mut summary = facility_summary(f);
                if let Value::Object(ref mut map) = summary {
                    map.insert("bed_doctor_ratio".to_owned(), json!(r));
                }
                summary
            }).collect::<Vec<_>>(),
        }),
        citations,
    )
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

fn single_point_of_failure(table: &FacilityTable) -> (String, Value, Vec<Citation>) {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for f in table.all() {
        for s in &f.specialties {
            let key = s.to_ascii_lowercase();
            match counts.iter_mut().find(|(k, _)| *k == key) {
                Some((_, c)) => *c += 1,
                None => counts.push((key, 1)),
            }
        }
    }
    counts.retain(|(_, c)| *c <= 2);
    counts.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

    (
        "single_point_of_failure".to_owned(),
        json!({
            "pseudo_sql": "SELECT specialty, COUNT(*) FROM facilities_specialties GROUP BY specialty HAVING COUNT(*) <= 2",
            "specialty_counts": counts.into_iter().map(|(s, c)| json!({ "specialty": s, "count": c })).collect::<Vec<_>>(),
        }),
        Vec::new(),
    )
}

fn facility_summary(f: &Facility) -> Value {
    json!({
        "pk_unique_id": f.pk_unique_id,
        "name": f.name,
        "city": f.city,
        "region": f.region,
        "facility_type": f.facility_type,
        "specialties": f.specialties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::RawFacilityRow;

    fn fixture_table() -> FacilityTable {
        let rows = vec![
            RawFacilityRow {
                pk_unique_id: "1".into(),
                unique_id: "1".into(),
                name: "Korle Bu Teaching Hospital".into(),
                facility_type: Some("hospital".into()),
                city: Some("Accra".into()),
                region: Some("Greater Accra".into()),
                beds: Some(2000.0),
                doctors: Some(400.0),
                specialties: vec!["cardiology".into(), "neurosurgery".into()],
                ..Default::default()
            },
            RawFacilityRow {
                pk_unique_id: "2".into(),
                unique_id: "2".into(),
                name: "37 Military Hospital".into(),
                facility_type: Some("hospital".into()),
                city: Some("Accra".into()),
                region: Some("Greater Accra".into()),
                beds: Some(500.0),
                doctors: Some(2.0),
                specialties: vec!["cardiology".into()],
                ..Default::default()
            },
            RawFacilityRow {
                pk_unique_id: "3".into(),
                unique_id: "3".into(),
                name: "Tamale Teaching Hospital".into(),
                facility_type: Some("hospital".into()),
                city: Some("Tamale".into()),
                region: Some("Northern".into()),
                beds: Some(800.0),
                doctors: Some(100.0),
                specialties: vec!["ophthalmology".into()],
                ..Default::default()
            },
        ];
        FacilityTable::build(rows)
    }

    #[test]
    fn counts_hospitals_offering_cardiology() {
        let table = fixture_table();
        let (action, payload, citations) = TabularAnalyst::execute("How many hospitals offer cardiology services?", &table);
        assert_eq!(action, "count_with_specialty");
        assert_eq!(payload["count"], json!(2));
        assert_eq!(citations.len(), 2);
        assert!(payload["pseudo_sql"].as_str().unwrap().contains("cardiology"));
        assert!(payload["pseudo_sql"].as_str().unwrap().contains("IN specialties"));
    }

    #[test]
    fn negation_flips_specialty_match() {
        let table = fixture_table();
        let (action, payload, _) = TabularAnalyst::execute("hospitals without cardiology", &table);
        assert_eq!(action, "count_with_specialty");
        assert_eq!(payload["count"], json!(1));
    }

    #[test]
    fn anomaly_detects_high_bed_doctor_ratio() {
        let table = fixture_table();
        let (action, payload, _) = TabularAnalyst::execute("show bed to doctor ratio anomalies", &table);
        assert_eq!(action, "anomaly_bed_doctor_ratio");
        let facilities = payload["facilities"].as_array().unwrap();
        assert!(facilities.iter().any(|f| f["pk_unique_id"] == "2"));
    }

    #[test]
    fn single_point_of_failure_flags_rare_specialties() {
        let table = fixture_table();
        let (action, payload, _) = TabularAnalyst::execute("what are the single point of failure specialties", &table);
        assert_eq!(action, "single_point_of_failure");
        let counts = payload["specialty_counts"].as_array().unwrap();
        assert!(counts.iter().any(|c| c["specialty"] == "ophthalmology" && c["count"] == 1));
    }

    #[test]
    fn empty_ratio_input_returns_null_threshold() {
        let table = FacilityTable::build(Vec::new());
        let (_, payload, _) = anomaly_bed_doctor_ratio_public(&table);
        assert!(payload["threshold"].is_null());
    }

    fn anomaly_bed_doctor_ratio_public(table: &FacilityTable) -> (String, Value, Vec<Citation>) {
        super::anomaly_bed_doctor_ratio(table)
    }
}
