//! Ghana city/region centroid lookup used by the Facility Store (C1) to
//! backfill missing coordinates, and by the Geospatial Analyst (C7) to
//! resolve a city name mentioned in an utterance into a point.
//!
//! Three-stage lookup per spec.md §4.1: exact normalized match, then a
//! word-boundary substring match (shortest key first, so more specific
//! entries win), then a Levenshtein fuzzy fallback at similarity >= 80.
//! Stage 2 never matches a query as a substring interior to another word
//! (the historical "wa" inside "nkawkaw" bug spec.md calls out to fix).

use regex::Regex;

/// Representative subset of Ghanaian city centroids (lat, lng in degrees).
/// Not the exhaustive gazetteer — a stand-in for the external geocoding
/// table spec.md §1 treats as an out-of-scope collaborator.
const CITY_COORDS: &[(&str, f64, f64)] = &[
    ("accra", 5.6037, -0.1870),
    ("tema", 5.6698, -0.0166),
    ("madina", 5.6730, -0.1670),
    ("kumasi", 6.6885, -1.6244),
    ("obuasi", 6.2060, -1.6630),
    ("takoradi", 4.8981, -1.7450),
    ("sekondi", 4.9340, -1.7130),
    ("cape coast", 5.1036, -1.2466),
    ("winneba", 5.3508, -0.6257),
    ("koforidua", 6.0936, -0.2572),
    ("nkawkaw", 6.5500, -0.7800),
    ("akosombo", 6.2900, 0.0500),
    ("tamale", 9.4034, -0.8393),
    ("yendi", 9.4450, -0.0100),
    ("bolgatanga", 10.7863, -0.8522),
    ("bawku", 11.0600, -0.2400),
    ("wa", 10.0601, -2.5099),
    ("ho", 6.6000, 0.4680),
    ("hohoe", 7.1500, 0.4730),
    ("keta", 5.9200, 0.9900),
    ("sunyani", 7.3349, -2.3286),
    ("techiman", 7.5833, -1.9308),
    ("berekum", 7.4530, -2.5830),
    ("kintampo", 8.0500, -1.7300),
    ("salaga", 8.5500, -0.5200),
    ("bole", 9.0300, -2.4800),
    ("nalerigu", 10.5200, -0.3700),
    ("tarkwa", 5.3009, -1.9940),
    ("axim", 4.8700, -2.2400),
];

const REGION_COORDS: &[(&str, f64, f64)] = &[
    ("greater accra", 5.6037, -0.1870),
    ("ashanti", 6.7470, -1.5209),
    ("western", 5.3000, -2.0000),
    ("western north", 6.3000, -2.5000),
    ("central", 5.5000, -1.0000),
    ("eastern", 6.2000, -0.5000),
    ("northern", 9.5000, -1.0000),
    ("upper east", 10.7000, -0.8000),
    ("upper west", 10.2500, -2.5000),
    ("volta", 6.5000, 0.4000),
    ("bono", 7.5000, -2.3000),
    ("bono east", 7.7500, -1.2000),
    ("ahafo", 7.0000, -2.5000),
    ("oti", 7.8000, 0.3000),
    ("savannah", 9.0000, -1.8000),
    ("north east", 10.2000, -0.3000),
];

pub const COUNTRY_CENTER: (f64, f64) = (7.9465, -1.0232);
pub const BOUNDING_BOX: BoundingBox = BoundingBox {
    north: 11.17,
    south: 4.74,
    east: 1.20,
    west: -3.26,
};

#[derive(Clone, Copy, Debug)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

fn normalize(name: &str) -> String {
    let collapsed: String = name
        .trim()
        .to_ascii_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    collapsed
}

fn word_boundary_regex(needle: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(needle))).ok()
}

/// Classic DP Levenshtein edit distance.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut row: Vec<usize> = (0..=m).collect();

    for i in 1..=n {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=m {
            let temp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag
            } else {
                1 + prev_diag.min(row[j]).min(row[j - 1])
            };
            prev_diag = temp;
        }
    }
    row[m]
}

/// Similarity in 0..=100, rapidfuzz-style ratio derived from edit distance.
fn similarity(a: &str, b: &str) -> u32 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100;
    }
    let dist = levenshtein_distance(a, b);
    (100.0 * (1.0 - dist as f64 / max_len as f64)).round().max(0.0) as u32
}

/// Resolve `(city, region)` to a point, or `None` if no stage matched.
pub fn geocode(city: Option<&str>, region: Option<&str>) -> Option<(f64, f64)> {
    if let Some(city) = city {
        let c = normalize(city);
        if let Some((_, lat, lng)) = CITY_COORDS.iter().find(|(key, ..)| *key == c) {
            return Some((*lat, *lng));
        }
    }

    if let Some(region) = region {
        let r = normalize(region);
        if let Some((_, lat, lng)) = REGION_COORDS.iter().find(|(key, ..)| *key == r) {
            return Some((*lat, *lng));
        }
    }

    if let Some(city) = city {
        let c = normalize(city);
        let mut candidates: Vec<&(&str, f64, f64)> = CITY_COORDS.iter().collect();
        candidates.sort_by_key(|(key, ..)| key.len());
        for (key, lat, lng) in candidates {
            if let Some(re) = word_boundary_regex(&c) {
                if re.is_match(key) {
                    return Some((*lat, *lng));
                }
            }
        }
    }

    if let Some(city) = city {
        let c = normalize(city);
        let best = CITY_COORDS
            .iter()
            .map(|(key, lat, lng)| (similarity(&c, key), *lat, *lng))
            .max_by_key(|(score, ..)| *score);
        if let Some((score, lat, lng)) = best {
            if score >= 80 {
                return Some((lat, lng));
            }
        }
    }

    None
}

/// Looks up a recognized city name mentioned anywhere inside `utterance`,
/// longest-first so e.g. "cape coast" wins over a coincidental shorter match.
pub fn find_city_mention(utterance: &str) -> Option<(&'static str, f64, f64)> {
    let lower = utterance.to_ascii_lowercase();
    let mut candidates: Vec<&(&str, f64, f64)> = CITY_COORDS.iter().collect();
    candidates.sort_by_key(|(key, ..)| std::cmp::Reverse(key.len()));
    for (key, lat, lng) in candidates {
        if let Some(re) = word_boundary_regex(key) {
            if re.is_match(&lower) {
                return Some((key, *lat, *lng));
            }
        }
    }
    None
}

/// Authoritative region centroid, used by the Geospatial Analyst (C7) to
/// override a mean-of-facilities estimate when available.
pub fn region_centroid(region: &str) -> Option<(f64, f64)> {
    let r = normalize(region);
    REGION_COORDS
        .iter()
        .find(|(key, ..)| *key == r)
        .map(|(_, lat, lng)| (*lat, *lng))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_city_match() {
        assert_eq!(geocode(Some("Accra"), None), Some((5.6037, -0.1870)));
    }

    #[test]
    fn does_not_false_match_wa_inside_nkawkaw() {
        // "wa" must not match inside "nkawkaw" via substring containment.
        let found = find_city_mention("directions near nkawkaw please");
        assert_eq!(found.map(|(name, ..)| name), Some("nkawkaw"));
        assert_ne!(found.map(|(name, ..)| name), Some("wa"));
    }

    #[test]
    fn word_boundary_match_still_finds_wa_on_its_own() {
        let found = find_city_mention("clinics near wa town");
        assert_eq!(found.map(|(name, ..)| name), Some("wa"));
    }

    #[test]
    fn fuzzy_fallback_catches_misspelling() {
        assert_eq!(geocode(Some("Kumase"), None), Some((6.6885, -1.6244)));
    }

    #[test]
    fn unresolvable_returns_none() {
        assert_eq!(geocode(Some("Nowhereville"), None), None);
    }
}
