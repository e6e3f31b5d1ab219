//! Runtime configuration (spec.md §6): "the core reads a small set of
//! recognized options ... No other runtime flags." Every option below maps
//! to one sentence of that enumeration.

use std::env;

use crate::domain::geocoding::{self, BoundingBox};

#[derive(Clone, Debug)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,

    /// Data source path (spec.md §6). `None` selects the built-in fixture
    /// facility source; `Some(path)` loads a CSV instead.
    pub data_source_path: Option<String>,

    /// Vector backend name (spec.md §6). Only `"in_process"` is implemented
    /// in this repository; any other value still selects it, logged once.
    pub vector_backend: String,

    /// Bounding-box override for coverage grids (spec.md §6), `(south, west, north, east)`.
    pub bounding_box_override: Option<(f64, f64, f64, f64)>,

    /// Earth radius constant in km (spec.md §6), overriding the 6371.0 default.
    pub earth_radius_km: f64,

    /// Concurrency and timeout knobs (spec.md §6 / §5).
    pub vector_search_timeout_secs: u64,
    pub synthesis_timeout_secs: u64,
    pub max_concurrent_requests: usize,

    /// Supervisor LLM enable/disable flag (spec.md §6).
    pub llm_supervisor_enabled: bool,

    pub semantic_top_k: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            host: env::var("MEDBRIDGE_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("MEDBRIDGE_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080),
            cors_origin: env::var("MEDBRIDGE_CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".into()),
            data_source_path: env::var("MEDBRIDGE_DATA_SOURCE_PATH").ok().map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()),
            vector_backend: env::var("MEDBRIDGE_VECTOR_BACKEND").unwrap_or_else(|_| "in_process".into()),
            bounding_box_override: env::var("MEDBRIDGE_BOUNDING_BOX").ok().and_then(|v| parse_bounding_box(&v)),
            earth_radius_km: env::var("MEDBRIDGE_EARTH_RADIUS_KM").ok().and_then(|v| v.parse().ok()).unwrap_or(6371.0),
            vector_search_timeout_secs: env::var("MEDBRIDGE_VECTOR_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
            synthesis_timeout_secs: env::var("MEDBRIDGE_SYNTHESIS_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
            max_concurrent_requests: env::var("MEDBRIDGE_MAX_CONCURRENT_REQUESTS").ok().and_then(|v| v.parse().ok()).unwrap_or(64),
            llm_supervisor_enabled: env::var("MEDBRIDGE_LLM_SUPERVISOR_ENABLED")
                .ok()
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false),
            semantic_top_k: env::var("MEDBRIDGE_SEMANTIC_TOP_K").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
        }
    }

    /// Coverage-grid bounding box: `bounding_box_override` when set,
    /// otherwise the built-in Ghana envelope (spec.md §6).
    pub fn bounding_box(&self) -> BoundingBox {
        match self.bounding_box_override {
            Some((south, west, north, east)) => BoundingBox { north, south, east, west },
            None => geocoding::BOUNDING_BOX,
        }
    }
}

/// Parses `"south,west,north,east"`.
fn parse_bounding_box(raw: &str) -> Option<(f64, f64, f64, f64)> {
    let parts: Vec<f64> = raw.split(',').filter_map(|p| p.trim().parse().ok()).collect();
    match parts.as_slice() {
        [south, west, north, east] => Some((*south, *west, *north, *east)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_parses_four_comma_separated_floats() {
        assert_eq!(parse_bounding_box("4.74,-3.26,11.17,1.20"), Some((4.74, -3.26, 11.17, 1.20)));
    }

    #[test]
    fn bounding_box_rejects_malformed_input() {
        assert_eq!(parse_bounding_box("not a box"), None);
    }
}
