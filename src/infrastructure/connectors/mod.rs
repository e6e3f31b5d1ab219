mod csv_connector;
mod fixture_connector;

use async_trait::async_trait;

use crate::domain::entities::RawFacilityRow;

pub use csv_connector::CsvFacilitySource;
pub use fixture_connector::FixtureFacilitySource;

/// CSV loading itself is out of scope per spec.md §1; the trait boundary
/// the Facility Store (C1) builds against is in scope, grounded in the
/// starting point's `HealthDataConnector` trait.
#[async_trait]
pub trait FacilitySource: Send + Sync {
    fn source_name(&self) -> &'static str;
    async fn fetch_facilities(&self) -> anyhow::Result<Vec<RawFacilityRow>>;
}
