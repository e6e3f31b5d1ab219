pub mod entities;
pub mod errors;
pub mod facility_store;
pub mod geocoding;
pub mod spatial_index;
