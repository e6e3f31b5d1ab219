mod geospatial_analyst;
mod orchestrator;
mod planner;
mod semantic_retriever;
mod supervisor;
mod tabular_analyst;
mod validator;

pub use geospatial_analyst::GeospatialAnalyst;
pub use orchestrator::{Orchestrator, QueryOutcome, map_overlay_for_payloads};
pub use planner::Planner;
pub use semantic_retriever::SemanticRetriever;
pub use supervisor::{Classification, Supervisor};
pub use tabular_analyst::TabularAnalyst;
pub use validator::Validator;
