use thiserror::Error;

/// Error categories reported to the caller (spec.md §7). Variant names are
/// internal; callers see [`EngineError::category`] instead of the Rust type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InputValidation(String),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::InputValidation(_) => "input_validation",
            Self::DependencyUnavailable(_) => "dependency_unavailable",
            Self::ResourceLimit(_) => "resource_limit",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }
}
