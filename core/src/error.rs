//! Error types callers need to tell apart.
//!
//! Storage plumbing stays on `anyhow`; these enums sit at the boundaries
//! where the UI must decide between "retry" and "nothing to show".

use thiserror::Error;

/// Failure talking to the external recipe catalog.
///
/// The recommendation engine never surfaces these to its caller: every variant
/// is turned into the local fallback set.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unreachable: {0}")]
    Transport(String),

    #[error("catalog did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("catalog returned HTTP {0}")]
    Status(u16),

    #[error("catalog response could not be decoded: {0}")]
    Decode(String),
}

/// Failure assigning a meal to a day plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The store could not be read or written. The plan was not changed.
    #[error("meal plan storage failed: {0:#}")]
    Store(#[source] anyhow::Error),

    #[error("recipe {0} not found")]
    RecipeNotFound(i64),

    #[error("{0}")]
    InvalidInput(String),
}

impl PlanError {
    /// True when repeating the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
