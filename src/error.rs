//! Engine and catalog error types.
//!
//! Failures local to one track or artist are logged and skipped by the
//! pipeline; only conditions that invalidate a whole request surface as
//! [`EngineError`].

use thiserror::Error;

/// Failure reported by a catalog/metadata provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("catalog item not found: {0}")]
    NotFound(String),

    #[error("transient catalog failure: {0}")]
    Transient(String),
}

impl CatalogError {
    /// Only transient failures are worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors that prevent the engine from serving a request.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The similarity index could not be built. Fatal at startup.
    #[error("nearest-neighbor index unavailable: {0}")]
    IndexUnavailable(String),

    /// The session track pool could not be read or written.
    #[error("track pool unavailable: {0}")]
    PoolUnavailable(String),

    #[error("store failure: {0}")]
    Store(String),

    #[error("clustering failed: {0}")]
    Clustering(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
