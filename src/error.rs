//! Cache error types

/// Boxed error type used at collaborator seams (shared store, recompute).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Cache-related errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Shared-store failure on a write path. Read-path store failures are
    /// absorbed and treated as a miss.
    #[error("shared store error: {0}")]
    Store(#[source] BoxError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller-supplied recomputation failed during a mandatory refresh,
    /// with no stale value to fall back on.
    #[error("recompute failed: {0}")]
    Recompute(#[source] BoxError),
}
