//! Error types for the execution platform.

use shipfn_core::ErrorKind;
use thiserror::Error;

/// Result type alias for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

#[derive(Debug, Error)]
pub enum PlatformError {
    /// Transport or storage failure; retryable.
    #[error("platform unavailable: {0}")]
    Unavailable(String),

    /// Request rate exceeded; retryable.
    #[error("throttled: {0}")]
    Throttled(String),

    /// Another update to the same resource is in progress; retryable.
    #[error("resource conflict: {0}")]
    Conflict(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The function changed between the caller's update and publish.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl PlatformError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlatformError::Unavailable(_)
            | PlatformError::Throttled(_)
            | PlatformError::Conflict(_) => ErrorKind::PlatformUnavailable,
            PlatformError::AccessDenied(_) => ErrorKind::AccessDenied,
            PlatformError::Validation(_)
            | PlatformError::PreconditionFailed(_)
            | PlatformError::NotFound(_)
            | PlatformError::Serialize(_) => ErrorKind::ValidationError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_retryable() {
        assert!(PlatformError::Conflict("update in progress".into()).kind().is_retryable());
        assert!(PlatformError::Throttled("rate".into()).kind().is_retryable());
        assert!(!PlatformError::AccessDenied("iam".into()).kind().is_retryable());
        assert!(!PlatformError::Validation("bad".into()).kind().is_retryable());
        // Retrying cannot bring back the state a concurrent writer replaced.
        assert!(!PlatformError::PreconditionFailed("sha".into()).kind().is_retryable());
    }
}
