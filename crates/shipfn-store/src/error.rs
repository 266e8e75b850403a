use shipfn_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact store unavailable for {key}: {message}")]
    Unavailable { key: String, message: String },

    #[error("access denied to {key}: {message}")]
    AccessDenied { key: String, message: String },

    #[error("artifact not found: {0}")]
    NotFound(String),

    /// A key already holds different bytes; artifacts are never overwritten.
    #[error("artifact {key} already exists with different content")]
    Conflict { key: String },

    #[error("invalid artifact key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Classify an I/O error for `key`.
    pub fn from_io(key: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => StoreError::AccessDenied {
                key: key.to_string(),
                message: err.to_string(),
            },
            std::io::ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::Unavailable {
                key: key.to_string(),
                message: err.to_string(),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unavailable { .. } => ErrorKind::StoreUnavailable,
            StoreError::AccessDenied { .. } => ErrorKind::AccessDenied,
            StoreError::NotFound(_) | StoreError::Conflict { .. } => ErrorKind::ValidationError,
            StoreError::InvalidKey { .. } => ErrorKind::InvalidInput,
        }
    }
}
