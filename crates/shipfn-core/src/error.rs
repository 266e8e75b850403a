//! Error taxonomy shared by every shipfn crate.
//!
//! Each crate keeps its own `thiserror` enum; all of them collapse into one
//! [`ErrorKind`] so the publisher can decide whether a failure is retryable
//! and the CLI can report it uniformly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::RuntimeError;

/// Classification of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad paths, names or configuration. Never retried.
    InvalidInput,
    /// The dependency descriptor is neither a requirements list nor a package manifest.
    UnsupportedDescriptor,
    /// The build sandbox could not be started.
    SandboxUnavailable,
    /// The package installer itself failed inside the sandbox.
    DependencyBuildFailed,
    /// Transient artifact store transport error.
    StoreUnavailable,
    /// Transient execution platform error (throttling, conflicts, transport).
    PlatformUnavailable,
    /// Permission error from the store or platform.
    AccessDenied,
    /// The platform or store rejected a request as malformed or inconsistent.
    ValidationError,
    /// A new version was registered but the alias could not be moved to it.
    PartialDeployment,
    /// A cancellation was observed at a step boundary.
    Cancelled,
}

impl ErrorKind {
    /// Whether the publisher may retry the failed step.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::SandboxUnavailable
                | ErrorKind::StoreUnavailable
                | ErrorKind::PlatformUnavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::UnsupportedDescriptor => "UnsupportedDescriptor",
            ErrorKind::SandboxUnavailable => "SandboxUnavailable",
            ErrorKind::DependencyBuildFailed => "DependencyBuildFailed",
            ErrorKind::StoreUnavailable => "StoreUnavailable",
            ErrorKind::PlatformUnavailable => "PlatformUnavailable",
            ErrorKind::AccessDenied => "AccessDenied",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::PartialDeployment => "PartialDeployment",
            ErrorKind::Cancelled => "Cancelled",
        }
    }

    /// Process exit code used by the CLI for this kind.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::InvalidInput | ErrorKind::UnsupportedDescriptor => 2,
            ErrorKind::PartialDeployment => 3,
            ErrorKind::Cancelled => 130,
            _ => 1,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while loading or resolving `shipfn.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(ErrorKind::StoreUnavailable.is_retryable());
        assert!(ErrorKind::PlatformUnavailable.is_retryable());
        assert!(ErrorKind::SandboxUnavailable.is_retryable());
    }

    #[test]
    fn fatal_kinds_are_not_retryable() {
        for kind in [
            ErrorKind::InvalidInput,
            ErrorKind::UnsupportedDescriptor,
            ErrorKind::DependencyBuildFailed,
            ErrorKind::AccessDenied,
            ErrorKind::ValidationError,
            ErrorKind::PartialDeployment,
            ErrorKind::Cancelled,
        ] {
            assert!(!kind.is_retryable(), "{kind} must not be retried");
        }
    }

    #[test]
    fn partial_deployment_has_distinct_exit_code() {
        assert_eq!(ErrorKind::PartialDeployment.exit_code(), 3);
        assert_ne!(
            ErrorKind::PartialDeployment.exit_code(),
            ErrorKind::PlatformUnavailable.exit_code()
        );
    }
}
