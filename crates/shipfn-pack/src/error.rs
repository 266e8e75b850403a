use shipfn_core::ErrorKind;
use thiserror::Error;

/// Errors from fingerprinting, descriptor parsing and code packaging.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("path not found: {0}")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {path}: {message}")]
    Walk { path: String, message: String },

    #[error("unsupported dependency descriptor {path}: {reason}")]
    UnsupportedDescriptor { path: String, reason: String },

    #[error("descriptor {path} is a {found} descriptor but runtime {runtime} needs {expected}")]
    EcosystemMismatch {
        path: String,
        found: &'static str,
        expected: &'static str,
        runtime: String,
    },

    #[error("failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl PackError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        PackError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PackError::UnsupportedDescriptor { .. } => ErrorKind::UnsupportedDescriptor,
            _ => ErrorKind::InvalidInput,
        }
    }
}

/// Errors from the sandboxed dependency build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The container engine could not start the build environment.
    #[error("sandbox unavailable ({engine}): {reason}")]
    SandboxUnavailable { engine: String, reason: String },

    /// The package installer ran and failed.
    #[error("{installer} failed (exit code: {code}):\n{output}")]
    InstallFailed {
        installer: String,
        code: i32,
        output: String,
    },

    #[error("dependency install timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("installer produced no {expected} directory")]
    MissingOutput { expected: String },

    #[error("failed to prepare build workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error(transparent)]
    Pack(#[from] PackError),
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::SandboxUnavailable { .. } | BuildError::Workspace(_) => {
                ErrorKind::SandboxUnavailable
            }
            BuildError::InstallFailed { .. }
            | BuildError::Timeout { .. }
            | BuildError::MissingOutput { .. } => ErrorKind::DependencyBuildFailed,
            BuildError::Pack(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installer_failure_is_not_a_sandbox_failure() {
        let install = BuildError::InstallFailed {
            installer: "pip3".to_string(),
            code: 1,
            output: "No matching distribution found for nope==9.9".to_string(),
        };
        let sandbox = BuildError::SandboxUnavailable {
            engine: "docker".to_string(),
            reason: "Cannot connect to the Docker daemon".to_string(),
        };
        assert_eq!(install.kind(), ErrorKind::DependencyBuildFailed);
        assert_eq!(sandbox.kind(), ErrorKind::SandboxUnavailable);
        assert!(install.to_string().contains("No matching distribution"));
    }

    #[test]
    fn unsupported_descriptor_kind() {
        let err = PackError::UnsupportedDescriptor {
            path: "deps.yaml".to_string(),
            reason: "not a requirements list".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::UnsupportedDescriptor);
        assert_eq!(
            PackError::NotFound("src".to_string()).kind(),
            ErrorKind::InvalidInput
        );
    }
}
