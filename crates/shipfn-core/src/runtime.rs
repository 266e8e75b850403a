//! Target runtime identifiers (`python3.9`, `nodejs18.x`, ...).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Package ecosystem implied by a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Python,
    Node,
}

impl Ecosystem {
    /// Descriptor file name used when none is configured.
    pub fn default_descriptor(self) -> &'static str {
        match self {
            Ecosystem::Python => "requirements.txt",
            Ecosystem::Node => "package.json",
        }
    }

    /// Top-level directory of the layer archive.
    pub fn layer_root(self) -> &'static str {
        match self {
            Ecosystem::Python => "python",
            Ecosystem::Node => "nodejs",
        }
    }

    /// Lockfile that, when present next to the descriptor, pins the resolution.
    pub fn lockfile(self) -> Option<&'static str> {
        match self {
            Ecosystem::Python => None,
            Ecosystem::Node => Some("package-lock.json"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Ecosystem::Python => "python",
            Ecosystem::Node => "nodejs",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("unsupported runtime: {0} (only python and nodejs runtimes are supported)")]
    Unsupported(String),
    #[error("runtime {0} is missing a version")]
    MissingVersion(String),
}

/// A validated runtime identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Runtime {
    id: String,
    ecosystem: Ecosystem,
}

impl Runtime {
    pub fn parse(id: &str) -> Result<Self, RuntimeError> {
        let id = id.trim();
        let (ecosystem, version) = if let Some(rest) = id.strip_prefix("python") {
            (Ecosystem::Python, rest)
        } else if let Some(rest) = id.strip_prefix("nodejs") {
            (Ecosystem::Node, rest)
        } else {
            return Err(RuntimeError::Unsupported(id.to_string()));
        };

        if version.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(RuntimeError::MissingVersion(id.to_string()));
        }

        Ok(Self {
            id: id.to_string(),
            ecosystem,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

impl TryFrom<String> for Runtime {
    type Error = RuntimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Runtime::parse(&value)
    }
}

impl From<Runtime> for String {
    fn from(runtime: Runtime) -> Self {
        runtime.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_python() {
        let rt = Runtime::parse("python3.9").unwrap();
        assert_eq!(rt.ecosystem(), Ecosystem::Python);
        assert_eq!(rt.as_str(), "python3.9");
    }

    #[test]
    fn test_parse_node() {
        let rt = Runtime::parse("nodejs18.x").unwrap();
        assert_eq!(rt.ecosystem(), Ecosystem::Node);
    }

    #[test]
    fn test_parse_unsupported() {
        assert_eq!(
            Runtime::parse("go1.x"),
            Err(RuntimeError::Unsupported("go1.x".to_string()))
        );
    }

    #[test]
    fn test_parse_missing_version() {
        assert!(matches!(
            Runtime::parse("python"),
            Err(RuntimeError::MissingVersion(_))
        ));
    }

    #[test]
    fn test_serde_validates() {
        let rt: Runtime = serde_json::from_str("\"nodejs20.x\"").unwrap();
        assert_eq!(rt.ecosystem(), Ecosystem::Node);
        assert!(serde_json::from_str::<Runtime>("\"ruby3.2\"").is_err());
    }
}
