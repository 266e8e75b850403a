//! Platform resource types.

use serde::{Deserialize, Serialize};
use shipfn_core::Runtime;

/// Where the platform fetches an archive from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSource {
    pub store_key: String,
    pub sha256: String,
}

/// Current (unpublished, `$LATEST`) state of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub runtime: Runtime,
    pub code: CodeSource,
    /// Layer version ARNs, in attach order.
    pub layers: Vec<String>,
    /// Highest published version number, 0 if none.
    pub last_version: u64,
    /// Unix timestamp (seconds).
    pub updated_at: u64,
}

/// Changes to apply to function configuration. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub runtime: Option<Runtime>,
    pub layers: Option<Vec<String>>,
}

/// State a new version must capture. Publishing fails when the function
/// has moved on since the caller last updated it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPrecondition {
    pub runtime: Runtime,
    pub code_sha256: String,
    pub layers: Vec<String>,
}

impl VersionPrecondition {
    /// First mismatch between `info` and the expected state, if any.
    pub fn mismatch(&self, info: &FunctionInfo) -> Option<String> {
        if info.runtime != self.runtime {
            Some(format!("runtime is {}, expected {}", info.runtime, self.runtime))
        } else if info.code.sha256 != self.code_sha256 {
            Some(format!(
                "code sha256 is {}, expected {}",
                info.code.sha256, self.code_sha256
            ))
        } else if info.layers != self.layers {
            Some(format!("layers are {:?}, expected {:?}", info.layers, self.layers))
        } else {
            None
        }
    }
}

/// An immutable published function version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionVersion {
    pub function: String,
    pub version: String,
    pub runtime: Runtime,
    pub code: CodeSource,
    pub layers: Vec<String>,
    pub description: String,
    pub published_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerVersion {
    pub layer: String,
    pub version: u64,
    pub arn: String,
    pub code: CodeSource,
    pub compatible_runtimes: Vec<Runtime>,
    pub description: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasInfo {
    pub function: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub updated_at: u64,
}

pub fn layer_arn(layer: &str, version: u64) -> String {
    format!("arn:shipfn:local:layer:{layer}:{version}")
}

pub(crate) fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
