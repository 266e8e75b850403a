//! Deterministic artifact keys.
//!
//! ```text
//! {prefix}/{function}/code/{source_fingerprint}.zip
//! {prefix}/{function}/deps/{runtime}/{dependency_fingerprint}.zip
//! ```
//!
//! The function name namespaces every key so unrelated functions never
//! collide. Dependency keys include the runtime because compiled extensions
//! built for one runtime are not valid for another.

use shipfn_core::{DependencyFingerprint, Runtime, SourceFingerprint};

use crate::error::{StoreError, StoreResult};

pub fn code_key(prefix: &str, function: &str, fingerprint: &SourceFingerprint) -> String {
    format!("{prefix}/{function}/code/{}.zip", fingerprint.as_str())
}

pub fn deps_key(
    prefix: &str,
    function: &str,
    runtime: &Runtime,
    fingerprint: &DependencyFingerprint,
) -> String {
    format!("{prefix}/{function}/deps/{runtime}/{}.zip", fingerprint.as_str())
}

/// Keys are `/`-separated relative paths without empty or `.`/`..` segments.
pub fn validate(key: &str) -> StoreResult<()> {
    let invalid = |reason| {
        Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason,
        })
    };
    if key.is_empty() {
        return invalid("empty key");
    }
    if key.starts_with('/') {
        return invalid("key must be relative");
    }
    if key.contains('\\') {
        return invalid("key must use '/' separators");
    }
    if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return invalid("key has an empty or relative segment");
    }
    Ok(())
}
