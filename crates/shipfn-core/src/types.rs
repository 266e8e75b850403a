//! Shared types used across shipfn crates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::runtime::Runtime;

/// Digest over the function source tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFingerprint(pub String);

/// Digest over the dependency descriptor (and lockfile, when present).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyFingerprint(pub String);

macro_rules! fingerprint_impls {
    ($ty:ident) => {
        impl $ty {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First 12 hex characters, for human output.
            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(12) {
                    Some((end, _)) => &self.0[..end],
                    None => &self.0,
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

fingerprint_impls!(SourceFingerprint);
fingerprint_impls!(DependencyFingerprint);

/// The fingerprints computed for the current working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprints {
    pub source: SourceFingerprint,
    pub dependencies: DependencyFingerprint,
    pub runtime: Runtime,
}

/// A published layer version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRef {
    pub version: u64,
    pub arn: String,
}

/// Tag keys under which a [`DeploymentRecord`] is stored on the function.
pub mod tags {
    pub const PREFIX: &str = "shipfn:";
    pub const SOURCE: &str = "shipfn:source";
    pub const DEPENDENCIES: &str = "shipfn:dependencies";
    pub const RUNTIME: &str = "shipfn:runtime";
    pub const FUNCTION_VERSION: &str = "shipfn:function-version";
    pub const LAYER_VERSION: &str = "shipfn:layer-version";
    pub const LAYER_ARN: &str = "shipfn:layer-arn";
    pub const LABEL: &str = "shipfn:label";
    pub const DEPLOYED_AT: &str = "shipfn:deployed-at";
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("deployment record is missing tag {0}")]
    Incomplete(&'static str),
    #[error("deployment record tag {tag} is invalid: {reason}")]
    Invalid { tag: &'static str, reason: String },
}

impl RecordError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ValidationError
    }
}

/// The last successfully published state of a function.
///
/// Only written after the alias shift succeeded, in a single tag write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub source: SourceFingerprint,
    pub dependencies: DependencyFingerprint,
    pub runtime: Runtime,
    pub function_version: String,
    pub layer: LayerRef,
    pub version_label: String,
    /// Unix timestamp (seconds).
    pub deployed_at: u64,
}

impl DeploymentRecord {
    pub fn to_tags(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(tags::SOURCE.to_string(), self.source.0.clone());
        map.insert(tags::DEPENDENCIES.to_string(), self.dependencies.0.clone());
        map.insert(tags::RUNTIME.to_string(), self.runtime.to_string());
        map.insert(
            tags::FUNCTION_VERSION.to_string(),
            self.function_version.clone(),
        );
        map.insert(tags::LAYER_VERSION.to_string(), self.layer.version.to_string());
        map.insert(tags::LAYER_ARN.to_string(), self.layer.arn.clone());
        map.insert(tags::LABEL.to_string(), self.version_label.clone());
        map.insert(tags::DEPLOYED_AT.to_string(), self.deployed_at.to_string());
        map
    }

    /// Rebuild a record from function tags.
    ///
    /// Returns `Ok(None)` when no shipfn tag is present (first deployment).
    /// A partial tag set is an error rather than a silently empty record.
    pub fn from_tags(map: &BTreeMap<String, String>) -> Result<Option<Self>, RecordError> {
        if !map.keys().any(|k| k.starts_with(tags::PREFIX)) {
            return Ok(None);
        }

        let get = |tag: &'static str| required_tag(map, tag);
        let parse_u64 = |tag: &'static str| -> Result<u64, RecordError> {
            required_tag(map, tag)?
                .parse()
                .map_err(|e: std::num::ParseIntError| RecordError::Invalid {
                    tag,
                    reason: e.to_string(),
                })
        };

        let runtime = Runtime::parse(get(tags::RUNTIME)?).map_err(|e| RecordError::Invalid {
            tag: tags::RUNTIME,
            reason: e.to_string(),
        })?;

        Ok(Some(Self {
            source: SourceFingerprint(digest_tag(map, tags::SOURCE)?),
            dependencies: DependencyFingerprint(digest_tag(map, tags::DEPENDENCIES)?),
            runtime,
            function_version: get(tags::FUNCTION_VERSION)?.clone(),
            layer: LayerRef {
                version: parse_u64(tags::LAYER_VERSION)?,
                arn: get(tags::LAYER_ARN)?.clone(),
            },
            version_label: get(tags::LABEL)?.clone(),
            deployed_at: parse_u64(tags::DEPLOYED_AT)?,
        }))
    }
}

fn required_tag<'a>(
    map: &'a BTreeMap<String, String>,
    tag: &'static str,
) -> Result<&'a String, RecordError> {
    map.get(tag).ok_or(RecordError::Incomplete(tag))
}

/// A fingerprint tag must hold a SHA-256 digest: 64 lowercase hex chars.
fn digest_tag(map: &BTreeMap<String, String>, tag: &'static str) -> Result<String, RecordError> {
    let value = required_tag(map, tag)?;
    let is_digest = value.len() == 64
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !is_digest {
        return Err(RecordError::Invalid {
            tag,
            reason: format!("{value:?} is not a sha256 hex digest"),
        });
    }
    Ok(value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DeploymentRecord {
        DeploymentRecord {
            source: SourceFingerprint("a".repeat(64)),
            dependencies: DependencyFingerprint("b".repeat(64)),
            runtime: Runtime::parse("python3.9").unwrap(),
            function_version: "7".to_string(),
            layer: LayerRef {
                version: 3,
                arn: "arn:local:layer:demo-deps:3".to_string(),
            },
            version_label: "ABC123".to_string(),
            deployed_at: 1_700_000_000,
        }
    }

    #[test]
    fn record_survives_tag_encoding() {
        let rec = record();
        let back = DeploymentRecord::from_tags(&rec.to_tags()).unwrap();
        assert_eq!(back, Some(rec));
    }

    #[test]
    fn no_tags_means_first_deployment() {
        let mut map = BTreeMap::new();
        map.insert("team".to_string(), "payments".to_string());
        assert_eq!(DeploymentRecord::from_tags(&map).unwrap(), None);
    }

    #[test]
    fn partial_tags_are_rejected() {
        let mut map = record().to_tags();
        map.remove(tags::LAYER_ARN);
        assert_eq!(
            DeploymentRecord::from_tags(&map),
            Err(RecordError::Incomplete(tags::LAYER_ARN))
        );
    }

    #[test]
    fn non_numeric_layer_version_is_invalid() {
        let mut map = record().to_tags();
        map.insert(tags::LAYER_VERSION.to_string(), "three".to_string());
        assert!(matches!(
            DeploymentRecord::from_tags(&map),
            Err(RecordError::Invalid { tag: tags::LAYER_VERSION, .. })
        ));
    }

    #[test]
    fn fingerprint_tags_must_be_hex_digests() {
        for bad in ["é".repeat(64), "A".repeat(64), "a".repeat(63), "not-a-digest".to_string()] {
            let mut map = record().to_tags();
            map.insert(tags::SOURCE.to_string(), bad.clone());
            assert!(
                matches!(
                    DeploymentRecord::from_tags(&map),
                    Err(RecordError::Invalid { tag: tags::SOURCE, .. })
                ),
                "{bad:?} accepted"
            );
        }

        let mut map = record().to_tags();
        map.insert(tags::DEPENDENCIES.to_string(), "ééééééééééééé".to_string());
        assert!(matches!(
            DeploymentRecord::from_tags(&map),
            Err(RecordError::Invalid { tag: tags::DEPENDENCIES, .. })
        ));
    }

    #[test]
    fn short_fingerprint() {
        let fp = SourceFingerprint("0123456789abcdef".to_string());
        assert_eq!(fp.short(), "0123456789ab");
        assert_eq!(SourceFingerprint("abc".to_string()).short(), "abc");
        // Cuts on character boundaries.
        let wide = DependencyFingerprint("é".repeat(20));
        assert_eq!(wide.short(), "é".repeat(12));
    }
}
