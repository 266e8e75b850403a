//! Change-set classification and the per-run result record.

use serde::{Deserialize, Serialize};

use crate::types::{DeploymentRecord, Fingerprints, LayerRef};

/// What must be published to bring the function up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSet {
    Unchanged,
    CodeOnly,
    DependenciesOnly,
    Both,
}

impl ChangeSet {
    /// Diff current fingerprints against the last deployment record.
    ///
    /// No record means first deployment: everything is published. A runtime
    /// change counts as a dependency change since compiled extensions differ
    /// per runtime.
    pub fn between(current: &Fingerprints, last: Option<&DeploymentRecord>) -> Self {
        let Some(last) = last else {
            return ChangeSet::Both;
        };

        let code_changed = current.source != last.source;
        let deps_changed =
            current.dependencies != last.dependencies || current.runtime != last.runtime;

        match (code_changed, deps_changed) {
            (false, false) => ChangeSet::Unchanged,
            (true, false) => ChangeSet::CodeOnly,
            (false, true) => ChangeSet::DependenciesOnly,
            (true, true) => ChangeSet::Both,
        }
    }

    pub fn code_changed(self) -> bool {
        matches!(self, ChangeSet::CodeOnly | ChangeSet::Both)
    }

    pub fn deps_changed(self) -> bool {
        matches!(self, ChangeSet::DependenciesOnly | ChangeSet::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeSet::Unchanged => "unchanged",
            ChangeSet::CodeOnly => "code",
            ChangeSet::DependenciesOnly => "dependencies",
            ChangeSet::Both => "code+dependencies",
        }
    }
}

impl std::fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArtifactState {
    Published,
    Intact,
}

impl ArtifactState {
    pub fn from_changed(changed: bool) -> Self {
        if changed {
            ArtifactState::Published
        } else {
            ArtifactState::Intact
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactState::Published => "PUBLISHED",
            ArtifactState::Intact => "INTACT",
        }
    }
}

/// Outcome of one publisher run.
///
/// `function_version` is the version the alias targets once the run returns;
/// downstream log streaming keys off it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub function: String,
    pub change_set: ChangeSet,
    pub code: ArtifactState,
    pub dependencies: ArtifactState,
    pub fingerprints: Fingerprints,
    pub code_key: String,
    pub deps_key: String,
    pub function_version: Option<String>,
    pub layer: Option<LayerRef>,
    pub alias: String,
    pub alias_target: Option<String>,
    pub version_label: String,
    pub profile: Option<String>,
}

impl RunReport {
    pub fn is_noop(&self) -> bool {
        self.change_set == ChangeSet::Unchanged
    }
}
