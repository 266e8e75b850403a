//! Read-only views: the dry-run plan and the current deployment status.

use serde::{Deserialize, Serialize};
use shipfn_core::{ChangeSet, DeploymentRecord, Fingerprints, Runtime};

/// What a deployment would do, computed without mutating anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanReport {
    pub function: String,
    pub change_set: ChangeSet,
    pub fingerprints: Fingerprints,
    /// Last recorded deployment, `None` before the first one.
    pub last: Option<DeploymentRecord>,
    pub code_key: String,
    pub deps_key: String,
    /// The changed code archive is already in the store.
    pub code_cached: bool,
    /// The changed dependency archive is already in the store.
    pub deps_cached: bool,
}

impl PlanReport {
    /// Whether running the deployment would start a sandbox build.
    pub fn needs_build(&self) -> bool {
        self.change_set.deps_changed() && !self.deps_cached
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub function: String,
    pub exists: bool,
    pub runtime: Option<Runtime>,
    pub layers: Vec<String>,
    pub record: Option<DeploymentRecord>,
    pub alias: String,
    pub alias_target: Option<String>,
    /// Layers of the version the alias points at.
    pub served_layers: Vec<String>,
}

impl StatusReport {
    /// The alias serves the recorded version, with the recorded layer.
    pub fn in_sync(&self) -> bool {
        match (&self.record, &self.alias_target) {
            (Some(record), Some(target)) => {
                &record.function_version == target
                    && self.served_layers == std::slice::from_ref(&record.layer.arn)
            }
            _ => false,
        }
    }
}
