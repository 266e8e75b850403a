//! Publisher: drives one deployment through its phases.
//!
//! ```text
//! START -> FINGERPRINT -> DIFF -> [BUILD_DEPS] -> [PACKAGE_CODE] -> UPLOAD
//!       -> REGISTER_VERSIONS -> SHIFT_ALIAS -> PERSIST_RECORD -> DONE
//! ```
//!
//! Any step may end the run in ABORT. Ordering is enforced in one place,
//! [`Publisher::execute`]: artifacts are durable before versions are
//! registered, the alias moves only after registration, and the deployment
//! record is written only after the alias moved. A run that dies midway
//! leaves the old record in place, so re-running recomputes the same change
//! set and picks up cached artifacts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shipfn_core::{
    ArtifactState, ChangeSet, DeployConfig, DeploymentRecord, Fingerprints, LayerRef, RunReport,
};
use shipfn_pack::fingerprint::{fingerprint_descriptor, fingerprint_source, sha256_bytes};
use shipfn_pack::{Archive, DependencyBuilder, Descriptor, Exclusions, Packager};
use shipfn_platform::{CodeSource, ConfigUpdate, FunctionInfo, FunctionPlatform, VersionPrecondition};
use shipfn_store::{ArtifactStore, StoreError, code_key, deps_key};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Cause, PublishError};
use crate::plan::{PlanReport, StatusReport};
use crate::retry::RetryPolicy;

/// Step of a publisher run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Fingerprint,
    Diff,
    BuildDeps,
    PackageCode,
    Upload,
    RegisterVersions,
    ShiftAlias,
    PersistRecord,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Fingerprint => "fingerprint",
            Phase::Diff => "diff",
            Phase::BuildDeps => "build_deps",
            Phase::PackageCode => "package_code",
            Phase::Upload => "upload",
            Phase::RegisterVersions => "register_versions",
            Phase::ShiftAlias => "shift_alias",
            Phase::PersistRecord => "persist_record",
            Phase::Done => "done",
        }
    }

    /// Cancellation is honoured only before platform mutations begin.
    fn cancellable(self) -> bool {
        !matches!(
            self,
            Phase::ShiftAlias | Phase::PersistRecord | Phase::Done
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the diff step observed about the current tree and the platform.
struct Observed {
    descriptor: Descriptor,
    fingerprints: Fingerprints,
    function: Option<FunctionInfo>,
    record: Option<DeploymentRecord>,
    change_set: ChangeSet,
    code_key: String,
    deps_key: String,
}

/// An artifact ready for upload, or already present in the store.
struct Staged {
    key: String,
    sha256: String,
    bytes: Option<Vec<u8>>,
}

impl Staged {
    fn built(key: String, archive: Archive) -> Self {
        Self {
            key,
            sha256: archive.sha256,
            bytes: Some(archive.bytes),
        }
    }

    fn cached(key: String, bytes: &[u8]) -> Self {
        Self {
            key,
            sha256: sha256_bytes(bytes),
            bytes: None,
        }
    }

    fn source(&self) -> CodeSource {
        CodeSource {
            store_key: self.key.clone(),
            sha256: self.sha256.clone(),
        }
    }
}

/// Tracks the current phase of one run and checks for cancellation at
/// each boundary.
struct Run<'a> {
    function: &'a str,
    phase: Phase,
    cancel: Option<&'a watch::Receiver<bool>>,
}

impl Run<'_> {
    fn enter(&mut self, next: Phase) -> Result<(), PublishError> {
        if next.cancellable() && self.cancel.is_some_and(|rx| *rx.borrow()) {
            warn!(function = %self.function, phase = %next, "cancelled at step boundary");
            return Err(PublishError::new(self.phase, Cause::Cancelled(next)));
        }
        debug!(function = %self.function, from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        Ok(())
    }

    fn fail(&self, cause: impl Into<Cause>) -> PublishError {
        PublishError::new(self.phase, cause)
    }
}

/// The orchestration core.
///
/// Generic over its collaborators so tests can inject fakes and arbitrary
/// prior deployment state.
pub struct Publisher<S, P, B, K> {
    store: S,
    platform: P,
    builder: B,
    packager: K,
    retry: RetryPolicy,
    sandbox_retry: RetryPolicy,
    cancel: Option<watch::Receiver<bool>>,
}

impl<S, P, B, K> Publisher<S, P, B, K>
where
    S: ArtifactStore,
    P: FunctionPlatform,
    B: DependencyBuilder,
    K: Packager,
{
    pub fn new(store: S, platform: P, builder: B, packager: K) -> Self {
        Self {
            store,
            platform,
            builder,
            packager,
            retry: RetryPolicy::default(),
            sandbox_retry: RetryPolicy::sandbox(&Default::default()),
            cancel: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy, sandbox_retry: RetryPolicy) -> Self {
        self.retry = retry;
        self.sandbox_retry = sandbox_retry;
        self
    }

    /// Observe `cancel`; once it turns `true` the run stops at the next
    /// cancellable step boundary.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Publish whatever changed since the last recorded deployment.
    pub fn run(&self, config: &DeployConfig) -> Result<RunReport, PublishError> {
        let mut run = Run {
            function: &config.function,
            phase: Phase::Start,
            cancel: self.cancel.as_ref(),
        };
        info!(function = %config.function, alias = %config.alias, label = %config.version_label, "deployment started");

        let observed = self.observe(&mut run, config)?;
        let report = self.execute(&mut run, config, observed)?;

        run.enter(Phase::Done)?;
        if report.is_noop() {
            info!(function = %config.function, "no changes detected, nothing deployed");
        } else {
            info!(
                function = %config.function,
                change_set = %report.change_set,
                version = report.function_version.as_deref().unwrap_or("-"),
                alias = %config.alias,
                "deployment complete"
            );
        }
        Ok(report)
    }

    /// Dry run: fingerprint, diff and cache lookups without any mutation.
    pub fn plan(&self, config: &DeployConfig) -> Result<PlanReport, PublishError> {
        let mut run = Run {
            function: &config.function,
            phase: Phase::Start,
            cancel: self.cancel.as_ref(),
        };
        let observed = self.observe(&mut run, config)?;

        let code_cached = observed.change_set.code_changed()
            && self
                .retry
                .run("store.exists", || self.store.exists(&observed.code_key))
                .map_err(|e| run.fail(e))?;
        let deps_cached = observed.change_set.deps_changed()
            && self
                .retry
                .run("store.exists", || self.store.exists(&observed.deps_key))
                .map_err(|e| run.fail(e))?;

        Ok(PlanReport {
            function: config.function.clone(),
            change_set: observed.change_set,
            fingerprints: observed.fingerprints,
            last: observed.record,
            code_key: observed.code_key,
            deps_key: observed.deps_key,
            code_cached,
            deps_cached,
        })
    }

    /// Current record and alias target, read-only.
    pub fn status(&self, config: &DeployConfig) -> Result<StatusReport, PublishError> {
        let run = Run {
            function: &config.function,
            phase: Phase::Diff,
            cancel: None,
        };
        let function = self
            .retry
            .run("get_function", || self.platform.get_function(&config.function))
            .map_err(|e| run.fail(e))?;
        let record = match &function {
            Some(_) => self.read_record(&run, &config.function)?,
            None => None,
        };
        let alias = match &function {
            Some(_) => self
                .retry
                .run("get_alias", || self.platform.get_alias(&config.function, &config.alias))
                .map_err(|e| run.fail(e))?,
            None => None,
        };
        let served = match &alias {
            Some(alias) => self
                .retry
                .run("get_version", || {
                    self.platform.get_version(&config.function, &alias.version)
                })
                .map_err(|e| run.fail(e))?,
            None => None,
        };

        Ok(StatusReport {
            function: config.function.clone(),
            exists: function.is_some(),
            runtime: function.as_ref().map(|f| f.runtime.clone()),
            layers: function.map(|f| f.layers).unwrap_or_default(),
            record,
            alias: config.alias.clone(),
            alias_target: alias.map(|a| a.version),
            served_layers: served.map(|v| v.layers).unwrap_or_default(),
        })
    }

    /// FINGERPRINT and DIFF.
    fn observe(&self, run: &mut Run<'_>, config: &DeployConfig) -> Result<Observed, PublishError> {
        run.enter(Phase::Fingerprint)?;
        let descriptor = Descriptor::load(&config.descriptor).map_err(|e| run.fail(e))?;
        descriptor
            .ensure_matches(&config.runtime)
            .map_err(|e| run.fail(e))?;
        let fingerprints = Fingerprints {
            source: fingerprint_source(&config.source, &Exclusions::from_config(config))
                .map_err(|e| run.fail(e))?,
            dependencies: fingerprint_descriptor(&descriptor).map_err(|e| run.fail(e))?,
            runtime: config.runtime.clone(),
        };
        info!(
            function = %config.function,
            source = %fingerprints.source.short(),
            dependencies = %fingerprints.dependencies.short(),
            runtime = %fingerprints.runtime,
            "fingerprints computed"
        );

        run.enter(Phase::Diff)?;
        let function = self
            .retry
            .run("get_function", || self.platform.get_function(&config.function))
            .map_err(|e| run.fail(e))?;
        let record = match &function {
            Some(_) => self.read_record(run, &config.function)?,
            None => None,
        };
        let change_set = ChangeSet::between(&fingerprints, record.as_ref());
        info!(
            function = %config.function,
            change_set = %change_set,
            first_deployment = record.is_none(),
            "change set computed"
        );

        Ok(Observed {
            code_key: code_key(&config.store_prefix, &config.function, &fingerprints.source),
            deps_key: deps_key(
                &config.store_prefix,
                &config.function,
                &fingerprints.runtime,
                &fingerprints.dependencies,
            ),
            descriptor,
            fingerprints,
            function,
            record,
            change_set,
        })
    }

    fn read_record(&self, run: &Run<'_>, function: &str) -> Result<Option<DeploymentRecord>, PublishError> {
        let tags = self
            .retry
            .run("get_function_tags", || self.platform.get_function_tags(function))
            .map_err(|e| run.fail(e))?;
        DeploymentRecord::from_tags(&tags).map_err(|e| run.fail(e))
    }

    /// The single place where the change set turns into platform mutations.
    fn execute(
        &self,
        run: &mut Run<'_>,
        config: &DeployConfig,
        observed: Observed,
    ) -> Result<RunReport, PublishError> {
        let Observed {
            descriptor,
            fingerprints,
            function,
            record,
            change_set,
            code_key,
            deps_key,
        } = observed;

        let mut report = RunReport {
            function: config.function.clone(),
            change_set,
            code: ArtifactState::from_changed(change_set.code_changed()),
            dependencies: ArtifactState::from_changed(change_set.deps_changed()),
            fingerprints: fingerprints.clone(),
            code_key: code_key.clone(),
            deps_key: deps_key.clone(),
            function_version: record.as_ref().map(|r| r.function_version.clone()),
            layer: record.as_ref().map(|r| r.layer.clone()),
            alias: config.alias.clone(),
            alias_target: None,
            version_label: config.version_label.clone(),
            profile: config.profile.clone(),
        };

        if change_set == ChangeSet::Unchanged {
            report.alias_target = self
                .retry
                .run("get_alias", || self.platform.get_alias(&config.function, &config.alias))
                .map_err(|e| run.fail(e))?
                .map(|a| a.version);
            return Ok(report);
        }

        // Whatever is not rebuilt comes from the previous deployment.
        let previous_layer = record.as_ref().map(|r| r.layer.clone());
        if !change_set.deps_changed() && previous_layer.is_none() {
            return Err(run.fail(Cause::Inconsistent(format!(
                "function {} has no recorded dependency layer to reuse",
                config.function
            ))));
        }
        if !change_set.code_changed() && function.is_none() {
            return Err(run.fail(Cause::Inconsistent(format!(
                "function {} does not exist on the platform",
                config.function
            ))));
        }

        let deps = if change_set.deps_changed() {
            run.enter(Phase::BuildDeps)?;
            Some(self.stage(run, &deps_key, || {
                self.sandbox_retry
                    .run("build_dependencies", || {
                        self.builder.build(&descriptor.path, &config.runtime)
                    })
                    .map_err(Cause::from)
            })?)
        } else {
            None
        };

        // Unchanged source still has to be what the function runs: an
        // earlier run may have died after updating the code.
        let code_drifted = !change_set.code_changed()
            && function.as_ref().is_some_and(|f| f.code.store_key != code_key);
        if code_drifted {
            warn!(
                function = %config.function,
                key = %code_key,
                "function code differs from the recorded deployment, restoring it"
            );
        }

        let code = if change_set.code_changed() || code_drifted {
            run.enter(Phase::PackageCode)?;
            let exclude = Exclusions::from_config(config);
            Some(self.stage(run, &code_key, || {
                self.packager
                    .package(&config.source, &exclude)
                    .map_err(Cause::from)
            })?)
        } else {
            None
        };

        run.enter(Phase::Upload)?;
        for staged in deps.iter().chain(code.iter()) {
            self.upload(run, staged)?;
        }

        run.enter(Phase::RegisterVersions)?;
        let (version, layer) = self.register(
            run,
            config,
            function.as_ref(),
            deps.as_ref(),
            code.as_ref(),
            previous_layer,
        )?;

        run.enter(Phase::ShiftAlias)?;
        let alias = self
            .retry
            .run("update_alias", || {
                self.platform
                    .set_alias(&config.function, &config.alias, &version, &config.version_label)
            })
            .map_err(|source| {
                run.fail(Cause::AliasNotShifted {
                    version: version.clone(),
                    alias: config.alias.clone(),
                    source,
                })
            })?;

        run.enter(Phase::PersistRecord)?;
        let new_record = DeploymentRecord {
            source: fingerprints.source,
            dependencies: fingerprints.dependencies,
            runtime: fingerprints.runtime,
            function_version: version.clone(),
            layer: layer.clone(),
            version_label: config.version_label.clone(),
            deployed_at: now(),
        };
        let tags: BTreeMap<String, String> = new_record.to_tags();
        self.retry
            .run("tag_function", || self.platform.tag_function(&config.function, &tags))
            .map_err(|e| run.fail(e))?;

        report.function_version = Some(version);
        report.layer = Some(layer);
        report.alias_target = Some(alias.version);
        Ok(report)
    }

    /// Reuse the artifact at `key` when the store already has it, otherwise
    /// produce it with `produce`.
    fn stage(
        &self,
        run: &Run<'_>,
        key: &str,
        produce: impl FnOnce() -> Result<Archive, Cause>,
    ) -> Result<Staged, PublishError> {
        let exists = self
            .retry
            .run("store.exists", || self.store.exists(key))
            .map_err(|e| run.fail(e))?;
        if exists {
            let bytes = self
                .retry
                .run("store.get", || self.store.get(key))
                .map_err(|e| run.fail(e))?;
            info!(function = %run.function, %key, "artifact cache hit, skipping rebuild");
            return Ok(Staged::cached(key.to_string(), &bytes));
        }
        let archive = produce().map_err(|e| run.fail(e))?;
        Ok(Staged::built(key.to_string(), archive))
    }

    /// Store the artifact and confirm it is readable before anything
    /// references it.
    fn upload(&self, run: &Run<'_>, staged: &Staged) -> Result<(), PublishError> {
        let Some(bytes) = &staged.bytes else {
            debug!(key = %staged.key, "artifact already stored");
            return Ok(());
        };
        self.retry
            .run("store.put", || self.store.put(&staged.key, bytes))
            .map_err(|e| run.fail(e))?;
        let durable = self
            .retry
            .run("store.exists", || self.store.exists(&staged.key))
            .map_err(|e| run.fail(e))?;
        if !durable {
            return Err(run.fail(StoreError::Unavailable {
                key: staged.key.clone(),
                message: "artifact not visible after upload".to_string(),
            }));
        }
        info!(function = %run.function, key = %staged.key, size_bytes = bytes.len(), "artifact uploaded");
        Ok(())
    }

    /// Publish the layer (if rebuilt), point the function at the new code and
    /// layer, then publish one function version that must carry exactly them.
    fn register(
        &self,
        run: &Run<'_>,
        config: &DeployConfig,
        function: Option<&FunctionInfo>,
        deps: Option<&Staged>,
        code: Option<&Staged>,
        previous_layer: Option<LayerRef>,
    ) -> Result<(String, LayerRef), PublishError> {
        let name = config.function.as_str();

        let layer = match deps {
            Some(deps) => self
                .retry
                .run("publish_layer_version", || {
                    self.platform.publish_layer_version(
                        &config.layer,
                        &deps.source(),
                        std::slice::from_ref(&config.runtime),
                        &config.version_label,
                    )
                })
                .map_err(|e| run.fail(e))?,
            None => previous_layer.ok_or_else(|| {
                run.fail(Cause::Inconsistent(format!("function {name} has no layer to reuse")))
            })?,
        };

        let expected_code = match (function, code) {
            (None, Some(code)) => {
                self.retry
                    .run("create_function", || {
                        self.platform.create_function(
                            name,
                            &config.runtime,
                            &code.source(),
                            std::slice::from_ref(&layer.arn),
                        )
                    })
                    .map_err(|e| run.fail(e))?;
                code.source()
            }
            (None, None) => {
                return Err(run.fail(Cause::Inconsistent(format!(
                    "function {name} does not exist and no code was packaged"
                ))));
            }
            (Some(current), code) => self.reconcile(run, config, current, code, &layer)?,
        };

        let expected = VersionPrecondition {
            runtime: config.runtime.clone(),
            code_sha256: expected_code.sha256,
            layers: vec![layer.arn.clone()],
        };
        let published = self
            .retry
            .run("publish_version", || {
                self.platform
                    .publish_version(name, &config.version_label, &expected)
            })
            .map_err(|e| run.fail(e))?;

        Ok((published.version, layer))
    }

    /// Bring an existing function to the runtime, layer and code this run
    /// publishes, whatever a previous run left behind. Returns the code the
    /// new version must carry.
    fn reconcile(
        &self,
        run: &Run<'_>,
        config: &DeployConfig,
        current: &FunctionInfo,
        code: Option<&Staged>,
        layer: &LayerRef,
    ) -> Result<CodeSource, PublishError> {
        let name = config.function.as_str();
        let layers = vec![layer.arn.clone()];
        let runtime_changed = current.runtime != config.runtime;

        if runtime_changed || current.layers != layers {
            let update = ConfigUpdate {
                runtime: runtime_changed.then(|| config.runtime.clone()),
                layers: (current.layers != layers).then_some(layers),
            };
            debug!(function = %name, ?update, "updating function configuration");
            self.retry
                .run("update_function_configuration", || {
                    self.platform.update_function_configuration(name, &update)
                })
                .map_err(|e| run.fail(e))?;
        }

        match code {
            Some(code) if code.source() != current.code => {
                let source = code.source();
                self.retry
                    .run("update_function_code", || {
                        self.platform.update_function_code(name, &source)
                    })
                    .map_err(|e| run.fail(e))?;
                Ok(source)
            }
            Some(code) => Ok(code.source()),
            None => Ok(current.code.clone()),
        }
    }
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
