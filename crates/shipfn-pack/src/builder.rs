//! Sandboxed dependency builds.

use std::path::Path;
use std::time::Duration;

use shipfn_core::{Runtime, SandboxConfig};
use tracing::{debug, info};

use crate::archive::{Archive, zip_tree};
use crate::descriptor::Descriptor;
use crate::error::BuildError;
use crate::fingerprint::Exclusions;
use crate::installer::{self, LAYER_DIR};
use crate::sandbox::{ContainerEngine, DockerEngine, Sandbox};

/// Produces the dependency layer archive for a descriptor.
///
/// Implementations never retry; the publisher owns retry policy.
pub trait DependencyBuilder: Send + Sync {
    fn build(&self, descriptor: &Path, runtime: &Runtime) -> Result<Archive, BuildError>;
}

/// Runs the ecosystem installer inside a disposable container whose image
/// matches the target runtime.
pub struct SandboxBuilder<E: ContainerEngine = DockerEngine> {
    engine: E,
    config: SandboxConfig,
}

impl SandboxBuilder<DockerEngine> {
    pub fn docker(config: SandboxConfig) -> Self {
        Self {
            engine: DockerEngine::new(config.engine.clone()),
            config,
        }
    }
}

impl<E: ContainerEngine> SandboxBuilder<E> {
    pub fn with_engine(engine: E, config: SandboxConfig) -> Self {
        Self { engine, config }
    }
}

impl<E: ContainerEngine> DependencyBuilder for SandboxBuilder<E> {
    fn build(&self, descriptor: &Path, runtime: &Runtime) -> Result<Archive, BuildError> {
        let descriptor = Descriptor::load(descriptor)?;
        descriptor.ensure_matches(runtime)?;

        let plan = installer::plan(&descriptor, runtime);
        let image = self.config.image_for(runtime);

        let sandbox = Sandbox::acquire(&self.engine)?;
        for (src, name) in &plan.inputs {
            std::fs::copy(src, sandbox.workdir().join(name)).map_err(BuildError::Workspace)?;
        }

        info!(
            runtime = %runtime,
            image = %image,
            container = %sandbox.container(),
            packages = descriptor.packages.len(),
            "Installing dependencies with {}", plan.installer
        );

        let output = sandbox.run(
            &image,
            &plan.script,
            Duration::from_secs(self.config.timeout_secs),
        )?;

        if output.code != 0 {
            return Err(BuildError::InstallFailed {
                installer: plan.installer.to_string(),
                code: output.code,
                output: output.output,
            });
        }
        debug!(output = %output.output, "installer output");

        if !sandbox.workdir().join(&plan.expected_output).is_dir() {
            return Err(BuildError::MissingOutput {
                expected: plan.expected_output,
            });
        }

        let archive = zip_tree(&sandbox.workdir().join(LAYER_DIR), &Exclusions::default())?;
        info!(
            size_bytes = archive.size_bytes(),
            sha256 = %archive.sha256,
            "built dependency archive"
        );
        Ok(archive)
    }
}
