pub mod deploy;
pub mod init;
pub mod plan;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use shipfn_core::{DeployConfig, ShipConfig};
use shipfn_pack::{SandboxBuilder, ZipPackager};
use shipfn_platform::LocalPlatform;
use shipfn_rollout::{Publisher, RetryPolicy};
use shipfn_store::FsArtifactStore;
use tokio::sync::watch;
use tracing::debug;

/// Publisher wired to the filesystem store, the embedded platform and the
/// docker sandbox.
pub type LocalPublisher =
    Publisher<FsArtifactStore, Arc<LocalPlatform>, SandboxBuilder, ZipPackager>;

/// Command-line values that take precedence over shipfn.toml.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Function name.
    #[arg(long)]
    pub function_name: Option<String>,
    /// Runtime identifier, e.g. python3.9 or nodejs18.x.
    #[arg(long)]
    pub runtime: Option<String>,
    /// Alias moved to the new version.
    #[arg(long)]
    pub alias: Option<String>,
    /// Dependency layer name.
    #[arg(long)]
    pub layer: Option<String>,
    /// Source directory or file.
    #[arg(long)]
    pub source: Option<String>,
    /// Dependency descriptor (requirements.txt or package.json).
    #[arg(long)]
    pub descriptor: Option<String>,
    /// Artifact store root directory.
    #[arg(long)]
    pub store: Option<String>,
    /// Description attached to published versions and the alias.
    #[arg(long)]
    pub version_label: Option<String>,
    /// Credentials context, passed through to the result.
    #[arg(long)]
    pub profile: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut ShipConfig) {
        let function = config.function_mut();
        set(&mut function.name, &self.function_name);
        set(&mut function.runtime, &self.runtime);
        set(&mut function.alias, &self.alias);
        set(&mut function.layer, &self.layer);
        set(&mut function.source, &self.source);
        set(&mut function.descriptor, &self.descriptor);
        set(&mut function.version_label, &self.version_label);
        set(&mut config.store_mut().root, &self.store);
        set(&mut config.profile, &self.profile);
    }
}

fn set(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *slot = Some(value.clone());
    }
}

/// Read a config file, apply overrides and resolve paths relative to the
/// file's directory.
pub fn load_config(path: &Path, overrides: &Overrides) -> anyhow::Result<DeployConfig> {
    let mut config = if path.is_file() {
        ShipConfig::from_file(path)?
    } else if path.exists() {
        anyhow::bail!("{} is not a file", path.display());
    } else {
        debug!(path = %path.display(), "config file not found, using flags only");
        ShipConfig::default()
    };
    overrides.apply(&mut config);

    let base_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(config.resolve(&base_dir)?)
}

pub fn open_platform(config: &DeployConfig) -> anyhow::Result<Arc<LocalPlatform>> {
    let platform = LocalPlatform::open(&config.platform_state).with_context(|| {
        format!(
            "failed to open platform state at {}",
            config.platform_state.display()
        )
    })?;
    Ok(Arc::new(platform))
}

pub fn publisher(
    config: &DeployConfig,
    platform: Arc<LocalPlatform>,
    cancel: Option<watch::Receiver<bool>>,
) -> LocalPublisher {
    let publisher = Publisher::new(
        FsArtifactStore::new(config.store_root.clone()),
        platform,
        SandboxBuilder::docker(config.sandbox.clone()),
        ZipPackager,
    )
    .with_retry(
        RetryPolicy::from_config(&config.retry),
        RetryPolicy::sandbox(&config.retry),
    );
    match cancel {
        Some(rx) => publisher.with_cancellation(rx),
        None => publisher,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipfn.toml");
        fs::write(
            &path,
            "[store]\nroot = \"bucket\"\n\n[function]\nname = \"orders\"\nalias = \"latest\"\n",
        )
        .unwrap();

        let overrides = Overrides {
            alias: Some("canary".into()),
            runtime: Some("python3.11".into()),
            ..Default::default()
        };
        let config = load_config(&path, &overrides).unwrap();

        assert_eq!(config.function, "orders");
        assert_eq!(config.alias, "canary");
        assert_eq!(config.runtime.as_str(), "python3.11");
        assert_eq!(config.store_root, dir.path().join("bucket"));
    }

    #[test]
    fn missing_file_falls_back_to_flags() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides {
            function_name: Some("orders".into()),
            store: Some("bucket".into()),
            ..Default::default()
        };
        let config = load_config(&dir.path().join("shipfn.toml"), &overrides).unwrap();
        assert_eq!(config.layer, "orders-deps");
    }

    #[test]
    fn missing_name_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides {
            store: Some("bucket".into()),
            ..Default::default()
        };
        let err = load_config(&dir.path().join("shipfn.toml"), &overrides).unwrap_err();
        assert!(err.downcast_ref::<shipfn_core::ConfigError>().is_some());
    }
}
