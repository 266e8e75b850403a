//! `shipfn init`: write a shipfn.toml scaffold.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, bail};
use shipfn_core::ShipConfig;

pub const CONFIG_FILE: &str = "shipfn.toml";

pub fn init(dir: &Path, name: &str, runtime: &str, force: bool) -> anyhow::Result<ExitCode> {
    let output = dir.join(CONFIG_FILE);
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let config = ShipConfig::scaffold(name, runtime);
    // Reject names and runtimes that would not resolve later.
    config.resolve(dir)?;

    let content = config.to_toml_string()?;
    std::fs::write(&output, content)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("✓ Generated {}", output.display());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Overrides, load_config};

    #[test]
    fn scaffold_resolves_back() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), "orders", "nodejs18.x", false).unwrap();

        let config = load_config(&dir.path().join(CONFIG_FILE), &Overrides::default()).unwrap();
        assert_eq!(config.function, "orders");
        assert_eq!(config.runtime.as_str(), "nodejs18.x");
        assert!(config.descriptor.ends_with("package.json"));
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "# mine\n").unwrap();

        assert!(init(dir.path(), "orders", "python3.9", false).is_err());
        init(dir.path(), "orders", "python3.9", true).unwrap();
        let content = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(content.contains("orders"));
    }

    #[test]
    fn rejects_unknown_runtime() {
        let dir = tempfile::tempdir().unwrap();
        assert!(init(dir.path(), "orders", "ruby3.2", false).is_err());
        assert!(!dir.path().join(CONFIG_FILE).exists());
    }
}
