//! shipfn.toml configuration parser.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::runtime::Runtime;

pub const DEFAULT_RUNTIME: &str = "python3.9";
pub const DEFAULT_ALIAS: &str = "latest";
pub const DEFAULT_STORE_PREFIX: &str = "lambda-ci";
pub const DEFAULT_PLATFORM_STATE: &str = ".shipfn/platform.redb";
/// Directory shipfn keeps its local state in.
pub const STATE_DIR: &str = ".shipfn";
pub const DEFAULT_EXCLUDES: &[&str] = &[".git", "__pycache__", ".DS_Store", "node_modules"];

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid regex"));
static LAYER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,140}$").expect("valid regex"));
static ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid regex"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipConfig {
    pub store: Option<StoreConfig>,
    pub function: Option<FunctionConfig>,
    pub sandbox: Option<SandboxConfig>,
    pub retry: Option<RetryConfig>,
    pub platform: Option<PlatformConfig>,
    /// Credentials context, resolved outside shipfn.
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub root: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub name: Option<String>,
    pub runtime: Option<String>,
    pub alias: Option<String>,
    pub layer: Option<String>,
    pub source: Option<String>,
    pub descriptor: Option<String>,
    pub exclude: Option<Vec<String>>,
    pub version_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Container engine binary.
    pub engine: String,
    /// Build image; `{runtime}` is replaced with the runtime identifier.
    pub image: String,
    pub timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            engine: "docker".to_string(),
            image: "public.ecr.aws/sam/build-{runtime}".to_string(),
            timeout_secs: 900,
        }
    }
}

impl SandboxConfig {
    pub fn image_for(&self, runtime: &Runtime) -> String {
        self.image.replace("{runtime}", runtime.as_str())
    }
}

/// Bounded exponential backoff settings for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per store/platform call, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Attempts at starting the build sandbox.
    pub sandbox_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            multiplier: 2.0,
            sandbox_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Path of the embedded platform database.
    pub state: Option<String>,
}

/// Fully resolved and validated settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub function: String,
    pub runtime: Runtime,
    pub alias: String,
    pub layer: String,
    pub source: PathBuf,
    pub descriptor: PathBuf,
    pub exclude: Vec<String>,
    /// Paths under `source` that are not function code: the descriptor,
    /// its lockfile, the store root and platform state. Relative to
    /// `source`, `/`-separated.
    pub exclude_paths: Vec<String>,
    pub store_root: PathBuf,
    pub store_prefix: String,
    pub sandbox: SandboxConfig,
    pub retry: RetryConfig,
    pub platform_state: PathBuf,
    pub version_label: String,
    pub profile: Option<String>,
}

impl ShipConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Scaffold a minimal shipfn.toml for a function.
    pub fn scaffold(name: &str, runtime: &str) -> Self {
        ShipConfig {
            store: Some(StoreConfig {
                root: Some(".shipfn/artifacts".to_string()),
                prefix: Some(DEFAULT_STORE_PREFIX.to_string()),
            }),
            function: Some(FunctionConfig {
                name: Some(name.to_string()),
                runtime: Some(runtime.to_string()),
                alias: Some(DEFAULT_ALIAS.to_string()),
                layer: Some(format!("{name}-deps")),
                source: Some("src".to_string()),
                descriptor: None,
                exclude: None,
                version_label: None,
            }),
            sandbox: Some(SandboxConfig::default()),
            retry: None,
            platform: None,
            profile: None,
        }
    }

    /// Mutable access to the `[function]` table, creating it if absent.
    pub fn function_mut(&mut self) -> &mut FunctionConfig {
        self.function.get_or_insert_with(FunctionConfig::default)
    }

    /// Mutable access to the `[store]` table, creating it if absent.
    pub fn store_mut(&mut self) -> &mut StoreConfig {
        self.store.get_or_insert_with(StoreConfig::default)
    }

    /// Apply defaults, resolve relative paths against `base_dir`, and validate.
    pub fn resolve(&self, base_dir: &Path) -> Result<DeployConfig, ConfigError> {
        let function = self.function.clone().unwrap_or_default();
        let store = self.store.clone().unwrap_or_default();

        let name = function.name.ok_or(ConfigError::Missing("function.name"))?;
        if !NAME_RE.is_match(&name) {
            return Err(ConfigError::Invalid {
                field: "function.name",
                reason: format!("{name:?} must be 1-64 characters of [A-Za-z0-9_-]"),
            });
        }

        let runtime = Runtime::parse(function.runtime.as_deref().unwrap_or(DEFAULT_RUNTIME))?;

        let alias = function.alias.unwrap_or_else(|| DEFAULT_ALIAS.to_string());
        if !ALIAS_RE.is_match(&alias) || alias.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                field: "function.alias",
                reason: format!("{alias:?} must be a non-numeric name of [A-Za-z0-9_-]"),
            });
        }

        let layer = function.layer.unwrap_or_else(|| format!("{name}-deps"));
        if !LAYER_RE.is_match(&layer) {
            return Err(ConfigError::Invalid {
                field: "function.layer",
                reason: format!("{layer:?} must be 1-140 characters of [A-Za-z0-9_-]"),
            });
        }

        let source = base_dir.join(function.source.as_deref().unwrap_or("."));
        let descriptor = base_dir.join(
            function
                .descriptor
                .as_deref()
                .unwrap_or(runtime.ecosystem().default_descriptor()),
        );

        let store_root = base_dir.join(store.root.ok_or(ConfigError::Missing("store.root"))?);
        let store_prefix = store
            .prefix
            .unwrap_or_else(|| DEFAULT_STORE_PREFIX.to_string());
        if store_prefix.is_empty() || store_prefix.starts_with('/') || store_prefix.contains("..") {
            return Err(ConfigError::Invalid {
                field: "store.prefix",
                reason: format!("{store_prefix:?} must be a relative key prefix"),
            });
        }

        let platform_state = base_dir.join(
            self.platform
                .as_ref()
                .and_then(|p| p.state.clone())
                .unwrap_or_else(|| DEFAULT_PLATFORM_STATE.to_string()),
        );

        let retry = self.retry.clone().unwrap_or_default();
        if retry.max_attempts == 0 || retry.sandbox_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry",
                reason: "attempt counts must be at least 1".to_string(),
            });
        }

        let version_label = function.version_label.unwrap_or_else(generate_version_label);

        let mut owned = vec![
            descriptor.clone(),
            store_root.clone(),
            platform_state.clone(),
            base_dir.join(STATE_DIR),
        ];
        if let (Some(lockfile), Some(dir)) = (runtime.ecosystem().lockfile(), descriptor.parent()) {
            owned.push(dir.join(lockfile));
        }
        let exclude_paths = paths_under(&source, &owned);

        Ok(DeployConfig {
            function: name,
            runtime,
            alias,
            layer,
            source,
            descriptor,
            exclude: function.exclude.unwrap_or_else(|| {
                DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
            }),
            exclude_paths,
            store_root,
            store_prefix,
            sandbox: self.sandbox.clone().unwrap_or_default(),
            retry,
            platform_state,
            version_label,
            profile: self.profile.clone(),
        })
    }
}

/// Those of `paths` that lie inside `root`, relative to it and `/`-separated.
fn paths_under(root: &Path, paths: &[PathBuf]) -> Vec<String> {
    let mut found: Vec<String> = paths
        .iter()
        .filter_map(|path| {
            let rel = path.strip_prefix(root).ok()?;
            let parts = rel
                .components()
                .map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()?;
            (!parts.is_empty()).then(|| parts.join("/"))
        })
        .collect();
    found.sort();
    found.dedup();
    found
}

/// Upper-case UUID v4 hex, used when no explicit version label is given.
pub fn generate_version_label() -> String {
    uuid::Uuid::new_v4().simple().to_string().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Ecosystem;

    fn minimal() -> ShipConfig {
        toml::from_str(
            r#"
[store]
root = "artifacts"

[function]
name = "demo"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_scaffold() {
        let config = ShipConfig::scaffold("orders-api", "nodejs18.x");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("orders-api"));
        assert!(toml_str.contains("orders-api-deps"));
        assert!(toml_str.contains("nodejs18.x"));
    }

    #[test]
    fn test_resolve_defaults() {
        let resolved = minimal().resolve(Path::new("/work")).unwrap();
        assert_eq!(resolved.function, "demo");
        assert_eq!(resolved.runtime.as_str(), DEFAULT_RUNTIME);
        assert_eq!(resolved.alias, "latest");
        assert_eq!(resolved.layer, "demo-deps");
        assert_eq!(resolved.source, PathBuf::from("/work/."));
        assert_eq!(resolved.descriptor, PathBuf::from("/work/requirements.txt"));
        assert_eq!(resolved.store_root, PathBuf::from("/work/artifacts"));
        assert_eq!(resolved.store_prefix, "lambda-ci");
        assert_eq!(resolved.retry, RetryConfig::default());
        assert_eq!(resolved.version_label.len(), 32);
        assert!(resolved.exclude.contains(&".git".to_string()));
        assert_eq!(
            resolved.exclude_paths,
            vec![".shipfn", ".shipfn/platform.redb", "artifacts", "requirements.txt"]
        );
    }

    #[test]
    fn test_exclude_paths_only_cover_the_source_tree() {
        let mut config = minimal();
        config.function_mut().source = Some("src".to_string());
        config.function_mut().runtime = Some("nodejs18.x".to_string());
        config.function_mut().descriptor = Some("src/package.json".to_string());
        config.store_mut().root = Some("src/.cache/artifacts".to_string());
        let resolved = config.resolve(Path::new("proj")).unwrap();
        assert_eq!(
            resolved.exclude_paths,
            vec![".cache/artifacts", "package-lock.json", "package.json"]
        );

        // Relative base dirs resolve the same way.
        let resolved = minimal().resolve(Path::new(".")).unwrap();
        assert!(resolved.exclude_paths.contains(&"requirements.txt".to_string()));
        assert!(resolved.exclude_paths.contains(&"artifacts".to_string()));
    }

    #[test]
    fn test_node_runtime_defaults_to_package_json() {
        let mut config = minimal();
        config.function_mut().runtime = Some("nodejs18.x".to_string());
        let resolved = config.resolve(Path::new("/w")).unwrap();
        assert_eq!(resolved.runtime.ecosystem(), Ecosystem::Node);
        assert_eq!(resolved.descriptor, PathBuf::from("/w/package.json"));
    }

    #[test]
    fn test_missing_function_name() {
        let config: ShipConfig = toml::from_str("[store]\nroot = \"a\"\n").unwrap();
        assert!(matches!(
            config.resolve(Path::new(".")),
            Err(ConfigError::Missing("function.name"))
        ));
    }

    #[test]
    fn test_numeric_alias_rejected() {
        let mut config = minimal();
        config.function_mut().alias = Some("42".to_string());
        assert!(matches!(
            config.resolve(Path::new(".")),
            Err(ConfigError::Invalid { field: "function.alias", .. })
        ));
    }

    #[test]
    fn test_unsupported_runtime_rejected() {
        let mut config = minimal();
        config.function_mut().runtime = Some("java11".to_string());
        assert!(matches!(
            config.resolve(Path::new(".")),
            Err(ConfigError::Runtime(_))
        ));
    }

    #[test]
    fn test_explicit_version_label_kept() {
        let mut config = minimal();
        config.function_mut().version_label = Some("3f2a9c1".to_string());
        let resolved = config.resolve(Path::new(".")).unwrap();
        assert_eq!(resolved.version_label, "3f2a9c1");
    }

    #[test]
    fn test_sandbox_image_template() {
        let sandbox = SandboxConfig::default();
        let runtime = Runtime::parse("python3.11").unwrap();
        assert_eq!(
            sandbox.image_for(&runtime),
            "public.ecr.aws/sam/build-python3.11"
        );
    }

    #[test]
    fn test_parse_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipfn.toml");
        std::fs::write(
            &path,
            r#"
profile = "staging"

[store]
root = "/srv/artifacts"
prefix = "ci"

[function]
name = "billing"
runtime = "python3.11"
alias = "live"
source = "src"
exclude = [".git"]

[sandbox]
timeout_secs = 60

[retry]
max_attempts = 3
"#,
        )
        .unwrap();

        let config = ShipConfig::from_file(&path).unwrap();
        let resolved = config.resolve(dir.path()).unwrap();
        assert_eq!(resolved.store_root, PathBuf::from("/srv/artifacts"));
        assert_eq!(resolved.store_prefix, "ci");
        assert_eq!(resolved.alias, "live");
        assert_eq!(resolved.sandbox.timeout_secs, 60);
        assert_eq!(resolved.sandbox.engine, "docker");
        assert_eq!(resolved.retry.max_attempts, 3);
        assert_eq!(resolved.retry.base_delay_ms, 500);
        assert_eq!(resolved.exclude, vec![".git".to_string()]);
        assert_eq!(resolved.profile.as_deref(), Some("staging"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipfn.toml");
        std::fs::write(&path, "[function\nname=").unwrap();
        let err = ShipConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("shipfn.toml"));
    }
}
