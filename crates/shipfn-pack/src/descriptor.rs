//! Dependency descriptor recognition.
//!
//! Exactly two shapes are accepted: a line-oriented requirements list
//! (`requirements.txt`) and a JSON package manifest with a `dependencies`
//! mapping (`package.json`). Anything else is rejected as unsupported.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use shipfn_core::{Ecosystem, Runtime};

use crate::error::PackError;

static REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)^
        [A-Za-z0-9][A-Za-z0-9._-]*            # project name
        (\[[A-Za-z0-9_.,\ -]+\])?             # extras
        \s*
        (
            @\s*\S+                           # direct reference
          | (===|==|!=|~=|>=|<=|<|>)\s*[^\s,;]+
            (\s*,\s*(===|==|!=|~=|>=|<=|<|>)\s*[^\s,;]+)*
        )?
        \s*(;.*)?                             # environment marker
        $",
    )
    .expect("valid regex")
});

/// A parsed dependency descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub path: PathBuf,
    pub ecosystem: Ecosystem,
    /// Requirement lines (Python) or dependency names (Node), in file order.
    pub packages: Vec<String>,
    /// Lockfile next to the descriptor, when the ecosystem has one and it exists.
    pub lockfile: Option<PathBuf>,
}

impl Descriptor {
    pub fn load(path: &Path) -> Result<Self, PackError> {
        if !path.is_file() {
            return Err(PackError::NotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path).map_err(|e| PackError::io(path, e))?;
        let content = String::from_utf8(bytes).map_err(|_| PackError::UnsupportedDescriptor {
            path: path.display().to_string(),
            reason: "descriptor is not UTF-8 text".to_string(),
        })?;

        let (ecosystem, packages) = parse(path, &content)?;

        let lockfile = ecosystem
            .lockfile()
            .and_then(|name| path.parent().map(|dir| dir.join(name)))
            .filter(|lock| lock.is_file());

        Ok(Self {
            path: path.to_path_buf(),
            ecosystem,
            packages,
            lockfile,
        })
    }

    /// The descriptor must belong to the runtime's ecosystem.
    pub fn ensure_matches(&self, runtime: &Runtime) -> Result<(), PackError> {
        if self.ecosystem == runtime.ecosystem() {
            return Ok(());
        }
        Err(PackError::EcosystemMismatch {
            path: self.path.display().to_string(),
            found: self.ecosystem.as_str(),
            expected: runtime.ecosystem().as_str(),
            runtime: runtime.to_string(),
        })
    }
}

fn parse(path: &Path, content: &str) -> Result<(Ecosystem, Vec<String>), PackError> {
    let unsupported = |reason: String| PackError::UnsupportedDescriptor {
        path: path.display().to_string(),
        reason,
    };

    let is_json = path.extension().is_some_and(|ext| ext == "json")
        || content.trim_start().starts_with('{');

    if is_json {
        parse_manifest(content).map(|pkgs| (Ecosystem::Node, pkgs)).map_err(unsupported)
    } else {
        parse_requirements(content).map(|pkgs| (Ecosystem::Python, pkgs)).map_err(unsupported)
    }
}

fn parse_manifest(content: &str) -> Result<Vec<String>, String> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| format!("invalid JSON manifest: {e}"))?;
    let object = value
        .as_object()
        .ok_or_else(|| "manifest must be a JSON object".to_string())?;

    let Some(deps) = object.get("dependencies") else {
        return Ok(Vec::new());
    };
    let deps = deps
        .as_object()
        .ok_or_else(|| "\"dependencies\" must be an object".to_string())?;

    deps.iter()
        .map(|(name, spec)| {
            if spec.is_string() {
                Ok(name.clone())
            } else {
                Err(format!("dependency {name:?} must map to a version string"))
            }
        })
        .collect()
}

fn parse_requirements(content: &str) -> Result<Vec<String>, String> {
    let mut packages = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        // pip options (-r, -e, --index-url, ...) and bare URLs pass through.
        if line.starts_with('-') || line.contains("://") {
            packages.push(line.to_string());
            continue;
        }
        if !REQUIREMENT_RE.is_match(line) {
            return Err(format!("line {}: {line:?} is not a requirement", idx + 1));
        }
        packages.push(line.to_string());
    }
    Ok(packages)
}

/// `#` starts a comment at line start or after whitespace.
fn strip_comment(line: &str) -> &str {
    let mut prev = None;
    for (pos, c) in line.char_indices() {
        if c == '#' && prev.is_none_or(char::is_whitespace) {
            return &line[..pos];
        }
        prev = Some(c);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_requirements_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "requirements.txt",
            "# pinned\nrequests==2.31.0\nnumpy>=1.24, <2 ; python_version >= \"3.9\"\n\nuvicorn[standard]~=0.23  # server\n-r base.txt\n",
        );
        let desc = Descriptor::load(&path).unwrap();
        assert_eq!(desc.ecosystem, Ecosystem::Python);
        assert_eq!(desc.packages.len(), 4);
        assert_eq!(desc.packages[0], "requests==2.31.0");
        assert_eq!(desc.lockfile, None);
    }

    #[test]
    fn test_comment_after_any_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "requirements.txt",
            "requests==2.31.0\t# pin\n\t# indented\nflask==3.0.0\u{a0}#nbsp\ngit+https://example.com/repo.git#egg=tool\n",
        );
        let desc = Descriptor::load(&path).unwrap();
        assert_eq!(
            desc.packages,
            vec![
                "requests==2.31.0",
                "flask==3.0.0",
                "git+https://example.com/repo.git#egg=tool",
            ]
        );
    }

    #[test]
    fn test_package_manifest_with_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "package.json",
            r#"{"name": "api", "dependencies": {"express": "^4.18.2", "zod": "3.22.4"}}"#,
        );
        write(dir.path(), "package-lock.json", "{}");
        let desc = Descriptor::load(&path).unwrap();
        assert_eq!(desc.ecosystem, Ecosystem::Node);
        assert_eq!(desc.packages, vec!["express", "zod"]);
        assert_eq!(desc.lockfile, Some(dir.path().join("package-lock.json")));
    }

    #[test]
    fn test_manifest_without_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "package.json", r#"{"name": "bare"}"#);
        assert!(Descriptor::load(&path).unwrap().packages.is_empty());
    }

    #[test]
    fn test_manifest_dependencies_must_be_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "package.json", r#"{"dependencies": ["express"]}"#);
        let err = Descriptor::load(&path).unwrap_err();
        assert!(matches!(err, PackError::UnsupportedDescriptor { .. }));
    }

    #[test]
    fn test_yaml_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "environment.yml",
            "dependencies:\n  - numpy=1.24\n",
        );
        let err = Descriptor::load(&path).unwrap_err();
        assert!(
            matches!(err, PackError::UnsupportedDescriptor { ref reason, .. } if reason.contains("line 1")),
            "got {err}"
        );
    }

    #[test]
    fn test_missing_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let err = Descriptor::load(&dir.path().join("requirements.txt")).unwrap_err();
        assert!(matches!(err, PackError::NotFound(_)));
    }

    #[test]
    fn test_ecosystem_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "requirements.txt", "flask==3.0.0\n");
        let desc = Descriptor::load(&path).unwrap();
        let node = Runtime::parse("nodejs18.x").unwrap();
        assert!(matches!(
            desc.ensure_matches(&node),
            Err(PackError::EcosystemMismatch { .. })
        ));
        assert!(desc.ensure_matches(&Runtime::parse("python3.11").unwrap()).is_ok());
    }
}
