//! Content-addressed fingerprints for the source tree and the dependency
//! descriptor.
//!
//! Both are pure functions of the bytes on disk. Directory traversal is
//! sorted and paths are normalised to `/` separators relative to the root,
//! so identical trees on different machines hash identically.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use shipfn_core::{DeployConfig, DependencyFingerprint, SourceFingerprint};
use tracing::debug;
use walkdir::WalkDir;

use crate::descriptor::Descriptor;
use crate::error::PackError;

/// Entries left out of both the source fingerprint and the code archive.
///
/// An excluded directory takes everything beneath it along.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusions {
    /// File names skipped at any depth.
    pub names: Vec<String>,
    /// Paths relative to the walk root, `/`-separated.
    pub paths: Vec<String>,
}

impl Exclusions {
    pub fn names<I, T>(names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            paths: Vec::new(),
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            names: config.exclude.clone(),
            paths: config.exclude_paths.clone(),
        }
    }

    fn skips(&self, rel: &str, name: &str) -> bool {
        self.names.iter().any(|x| x == name) || self.paths.iter().any(|x| x == rel)
    }
}

/// Hash a source directory (or single file).
///
/// Each entry contributes one line: `F:<path>:<sha256>` for files,
/// `D:<path>` for directories and `L:<path>:<sha256 of target>` for symlinks.
/// Lines are sorted by path before hashing.
pub fn fingerprint_source(path: &Path, exclude: &Exclusions) -> Result<SourceFingerprint, PackError> {
    if !path.exists() {
        return Err(PackError::NotFound(path.display().to_string()));
    }

    let mut entries = Vec::new();
    for entry in walk(path, exclude) {
        let entry = entry?;
        let line = match entry.kind {
            EntryKind::File => format!("F:{}:{}", entry.rel, sha256_file(&entry.abs)?),
            EntryKind::Dir => format!("D:{}", entry.rel),
            EntryKind::Symlink(ref target) => {
                format!("L:{}:{}", entry.rel, sha256_bytes(target.as_bytes()))
            }
        };
        entries.push((entry.rel, line));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (_, line) in &entries {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hex::encode(hasher.finalize());

    debug!(path = %path.display(), entries = entries.len(), fingerprint = %digest, "fingerprinted source");
    Ok(SourceFingerprint(digest))
}

/// Hash the dependency descriptor, plus its lockfile when one exists.
///
/// The descriptor must parse as one of the supported formats; the file name
/// itself does not contribute, only the content.
pub fn fingerprint_dependencies(descriptor: &Path) -> Result<DependencyFingerprint, PackError> {
    let parsed = Descriptor::load(descriptor)?;
    fingerprint_descriptor(&parsed)
}

pub fn fingerprint_descriptor(descriptor: &Descriptor) -> Result<DependencyFingerprint, PackError> {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}\n", descriptor.ecosystem.as_str()).as_bytes());
    hasher.update(format!("descriptor:{}\n", sha256_file(&descriptor.path)?).as_bytes());
    if let Some(lock) = &descriptor.lockfile {
        hasher.update(format!("lockfile:{}\n", sha256_file(lock)?).as_bytes());
    }
    let digest = hex::encode(hasher.finalize());

    debug!(descriptor = %descriptor.path.display(), fingerprint = %digest, "fingerprinted dependencies");
    Ok(DependencyFingerprint(digest))
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub(crate) fn sha256_file(path: &Path) -> Result<String, PackError> {
    let bytes = fs::read(path).map_err(|e| PackError::io(path, e))?;
    Ok(sha256_bytes(&bytes))
}

pub(crate) enum EntryKind {
    File,
    Dir,
    Symlink(String),
}

pub(crate) struct TreeEntry {
    /// Path relative to the walk root, `/`-separated.
    pub rel: String,
    pub abs: std::path::PathBuf,
    pub kind: EntryKind,
}

/// Sorted walk shared by the fingerprinter and the packager so both see the
/// same set of entries.
pub(crate) fn walk<'a>(
    root: &'a Path,
    exclude: &'a Exclusions,
) -> impl Iterator<Item = Result<TreeEntry, PackError>> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| {
            e.depth() == 0
                || !exclude.skips(
                    &relative_path(root, e.path()),
                    &e.file_name().to_string_lossy(),
                )
        })
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    return Some(Err(PackError::Walk {
                        path: root.display().to_string(),
                        message: e.to_string(),
                    }));
                }
            };

            let rel = relative_path(root, entry.path());
            let file_type = entry.file_type();
            let kind = if file_type.is_symlink() {
                match fs::read_link(entry.path()) {
                    Ok(target) => EntryKind::Symlink(target.to_string_lossy().replace('\\', "/")),
                    Err(e) => return Some(Err(PackError::io(entry.path(), e))),
                }
            } else if file_type.is_dir() {
                // The root itself is not an entry.
                if rel.is_empty() {
                    return None;
                }
                EntryKind::Dir
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                return None;
            };

            // A single-file root is keyed by its file name.
            let rel = if rel.is_empty() {
                entry.file_name().to_string_lossy().to_string()
            } else {
                rel
            };

            Some(Ok(TreeEntry {
                rel,
                abs: entry.path().to_path_buf(),
                kind,
            }))
        })
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn excludes() -> Exclusions {
        Exclusions::names([".git", "__pycache__"])
    }

    fn tree(files: &[(&str, &str)]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("src");
        fs::create_dir_all(&root).unwrap();
        for (rel, content) in files {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        (dir, root)
    }

    #[test]
    fn test_refingerprint_is_stable() {
        let (_dir, root) = tree(&[("handler.py", "def handler(e, c): pass\n")]);
        let a = fingerprint_source(&root, &excludes()).unwrap();
        let b = fingerprint_source(&root, &excludes()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_creation_order_does_not_matter() {
        let (_a, root_a) = tree(&[("a.py", "A"), ("lib/b.py", "B"), ("z.py", "Z")]);
        let (_b, root_b) = tree(&[("z.py", "Z"), ("lib/b.py", "B"), ("a.py", "A")]);
        assert_eq!(
            fingerprint_source(&root_a, &excludes()).unwrap(),
            fingerprint_source(&root_b, &excludes()).unwrap()
        );
    }

    #[test]
    fn test_content_change_changes_fingerprint() {
        let (_dir, root) = tree(&[("handler.py", "v1")]);
        let before = fingerprint_source(&root, &excludes()).unwrap();
        fs::write(root.join("handler.py"), "v2").unwrap();
        assert_ne!(before, fingerprint_source(&root, &excludes()).unwrap());
    }

    #[test]
    fn test_rename_changes_fingerprint() {
        let (_a, root_a) = tree(&[("one.py", "same")]);
        let (_b, root_b) = tree(&[("two.py", "same")]);
        assert_ne!(
            fingerprint_source(&root_a, &excludes()).unwrap(),
            fingerprint_source(&root_b, &excludes()).unwrap()
        );
    }

    #[test]
    fn test_excluded_entries_ignored() {
        let (_dir, root) = tree(&[("handler.py", "x")]);
        let before = fingerprint_source(&root, &excludes()).unwrap();
        fs::create_dir_all(root.join("__pycache__")).unwrap();
        fs::write(root.join("__pycache__/handler.cpython-39.pyc"), "junk").unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        assert_eq!(before, fingerprint_source(&root, &excludes()).unwrap());
    }

    #[test]
    fn test_excluded_paths_match_from_the_root_only() {
        let (_dir, root) = tree(&[("handler.py", "x"), ("lib/requirements.txt", "nested")]);
        let exclude = Exclusions {
            paths: vec!["requirements.txt".to_string(), ".shipfn".to_string()],
            ..excludes()
        };
        let before = fingerprint_source(&root, &exclude).unwrap();

        fs::write(root.join("requirements.txt"), "requests==2.31.0\n").unwrap();
        fs::create_dir_all(root.join(".shipfn")).unwrap();
        fs::write(root.join(".shipfn/platform.redb"), "state").unwrap();
        assert_eq!(before, fingerprint_source(&root, &exclude).unwrap());

        // Same file name deeper in the tree is still source.
        fs::write(root.join("lib/requirements.txt"), "changed").unwrap();
        assert_ne!(before, fingerprint_source(&root, &exclude).unwrap());
    }

    #[test]
    fn test_missing_source_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = fingerprint_source(&dir.path().join("nope"), &Exclusions::default()).unwrap_err();
        assert!(matches!(err, PackError::NotFound(_)));
    }

    #[test]
    fn test_dependency_fingerprint_ignores_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("requirements.txt");
        let b = dir.path().join("requirements-prod.txt");
        fs::write(&a, "flask==3.0.0\n").unwrap();
        fs::write(&b, "flask==3.0.0\n").unwrap();
        assert_eq!(
            fingerprint_dependencies(&a).unwrap(),
            fingerprint_dependencies(&b).unwrap()
        );
    }

    #[test]
    fn test_lockfile_contributes() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        fs::write(&manifest, r#"{"dependencies": {"express": "^4.18.2"}}"#).unwrap();
        let without = fingerprint_dependencies(&manifest).unwrap();
        fs::write(dir.path().join("package-lock.json"), r#"{"lockfileVersion": 3}"#).unwrap();
        let with = fingerprint_dependencies(&manifest).unwrap();
        assert_ne!(without, with);
    }
}
