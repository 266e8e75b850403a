//! Deterministic zip archives for function code and dependency layers.
//!
//! Entries are written in sorted path order with a fixed timestamp
//! (1980-01-01, the zip epoch) and fixed permissions, so the same tree always
//! produces byte-identical output.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use tracing::info;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::PackError;
use crate::fingerprint::{EntryKind, Exclusions, sha256_bytes, walk};

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

/// An in-memory archive ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub bytes: Vec<u8>,
    pub sha256: String,
}

impl Archive {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let sha256 = sha256_bytes(&bytes);
        Self { bytes, sha256 }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Assembles the function code archive from a source tree.
///
/// `exclude` is the same set the source fingerprint was computed with, so
/// the archive holds exactly the fingerprinted entries.
pub trait Packager: Send + Sync {
    fn package(&self, source: &Path, exclude: &Exclusions) -> Result<Archive, PackError>;
}

/// Zips the source tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackager;

impl Packager for ZipPackager {
    fn package(&self, source: &Path, exclude: &Exclusions) -> Result<Archive, PackError> {
        if !source.exists() {
            return Err(PackError::NotFound(source.display().to_string()));
        }
        let archive = zip_tree(source, exclude)?;
        info!(
            source = %source.display(),
            size_bytes = archive.size_bytes(),
            sha256 = %archive.sha256,
            "packaged function code"
        );
        Ok(archive)
    }
}

/// Zip everything under `root`; entry names are relative to it.
pub fn zip_tree(root: &Path, exclude: &Exclusions) -> Result<Archive, PackError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let file_opts = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(FILE_MODE);
    let dir_opts = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(DIR_MODE);

    let mut entries = walk(root, exclude).collect::<Result<Vec<_>, _>>()?;
    entries.sort_by(|a, b| a.rel.cmp(&b.rel));

    for entry in entries {
        let name = entry.rel;
        match entry.kind {
            EntryKind::Dir => writer.add_directory(format!("{name}/"), dir_opts)?,
            EntryKind::File => {
                let bytes = fs::read(&entry.abs).map_err(|e| PackError::io(&entry.abs, e))?;
                writer.start_file(name, file_opts)?;
                writer
                    .write_all(&bytes)
                    .map_err(|e| PackError::io(&entry.abs, e))?;
            }
            EntryKind::Symlink(target) => writer.add_symlink(name, target, file_opts)?,
        }
    }

    let cursor = writer.finish()?;
    Ok(Archive::from_bytes(cursor.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn names(archive: &Archive) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes.clone())).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn source_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("handler.py"), "import pkg\n").unwrap();
        fs::write(dir.path().join("pkg/__init__.py"), "").unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: main").unwrap();
        dir
    }

    #[test]
    fn test_package_is_byte_identical_across_runs() {
        let dir = source_tree();
        let exclude = Exclusions::names([".git"]);
        let a = ZipPackager.package(dir.path(), &exclude).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(dir.path().join("handler.py"), "import pkg\n").unwrap();
        let b = ZipPackager.package(dir.path(), &exclude).unwrap();
        assert_eq!(a.sha256, b.sha256);
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_package_sorted_and_excluded() {
        let dir = source_tree();
        let archive = ZipPackager
            .package(dir.path(), &Exclusions::names([".git"]))
            .unwrap();
        assert_eq!(names(&archive), vec!["handler.py", "pkg/", "pkg/__init__.py"]);
    }

    #[test]
    fn test_package_leaves_out_excluded_paths() {
        let dir = source_tree();
        fs::write(dir.path().join("requirements.txt"), "requests==2.31.0\n").unwrap();
        fs::create_dir_all(dir.path().join(".shipfn/artifacts")).unwrap();
        fs::write(dir.path().join(".shipfn/artifacts/old.zip"), "zip").unwrap();
        let exclude = Exclusions {
            names: vec![".git".to_string()],
            paths: vec!["requirements.txt".to_string(), ".shipfn".to_string()],
        };

        let archive = ZipPackager.package(dir.path(), &exclude).unwrap();
        assert_eq!(names(&archive), vec!["handler.py", "pkg/", "pkg/__init__.py"]);

        let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
        let mut content = String::new();
        zip.by_name("handler.py")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "import pkg\n");
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = ZipPackager
            .package(&dir.path().join("missing"), &Exclusions::default())
            .unwrap_err();
        assert!(matches!(err, PackError::NotFound(_)));
    }
}
