//! Directory-backed artifact store.
//!
//! Each key maps to a file under the root. Writes go to a temp file in the
//! target directory and are moved into place with a no-clobber rename, so a
//! reader never observes a partially written artifact and two concurrent
//! writers of the same key cannot interleave.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::ArtifactStore;
use crate::error::{StoreError, StoreResult};
use crate::keys;

const TEMP_PREFIX: &str = ".shipfn-tmp-";

#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        keys::validate(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, seg| p.join(seg)))
    }

    /// Resolve a racing write: identical content is fine, anything else is a conflict.
    fn check_existing(&self, key: &str, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let existing = std::fs::read(path).map_err(|e| StoreError::from_io(key, e))?;
        if existing == bytes {
            debug!(%key, "artifact already present with identical content");
            Ok(())
        } else {
            Err(StoreError::Conflict {
                key: key.to_string(),
            })
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        match std::fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::from_io(key, e)),
        }
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.path_for(key)?;
        std::fs::read(&path).map_err(|e| StoreError::from_io(key, e))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key)?;
        if path.is_file() {
            return self.check_existing(key, &path, bytes);
        }

        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent).map_err(|e| StoreError::from_io(key, e))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)
            .map_err(|e| StoreError::from_io(key, e))?;
        write_synced(&mut tmp, bytes).map_err(|e| StoreError::from_io(key, e))?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                info!(%key, size_bytes = bytes.len(), "artifact stored");
                Ok(())
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                self.check_existing(key, &path, bytes)
            }
            Err(e) => Err(StoreError::from_io(key, e.error)),
        }
    }
}

fn write_synced(tmp: &mut NamedTempFile, bytes: &[u8]) -> std::io::Result<()> {
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()
}
