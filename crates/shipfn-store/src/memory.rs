//! In-process artifact store, used by tests and dry runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::ArtifactStore;
use crate::error::{StoreError, StoreResult};
use crate::keys;

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(key: &str) -> StoreError {
    StoreError::Unavailable {
        key: key.to_string(),
        message: "store lock poisoned".to_string(),
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        keys::validate(key)?;
        let blobs = self.blobs.read().map_err(|_| poisoned(key))?;
        Ok(blobs.contains_key(key))
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        keys::validate(key)?;
        let blobs = self.blobs.read().map_err(|_| poisoned(key))?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        keys::validate(key)?;
        let mut blobs = self.blobs.write().map_err(|_| poisoned(key))?;
        match blobs.get(key) {
            Some(existing) if existing.as_slice() == bytes => Ok(()),
            Some(_) => Err(StoreError::Conflict {
                key: key.to_string(),
            }),
            None => {
                blobs.insert(key.to_string(), bytes.to_vec());
                Ok(())
            }
        }
    }
}
