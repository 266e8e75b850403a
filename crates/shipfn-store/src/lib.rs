//! shipfn store: artifact store client.
//!
//! Artifacts are immutable blobs under deterministic keys derived from
//! function identity and fingerprint (see [`keys`]). A key is either absent
//! or holds exactly one value: a second `put` with identical bytes is a
//! no-op, with different bytes it is rejected.

pub mod error;
pub mod fs;
pub mod keys;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use fs::FsArtifactStore;
pub use keys::{code_key, deps_key};
pub use memory::MemoryArtifactStore;

/// A versioned blob store holding code and dependency archives.
///
/// Implementations never retry; transient failures surface as
/// [`StoreError::Unavailable`] for the publisher to retry.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, key: &str) -> StoreResult<bool>;
    fn get(&self, key: &str) -> StoreResult<Vec<u8>>;
    /// Idempotent write: safe to race with identical `(key, bytes)`.
    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()>;
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for std::sync::Arc<T> {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        (**self).exists(key)
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        (**self).put(key, bytes)
    }
}
