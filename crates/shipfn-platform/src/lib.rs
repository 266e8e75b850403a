//! shipfn platform: the function execution platform as seen by the publisher.
//!
//! [`FunctionPlatform`] lists the operations a deployment needs: function
//! metadata and tags, code and configuration updates, version and layer
//! publishing, and atomic alias updates.
//!
//! [`LocalPlatform`] implements it on an embedded [redb](https://docs.rs/redb)
//! database. Every operation is a single write transaction, so tag writes
//! and alias moves are all-or-nothing. Values are JSON-serialized into
//! `&[u8]` columns.

pub mod error;
pub mod local;
pub mod tables;
pub mod types;

pub use error::{PlatformError, PlatformResult};
pub use local::LocalPlatform;
pub use types::*;

use std::collections::BTreeMap;

use shipfn_core::{LayerRef, Runtime};

/// Execution platform API used by the publisher.
///
/// Implementations never retry. Transient failures (throttling, "update in
/// progress" conflicts, transport errors) surface as retryable errors.
pub trait FunctionPlatform: Send + Sync {
    fn get_function(&self, name: &str) -> PlatformResult<Option<FunctionInfo>>;

    /// Create a function whose initial code is `code`.
    fn create_function(
        &self,
        name: &str,
        runtime: &Runtime,
        code: &CodeSource,
        layers: &[String],
    ) -> PlatformResult<FunctionInfo>;

    fn get_function_tags(&self, name: &str) -> PlatformResult<BTreeMap<String, String>>;

    /// Merge `tags` into the function's tags in one atomic write.
    fn tag_function(&self, name: &str, tags: &BTreeMap<String, String>) -> PlatformResult<()>;

    fn update_function_code(&self, name: &str, code: &CodeSource) -> PlatformResult<()>;

    fn update_function_configuration(&self, name: &str, update: &ConfigUpdate) -> PlatformResult<()>;

    /// Snapshot the function's current code and configuration as a new
    /// immutable version, provided they still match `expected`.
    fn publish_version(
        &self,
        name: &str,
        description: &str,
        expected: &VersionPrecondition,
    ) -> PlatformResult<FunctionVersion>;

    fn get_version(&self, name: &str, version: &str) -> PlatformResult<Option<FunctionVersion>>;

    fn publish_layer_version(
        &self,
        layer: &str,
        code: &CodeSource,
        compatible_runtimes: &[Runtime],
        description: &str,
    ) -> PlatformResult<LayerRef>;

    /// Create or retarget an alias in one call.
    fn set_alias(
        &self,
        name: &str,
        alias: &str,
        version: &str,
        description: &str,
    ) -> PlatformResult<AliasInfo>;

    fn get_alias(&self, name: &str, alias: &str) -> PlatformResult<Option<AliasInfo>>;
}

impl<T: FunctionPlatform + ?Sized> FunctionPlatform for std::sync::Arc<T> {
    fn get_function(&self, name: &str) -> PlatformResult<Option<FunctionInfo>> {
        (**self).get_function(name)
    }

    fn create_function(
        &self,
        name: &str,
        runtime: &Runtime,
        code: &CodeSource,
        layers: &[String],
    ) -> PlatformResult<FunctionInfo> {
        (**self).create_function(name, runtime, code, layers)
    }

    fn get_function_tags(&self, name: &str) -> PlatformResult<BTreeMap<String, String>> {
        (**self).get_function_tags(name)
    }

    fn tag_function(&self, name: &str, tags: &BTreeMap<String, String>) -> PlatformResult<()> {
        (**self).tag_function(name, tags)
    }

    fn update_function_code(&self, name: &str, code: &CodeSource) -> PlatformResult<()> {
        (**self).update_function_code(name, code)
    }

    fn update_function_configuration(&self, name: &str, update: &ConfigUpdate) -> PlatformResult<()> {
        (**self).update_function_configuration(name, update)
    }

    fn publish_version(
        &self,
        name: &str,
        description: &str,
        expected: &VersionPrecondition,
    ) -> PlatformResult<FunctionVersion> {
        (**self).publish_version(name, description, expected)
    }

    fn get_version(&self, name: &str, version: &str) -> PlatformResult<Option<FunctionVersion>> {
        (**self).get_version(name, version)
    }

    fn publish_layer_version(
        &self,
        layer: &str,
        code: &CodeSource,
        compatible_runtimes: &[Runtime],
        description: &str,
    ) -> PlatformResult<LayerRef> {
        (**self).publish_layer_version(layer, code, compatible_runtimes, description)
    }

    fn set_alias(
        &self,
        name: &str,
        alias: &str,
        version: &str,
        description: &str,
    ) -> PlatformResult<AliasInfo> {
        (**self).set_alias(name, alias, version, description)
    }

    fn get_alias(&self, name: &str, alias: &str) -> PlatformResult<Option<AliasInfo>> {
        (**self).get_alias(name, alias)
    }
}
