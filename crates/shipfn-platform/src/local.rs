//! LocalPlatform: an embedded execution platform backed by redb.
//!
//! Functions, versions, layers, aliases and tags each live in their own
//! table. Every mutating call runs in one write transaction, so a failed
//! call leaves no trace and concurrent callers see either the old or the
//! new state, never a mix.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shipfn_core::{LayerRef, Runtime};
use tracing::{debug, info};

use crate::FunctionPlatform;
use crate::error::{PlatformError, PlatformResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `PlatformError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| PlatformError::$variant(e.to_string())
    };
}

type Json = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe local platform backed by redb.
#[derive(Clone)]
pub struct LocalPlatform {
    db: Arc<Database>,
}

impl LocalPlatform {
    /// Open (or create) a persistent platform database at the given path.
    pub fn open(path: &Path) -> PlatformResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(map_err!(Unavailable))?;
        }
        let db = Database::create(path).map_err(map_err!(Unavailable))?;
        let platform = Self { db: Arc::new(db) };
        platform.ensure_tables()?;
        debug!(?path, "local platform opened");
        Ok(platform)
    }

    /// Create an ephemeral in-memory platform (for testing and dry runs).
    pub fn open_in_memory() -> PlatformResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Unavailable))?;
        let platform = Self { db: Arc::new(db) };
        platform.ensure_tables()?;
        debug!("in-memory local platform opened");
        Ok(platform)
    }

    fn ensure_tables(&self) -> PlatformResult<()> {
        self.write(|txn| {
            // Opening a table in a write transaction creates it if absent.
            for def in [FUNCTIONS, VERSIONS, LAYERS, ALIASES, TAGS] {
                txn.open_table(def).map_err(map_err!(Unavailable))?;
            }
            Ok(())
        })
    }

    /// Run `f` in a write transaction, committing only if it succeeds.
    fn write<R>(&self, f: impl FnOnce(&WriteTransaction) -> PlatformResult<R>) -> PlatformResult<R> {
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        let out = f(&txn)?;
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(out)
    }

    fn read<T: DeserializeOwned>(&self, def: Json, key: &str) -> PlatformResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let table = txn.open_table(def).map_err(map_err!(Unavailable))?;
        get_json(&table, key)
    }

    /// Load a function inside a write transaction or fail with `NotFound`.
    fn function_in(txn: &WriteTransaction, name: &str) -> PlatformResult<FunctionInfo> {
        let table = txn.open_table(FUNCTIONS).map_err(map_err!(Unavailable))?;
        get_json(&table, name)?.ok_or_else(|| PlatformError::NotFound(format!("function {name}")))
    }

    fn save_function(txn: &WriteTransaction, info: &FunctionInfo) -> PlatformResult<()> {
        let mut table = txn.open_table(FUNCTIONS).map_err(map_err!(Unavailable))?;
        put_json(&mut table, &info.name, info)
    }

    /// Every layer ARN must name a published layer version.
    fn check_layers(txn: &WriteTransaction, arns: &[String]) -> PlatformResult<()> {
        let table = txn.open_table(LAYERS).map_err(map_err!(Unavailable))?;
        for arn in arns {
            let (layer, version) = parse_layer_arn(arn)
                .ok_or_else(|| PlatformError::Validation(format!("malformed layer ARN {arn}")))?;
            let exists = table
                .get(version_key(layer, version).as_str())
                .map_err(map_err!(Unavailable))?
                .is_some();
            if !exists {
                return Err(PlatformError::Validation(format!("layer version {arn} does not exist")));
            }
        }
        Ok(())
    }
}

fn get_json<T, Tbl>(table: &Tbl, key: &str) -> PlatformResult<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key).map_err(map_err!(Unavailable))? {
        Some(guard) => Ok(Some(
            serde_json::from_slice(guard.value()).map_err(map_err!(Serialize))?,
        )),
        None => Ok(None),
    }
}

fn put_json<T: Serialize>(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    key: &str,
    value: &T,
) -> PlatformResult<()> {
    let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
    table
        .insert(key, bytes.as_slice())
        .map_err(map_err!(Unavailable))?;
    Ok(())
}

/// Highest version of `layer`, found with a range scan over `{layer}:*`.
fn latest_layer<Tbl>(table: &Tbl, layer: &str) -> PlatformResult<Option<LayerVersion>>
where
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let start = format!("{layer}:");
    let end = format!("{layer};");
    let mut range = table
        .range(start.as_str()..end.as_str())
        .map_err(map_err!(Unavailable))?;
    match range.next_back() {
        Some(entry) => {
            let (_, value) = entry.map_err(map_err!(Unavailable))?;
            Ok(Some(
                serde_json::from_slice(value.value()).map_err(map_err!(Serialize))?,
            ))
        }
        None => Ok(None),
    }
}

fn parse_layer_arn(arn: &str) -> Option<(&str, u64)> {
    let rest = arn.strip_prefix("arn:shipfn:local:layer:")?;
    let (layer, version) = rest.rsplit_once(':')?;
    Some((layer, version.parse().ok()?))
}

fn layer_ref(v: &LayerVersion) -> LayerRef {
    LayerRef {
        version: v.version,
        arn: v.arn.clone(),
    }
}

impl FunctionPlatform for LocalPlatform {
    fn get_function(&self, name: &str) -> PlatformResult<Option<FunctionInfo>> {
        self.read(FUNCTIONS, name)
    }

    fn create_function(
        &self,
        name: &str,
        runtime: &Runtime,
        code: &CodeSource,
        layers: &[String],
    ) -> PlatformResult<FunctionInfo> {
        let info = self.write(|txn| {
            {
                let table = txn.open_table(FUNCTIONS).map_err(map_err!(Unavailable))?;
                if get_json::<FunctionInfo, _>(&table, name)?.is_some() {
                    return Err(PlatformError::Validation(format!(
                        "function {name} already exists"
                    )));
                }
            }
            Self::check_layers(txn, layers)?;
            let info = FunctionInfo {
                name: name.to_string(),
                runtime: runtime.clone(),
                code: code.clone(),
                layers: layers.to_vec(),
                last_version: 0,
                updated_at: now(),
            };
            Self::save_function(txn, &info)?;
            Ok(info)
        })?;
        info!(function = %name, runtime = %runtime, "function created");
        Ok(info)
    }

    fn get_function_tags(&self, name: &str) -> PlatformResult<BTreeMap<String, String>> {
        if self.get_function(name)?.is_none() {
            return Err(PlatformError::NotFound(format!("function {name}")));
        }
        Ok(self.read(TAGS, name)?.unwrap_or_default())
    }

    fn tag_function(&self, name: &str, tags: &BTreeMap<String, String>) -> PlatformResult<()> {
        self.write(|txn| {
            Self::function_in(txn, name)?;
            let mut table = txn.open_table(TAGS).map_err(map_err!(Unavailable))?;
            let mut current: BTreeMap<String, String> = get_json(&table, name)?.unwrap_or_default();
            current.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            put_json(&mut table, name, &current)
        })?;
        debug!(function = %name, count = tags.len(), "function tagged");
        Ok(())
    }

    fn update_function_code(&self, name: &str, code: &CodeSource) -> PlatformResult<()> {
        self.write(|txn| {
            let mut info = Self::function_in(txn, name)?;
            info.code = code.clone();
            info.updated_at = now();
            Self::save_function(txn, &info)
        })?;
        info!(function = %name, key = %code.store_key, "function code updated");
        Ok(())
    }

    fn update_function_configuration(&self, name: &str, update: &ConfigUpdate) -> PlatformResult<()> {
        self.write(|txn| {
            let mut info = Self::function_in(txn, name)?;
            if let Some(runtime) = &update.runtime {
                info.runtime = runtime.clone();
            }
            if let Some(layers) = &update.layers {
                Self::check_layers(txn, layers)?;
                info.layers = layers.clone();
            }
            info.updated_at = now();
            Self::save_function(txn, &info)
        })?;
        info!(function = %name, "function configuration updated");
        Ok(())
    }

    fn publish_version(
        &self,
        name: &str,
        description: &str,
        expected: &VersionPrecondition,
    ) -> PlatformResult<FunctionVersion> {
        let published = self.write(|txn| {
            let mut info = Self::function_in(txn, name)?;
            if let Some(mismatch) = expected.mismatch(&info) {
                return Err(PlatformError::PreconditionFailed(format!(
                    "function {name}: {mismatch}"
                )));
            }
            info.last_version += 1;
            let published = FunctionVersion {
                function: name.to_string(),
                version: info.last_version.to_string(),
                runtime: info.runtime.clone(),
                code: info.code.clone(),
                layers: info.layers.clone(),
                description: description.to_string(),
                published_at: now(),
            };
            {
                let mut table = txn.open_table(VERSIONS).map_err(map_err!(Unavailable))?;
                put_json(&mut table, &version_key(name, info.last_version), &published)?;
            }
            Self::save_function(txn, &info)?;
            Ok(published)
        })?;
        info!(function = %name, version = %published.version, "function version published");
        Ok(published)
    }

    fn get_version(&self, name: &str, version: &str) -> PlatformResult<Option<FunctionVersion>> {
        let number: u64 = version
            .parse()
            .map_err(|_| PlatformError::Validation(format!("version {version:?} is not numeric")))?;
        self.read(VERSIONS, &version_key(name, number))
    }

    fn publish_layer_version(
        &self,
        layer: &str,
        code: &CodeSource,
        compatible_runtimes: &[Runtime],
        description: &str,
    ) -> PlatformResult<LayerRef> {
        if compatible_runtimes.is_empty() {
            return Err(PlatformError::Validation(
                "a layer needs at least one compatible runtime".to_string(),
            ));
        }
        let published = self.write(|txn| {
            let mut table = txn.open_table(LAYERS).map_err(map_err!(Unavailable))?;
            let next = latest_layer(&table, layer)?.map_or(1, |v| v.version + 1);
            let published = LayerVersion {
                layer: layer.to_string(),
                version: next,
                arn: layer_arn(layer, next),
                code: code.clone(),
                compatible_runtimes: compatible_runtimes.to_vec(),
                description: description.to_string(),
                created_at: now(),
            };
            put_json(&mut table, &version_key(layer, next), &published)?;
            Ok(published)
        })?;
        info!(layer = %layer, version = published.version, "layer version published");
        Ok(layer_ref(&published))
    }

    fn set_alias(
        &self,
        name: &str,
        alias: &str,
        version: &str,
        description: &str,
    ) -> PlatformResult<AliasInfo> {
        if alias.is_empty() || alias.chars().all(|c| c.is_ascii_digit()) {
            return Err(PlatformError::Validation(format!("invalid alias name {alias:?}")));
        }
        let number: u64 = version
            .parse()
            .map_err(|_| PlatformError::Validation(format!("version {version:?} is not numeric")))?;

        let info = self.write(|txn| {
            Self::function_in(txn, name)?;
            {
                let versions = txn.open_table(VERSIONS).map_err(map_err!(Unavailable))?;
                let exists = versions
                    .get(version_key(name, number).as_str())
                    .map_err(map_err!(Unavailable))?
                    .is_some();
                if !exists {
                    return Err(PlatformError::Validation(format!(
                        "function {name} has no version {version}"
                    )));
                }
            }
            let info = AliasInfo {
                function: name.to_string(),
                name: alias.to_string(),
                version: version.to_string(),
                description: description.to_string(),
                updated_at: now(),
            };
            let mut table = txn.open_table(ALIASES).map_err(map_err!(Unavailable))?;
            put_json(&mut table, &alias_key(name, alias), &info)?;
            Ok(info)
        })?;
        info!(function = %name, alias = %alias, version = %version, "alias updated");
        Ok(info)
    }

    fn get_alias(&self, name: &str, alias: &str) -> PlatformResult<Option<AliasInfo>> {
        self.read(ALIASES, &alias_key(name, alias))
    }
}
