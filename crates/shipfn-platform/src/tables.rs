//! redb table definitions for the local platform.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized types).
//! Version numbers inside keys are zero-padded so lexical order is numeric.

use redb::TableDefinition;

/// Function metadata keyed by `{function}`.
pub const FUNCTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("functions");

/// Published function versions keyed by `{function}:{version:010}`.
pub const VERSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("versions");

/// Layer versions keyed by `{layer}:{version:010}`.
pub const LAYERS: TableDefinition<&str, &[u8]> = TableDefinition::new("layers");

/// Aliases keyed by `{function}:{alias}`.
pub const ALIASES: TableDefinition<&str, &[u8]> = TableDefinition::new("aliases");

/// Tag maps keyed by `{function}`.
pub const TAGS: TableDefinition<&str, &[u8]> = TableDefinition::new("tags");

pub fn version_key(parent: &str, version: u64) -> String {
    format!("{parent}:{version:010}")
}

pub fn alias_key(function: &str, alias: &str) -> String {
    format!("{function}:{alias}")
}
