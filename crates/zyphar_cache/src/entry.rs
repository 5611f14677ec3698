//! Cache entry model and the persisted index schema.

use serde::{Deserialize, Serialize};
use zyphar_common::ContentHash;

/// One cached module version.
///
/// Uniquely identified by `(module_name, content_hash, pass_sequence)`.
/// The body is the textual-IR dump of the module; it may be empty on an
/// entry loaded from an index whose body file was missing, in which case
/// a later restore fails and forces re-synthesis.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Name of the cached module.
    pub module_name: String,
    /// Content hash of the module's pre-synthesis structure.
    pub content_hash: ContentHash,
    /// Pipeline-stage tag this body represents (e.g. `post_hierarchy`).
    pub pass_sequence: String,
    /// Serialized module text; empty until loaded when restored lazily.
    pub body: String,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: u64,
    /// Number of successful lookups. Reset only by eviction.
    pub hit_count: u64,
}

/// On-disk index file schema (`index.json`, version 1).
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IndexFile {
    pub version: u32,
    pub entries: Vec<IndexEntry>,
}

/// One entry in the persisted index. Bodies live in separate files.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IndexEntry {
    pub key: String,
    pub module_name: String,
    pub hash: ContentHash,
    pub pass_seq: String,
    pub timestamp: u64,
    pub hits: u64,
}
