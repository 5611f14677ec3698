//! Persistent per-module content cache for incremental re-synthesis.
//!
//! The cache stores post-synthesis module bodies keyed by
//! `(module_name, content_hash, pass_sequence)`. Storage is two-tier: an
//! in-memory index plus body map, persisted as a JSON index file and one
//! raw textual-IR body file per entry. Entries are bounded by count, total
//! body bytes, and age, with a least-used-then-oldest eviction policy.
//!
//! All reads are fail-safe: a corrupt index, a missing body file, or an
//! unparseable body results in a cache miss (forcing re-synthesis), never
//! a hard error.

#![warn(missing_docs)]

mod cache;
mod entry;
mod error;
pub mod key;

pub use cache::{CacheConfig, CacheStats, ModuleCache};
pub use entry::CacheEntry;
pub use error::CacheError;
