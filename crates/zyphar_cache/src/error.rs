//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Most cache operations are fail-safe and surface problems as warnings
/// plus a `false`/`None` return. This enum is used where an error value
/// is propagated internally (key construction, persistence).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A module name or pass-sequence tag contained the `|` key separator.
    #[error("invalid cache key component: {reason}")]
    InvalidKey {
        /// Description of the offending component.
        reason: String,
    },

    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The cache index could not be serialized.
    #[error("cache index serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}
