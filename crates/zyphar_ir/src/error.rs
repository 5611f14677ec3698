//! Error types for IR parsing and file I/O.

use std::path::PathBuf;

/// Errors produced by the textual IR codec.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// The input text could not be parsed.
    #[error("IR parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number of the offending line.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// An I/O error occurred while reading or writing IR text.
    #[error("IR I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
