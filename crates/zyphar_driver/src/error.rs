//! Driver error types.

use zyphar_ir::PassError;

/// Errors that abort a driver invocation.
///
/// Per the propagation policy, the driver only escalates when hierarchy
/// resolution itself fails; everything else is a warning plus a degraded
/// result.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The external hierarchy pass failed.
    #[error("hierarchy resolution failed: {source}")]
    Hierarchy {
        /// The underlying pass failure.
        #[source]
        source: PassError,
    },

    /// The watch loop was started without any files to watch.
    #[error("no files specified to watch")]
    NoWatchFiles,
}
