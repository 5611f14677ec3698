//! Incremental synthesis driver.
//!
//! Orchestrates one re-synthesis round: resolve the hierarchy, hash every
//! module, split cache hits from misses, optionally widen the miss set by
//! conservative dependency invalidation, restore the hits, synthesize the
//! misses, and write fresh entries back. Also provides a polling watch
//! loop that re-runs the driver whenever a watched source file changes.

#![warn(missing_docs)]

mod driver;
mod error;
mod passes;
mod watch;

pub use driver::{run_incremental, SynthOptions, SynthReport, PASS_SEQ};
pub use error::DriverError;
pub use passes::BuiltinPassRunner;
pub use watch::{WatchLoop, WatchOptions};
