//! Module dependency graph for incremental re-synthesis.
//!
//! The graph records which modules instantiate which (and the inverse),
//! supports transitive closures in both directions, produces a
//! cycle-tolerant topological order, and round-trips through JSON for
//! reuse between runs via the design scratchpad.

#![warn(missing_docs)]

mod graph;

pub use graph::{DependencyGraph, SCRATCHPAD_KEY};
