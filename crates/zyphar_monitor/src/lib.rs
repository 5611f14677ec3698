//! Design change tracking for incremental re-synthesis.
//!
//! A [`ChangeMonitor`] observes a design through the IR's observer
//! contract and reconciles the event stream into three disjoint sets:
//! added, deleted, and modified modules. A module created and destroyed
//! within one observation window cancels out; a module re-created after
//! deletion counts as modified. The dirty set handed to the driver is
//! `added ∪ modified` — deleted modules are gone, not dirty.

#![warn(missing_docs)]

mod monitor;

pub use monitor::{ChangeMonitor, ChangeSummary, MonitorHandle};
