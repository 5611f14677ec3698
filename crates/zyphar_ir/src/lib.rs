//! In-memory hardware IR for the Zyphar incremental synthesis accelerator.
//!
//! This crate provides the design/module/cell data model the incremental
//! engine operates on, the observer contract used by the change monitor,
//! a line-oriented textual codec for persisting individual modules, and
//! the pass-runner contract through which synthesis passes are invoked.
//!
//! Modules are identified by name. A cell whose type starts with `$` is a
//! primitive; any other cell type is expected to name another module in
//! the design, which is how the hierarchy is expressed.

#![warn(missing_docs)]

mod cell;
mod design;
mod error;
mod module;
mod monitor;
mod pass;
pub mod text;

pub use cell::{Cell, Wire};
pub use design::Design;
pub use error::IrError;
pub use module::Module;
pub use monitor::DesignMonitor;
pub use pass::{PassError, PassRunner};
