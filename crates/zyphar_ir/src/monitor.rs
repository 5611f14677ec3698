//! Observer contract for design mutations.

use crate::module::Module;

/// Callbacks fired by a [`Design`](crate::Design) when its contents change.
///
/// A design holds a set of registered monitors and notifies them in
/// registration order. Mutating callbacks receive the affected module
/// mutably so an observer can invalidate its cached content hash.
///
/// All methods default to no-ops so an implementation only overrides the
/// events it cares about.
pub trait DesignMonitor {
    /// A module was added to the design.
    fn on_module_add(&mut self, module: &Module) {
        let _ = module;
    }

    /// A module was removed from the design.
    fn on_module_del(&mut self, module: &Module) {
        let _ = module;
    }

    /// A cell port inside `module` was reconnected.
    fn on_cell_connect(&mut self, module: &mut Module, cell: &str, port: &str) {
        let _ = (module, cell, port);
    }

    /// A module-level connection was added or the connection list changed.
    fn on_connect(&mut self, module: &mut Module) {
        let _ = module;
    }

    /// The module is being wholesale replaced.
    fn on_blackout(&mut self, module: &mut Module) {
        let _ = module;
    }
}
