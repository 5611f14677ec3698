//! Top-level design container with observer dispatch.

use crate::module::Module;
use crate::monitor::DesignMonitor;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// A complete hardware design: a set of modules plus session state.
///
/// The design owns its modules (keyed by name), a string key/value
/// scratchpad carrying data between passes, and a set of registered
/// [`DesignMonitor`]s notified on every structural mutation that goes
/// through the methods on this type.
///
/// Monitors are held weakly; a monitor that has been dropped is pruned
/// from the set on the next notification.
#[derive(Default)]
pub struct Design {
    modules: BTreeMap<String, Module>,
    scratchpad: BTreeMap<String, String>,
    monitors: Vec<Weak<RefCell<dyn DesignMonitor>>>,
}

impl std::fmt::Debug for Design {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Design")
            .field("modules", &self.modules)
            .field("scratchpad", &self.scratchpad)
            .field("monitors_len", &self.monitors.len())
            .finish()
    }
}

impl Design {
    /// Creates an empty design.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module, replacing any existing module of the same name, and
    /// fires the module-add event.
    pub fn add_module(&mut self, module: Module) {
        let name = module.name.clone();
        self.modules.insert(name.clone(), module);
        let monitors = self.live_monitors();
        if let Some(m) = self.modules.get(&name) {
            for mon in monitors {
                mon.borrow_mut().on_module_add(m);
            }
        }
    }

    /// Removes a module by name, firing the module-delete event.
    ///
    /// Returns the removed module so a caller can reinstate it if a
    /// follow-up operation fails.
    pub fn remove_module(&mut self, name: &str) -> Option<Module> {
        let removed = self.modules.remove(name)?;
        let monitors = self.live_monitors();
        for mon in monitors {
            mon.borrow_mut().on_module_del(&removed);
        }
        Some(removed)
    }

    /// Reconnects one port of a cell, firing the cell-connect event.
    ///
    /// Returns `false` if the module or cell does not exist.
    pub fn connect_cell_port(
        &mut self,
        module: &str,
        cell: &str,
        port: &str,
        signal: &str,
    ) -> bool {
        let monitors = self.live_monitors();
        let Some(m) = self.modules.get_mut(module) else {
            return false;
        };
        let Some(c) = m.cells.get_mut(cell) else {
            return false;
        };
        c.connect(port, signal);
        m.invalidate_content_hash();
        for mon in monitors {
            mon.borrow_mut().on_cell_connect(m, cell, port);
        }
        true
    }

    /// Appends a module-level connection, firing the connect event.
    ///
    /// Returns `false` if the module does not exist.
    pub fn connect(&mut self, module: &str, left: &str, right: &str) -> bool {
        let monitors = self.live_monitors();
        let Some(m) = self.modules.get_mut(module) else {
            return false;
        };
        m.add_connection(left, right);
        for mon in monitors {
            mon.borrow_mut().on_connect(m);
        }
        true
    }

    /// Wholesale-replaces the contents of an existing module, firing the
    /// blackout event.
    ///
    /// Returns `false` if no module with the replacement's name exists.
    pub fn replace_module(&mut self, replacement: Module) -> bool {
        let monitors = self.live_monitors();
        let name = replacement.name.clone();
        let Some(slot) = self.modules.get_mut(&name) else {
            return false;
        };
        *slot = replacement;
        slot.invalidate_content_hash();
        for mon in monitors {
            mon.borrow_mut().on_blackout(slot);
        }
        true
    }

    /// Looks up a module by name.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Looks up a module mutably.
    ///
    /// Mutations made through this reference bypass observer dispatch;
    /// callers are responsible for invalidating the content hash.
    pub fn module_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    /// Iterates over all modules in name order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Returns all module names in sorted order.
    pub fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Returns the number of modules in the design.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Stores a scratchpad value, replacing any previous value.
    pub fn scratchpad_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.scratchpad.insert(key.into(), value.into());
    }

    /// Looks up a scratchpad value.
    pub fn scratchpad_get(&self, key: &str) -> Option<&str> {
        self.scratchpad.get(key).map(String::as_str)
    }

    /// Iterates over all scratchpad entries in key order.
    pub fn scratchpad_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.scratchpad
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Registers a monitor. The design keeps only a weak handle.
    pub fn register_monitor(&mut self, monitor: Weak<RefCell<dyn DesignMonitor>>) {
        self.monitors.push(monitor);
    }

    /// Unregisters a previously registered monitor.
    pub fn unregister_monitor(&mut self, monitor: &Weak<RefCell<dyn DesignMonitor>>) {
        self.monitors.retain(|w| !Weak::ptr_eq(w, monitor));
    }

    /// Returns the number of live registered monitors.
    pub fn monitor_count(&self) -> usize {
        self.monitors.iter().filter(|w| w.strong_count() > 0).count()
    }

    fn live_monitors(&mut self) -> Vec<Rc<RefCell<dyn DesignMonitor>>> {
        self.monitors.retain(|w| w.strong_count() > 0);
        self.monitors.iter().filter_map(Weak::upgrade).collect()
    }
}
