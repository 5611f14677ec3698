//! The change monitor and its attachment handle.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};
use tracing::{debug, info};
use zyphar_common::ContentHash;
use zyphar_ir::{Design, DesignMonitor, Module};

/// Snapshot of the monitor's three change sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    /// Modules added since the last reset.
    pub added: BTreeSet<String>,
    /// Modules deleted since the last reset.
    pub deleted: BTreeSet<String>,
    /// Modules modified in place since the last reset.
    pub modified: BTreeSet<String>,
}

impl ChangeSummary {
    /// Returns `true` if no changes have been recorded.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }
}

/// Reconciles design mutation events into disjoint change sets.
///
/// The three sets are disjoint at every observable point:
/// - adding a previously deleted module moves it to `modified`
///   (re-creation is a logical modification);
/// - deleting a just-added module erases it entirely (transient);
/// - a module is only marked modified if it is not currently `added`.
///
/// Every modification also invalidates the module's cached content hash
/// on the IR side; without that, a modified module would hash identically
/// to its pre-edit state and the driver would wrongly treat it as
/// unchanged.
#[derive(Debug, Default)]
pub struct ChangeMonitor {
    added: BTreeSet<String>,
    deleted: BTreeSet<String>,
    modified: BTreeSet<String>,
    original_hashes: BTreeMap<String, ContentHash>,
}

impl ChangeMonitor {
    fn mark_modified(&mut self, module: &mut Module) {
        if !self.added.contains(&module.name) {
            self.modified.insert(module.name.clone());
        }
        module.invalidate_content_hash();
        debug!("module modified: {}", module.name);
    }

    fn snapshot_hashes(&mut self, design: &Design) {
        self.original_hashes.clear();
        for module in design.modules() {
            self.original_hashes
                .insert(module.name.clone(), module.content_hash());
        }
    }

    fn clear_sets(&mut self) {
        self.added.clear();
        self.deleted.clear();
        self.modified.clear();
    }
}

impl DesignMonitor for ChangeMonitor {
    fn on_module_add(&mut self, module: &Module) {
        if self.deleted.remove(&module.name) {
            self.modified.insert(module.name.clone());
        } else {
            self.added.insert(module.name.clone());
        }
        debug!("module added: {}", module.name);
    }

    fn on_module_del(&mut self, module: &Module) {
        if self.added.remove(&module.name) {
            // Created and destroyed within one window: no net change.
        } else {
            self.deleted.insert(module.name.clone());
            self.modified.remove(&module.name);
        }
        debug!("module deleted: {}", module.name);
    }

    fn on_cell_connect(&mut self, module: &mut Module, _cell: &str, _port: &str) {
        self.mark_modified(module);
    }

    fn on_connect(&mut self, module: &mut Module) {
        self.mark_modified(module);
    }

    fn on_blackout(&mut self, module: &mut Module) {
        self.mark_modified(module);
    }
}

/// Owning handle for a [`ChangeMonitor`] registered on a design.
///
/// The design keeps only a weak reference to the monitor; dropping this
/// handle effectively detaches it. Attachment snapshots every module's
/// content hash as the comparison baseline.
pub struct MonitorHandle {
    inner: Rc<RefCell<ChangeMonitor>>,
    attached: bool,
}

impl Default for MonitorHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorHandle {
    /// Creates a detached monitor.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ChangeMonitor::default())),
            attached: false,
        }
    }

    /// Registers the monitor on a design and snapshots current hashes.
    ///
    /// The change sets are reset so observation starts from a clean
    /// baseline.
    pub fn attach(&mut self, design: &mut Design) {
        design.register_monitor(self.weak());
        {
            let mut monitor = self.inner.borrow_mut();
            monitor.clear_sets();
            monitor.snapshot_hashes(design);
        }
        self.attached = true;
        info!(
            "change monitor attached to design ({} modules)",
            design.module_count()
        );
    }

    /// Deregisters the monitor and clears its state.
    pub fn detach(&mut self, design: &mut Design) {
        design.unregister_monitor(&self.weak());
        let mut monitor = self.inner.borrow_mut();
        monitor.clear_sets();
        monitor.original_hashes.clear();
        self.attached = false;
    }

    /// Returns `true` while the monitor is attached.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Clears the change sets and re-snapshots hashes, making the current
    /// design state the new baseline.
    pub fn reset(&self, design: &Design) {
        let mut monitor = self.inner.borrow_mut();
        monitor.clear_sets();
        if self.attached {
            monitor.snapshot_hashes(design);
        }
    }

    /// Returns `added ∪ modified`. Deleted modules are not dirty.
    pub fn dirty_modules(&self) -> BTreeSet<String> {
        let monitor = self.inner.borrow();
        monitor.added.union(&monitor.modified).cloned().collect()
    }

    /// Returns `true` if any module was added, deleted, or modified.
    pub fn has_changes(&self) -> bool {
        !self.summary().is_empty()
    }

    /// Returns `true` if the named module is added or modified.
    pub fn is_dirty(&self, module_name: &str) -> bool {
        let monitor = self.inner.borrow();
        monitor.added.contains(module_name) || monitor.modified.contains(module_name)
    }

    /// Returns a snapshot of the three change sets.
    pub fn summary(&self) -> ChangeSummary {
        let monitor = self.inner.borrow();
        ChangeSummary {
            added: monitor.added.clone(),
            deleted: monitor.deleted.clone(),
            modified: monitor.modified.clone(),
        }
    }

    /// The hash snapshot taken at attach/reset time.
    pub fn original_hashes(&self) -> BTreeMap<String, ContentHash> {
        self.inner.borrow().original_hashes.clone()
    }

    fn weak(&self) -> Weak<RefCell<dyn DesignMonitor>> {
        let dyn_rc: Rc<RefCell<dyn DesignMonitor>> = self.inner.clone();
        Rc::downgrade(&dyn_rc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zyphar_ir::{Cell, Module, Wire};

    fn make_module(name: &str) -> Module {
        let mut m = Module::new(name);
        m.add_wire(Wire::new("clk", 1));
        let mut c = Cell::new("u0", "$dff");
        c.connect("CLK", "clk");
        m.add_cell(c);
        m
    }

    fn attached_pair() -> (Design, MonitorHandle) {
        let mut design = Design::new();
        design.add_module(make_module("top"));
        let mut handle = MonitorHandle::new();
        handle.attach(&mut design);
        (design, handle)
    }

    fn assert_disjoint(summary: &ChangeSummary) {
        assert!(summary.added.is_disjoint(&summary.deleted));
        assert!(summary.added.is_disjoint(&summary.modified));
        assert!(summary.deleted.is_disjoint(&summary.modified));
    }

    #[test]
    fn attach_snapshots_hashes() {
        let (design, handle) = attached_pair();
        let hashes = handle.original_hashes();
        assert_eq!(hashes.len(), 1);
        assert_eq!(
            hashes["top"],
            design.module("top").unwrap().content_hash()
        );
        assert!(handle.is_attached());
        assert!(!handle.has_changes());
    }

    #[test]
    fn add_is_tracked() {
        let (mut design, handle) = attached_pair();
        design.add_module(make_module("alu"));
        let summary = handle.summary();
        assert_eq!(summary.added, BTreeSet::from(["alu".to_string()]));
        assert_disjoint(&summary);
        assert!(handle.is_dirty("alu"));
    }

    #[test]
    fn delete_is_tracked() {
        let (mut design, handle) = attached_pair();
        design.remove_module("top");
        let summary = handle.summary();
        assert_eq!(summary.deleted, BTreeSet::from(["top".to_string()]));
        assert!(summary.added.is_empty());
        assert_disjoint(&summary);
        // Deleted modules are not dirty.
        assert!(handle.dirty_modules().is_empty());
    }

    #[test]
    fn transient_add_then_delete_cancels() {
        let (mut design, handle) = attached_pair();
        design.add_module(make_module("x"));
        design.remove_module("x");
        assert!(!handle.has_changes());
        // Adding again lands back in `added`.
        design.add_module(make_module("x"));
        let summary = handle.summary();
        assert_eq!(summary.added, BTreeSet::from(["x".to_string()]));
        assert_disjoint(&summary);
    }

    #[test]
    fn readd_after_delete_counts_as_modified() {
        let (mut design, handle) = attached_pair();
        design.remove_module("top");
        design.add_module(make_module("top"));
        let summary = handle.summary();
        assert!(summary.deleted.is_empty());
        assert_eq!(summary.modified, BTreeSet::from(["top".to_string()]));
        assert_disjoint(&summary);
    }

    #[test]
    fn delete_removes_modified_mark() {
        let (mut design, handle) = attached_pair();
        design.connect("top", "a", "b");
        assert!(handle.is_dirty("top"));
        design.remove_module("top");
        let summary = handle.summary();
        assert!(summary.modified.is_empty());
        assert_eq!(summary.deleted, BTreeSet::from(["top".to_string()]));
        assert_disjoint(&summary);
    }

    #[test]
    fn connect_marks_modified() {
        let (mut design, handle) = attached_pair();
        design.connect("top", "x", "y");
        assert_eq!(
            handle.summary().modified,
            BTreeSet::from(["top".to_string()])
        );
    }

    #[test]
    fn cell_connect_marks_modified() {
        let (mut design, handle) = attached_pair();
        design.connect_cell_port("top", "u0", "CLK", "other_clk");
        assert!(handle.is_dirty("top"));
    }

    #[test]
    fn blackout_marks_modified() {
        let (mut design, handle) = attached_pair();
        design.replace_module(make_module("top"));
        assert!(handle.is_dirty("top"));
    }

    #[test]
    fn just_added_module_stays_added_on_modification() {
        let (mut design, handle) = attached_pair();
        design.add_module(make_module("alu"));
        design.connect("alu", "a", "b");
        let summary = handle.summary();
        assert_eq!(summary.added, BTreeSet::from(["alu".to_string()]));
        assert!(summary.modified.is_empty());
        assert_disjoint(&summary);
    }

    #[test]
    fn modification_invalidates_hash_for_recompute() {
        let (mut design, handle) = attached_pair();
        let before = handle.original_hashes()["top"];
        design.connect("top", "a", "b");
        let after = design.module("top").unwrap().content_hash();
        assert_ne!(before, after);
    }

    #[test]
    fn dirty_is_union_of_added_and_modified() {
        let (mut design, handle) = attached_pair();
        design.add_module(make_module("alu"));
        design.connect("top", "a", "b");
        assert_eq!(
            handle.dirty_modules(),
            BTreeSet::from(["alu".to_string(), "top".to_string()])
        );
    }

    #[test]
    fn reset_clears_and_resnapshots() {
        let (mut design, handle) = attached_pair();
        design.connect("top", "a", "b");
        design.add_module(make_module("alu"));
        handle.reset(&design);
        assert!(!handle.has_changes());
        // Baseline now includes the new module.
        assert_eq!(handle.original_hashes().len(), 2);
    }

    #[test]
    fn detach_stops_observation() {
        let (mut design, mut handle) = attached_pair();
        handle.detach(&mut design);
        assert!(!handle.is_attached());
        design.add_module(make_module("alu"));
        assert!(!handle.has_changes());
        assert_eq!(design.monitor_count(), 0);
    }

    #[test]
    fn dropping_handle_detaches() {
        let mut design = Design::new();
        design.add_module(make_module("top"));
        {
            let mut handle = MonitorHandle::new();
            handle.attach(&mut design);
            assert_eq!(design.monitor_count(), 1);
        }
        assert_eq!(design.monitor_count(), 0);
    }
}
