//! Module definitions — the unit of caching and re-synthesis.
//!
//! A [`Module`] contains ports, wires, cells, and module-level connections.
//! Its content hash is computed lazily over all of that structure and
//! cached until a mutation invalidates it.

use crate::cell::{Cell, Wire};
use std::cell::Cell as StdCell;
use std::collections::BTreeMap;
use zyphar_common::ContentHash;

/// A single hardware module.
///
/// Modules form a hierarchy through cells whose type names another module.
/// The content hash covers ports, wires, cells, and connections; it is
/// cached on first computation and must be invalidated whenever the module
/// is mutated outside the methods on this type.
#[derive(Debug, Clone)]
pub struct Module {
    /// The module name, unique within its design.
    pub name: String,
    /// External port names (each must also exist as a wire).
    pub ports: Vec<String>,
    /// Wires, keyed by name.
    pub wires: BTreeMap<String, Wire>,
    /// Cells, keyed by instance name.
    pub cells: BTreeMap<String, Cell>,
    /// Module-level connections (left side driven by right side).
    pub connections: Vec<(String, String)>,
    hash_cache: StdCell<Option<ContentHash>>,
}

impl Module {
    /// Creates an empty module with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
            wires: BTreeMap::new(),
            cells: BTreeMap::new(),
            connections: Vec::new(),
            hash_cache: StdCell::new(None),
        }
    }

    /// Declares a port. The corresponding wire must be added separately.
    pub fn add_port(&mut self, name: impl Into<String>) {
        self.ports.push(name.into());
        self.invalidate_content_hash();
    }

    /// Adds a wire, replacing any existing wire of the same name.
    pub fn add_wire(&mut self, wire: Wire) {
        self.wires.insert(wire.name.clone(), wire);
        self.invalidate_content_hash();
    }

    /// Adds a cell, replacing any existing cell of the same name.
    pub fn add_cell(&mut self, cell: Cell) {
        self.cells.insert(cell.name.clone(), cell);
        self.invalidate_content_hash();
    }

    /// Removes a wire by name.
    pub fn remove_wire(&mut self, name: &str) -> Option<Wire> {
        let removed = self.wires.remove(name);
        if removed.is_some() {
            self.invalidate_content_hash();
        }
        removed
    }

    /// Removes a cell by name.
    pub fn remove_cell(&mut self, name: &str) -> Option<Cell> {
        let removed = self.cells.remove(name);
        if removed.is_some() {
            self.invalidate_content_hash();
        }
        removed
    }

    /// Appends a module-level connection.
    pub fn add_connection(&mut self, left: impl Into<String>, right: impl Into<String>) {
        self.connections.push((left.into(), right.into()));
        self.invalidate_content_hash();
    }

    /// Returns the structural content hash, computing and caching it if
    /// necessary.
    ///
    /// The hash covers ports, wires, cells (type and connections), and
    /// module-level connections. The module name is deliberately excluded
    /// so that renaming alone does not force re-synthesis; the cache key
    /// carries the name separately.
    pub fn content_hash(&self) -> ContentHash {
        if let Some(h) = self.hash_cache.get() {
            return h;
        }
        let mut buf = Vec::new();
        for port in &self.ports {
            buf.extend_from_slice(b"port ");
            buf.extend_from_slice(port.as_bytes());
            buf.push(b'\n');
        }
        for wire in self.wires.values() {
            buf.extend_from_slice(b"wire ");
            buf.extend_from_slice(wire.name.as_bytes());
            buf.push(b' ');
            buf.extend_from_slice(&wire.width.to_le_bytes());
            buf.push(b'\n');
        }
        for cell in self.cells.values() {
            buf.extend_from_slice(b"cell ");
            buf.extend_from_slice(cell.name.as_bytes());
            buf.push(b' ');
            buf.extend_from_slice(cell.cell_type.as_bytes());
            buf.push(b'\n');
            for (port, sig) in &cell.connections {
                buf.extend_from_slice(port.as_bytes());
                buf.push(b'=');
                buf.extend_from_slice(sig.as_bytes());
                buf.push(b'\n');
            }
        }
        for (left, right) in &self.connections {
            buf.extend_from_slice(left.as_bytes());
            buf.push(b'~');
            buf.extend_from_slice(right.as_bytes());
            buf.push(b'\n');
        }
        let h = ContentHash::from_bytes(&buf);
        self.hash_cache.set(Some(h));
        h
    }

    /// Discards the cached content hash so the next call to
    /// [`content_hash`](Self::content_hash) recomputes it.
    pub fn invalidate_content_hash(&self) {
        self.hash_cache.set(None);
    }

    /// Returns `true` if the module's current content hash equals `h`.
    pub fn content_matches(&self, h: ContentHash) -> bool {
        self.content_hash() == h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_adder() -> Module {
        let mut m = Module::new("adder");
        m.add_port("a");
        m.add_port("b");
        m.add_port("sum");
        m.add_wire(Wire::new("a", 8));
        m.add_wire(Wire::new("b", 8));
        m.add_wire(Wire::new("sum", 8));
        let mut c = Cell::new("add0", "$add");
        c.connect("A", "a");
        c.connect("B", "b");
        c.connect("Y", "sum");
        m.add_cell(c);
        m
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let m = make_adder();
        assert_eq!(m.content_hash(), m.content_hash());
    }

    #[test]
    fn hash_survives_clone() {
        let m = make_adder();
        let m2 = m.clone();
        assert_eq!(m.content_hash(), m2.content_hash());
    }

    #[test]
    fn mutation_changes_hash() {
        let mut m = make_adder();
        let before = m.content_hash();
        m.add_wire(Wire::new("carry", 1));
        assert_ne!(before, m.content_hash());
    }

    #[test]
    fn rename_does_not_change_hash() {
        let m = make_adder();
        let before = m.content_hash();
        let mut m2 = m.clone();
        m2.name = "adder_v2".to_string();
        assert_eq!(before, m2.content_hash());
    }

    #[test]
    fn invalidate_forces_recompute() {
        let m = make_adder();
        let before = m.content_hash();
        m.invalidate_content_hash();
        assert_eq!(before, m.content_hash());
    }

    #[test]
    fn content_matches() {
        let m = make_adder();
        let h = m.content_hash();
        assert!(m.content_matches(h));
        assert!(!m.content_matches(ContentHash(h.as_u64().wrapping_add(1))));
    }

    #[test]
    fn connection_order_matters() {
        let mut a = Module::new("m");
        a.add_connection("x", "y");
        a.add_connection("p", "q");
        let mut b = Module::new("m");
        b.add_connection("p", "q");
        b.add_connection("x", "y");
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
