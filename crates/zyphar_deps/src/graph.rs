//! The dependency graph and its JSON codec.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;
use tracing::warn;
use zyphar_ir::Design;

/// Scratchpad key under which the serialized graph is stored on a design.
pub const SCRATCHPAD_KEY: &str = "zyphar.deps.json";

/// Serialized form of the graph.
#[derive(Debug, Serialize, Deserialize)]
struct GraphFile {
    #[serde(default)]
    modules: Vec<GraphModule>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphModule {
    name: String,
    dependencies: Vec<String>,
    dependents: Vec<String>,
}

/// Which-module-instantiates-which graph over a design.
///
/// Holds two exactly inverse adjacency maps: `instantiates` (module to
/// the modules it instantiates) and `instantiated_by`. Cycles are
/// representable; the topological-order routine detects and skips them
/// instead of hanging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    instantiates: BTreeMap<String, BTreeSet<String>>,
    instantiated_by: BTreeMap<String, BTreeSet<String>>,
    all_modules: BTreeSet<String>,
    valid: bool,
}

impl DependencyGraph {
    /// Creates an empty, not-yet-built graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the graph has been built or loaded.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Returns the number of modules in the graph.
    pub fn module_count(&self) -> usize {
        self.all_modules.len()
    }

    /// Returns all module names in the graph.
    pub fn modules(&self) -> &BTreeSet<String> {
        &self.all_modules
    }

    /// Empties the graph and marks it invalid.
    pub fn clear(&mut self) {
        self.instantiates.clear();
        self.instantiated_by.clear();
        self.all_modules.clear();
        self.valid = false;
    }

    /// Rebuilds the graph from a design.
    ///
    /// Every module becomes a node. For every cell whose type names
    /// another module in the design, an edge is recorded in both maps.
    /// Cells with `$`-prefixed types are primitives and skipped; so are
    /// cell types that resolve to no module (unresolved blackboxes).
    pub fn build_from_design(&mut self, design: &Design) {
        self.clear();

        for module in design.modules() {
            self.all_modules.insert(module.name.clone());
            self.instantiates
                .insert(module.name.clone(), BTreeSet::new());
            self.instantiated_by
                .insert(module.name.clone(), BTreeSet::new());
        }

        for module in design.modules() {
            for cell in module.cells.values() {
                if cell.is_primitive() {
                    continue;
                }
                if !self.all_modules.contains(&cell.cell_type) {
                    continue;
                }
                self.instantiates
                    .entry(module.name.clone())
                    .or_default()
                    .insert(cell.cell_type.clone());
                self.instantiated_by
                    .entry(cell.cell_type.clone())
                    .or_default()
                    .insert(module.name.clone());
            }
        }

        self.valid = true;
    }

    /// Modules that directly instantiate `module_name`.
    pub fn direct_dependents(&self, module_name: &str) -> BTreeSet<String> {
        self.instantiated_by
            .get(module_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Modules that `module_name` directly instantiates.
    pub fn direct_dependencies(&self, module_name: &str) -> BTreeSet<String> {
        self.instantiates
            .get(module_name)
            .cloned()
            .unwrap_or_default()
    }

    /// All modules that transitively instantiate `module_name`,
    /// exclusive of `module_name` itself.
    pub fn all_dependents(&self, module_name: &str) -> BTreeSet<String> {
        collect_transitive(&self.instantiated_by, module_name)
    }

    /// All modules that `module_name` transitively instantiates,
    /// exclusive of `module_name` itself.
    pub fn all_dependencies(&self, module_name: &str) -> BTreeSet<String> {
        collect_transitive(&self.instantiates, module_name)
    }

    /// The changed modules plus everything that transitively instantiates
    /// any of them — the conservative re-synthesis set.
    pub fn affected_modules(&self, changed_modules: &BTreeSet<String>) -> BTreeSet<String> {
        let mut affected = changed_modules.clone();
        for module in changed_modules {
            affected.extend(self.all_dependents(module));
        }
        affected
    }

    /// A copy of the full dependents map, for transitive cache
    /// invalidation.
    pub fn dependents_map(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.instantiated_by.clone()
    }

    /// Produces an order in which every module's dependencies precede it.
    ///
    /// Iterative three-color depth-first search (no recursion, so deep
    /// hierarchies cannot overflow the stack). On a back edge a warning
    /// names the module involved and the edge is skipped; under a cycle
    /// the relative order of its members is unspecified but every module
    /// still appears exactly once.
    pub fn topological_order(&self) -> Vec<String> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            OnStack,
            Done,
        }

        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut order: Vec<String> = Vec::new();

        for root in &self.all_modules {
            if marks.contains_key(root.as_str()) {
                continue;
            }
            // Stack frames: (module, children, next child index).
            let mut stack: Vec<(&str, Vec<&str>, usize)> = Vec::new();
            marks.insert(root.as_str(), Mark::OnStack);
            stack.push((root.as_str(), self.children_of(root), 0));

            while let Some(frame) = stack.last_mut() {
                let (name, children, idx) = frame;
                if *idx < children.len() {
                    let child = children[*idx];
                    *idx += 1;
                    match marks.get(child) {
                        Some(Mark::Done) => {}
                        Some(Mark::OnStack) => {
                            warn!("circular dependency detected involving module {child}");
                        }
                        None => {
                            marks.insert(child, Mark::OnStack);
                            stack.push((child, self.children_of(child), 0));
                        }
                    }
                } else {
                    let name = *name;
                    stack.pop();
                    marks.insert(name, Mark::Done);
                    order.push(name.to_string());
                }
            }
        }

        order
    }

    /// [`topological_order`](Self::topological_order) reversed:
    /// dependents first.
    pub fn reverse_topological_order(&self) -> Vec<String> {
        let mut order = self.topological_order();
        order.reverse();
        order
    }

    fn children_of(&self, module_name: &str) -> Vec<&str> {
        self.instantiates
            .get(module_name)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Serializes the graph to the persisted JSON form.
    pub fn to_json(&self) -> String {
        let file = GraphFile {
            modules: self
                .all_modules
                .iter()
                .map(|name| GraphModule {
                    name: name.clone(),
                    dependencies: self
                        .direct_dependencies(name)
                        .into_iter()
                        .collect(),
                    dependents: self.direct_dependents(name).into_iter().collect(),
                })
                .collect(),
        };
        // GraphFile serialization cannot fail: plain strings and vectors.
        serde_json::to_string_pretty(&file).unwrap_or_else(|_| String::from("{}"))
    }

    /// Replaces the graph with the contents of a JSON document.
    ///
    /// A missing `modules` key yields an empty graph. Returns the
    /// resulting validity: `true` iff at least one module was loaded.
    pub fn from_json(&mut self, json: &str) -> bool {
        self.clear();
        let file: GraphFile = match serde_json::from_str(json) {
            Ok(f) => f,
            Err(e) => {
                warn!("failed to parse dependency graph JSON: {e}");
                return false;
            }
        };
        for gm in file.modules {
            if gm.name.is_empty() {
                continue;
            }
            self.all_modules.insert(gm.name.clone());
            self.instantiates
                .insert(gm.name.clone(), gm.dependencies.into_iter().collect());
            self.instantiated_by
                .insert(gm.name, gm.dependents.into_iter().collect());
        }
        self.valid = !self.all_modules.is_empty();
        self.valid
    }

    /// Stores the serialized graph in the design scratchpad.
    pub fn store_in_scratchpad(&self, design: &mut Design) {
        design.scratchpad_set(SCRATCHPAD_KEY, self.to_json());
    }

    /// Loads the graph from the design scratchpad. Returns `false` if no
    /// graph is stored or the stored JSON is unusable.
    pub fn load_from_scratchpad(&mut self, design: &Design) -> bool {
        match design.scratchpad_get(SCRATCHPAD_KEY) {
            Some(json) if !json.is_empty() => self.from_json(json),
            _ => false,
        }
    }

    /// Renders a human-readable listing of the graph plus the topological
    /// order, for the CLI `--show` action.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for module in &self.all_modules {
            writeln!(out, "Module: {module}").unwrap();
            let deps = self.direct_dependencies(module);
            if deps.is_empty() {
                writeln!(out, "  instantiates: (none)").unwrap();
            } else {
                let list: Vec<&str> = deps.iter().map(String::as_str).collect();
                writeln!(out, "  instantiates: {}", list.join(" ")).unwrap();
            }
            let users = self.direct_dependents(module);
            if users.is_empty() {
                writeln!(out, "  instantiated by: (none)").unwrap();
            } else {
                let list: Vec<&str> = users.iter().map(String::as_str).collect();
                writeln!(out, "  instantiated by: {}", list.join(" ")).unwrap();
            }
        }
        writeln!(out, "Topological order: {}", self.topological_order().join(" -> ")).unwrap();
        out
    }
}

/// Breadth-first reachability over one adjacency map, exclusive of the
/// start node. An explicit queue keeps cyclic graphs from recursing
/// forever.
fn collect_transitive(
    graph: &BTreeMap<String, BTreeSet<String>>,
    start: &str,
) -> BTreeSet<String> {
    let mut result = BTreeSet::new();
    let mut worklist: VecDeque<String> = VecDeque::new();

    if let Some(direct) = graph.get(start) {
        for next in direct {
            if result.insert(next.clone()) {
                worklist.push_back(next.clone());
            }
        }
    }

    while let Some(current) = worklist.pop_front() {
        if let Some(nexts) = graph.get(&current) {
            for next in nexts {
                if result.insert(next.clone()) {
                    worklist.push_back(next.clone());
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use zyphar_ir::{Cell, Module};

    /// Builds a design where each `(parent, child)` pair is an
    /// instantiation edge.
    fn design_with_edges(modules: &[&str], edges: &[(&str, &str)]) -> Design {
        let mut design = Design::new();
        for name in modules {
            design.add_module(Module::new(*name));
        }
        for (i, (parent, child)) in edges.iter().enumerate() {
            let m = design.module_mut(parent).unwrap();
            m.add_cell(Cell::new(format!("u{i}"), *child));
        }
        design
    }

    fn build(modules: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let design = design_with_edges(modules, edges);
        let mut graph = DependencyGraph::new();
        graph.build_from_design(&design);
        graph
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn build_collects_all_modules() {
        let graph = build(&["top", "alu", "regs"], &[("top", "alu"), ("top", "regs")]);
        assert!(graph.is_valid());
        assert_eq!(graph.module_count(), 3);
    }

    #[test]
    fn primitives_are_skipped() {
        let mut design = design_with_edges(&["top"], &[]);
        design
            .module_mut("top")
            .unwrap()
            .add_cell(Cell::new("a0", "$add"));
        let mut graph = DependencyGraph::new();
        graph.build_from_design(&design);
        assert!(graph.direct_dependencies("top").is_empty());
    }

    #[test]
    fn unresolved_cell_types_are_skipped() {
        let graph = build(&["top"], &[("top", "external_blackbox")]);
        assert!(graph.direct_dependencies("top").is_empty());
    }

    #[test]
    fn maps_are_exact_inverses() {
        let graph = build(
            &["top", "alu", "regs", "bit"],
            &[("top", "alu"), ("top", "regs"), ("alu", "bit")],
        );
        for module in graph.modules() {
            for dep in graph.direct_dependencies(module) {
                assert!(
                    graph.direct_dependents(&dep).contains(module),
                    "edge {module}->{dep} missing inverse"
                );
            }
            for user in graph.direct_dependents(module) {
                assert!(
                    graph.direct_dependencies(&user).contains(module),
                    "edge {user}->{module} missing forward"
                );
            }
        }
    }

    #[test]
    fn transitive_dependents() {
        let graph = build(
            &["top", "mid", "leaf"],
            &[("top", "mid"), ("mid", "leaf")],
        );
        assert_eq!(graph.all_dependents("leaf"), set(&["mid", "top"]));
        assert_eq!(graph.all_dependents("top"), set(&[]));
    }

    #[test]
    fn transitive_dependencies() {
        let graph = build(
            &["top", "mid", "leaf"],
            &[("top", "mid"), ("mid", "leaf")],
        );
        assert_eq!(graph.all_dependencies("top"), set(&["leaf", "mid"]));
        assert_eq!(graph.all_dependencies("leaf"), set(&[]));
    }

    #[test]
    fn transitive_query_excludes_start() {
        let graph = build(&["a", "b"], &[("a", "b"), ("b", "a")]);
        assert!(!graph.all_dependents("a").contains("a"));
    }

    #[test]
    fn affected_modules_includes_changed_set() {
        let graph = build(
            &["top", "mid", "leaf", "other"],
            &[("top", "mid"), ("mid", "leaf")],
        );
        let affected = graph.affected_modules(&set(&["leaf"]));
        assert_eq!(affected, set(&["leaf", "mid", "top"]));
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let graph = build(
            &["top", "alu", "regs", "bit"],
            &[("top", "alu"), ("top", "regs"), ("alu", "bit")],
        );
        let order = graph.topological_order();
        assert_eq!(order.len(), 4);
        let pos = |name: &str| order.iter().position(|m| m == name).unwrap();
        assert!(pos("bit") < pos("alu"));
        assert!(pos("alu") < pos("top"));
        assert!(pos("regs") < pos("top"));
    }

    #[test]
    fn reverse_topological_order_is_reversed() {
        let graph = build(&["top", "alu"], &[("top", "alu")]);
        let mut fwd = graph.topological_order();
        fwd.reverse();
        assert_eq!(fwd, graph.reverse_topological_order());
    }

    #[test]
    fn cycle_terminates_and_emits_all_modules() {
        let graph = build(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let order = graph.topological_order();
        assert_eq!(order.len(), 2);
        assert!(order.contains(&"a".to_string()));
        assert!(order.contains(&"b".to_string()));
    }

    #[test]
    fn self_loop_terminates() {
        let graph = build(&["a"], &[("a", "a")]);
        let order = graph.topological_order();
        assert_eq!(order, vec!["a".to_string()]);
    }

    #[test]
    fn json_roundtrip() {
        let graph = build(
            &["top", "alu", "regs"],
            &[("top", "alu"), ("top", "regs")],
        );
        let json = graph.to_json();
        let mut back = DependencyGraph::new();
        assert!(back.from_json(&json));
        assert_eq!(back, graph);
    }

    #[test]
    fn json_shape() {
        let graph = build(&["top", "alu"], &[("top", "alu")]);
        let json = graph.to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let modules = value["modules"].as_array().unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0]["name"], "alu");
        assert_eq!(modules[0]["dependents"][0], "top");
        assert_eq!(modules[1]["name"], "top");
        assert_eq!(modules[1]["dependencies"][0], "alu");
    }

    #[test]
    fn from_json_missing_modules_key_yields_empty_graph() {
        let mut graph = DependencyGraph::new();
        assert!(!graph.from_json("{}"));
        assert_eq!(graph.module_count(), 0);
        assert!(!graph.is_valid());
    }

    #[test]
    fn from_json_garbage_yields_empty_graph() {
        let mut graph = DependencyGraph::new();
        assert!(!graph.from_json("not json at all"));
        assert!(!graph.is_valid());
    }

    #[test]
    fn scratchpad_roundtrip() {
        let mut design = design_with_edges(&["top", "alu"], &[("top", "alu")]);
        let mut graph = DependencyGraph::new();
        graph.build_from_design(&design);
        graph.store_in_scratchpad(&mut design);

        let mut loaded = DependencyGraph::new();
        assert!(loaded.load_from_scratchpad(&design));
        assert_eq!(loaded, graph);
    }

    #[test]
    fn scratchpad_load_without_stored_graph_fails() {
        let design = Design::new();
        let mut graph = DependencyGraph::new();
        assert!(!graph.load_from_scratchpad(&design));
    }

    #[test]
    fn render_lists_edges_and_order() {
        let graph = build(&["top", "alu"], &[("top", "alu")]);
        let text = graph.render();
        assert!(text.contains("Module: top"));
        assert!(text.contains("instantiates: alu"));
        assert!(text.contains("instantiated by: top"));
        assert!(text.contains("Topological order: alu -> top"));
    }
}
