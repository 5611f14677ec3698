//! Built-in synthesis passes.
//!
//! A minimal, self-contained implementation of the pass commands the
//! driver issues: `hierarchy`, `proc`, `opt`, and `techmap`. The point is
//! not synthesis quality — it is that the driver's orchestration is
//! executable end to end, with each pass honoring a trailing selection of
//! module names so misses can be synthesized without touching cache hits.
//!
//! An embedding toolchain with its own pass infrastructure supplies its
//! own [`PassRunner`] instead.

use std::collections::BTreeSet;
use tracing::debug;
use zyphar_ir::{Design, PassError, PassRunner};

/// Generic combinational cell types rewritten by `techmap`.
const GENERIC_COMB_CELLS: &[&str] = &[
    "$add", "$sub", "$mul", "$shl", "$shr", "$eq", "$mux", "$and", "$or", "$xor", "$not",
];

/// The built-in pass runner.
///
/// Supported commands:
/// - `hierarchy [-check] [-top <module>]` — verifies that every
///   non-primitive cell type resolves to a module; with `-top`, prunes
///   modules unreachable from the top.
/// - `proc` — a no-op: this IR carries no behavioral processes.
/// - `opt [-full] [<modules…>]` — sweeps wires referenced by nothing.
/// - `techmap [<modules…>]` — maps generic combinational cells to `$lut`.
#[derive(Debug, Default)]
pub struct BuiltinPassRunner;

impl BuiltinPassRunner {
    /// Creates the runner.
    pub fn new() -> Self {
        Self
    }
}

impl PassRunner for BuiltinPassRunner {
    fn call(&mut self, design: &mut Design, command: &str) -> Result<(), PassError> {
        let mut tokens = command.split_whitespace();
        let name = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();
        match name {
            "hierarchy" => run_hierarchy(design, &args),
            "proc" => Ok(()),
            "opt" => {
                run_opt(design, &selection(&args));
                Ok(())
            }
            "techmap" => {
                run_techmap(design, &selection(&args));
                Ok(())
            }
            other => Err(PassError::UnknownPass {
                name: other.to_string(),
            }),
        }
    }
}

/// Module names named in a command, after the flags.
fn selection(args: &[&str]) -> Vec<String> {
    args.iter()
        .filter(|a| !a.starts_with('-'))
        .map(|a| a.to_string())
        .collect()
}

/// Resolves a selection to concrete module names; empty means all.
fn selected_modules(design: &Design, sel: &[String]) -> Vec<String> {
    if sel.is_empty() {
        design.module_names()
    } else {
        sel.iter()
            .filter(|name| design.module(name).is_some())
            .cloned()
            .collect()
    }
}

fn run_hierarchy(design: &mut Design, args: &[&str]) -> Result<(), PassError> {
    let mut check = false;
    let mut top: Option<String> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match *arg {
            "-check" => check = true,
            "-top" => {
                top = iter.next().map(|s| s.to_string());
                if top.is_none() {
                    return Err(PassError::Failed {
                        name: "hierarchy".to_string(),
                        reason: "-top requires a module name".to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    if check {
        for module in design.modules() {
            for cell in module.cells.values() {
                if cell.is_primitive() {
                    continue;
                }
                if design.module(&cell.cell_type).is_none() {
                    return Err(PassError::Failed {
                        name: "hierarchy".to_string(),
                        reason: format!(
                            "module `{}` instantiates unknown module `{}`",
                            module.name, cell.cell_type
                        ),
                    });
                }
            }
        }
    }

    if let Some(top_name) = top {
        if design.module(&top_name).is_none() {
            return Err(PassError::Failed {
                name: "hierarchy".to_string(),
                reason: format!("top module `{top_name}` not found"),
            });
        }
        prune_unreachable(design, &top_name);
    }

    Ok(())
}

/// Removes modules not reachable from `top` through instantiation.
fn prune_unreachable(design: &mut Design, top: &str) {
    let mut reachable: BTreeSet<String> = BTreeSet::new();
    let mut worklist = vec![top.to_string()];
    while let Some(name) = worklist.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(module) = design.module(&name) {
            for cell in module.cells.values() {
                if !cell.is_primitive() && design.module(&cell.cell_type).is_some() {
                    worklist.push(cell.cell_type.clone());
                }
            }
        }
    }
    for name in design.module_names() {
        if !reachable.contains(&name) {
            debug!("hierarchy: pruning unreachable module {name}");
            design.remove_module(&name);
        }
    }
}

/// Dead-wire sweep: removes wires that are neither ports nor referenced
/// by any cell connection or module-level connection.
fn run_opt(design: &mut Design, sel: &[String]) {
    for name in selected_modules(design, sel) {
        let Some(module) = design.module_mut(&name) else {
            continue;
        };
        let mut used: BTreeSet<String> = module.ports.iter().cloned().collect();
        for cell in module.cells.values() {
            used.extend(cell.connections.values().cloned());
        }
        for (left, right) in &module.connections {
            used.insert(left.clone());
            used.insert(right.clone());
        }
        let dead: Vec<String> = module
            .wires
            .keys()
            .filter(|w| !used.contains(*w))
            .cloned()
            .collect();
        for wire in &dead {
            module.remove_wire(wire);
        }
        if !dead.is_empty() {
            debug!("opt: removed {} dead wires in {name}", dead.len());
        }
    }
}

/// Maps generic combinational cells to `$lut` primitives, leaving
/// sequential cells and module instances untouched.
fn run_techmap(design: &mut Design, sel: &[String]) {
    for name in selected_modules(design, sel) {
        let Some(module) = design.module_mut(&name) else {
            continue;
        };
        let mut mapped = 0usize;
        for cell in module.cells.values_mut() {
            if GENERIC_COMB_CELLS.contains(&cell.cell_type.as_str()) {
                cell.cell_type = "$lut".to_string();
                mapped += 1;
            }
        }
        if mapped > 0 {
            module.invalidate_content_hash();
            debug!("techmap: mapped {mapped} cells in {name}");
        }
    }
}
