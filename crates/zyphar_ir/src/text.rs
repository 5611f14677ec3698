//! Line-oriented textual IR codec.
//!
//! This is the persistence format for designs and for individual cached
//! module bodies. The format is deliberately simple: one directive per
//! line, two-space indentation for readability (ignored on parse), `#`
//! comments, and quoted scratchpad values.
//!
//! ```text
//! zyphar-ir 1
//! scratchpad zyphar.deps.json "{...}"
//! module top
//!   port clk
//!   wire width 1 clk
//!   cell alu u0
//!     connect clk clk
//!   end
//!   connect a b
//! end
//! ```
//!
//! [`dump_module`] emits a single module block with no header, which is
//! the byte form stored in cache bodies. A leading `autoidx <n>` line is
//! accepted and ignored so restored bodies can carry the restore header.
//!
//! Signal expressions and names must be single whitespace-free tokens.

use crate::cell::{Cell, Wire};
use crate::design::Design;
use crate::error::IrError;
use crate::module::Module;
use std::fmt::Write as _;
use std::path::Path;

/// Magic first line of a full design dump.
const HEADER: &str = "zyphar-ir 1";

/// Serializes a single module to its textual form.
///
/// The output is deterministic: ports in declaration order, wires and
/// cells in name order, connections in insertion order. Identical modules
/// always produce identical bytes.
pub fn dump_module(module: &Module) -> String {
    let mut out = String::new();
    writeln!(out, "module {}", module.name).unwrap();
    for port in &module.ports {
        writeln!(out, "  port {port}").unwrap();
    }
    for wire in module.wires.values() {
        writeln!(out, "  wire width {} {}", wire.width, wire.name).unwrap();
    }
    for cell in module.cells.values() {
        writeln!(out, "  cell {} {}", cell.cell_type, cell.name).unwrap();
        for (port, sig) in &cell.connections {
            writeln!(out, "    connect {port} {sig}").unwrap();
        }
        writeln!(out, "  end").unwrap();
    }
    for (left, right) in &module.connections {
        writeln!(out, "  connect {left} {right}").unwrap();
    }
    writeln!(out, "end").unwrap();
    out
}

/// Serializes a full design: header, scratchpad entries, then all modules
/// in name order.
pub fn dump_design(design: &Design) -> String {
    let mut out = String::new();
    writeln!(out, "{HEADER}").unwrap();
    for (key, value) in design.scratchpad_entries() {
        writeln!(out, "scratchpad {key} \"{}\"", escape(value)).unwrap();
    }
    for module in design.modules() {
        out.push_str(&dump_module(module));
    }
    out
}

/// Parses textual IR into a fresh design.
pub fn parse_design(input: &str) -> Result<Design, IrError> {
    let mut design = Design::new();
    parse_into(input, &mut design)?;
    Ok(design)
}

/// Parses textual IR into an existing design.
///
/// Modules are added through [`Design::add_module`], so registered
/// monitors observe each addition; an already-present module of the same
/// name is replaced. Scratchpad entries are merged in. Returns the number
/// of modules parsed.
pub fn parse_into(input: &str, design: &mut Design) -> Result<usize, IrError> {
    let mut modules: Vec<Module> = Vec::new();
    let mut scratchpad: Vec<(String, String)> = Vec::new();
    let mut current: Option<Module> = None;
    let mut current_cell: Option<Cell> = None;

    for (idx, raw) in input.lines().enumerate() {
        let line = idx + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let mut tokens = text.split_whitespace();
        let directive = tokens.next().unwrap_or("");
        match directive {
            "zyphar-ir" | "autoidx" => {
                // Version / index headers carry no structure.
            }
            "scratchpad" => {
                if current.is_some() {
                    return Err(err(line, "scratchpad entry inside module block"));
                }
                let key = tokens
                    .next()
                    .ok_or_else(|| err(line, "scratchpad entry missing key"))?
                    .to_string();
                let rest = text
                    .splitn(3, char::is_whitespace)
                    .nth(2)
                    .ok_or_else(|| err(line, "scratchpad entry missing value"))?;
                scratchpad.push((key, unquote(rest, line)?));
            }
            "module" => {
                if current.is_some() {
                    return Err(err(line, "nested module block"));
                }
                let name = tokens
                    .next()
                    .ok_or_else(|| err(line, "module directive missing name"))?;
                current = Some(Module::new(name));
            }
            "port" => {
                let module = current
                    .as_mut()
                    .ok_or_else(|| err(line, "port directive outside module"))?;
                let name = tokens
                    .next()
                    .ok_or_else(|| err(line, "port directive missing name"))?;
                module.add_port(name);
            }
            "wire" => {
                let module = current
                    .as_mut()
                    .ok_or_else(|| err(line, "wire directive outside module"))?;
                match (tokens.next(), tokens.next(), tokens.next()) {
                    (Some("width"), Some(w), Some(name)) => {
                        let width: u32 = w
                            .parse()
                            .map_err(|_| err(line, format!("invalid wire width `{w}`")))?;
                        module.add_wire(Wire::new(name, width));
                    }
                    _ => return Err(err(line, "expected `wire width <n> <name>`")),
                }
            }
            "cell" => {
                if current.is_none() {
                    return Err(err(line, "cell directive outside module"));
                }
                if current_cell.is_some() {
                    return Err(err(line, "nested cell block"));
                }
                let cell_type = tokens
                    .next()
                    .ok_or_else(|| err(line, "cell directive missing type"))?;
                let name = tokens
                    .next()
                    .ok_or_else(|| err(line, "cell directive missing name"))?;
                current_cell = Some(Cell::new(name, cell_type));
            }
            "connect" => {
                let (a, b) = match (tokens.next(), tokens.next()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(err(line, "expected `connect <a> <b>`")),
                };
                if let Some(cell) = current_cell.as_mut() {
                    cell.connect(a, b);
                } else if let Some(module) = current.as_mut() {
                    module.add_connection(a, b);
                } else {
                    return Err(err(line, "connect directive outside module"));
                }
            }
            "end" => {
                if let Some(cell) = current_cell.take() {
                    match current.as_mut() {
                        Some(module) => module.add_cell(cell),
                        None => return Err(err(line, "cell block outside module")),
                    }
                } else if let Some(module) = current.take() {
                    modules.push(module);
                } else {
                    return Err(err(line, "unmatched `end`"));
                }
            }
            other => {
                return Err(err(line, format!("unknown directive `{other}`")));
            }
        }
    }

    if current_cell.is_some() || current.is_some() {
        return Err(err(
            input.lines().count(),
            "unexpected end of input inside open block",
        ));
    }

    for (key, value) in scratchpad {
        design.scratchpad_set(key, value);
    }
    let count = modules.len();
    for module in modules {
        design.add_module(module);
    }
    Ok(count)
}

/// Reads and parses a textual IR file into an existing design.
pub fn parse_file_into(path: &Path, design: &mut Design) -> Result<usize, IrError> {
    let input = std::fs::read_to_string(path).map_err(|e| IrError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_into(&input, design)
}

/// Writes a full design dump to a file.
pub fn write_design_file(design: &Design, path: &Path) -> Result<(), IrError> {
    std::fs::write(path, dump_design(design)).map_err(|e| IrError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn err(line: usize, message: impl Into<String>) -> IrError {
    IrError::Parse {
        line,
        message: message.into(),
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

fn unquote(raw: &str, line: usize) -> Result<String, IrError> {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| err(line, "scratchpad value must be double-quoted"))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some(other) => return Err(err(line, format!("invalid escape `\\{other}`"))),
            None => return Err(err(line, "dangling escape at end of value")),
        }
    }
    Ok(out)
}
