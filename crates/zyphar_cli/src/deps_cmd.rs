//! `zyphar deps` — dependency-graph build, query, and persistence.

use std::collections::BTreeSet;

use crate::{load_design, save_design, DepsArgs, GlobalArgs};
use zyphar_deps::DependencyGraph;
use zyphar_ir::Design;

/// Runs the deps command. With no action flags, builds the graph and
/// shows it.
pub fn run(args: &DepsArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let no_action = !(args.build || args.show || args.json || args.order || args.store
        || args.load)
        && args.affected.is_none();
    let do_build = args.build || no_action;
    let do_show = args.show || no_action;

    let mut design = match &args.design {
        Some(path) => load_design(path)?,
        None => Design::new(),
    };

    let mut graph = DependencyGraph::new();

    if args.load {
        if graph.load_from_scratchpad(&design) {
            println!("loaded graph with {} modules", graph.module_count());
        } else {
            eprintln!("warning: no dependency graph found in scratchpad");
        }
    }

    if do_build {
        graph.build_from_design(&design);
        println!("built graph with {} modules", graph.module_count());
    }

    if !graph.is_valid() {
        eprintln!("error: dependency graph not built; use --build first");
        return Ok(1);
    }

    if do_show {
        print!("{}", graph.render());
    }

    if args.json {
        println!("{}", graph.to_json());
    }

    if args.order {
        println!("synthesis order (dependencies first):");
        for (i, module) in graph.topological_order().iter().enumerate() {
            println!("  {}. {module}", i + 1);
        }
    }

    if let Some(module) = &args.affected {
        let changed: BTreeSet<String> = BTreeSet::from([module.clone()]);
        let affected = graph.affected_modules(&changed);
        println!("modules affected if {module} changes:");
        for m in &affected {
            let tag = if m == module { " (changed)" } else { "" };
            println!("  - {m}{tag}");
        }
        println!("total: {} modules need re-synthesis", affected.len());
    }

    if args.store {
        graph.store_in_scratchpad(&mut design);
        let Some(path) = args.output.as_ref().or(args.design.as_ref()) else {
            return Err("--store requires --design or --output".into());
        };
        save_design(&design, path)?;
        if !global.quiet {
            println!("graph stored in scratchpad; design written to {}", path.display());
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const DESIGN: &str = "\
module top
  cell alu u0
  end
end
module alu
end
";

    fn write_design(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("d.zir");
        std::fs::write(&path, DESIGN).unwrap();
        path
    }

    fn base_args() -> DepsArgs {
        DepsArgs {
            design: None,
            build: false,
            show: false,
            json: false,
            affected: None,
            order: false,
            store: false,
            load: false,
            output: None,
        }
    }

    fn global() -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
        }
    }

    #[test]
    fn default_builds_and_shows() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args();
        args.design = Some(write_design(dir.path()));
        assert_eq!(run(&args, &global()).unwrap(), 0);
    }

    #[test]
    fn load_without_stored_graph_fails_validity() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args();
        args.design = Some(write_design(dir.path()));
        args.load = true;
        // Load alone (no build) leaves the graph invalid.
        assert_eq!(run(&args, &global()).unwrap(), 1);
    }

    #[test]
    fn store_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let design_path = write_design(dir.path());

        let mut args = base_args();
        args.design = Some(design_path.clone());
        args.build = true;
        args.store = true;
        assert_eq!(run(&args, &global()).unwrap(), 0);

        // The stored graph survives in the rewritten design file.
        let mut args = base_args();
        args.design = Some(design_path);
        args.load = true;
        assert_eq!(run(&args, &global()).unwrap(), 0);
    }

    #[test]
    fn affected_query_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args();
        args.design = Some(write_design(dir.path()));
        args.build = true;
        args.affected = Some("alu".to_string());
        assert_eq!(run(&args, &global()).unwrap(), 0);
    }
}
