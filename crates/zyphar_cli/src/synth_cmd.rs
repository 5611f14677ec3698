//! `zyphar synth` — one incremental synthesis round.

use crate::{load_design, save_design, GlobalArgs, SynthArgs};
use zyphar_cache::ModuleCache;
use zyphar_driver::{run_incremental, BuiltinPassRunner, SynthOptions};

/// Runs the synth command.
pub fn run(args: &SynthArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut design = load_design(&args.design)?;

    let mut cache = ModuleCache::new();
    if !cache.init(args.cache_dir.as_deref()) {
        eprintln!("warning: cache unavailable; running without caching");
    }

    let opts = SynthOptions {
        top: args.top.clone(),
        full: args.full,
        nocache: args.nocache,
        stats: args.stats,
        skip_hierarchy: args.nohierarchy,
        conservative: args.conservative,
    };

    let mut runner = BuiltinPassRunner::new();
    let report = match run_incremental(&mut design, &mut cache, &mut runner, &opts) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(1);
        }
    };

    if !global.quiet {
        println!(
            "{} modules synthesized, {} restored from cache, {} ms",
            report.synthesized.len(),
            report.restored.len(),
            report.elapsed_ms
        );
    }

    if let Some(output) = &args.output {
        save_design(&design, output)?;
        if !global.quiet {
            println!("post-synthesis design written to {}", output.display());
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    const DESIGN: &str = "\
module top
  wire width 1 clk
  cell alu u0
    connect clk clk
  end
end
module alu
  wire width 8 x
  wire width 8 y
  cell $add a0
    connect A x
    connect Y y
  end
end
";

    fn write_design(dir: &Path) -> PathBuf {
        let path = dir.join("d.zir");
        std::fs::write(&path, DESIGN).unwrap();
        path
    }

    fn args(design: PathBuf, cache_dir: PathBuf) -> SynthArgs {
        SynthArgs {
            design,
            output: None,
            top: Some("top".to_string()),
            full: false,
            nocache: false,
            stats: false,
            nohierarchy: false,
            conservative: false,
            cache_dir: Some(cache_dir),
        }
    }

    fn global() -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
        }
    }

    #[test]
    fn cold_then_warm_run() {
        let dir = tempfile::tempdir().unwrap();
        let design_path = write_design(dir.path());
        let cache_dir = dir.path().join("cache");

        // Cold run populates the cache.
        let a = args(design_path.clone(), cache_dir.clone());
        assert_eq!(run(&a, &global()).unwrap(), 0);
        assert!(cache_dir.join("index.json").exists());

        // Warm run restores from it.
        let a = args(design_path, cache_dir);
        assert_eq!(run(&a, &global()).unwrap(), 0);
    }

    #[test]
    fn writes_output_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let design_path = write_design(dir.path());
        let out_path = dir.path().join("out.zir");

        let mut a = args(design_path, dir.path().join("cache"));
        a.output = Some(out_path.clone());
        assert_eq!(run(&a, &global()).unwrap(), 0);
        let out = std::fs::read_to_string(&out_path).unwrap();
        // techmap rewrote the generic adder.
        assert!(out.contains("$lut"));
    }

    #[test]
    fn missing_design_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = args(dir.path().join("missing.zir"), dir.path().join("cache"));
        assert!(run(&a, &global()).is_err());
    }

    #[test]
    fn unresolved_hierarchy_returns_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let design_path = dir.path().join("d.zir");
        std::fs::write(
            &design_path,
            "module top\n  cell ghost u0\n  end\nend\n",
        )
        .unwrap();
        let a = args(design_path, dir.path().join("cache"));
        assert_eq!(run(&a, &global()).unwrap(), 1);
    }
}
