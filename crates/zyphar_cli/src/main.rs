//! Zyphar CLI — incremental re-synthesis accelerator.
//!
//! Provides `zyphar cache` for cache maintenance, `zyphar deps` for
//! dependency-graph queries, `zyphar monitor` for change tracking,
//! `zyphar synth` for one incremental synthesis round, and `zyphar watch`
//! for the polling re-synthesis loop.

#![warn(missing_docs)]

mod cache_cmd;
mod deps_cmd;
mod monitor_cmd;
mod synth_cmd;
mod watch_cmd;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use zyphar_ir::{text, Design};

/// Zyphar — incremental re-synthesis accelerator.
#[derive(Parser, Debug)]
#[command(name = "zyphar", version, about = "Incremental re-synthesis accelerator")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the module cache for incremental synthesis.
    Cache(CacheArgs),
    /// Build and query the module dependency graph.
    Deps(DepsArgs),
    /// Manage change tracking on a design.
    Monitor(MonitorArgs),
    /// Perform one incremental synthesis round with caching.
    Synth(SynthArgs),
    /// Watch design files and re-synthesize on change.
    Watch(WatchArgs),
}

/// Arguments for `zyphar cache`.
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Design file, required for `--store` and `--restore`.
    #[arg(long, value_name = "FILE")]
    pub design: Option<PathBuf>,

    /// Initialize the cache, optionally at a specific directory
    /// (default: `$HOME/.cache/zyphar`).
    #[arg(
        long,
        value_name = "DIR",
        num_args = 0..=1,
        default_missing_value = "",
        value_parser = clap::builder::ValueParser::new(
            |s: &str| -> Result<PathBuf, std::convert::Infallible> { Ok(PathBuf::from(s)) }
        )
    )]
    pub init: Option<PathBuf>,

    /// Show cache statistics.
    #[arg(long)]
    pub status: bool,

    /// List all cached entries.
    #[arg(long)]
    pub list: bool,

    /// Clear all cached entries.
    #[arg(long)]
    pub clear: bool,

    /// Save the cache to disk.
    #[arg(long)]
    pub save: bool,

    /// Invalidate all cached versions of a module.
    #[arg(long, value_name = "MODULE")]
    pub invalidate: Option<String>,

    /// Store the current state of a module in the cache.
    #[arg(long, num_args = 2, value_names = ["MODULE", "PASS_SEQ"])]
    pub store: Option<Vec<String>>,

    /// Restore a module from the cache into the design.
    #[arg(long, value_name = "MODULE")]
    pub restore: Option<String>,

    /// Set the maximum number of cache entries.
    #[arg(long, value_name = "N")]
    pub max_entries: Option<usize>,

    /// Set the maximum cache size in megabytes.
    #[arg(long, value_name = "MB")]
    pub max_size: Option<u64>,

    /// Set the maximum cache entry age in days (`0` disables age
    /// eviction).
    #[arg(long, value_name = "DAYS")]
    pub max_age: Option<u64>,

    /// Force eviction based on the current limits.
    #[arg(long)]
    pub evict: bool,

    /// Write the (possibly modified) design back to this file.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for `zyphar deps`.
#[derive(Args, Debug)]
pub struct DepsArgs {
    /// Design file to analyze.
    #[arg(long, value_name = "FILE")]
    pub design: Option<PathBuf>,

    /// Build the dependency graph from the design.
    #[arg(long)]
    pub build: bool,

    /// Display the dependency graph.
    #[arg(long)]
    pub show: bool,

    /// Output the dependency graph as JSON.
    #[arg(long)]
    pub json: bool,

    /// Show all modules affected if the named module changes.
    #[arg(long, value_name = "MODULE")]
    pub affected: Option<String>,

    /// Show the topological synthesis order.
    #[arg(long)]
    pub order: bool,

    /// Store the graph in the design scratchpad (and write the design
    /// back).
    #[arg(long)]
    pub store: bool,

    /// Load the graph from the design scratchpad.
    #[arg(long)]
    pub load: bool,

    /// Write the design to this file instead of back to `--design`.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for `zyphar monitor`.
#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Design file to observe.
    #[arg(long, value_name = "FILE")]
    pub design: Option<PathBuf>,

    /// Attach the monitor to the design.
    #[arg(long)]
    pub attach: bool,

    /// Detach the monitor from the design.
    #[arg(long)]
    pub detach: bool,

    /// Show the current change status.
    #[arg(long)]
    pub status: bool,

    /// Reset change tracking, making the current state the baseline.
    #[arg(long)]
    pub reset: bool,

    /// List all dirty (added or modified) modules.
    #[arg(long)]
    pub dirty: bool,
}

/// Arguments for `zyphar synth`.
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Design file to synthesize.
    #[arg(long, value_name = "FILE")]
    pub design: PathBuf,

    /// Write the post-synthesis design to this file.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Top module name (default: auto-detected by hierarchy).
    #[arg(long, value_name = "MODULE")]
    pub top: Option<String>,

    /// Force full synthesis, ignoring the cache.
    #[arg(long)]
    pub full: bool,

    /// Don't update the cache with results.
    #[arg(long)]
    pub nocache: bool,

    /// Show detailed cache statistics after the run.
    #[arg(long)]
    pub stats: bool,

    /// Assume the design is already hierarchy-resolved.
    #[arg(long)]
    pub nohierarchy: bool,

    /// Re-synthesize everything that transitively instantiates a changed
    /// module.
    #[arg(long)]
    pub conservative: bool,

    /// Cache directory (default: `$HOME/.cache/zyphar`).
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Arguments for `zyphar watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Design files to watch.
    #[arg(value_name = "FILES", required = true)]
    pub files: Vec<PathBuf>,

    /// Top module name.
    #[arg(long, value_name = "MODULE")]
    pub top: Option<String>,

    /// Polling interval in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub poll: u64,

    /// Emit a JSON event line on stdout after every synthesis round, for
    /// an external update server on this port.
    #[arg(long, value_name = "N")]
    pub port: Option<u16>,

    /// Run one synthesis round and exit.
    #[arg(long)]
    pub once: bool,

    /// Cache directory (default: `$HOME/.cache/zyphar`).
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        tracing::Level::ERROR
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let result = match cli.command {
        Command::Cache(ref args) => cache_cmd::run(args, &global),
        Command::Deps(ref args) => deps_cmd::run(args, &global),
        Command::Monitor(ref args) => monitor_cmd::run(args, &global),
        Command::Synth(ref args) => synth_cmd::run(args, &global),
        Command::Watch(ref args) => watch_cmd::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Loads a design from a textual IR file.
pub(crate) fn load_design(path: &Path) -> Result<Design, Box<dyn std::error::Error>> {
    let mut design = Design::new();
    text::parse_file_into(path, &mut design)?;
    Ok(design)
}

/// Writes a design back to disk.
pub(crate) fn save_design(
    design: &Design,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    text::write_design_file(design, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_cache_default() {
        let cli = Cli::parse_from(["zyphar", "cache"]);
        match cli.command {
            Command::Cache(ref args) => {
                assert!(args.init.is_none());
                assert!(!args.status);
                assert!(!args.clear);
                assert!(args.store.is_none());
            }
            _ => panic!("expected Cache command"),
        }
    }

    #[test]
    fn parse_cache_init_without_dir() {
        let cli = Cli::parse_from(["zyphar", "cache", "--init"]);
        match cli.command {
            Command::Cache(ref args) => {
                assert_eq!(args.init.as_deref(), Some(Path::new("")));
            }
            _ => panic!("expected Cache command"),
        }
    }

    #[test]
    fn parse_cache_init_with_dir() {
        let cli = Cli::parse_from(["zyphar", "cache", "--init", "/tmp/zcache"]);
        match cli.command {
            Command::Cache(ref args) => {
                assert_eq!(args.init.as_deref(), Some(Path::new("/tmp/zcache")));
            }
            _ => panic!("expected Cache command"),
        }
    }

    #[test]
    fn parse_cache_store_pair() {
        let cli = Cli::parse_from([
            "zyphar", "cache", "--design", "d.zir", "--store", "alu", "post_hierarchy",
        ]);
        match cli.command {
            Command::Cache(ref args) => {
                assert_eq!(
                    args.store.as_deref(),
                    Some(&["alu".to_string(), "post_hierarchy".to_string()][..])
                );
            }
            _ => panic!("expected Cache command"),
        }
    }

    #[test]
    fn parse_cache_limits() {
        let cli = Cli::parse_from([
            "zyphar",
            "cache",
            "--max-entries",
            "100",
            "--max-size",
            "50",
            "--max-age",
            "7",
            "--evict",
        ]);
        match cli.command {
            Command::Cache(ref args) => {
                assert_eq!(args.max_entries, Some(100));
                assert_eq!(args.max_size, Some(50));
                assert_eq!(args.max_age, Some(7));
                assert!(args.evict);
            }
            _ => panic!("expected Cache command"),
        }
    }

    #[test]
    fn parse_deps_flags() {
        let cli = Cli::parse_from([
            "zyphar", "deps", "--design", "d.zir", "--build", "--show", "--affected", "alu",
        ]);
        match cli.command {
            Command::Deps(ref args) => {
                assert!(args.build);
                assert!(args.show);
                assert!(!args.json);
                assert_eq!(args.affected.as_deref(), Some("alu"));
            }
            _ => panic!("expected Deps command"),
        }
    }

    #[test]
    fn parse_monitor_flags() {
        let cli = Cli::parse_from(["zyphar", "monitor", "--design", "d.zir", "--attach", "--dirty"]);
        match cli.command {
            Command::Monitor(ref args) => {
                assert!(args.attach);
                assert!(args.dirty);
                assert!(!args.detach);
            }
            _ => panic!("expected Monitor command"),
        }
    }

    #[test]
    fn parse_synth_flags() {
        let cli = Cli::parse_from([
            "zyphar",
            "synth",
            "--design",
            "d.zir",
            "--top",
            "cpu",
            "--conservative",
            "--stats",
            "--nohierarchy",
        ]);
        match cli.command {
            Command::Synth(ref args) => {
                assert_eq!(args.design, PathBuf::from("d.zir"));
                assert_eq!(args.top.as_deref(), Some("cpu"));
                assert!(args.conservative);
                assert!(args.stats);
                assert!(args.nohierarchy);
                assert!(!args.full);
            }
            _ => panic!("expected Synth command"),
        }
    }

    #[test]
    fn parse_synth_requires_design() {
        assert!(Cli::try_parse_from(["zyphar", "synth"]).is_err());
    }

    #[test]
    fn parse_watch_files_and_poll() {
        let cli = Cli::parse_from([
            "zyphar", "watch", "--poll", "200", "--once", "a.zir", "b.zir",
        ]);
        match cli.command {
            Command::Watch(ref args) => {
                assert_eq!(args.poll, 200);
                assert!(args.once);
                assert_eq!(args.files.len(), 2);
                assert!(args.port.is_none());
            }
            _ => panic!("expected Watch command"),
        }
    }

    #[test]
    fn parse_watch_requires_files() {
        assert!(Cli::try_parse_from(["zyphar", "watch"]).is_err());
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from(["zyphar", "--quiet", "cache"]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        let cli = Cli::parse_from(["zyphar", "--verbose", "cache", "--status"]);
        assert!(cli.verbose);
    }
}
