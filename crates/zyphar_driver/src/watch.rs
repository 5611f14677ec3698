//! Polling watch loop: re-run incremental synthesis when sources change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};

use serde_json::json;
use tracing::{info, warn};
use zyphar_cache::ModuleCache;
use zyphar_ir::{text, Design, PassRunner};

use crate::driver::{run_incremental, SynthOptions, SynthReport};
use crate::error::DriverError;

/// After this many consecutive failed synthesis rounds, the loop flags
/// the situation loudly (it still keeps running).
const FAILURE_THRESHOLD: u32 = 5;

/// How long to wait after a change before re-checking that mtimes have
/// settled, so half-written files are not picked up.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Options for the watch loop.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Top module name handed to the driver.
    pub top: Option<String>,
    /// Polling interval in milliseconds.
    pub poll_ms: u64,
    /// When set, a JSON event line is printed to stdout after every
    /// synthesis round, for consumption by an external update server.
    pub port: Option<u16>,
    /// Run one synthesis round and return instead of looping.
    pub once: bool,
    /// Design source files to watch.
    pub files: Vec<PathBuf>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            top: None,
            poll_ms: 500,
            port: None,
            once: false,
            files: Vec::new(),
        }
    }
}

/// Polls source file mtimes and re-runs the incremental driver on change.
///
/// The loop owns a shutdown flag; an embedder (typically a Ctrl-C
/// handler) sets it, and the loop honors it between polls and between
/// synthesis rounds — an in-flight round is never interrupted.
pub struct WatchLoop {
    opts: WatchOptions,
    shutdown: Arc<AtomicBool>,
}

impl WatchLoop {
    /// Creates a watch loop over the given options.
    pub fn new(opts: WatchOptions) -> Self {
        Self {
            opts,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the flag that stops the loop when set to `true`.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Runs the loop until shutdown (or once, with `once`).
    ///
    /// Missing watched files are tolerated with a warning and an mtime of
    /// zero; a synthesis failure inside the loop is logged, counted, and
    /// the loop continues.
    pub fn run(
        &self,
        design: &mut Design,
        cache: &mut ModuleCache,
        runner: &mut dyn PassRunner,
    ) -> Result<(), DriverError> {
        if self.opts.files.is_empty() {
            return Err(DriverError::NoWatchFiles);
        }

        let mut mtimes: BTreeMap<PathBuf, u64> = BTreeMap::new();
        for file in &self.opts.files {
            let mtime = file_mtime(file);
            if mtime == 0 {
                warn!("watched file missing: {}", file.display());
            }
            info!("watching {} (mtime: {mtime})", file.display());
            mtimes.insert(file.clone(), mtime);
        }

        info!(
            "watch mode started: {} files, polling every {} ms",
            self.opts.files.len(),
            self.opts.poll_ms
        );

        self.read_all(design);
        let synth_opts = SynthOptions {
            top: self.opts.top.clone(),
            ..SynthOptions::default()
        };

        let mut failures = 0u32;
        match run_incremental(design, cache, runner, &synth_opts) {
            Ok(report) => self.emit_event(design, &[], &report),
            Err(e) => {
                failures += 1;
                warn!("initial synthesis failed: {e}");
            }
        }

        if self.opts.once {
            info!("one-shot mode, exiting");
            return Ok(());
        }

        let mut iteration = 0u64;
        while !self.shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(self.opts.poll_ms));
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let changed: Vec<PathBuf> = self
                .opts
                .files
                .iter()
                .filter(|f| file_mtime(f) != mtimes[*f])
                .cloned()
                .collect();
            if changed.is_empty() {
                continue;
            }

            // Debounce: act only once the mtimes have stopped moving.
            let snapshot: BTreeMap<&PathBuf, u64> =
                changed.iter().map(|f| (f, file_mtime(f))).collect();
            std::thread::sleep(DEBOUNCE);
            if changed.iter().any(|f| file_mtime(f) != snapshot[f]) {
                continue;
            }
            for file in &self.opts.files {
                mtimes.insert(file.clone(), file_mtime(file));
            }

            iteration += 1;
            for file in &changed {
                info!("[{iteration}] file changed: {}", file.display());
            }

            let start = Instant::now();
            for name in design.module_names() {
                design.remove_module(&name);
            }
            self.read_all(design);

            match run_incremental(design, cache, runner, &synth_opts) {
                Ok(report) => {
                    failures = 0;
                    info!(
                        "[{iteration}] incremental synthesis completed in {} ms",
                        start.elapsed().as_millis()
                    );
                    self.emit_event(design, &changed, &report);
                }
                Err(e) => {
                    failures += 1;
                    warn!("[{iteration}] synthesis failed: {e}");
                    if failures >= FAILURE_THRESHOLD {
                        warn!("{failures} consecutive synthesis failures");
                    }
                }
            }
        }

        info!("watch mode stopped");
        Ok(())
    }

    /// Reads every watched file into the design, tolerating missing or
    /// unparseable files with a warning.
    fn read_all(&self, design: &mut Design) {
        for file in &self.opts.files {
            if let Err(e) = text::parse_file_into(file, design) {
                warn!("failed to read {}: {e}", file.display());
            }
        }
    }

    /// Prints the per-round JSON event line when an update port is
    /// configured.
    fn emit_event(&self, design: &Design, changed: &[PathBuf], report: &SynthReport) {
        if self.opts.port.is_none() {
            return;
        }
        let modules: Vec<serde_json::Value> = design
            .modules()
            .map(|m| {
                json!({
                    "name": m.name,
                    "cells": m.cells.len(),
                    "wires": m.wires.len(),
                })
            })
            .collect();
        let event = json!({
            "event": "synthesis_complete",
            "time_ms": report.elapsed_ms as u64,
            "changed_files": changed
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
            "modules": modules,
        });
        println!("{event}");
    }
}

/// Modification time of a file in seconds since the epoch; `0` when the
/// file is missing or unreadable.
fn file_mtime(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::BuiltinPassRunner;
    use std::io::Write as _;

    fn write_design_source(path: &Path) {
        let mut f = std::fs::File::create(path).unwrap();
        writeln!(f, "module top").unwrap();
        writeln!(f, "  wire width 1 clk").unwrap();
        writeln!(f, "  cell alu u0").unwrap();
        writeln!(f, "    connect clk clk").unwrap();
        writeln!(f, "  end").unwrap();
        writeln!(f, "end").unwrap();
        writeln!(f, "module alu").unwrap();
        writeln!(f, "  wire width 8 x").unwrap();
        writeln!(f, "end").unwrap();
    }

    #[test]
    fn empty_file_list_is_an_error() {
        let watch = WatchLoop::new(WatchOptions::default());
        let mut design = Design::new();
        let mut cache = ModuleCache::new();
        let mut runner = BuiltinPassRunner::new();
        let err = watch.run(&mut design, &mut cache, &mut runner).unwrap_err();
        assert!(matches!(err, DriverError::NoWatchFiles));
    }

    #[test]
    fn once_mode_runs_one_round() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("design.zir");
        write_design_source(&src);

        let cache_dir = dir.path().join("cache");
        let mut cache = ModuleCache::new();
        assert!(cache.init(Some(&cache_dir)));

        let watch = WatchLoop::new(WatchOptions {
            top: Some("top".to_string()),
            once: true,
            files: vec![src],
            ..WatchOptions::default()
        });
        let mut design = Design::new();
        let mut runner = BuiltinPassRunner::new();
        watch.run(&mut design, &mut cache, &mut runner).unwrap();

        assert_eq!(design.module_count(), 2);
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn missing_watched_file_does_not_crash() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let mut cache = ModuleCache::new();
        assert!(cache.init(Some(&cache_dir)));

        let watch = WatchLoop::new(WatchOptions {
            once: true,
            files: vec![dir.path().join("missing.zir")],
            ..WatchOptions::default()
        });
        let mut design = Design::new();
        let mut runner = BuiltinPassRunner::new();
        // The round runs on an empty design; nothing to synthesize.
        watch.run(&mut design, &mut cache, &mut runner).unwrap();
        assert_eq!(design.module_count(), 0);
    }

    #[test]
    fn preset_shutdown_flag_stops_after_initial_round() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("design.zir");
        write_design_source(&src);
        let cache_dir = dir.path().join("cache");
        let mut cache = ModuleCache::new();
        assert!(cache.init(Some(&cache_dir)));

        let watch = WatchLoop::new(WatchOptions {
            top: Some("top".to_string()),
            poll_ms: 1,
            files: vec![src],
            ..WatchOptions::default()
        });
        watch.shutdown_flag().store(true, Ordering::Relaxed);
        let mut design = Design::new();
        let mut runner = BuiltinPassRunner::new();
        watch.run(&mut design, &mut cache, &mut runner).unwrap();
        assert_eq!(design.module_count(), 2);
    }

    #[test]
    fn mtime_of_missing_file_is_zero() {
        assert_eq!(file_mtime(Path::new("/nonexistent/file.zir")), 0);
    }
}
