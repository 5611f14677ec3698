//! The incremental synthesis driver.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use tracing::{info, warn};
use zyphar_cache::ModuleCache;
use zyphar_common::ContentHash;
use zyphar_deps::DependencyGraph;
use zyphar_ir::{Design, PassRunner};

use crate::error::DriverError;

/// Pipeline-stage tag under which the driver caches module bodies.
///
/// The cache key uses the pre-synthesis content hash: the next run hashes
/// the freshly read (pre-synthesis) modules and must land on the same key.
pub const PASS_SEQ: &str = "post_hierarchy";

/// Options controlling one driver invocation.
#[derive(Debug, Clone, Default)]
pub struct SynthOptions {
    /// Top module name handed to hierarchy resolution.
    pub top: Option<String>,
    /// Force full synthesis, ignoring the cache.
    pub full: bool,
    /// Skip write-back and the final save.
    pub nocache: bool,
    /// Emit cache statistics at the end of the run.
    pub stats: bool,
    /// Assume the design is already hierarchy-resolved.
    pub skip_hierarchy: bool,
    /// Widen the miss set to everything that transitively instantiates a
    /// miss, guarding against cross-module optimizations.
    pub conservative: bool,
}

/// Result of one driver invocation.
#[derive(Debug, Clone)]
pub struct SynthReport {
    /// Modules that went through the synthesis passes.
    pub synthesized: BTreeSet<String>,
    /// Modules restored from the cache.
    pub restored: BTreeSet<String>,
    /// Pre-synthesis content hash of every module in the run.
    pub module_hashes: BTreeMap<String, ContentHash>,
    /// Wall-clock time of the whole invocation in milliseconds.
    pub elapsed_ms: u128,
}

/// Runs one incremental synthesis round.
///
/// Phases: hierarchy resolution, dependency-graph build, hashing, cache
/// partition, optional conservative invalidation, restoring hits,
/// synthesizing misses (scoped to the miss set), write-back under the
/// pre-synthesis hashes, and a final save.
///
/// Only a hierarchy failure is escalated as an error. A failed restore
/// falls back to re-synthesis of that module; a failed synthesis pass is
/// logged and suppresses write-back for the round.
pub fn run_incremental(
    design: &mut Design,
    cache: &mut ModuleCache,
    runner: &mut dyn PassRunner,
    opts: &SynthOptions,
) -> Result<SynthReport, DriverError> {
    let start = Instant::now();
    info!("incremental synthesis started");

    if !cache.is_initialized() && !cache.init(None) {
        warn!("cache unavailable; this run will synthesize everything");
    }

    // Hierarchy resolution produces the canonical module set.
    if !opts.skip_hierarchy {
        let mut command = String::from("hierarchy -check");
        if let Some(top) = &opts.top {
            command.push_str(" -top ");
            command.push_str(top);
        }
        runner
            .call(design, &command)
            .map_err(|source| DriverError::Hierarchy { source })?;
    }

    info!("analyzing module dependencies");
    let mut graph = DependencyGraph::new();
    graph.build_from_design(design);
    info!("found {} modules", graph.module_count());

    info!("computing input content hashes");
    let module_hashes: BTreeMap<String, ContentHash> = design
        .modules()
        .map(|m| (m.name.clone(), m.content_hash()))
        .collect();

    info!("partitioning modules against the cache");
    let mut to_synthesize: BTreeSet<String> = BTreeSet::new();
    let mut from_cache: BTreeSet<String> = BTreeSet::new();
    if opts.full {
        info!("full synthesis requested; ignoring cache");
        to_synthesize.extend(module_hashes.keys().cloned());
    } else {
        for (name, hash) in &module_hashes {
            if cache.has(name, *hash, PASS_SEQ) {
                info!("  [cached] {name} (hash: {hash})");
                from_cache.insert(name.clone());
            } else {
                info!("  [synth]  {name} (hash: {hash})");
                to_synthesize.insert(name.clone());
            }
        }
    }

    // Cross-module optimizations (constant propagation over boundaries)
    // can change a dependent's output even when its own hash is stable,
    // so conservative mode re-synthesizes the whole dependent closure.
    if opts.conservative && !to_synthesize.is_empty() {
        let affected = graph.affected_modules(&to_synthesize);
        for name in affected {
            if from_cache.remove(&name) {
                info!("  [conservative] {name} re-synthesized due to changed dependency");
                cache.invalidate(&name);
                to_synthesize.insert(name);
            }
        }
    }

    info!(
        "{} modules to synthesize, {} from cache",
        to_synthesize.len(),
        from_cache.len()
    );

    let mut restored: BTreeSet<String> = BTreeSet::new();
    for name in from_cache {
        let hash = module_hashes[&name];
        // The pre-synthesis module must leave the design before its
        // post-synthesis body is parsed back in under the same name.
        let taken = design.remove_module(&name);
        if cache.restore(&name, hash, PASS_SEQ, design) {
            restored.insert(name);
        } else {
            warn!("restore of {name} failed; falling back to re-synthesis");
            if let Some(module) = taken {
                design.add_module(module);
            }
            to_synthesize.insert(name);
        }
    }

    let mut synth_ok = true;
    if to_synthesize.is_empty() {
        info!("no modules need synthesis; everything restored from cache");
    } else {
        let names: Vec<&str> = to_synthesize.iter().map(String::as_str).collect();
        let sel = names.join(" ");
        for pass in ["proc", "opt -full", "techmap", "opt -full"] {
            let command = format!("{pass} {sel}");
            if let Err(e) = runner.call(design, &command) {
                warn!("synthesis pass failed: {e}; skipping write-back for this round");
                synth_ok = false;
                break;
            }
        }
    }

    if !opts.nocache && synth_ok {
        for name in &to_synthesize {
            let Some(hash) = module_hashes.get(name) else {
                continue;
            };
            let Some(module) = design.module(name) else {
                continue;
            };
            cache.put(name, *hash, PASS_SEQ, module);
        }
        if let Err(e) = cache.save_to_disk() {
            warn!("cache save failed: {e}");
        }
    }

    let elapsed_ms = start.elapsed().as_millis();
    info!(
        "incremental synthesis complete: {} synthesized, {} from cache, {elapsed_ms} ms",
        to_synthesize.len(),
        restored.len()
    );
    if opts.stats {
        let stats = cache.stats();
        info!(
            "cache: {} entries, {} bytes, {} hits, {} misses, {:.1}% hit rate",
            stats.entries, stats.total_size_bytes, stats.hits, stats.misses, stats.hit_rate
        );
    }

    Ok(SynthReport {
        synthesized: to_synthesize,
        restored,
        module_hashes,
        elapsed_ms,
    })
}
