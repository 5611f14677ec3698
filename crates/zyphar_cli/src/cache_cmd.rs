//! `zyphar cache` — cache maintenance.

use crate::{load_design, save_design, CacheArgs, GlobalArgs};
use zyphar_cache::ModuleCache;

/// Runs the cache command. With no action flags, initializes the cache
/// and shows its status.
pub fn run(args: &CacheArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let init_dir = args
        .init
        .as_deref()
        .filter(|p| !p.as_os_str().is_empty());

    let mut cache = ModuleCache::new();
    if !cache.init(init_dir) {
        eprintln!("error: failed to initialize cache");
        return Ok(1);
    }

    let no_action = !(args.status
        || args.list
        || args.clear
        || args.save
        || args.evict
        || args.init.is_some())
        && args.invalidate.is_none()
        && args.store.is_none()
        && args.restore.is_none()
        && args.max_entries.is_none()
        && args.max_size.is_none()
        && args.max_age.is_none();
    let do_status = args.status || no_action;

    if let Some(n) = args.max_entries {
        cache.config_mut().max_entries = n;
        println!("set max cache entries to {n}");
    }
    if let Some(mb) = args.max_size {
        cache.config_mut().max_size_bytes = mb * 1024 * 1024;
        println!("set max cache size to {mb} MB");
    }
    if let Some(days) = args.max_age {
        cache.config_mut().max_age_secs = days * 24 * 3600;
        println!("set max cache age to {days} days");
    }

    if args.evict {
        let before = cache.entry_count();
        cache.evict_if_needed();
        println!("eviction complete: {before} -> {} entries", cache.entry_count());
    }

    if args.clear {
        cache.clear();
        println!("cache cleared");
    }

    if let Some(module) = &args.invalidate {
        let removed = cache.invalidate(module);
        println!("invalidated {removed} entries for module {module}");
    }

    let mut design_touched = false;
    let mut design = match &args.design {
        Some(path) => Some(load_design(path)?),
        None => None,
    };

    if let Some(pair) = &args.store {
        let (module_name, pass_seq) = (&pair[0], &pair[1]);
        let Some(design) = design.as_ref() else {
            return Err("--store requires --design".into());
        };
        let Some(module) = design.module(module_name) else {
            return Err(format!("module not found in design: {module_name}").into());
        };
        let hash = module.content_hash();
        if cache.put(module_name, hash, pass_seq, module) {
            println!("stored {module_name} (hash: {hash}, pass: {pass_seq})");
        } else {
            println!("failed to store {module_name}");
        }
    }

    if let Some(module_name) = &args.restore {
        let Some(design) = design.as_mut() else {
            return Err("--restore requires --design".into());
        };
        // The current module determines the lookup hash; a module absent
        // from the design has no hash to look up with.
        let Some(module) = design.module(module_name) else {
            return Err(format!(
                "module {module_name} not in design, cannot determine hash for lookup"
            )
            .into());
        };
        let hash = module.content_hash();
        if cache.restore(module_name, hash, "", design) {
            println!("restored module {module_name} from cache");
            design_touched = true;
        } else {
            println!("module {module_name} not found in cache");
        }
    }

    if args.save {
        cache.save_to_disk()?;
        println!("cache saved");
    }

    if do_status {
        let stats = cache.stats();
        println!("cache directory: {}", stats.cache_dir.display());
        println!("total entries:   {}", stats.entries);
        println!("total size:      {} bytes", stats.total_size_bytes);
        println!("cache hits:      {}", stats.hits);
        println!("cache misses:    {}", stats.misses);
        println!("hit rate:        {:.1}%", stats.hit_rate);
    }

    if args.list {
        for entry in cache.entries() {
            println!("{}", entry.module_name);
            println!("  hash:  {}", entry.content_hash);
            println!("  pass:  {}", entry.pass_sequence);
            println!("  hits:  {}", entry.hit_count);
            println!("  size:  {} bytes", entry.body.len());
            if global.verbose {
                println!("  stamp: {}", entry.timestamp);
            }
        }
    }

    if design_touched {
        if let (Some(design), Some(path)) = (&design, args.output.as_ref().or(args.design.as_ref()))
        {
            save_design(design, path)?;
            if !global.quiet {
                println!("design written to {}", path.display());
            }
        }
    }

    Ok(0)
}
