//! `zyphar watch` — polling re-synthesis loop.

use std::sync::atomic::Ordering;

use crate::{GlobalArgs, WatchArgs};
use zyphar_cache::ModuleCache;
use zyphar_driver::{BuiltinPassRunner, WatchLoop, WatchOptions};
use zyphar_ir::Design;

/// Runs the watch command. Blocks until interrupted (or after one round
/// with `--once`).
pub fn run(args: &WatchArgs, _global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut cache = ModuleCache::new();
    if !cache.init(args.cache_dir.as_deref()) {
        eprintln!("warning: cache unavailable; running without caching");
    }

    let watch = WatchLoop::new(WatchOptions {
        top: args.top.clone(),
        poll_ms: args.poll,
        port: args.port,
        once: args.once,
        files: args.files.clone(),
    });

    if !args.once {
        let flag = watch.shutdown_flag();
        if let Err(e) = ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        }) {
            eprintln!("warning: could not install interrupt handler: {e}");
        }
        println!("press Ctrl+C to stop watching");
    }

    let mut design = Design::new();
    let mut runner = BuiltinPassRunner::new();
    watch.run(&mut design, &mut cache, &mut runner)?;
    Ok(0)
}
