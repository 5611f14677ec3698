//! `zyphar monitor` — change-tracking control.
//!
//! Monitoring is per-process: the monitor observes the design for the
//! duration of one invocation (or one interactive/watch session). The
//! command surface mirrors the attach/status/reset/dirty controls so the
//! same flow works when driven from a long-lived session.

use crate::{load_design, GlobalArgs, MonitorArgs};
use zyphar_ir::Design;
use zyphar_monitor::MonitorHandle;

/// Runs the monitor command. With no action flags, attaches and shows
/// status.
pub fn run(args: &MonitorArgs, _global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let no_action = !(args.attach || args.detach || args.status || args.reset || args.dirty);
    let do_attach = args.attach || no_action;
    let do_status = args.status || no_action;

    let mut design = match &args.design {
        Some(path) => load_design(path)?,
        None => Design::new(),
    };

    let mut handle = MonitorHandle::new();

    if do_attach {
        handle.attach(&mut design);
        println!(
            "monitor attached to design ({} modules)",
            design.module_count()
        );
    }

    if args.reset {
        if handle.is_attached() {
            handle.reset(&design);
            println!("change tracking reset");
        } else {
            eprintln!("warning: monitor not attached");
        }
    }

    if do_status {
        if handle.is_attached() {
            let summary = handle.summary();
            if summary.is_empty() {
                println!("no changes detected");
            } else {
                for m in &summary.added {
                    println!("  + {m}");
                }
                for m in &summary.deleted {
                    println!("  - {m}");
                }
                for m in &summary.modified {
                    println!("  ~ {m}");
                }
            }
        } else {
            println!("monitor not attached");
        }
    }

    if args.dirty {
        if handle.is_attached() {
            let dirty = handle.dirty_modules();
            if dirty.is_empty() {
                println!("no dirty modules");
            } else {
                println!("dirty modules ({}):", dirty.len());
                for m in &dirty {
                    println!("  {m}");
                }
            }
        } else {
            eprintln!("warning: monitor not attached");
        }
    }

    if args.detach {
        if handle.is_attached() {
            handle.detach(&mut design);
            println!("monitor detached");
        } else {
            println!("monitor not attached");
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_design(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("d.zir");
        std::fs::write(&path, "module top\n  wire width 1 clk\nend\n").unwrap();
        path
    }

    fn base_args() -> MonitorArgs {
        MonitorArgs {
            design: None,
            attach: false,
            detach: false,
            status: false,
            reset: false,
            dirty: false,
        }
    }

    fn global() -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
        }
    }

    #[test]
    fn default_attaches_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args();
        args.design = Some(write_design(dir.path()));
        assert_eq!(run(&args, &global()).unwrap(), 0);
    }

    #[test]
    fn attach_dirty_detach_flow() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args();
        args.design = Some(write_design(dir.path()));
        args.attach = true;
        args.dirty = true;
        args.detach = true;
        assert_eq!(run(&args, &global()).unwrap(), 0);
    }

    #[test]
    fn status_without_attach_reports_detached() {
        let mut args = base_args();
        args.status = true;
        assert_eq!(run(&args, &global()).unwrap(), 0);
    }
}
