// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod results;
pub mod scheduler;
pub mod types;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::SiteConfig;
use crate::config::loader::{default_config_path, load_and_validate};
use crate::pipeline::{InputParameterSet, StepPipeline};
use crate::types::{ExitOutcome, ParamKind};

/// High-level entry point used by `main.rs`.
///
/// Loads the site config, imports `--source`, runs every `--op` in order
/// (stopping at the first failure), performs the requested exports and
/// removes the working directory unless `--keep-workdir` was given.
///
/// Returns the process exit status for the binary.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading site config {:?}", config_path))?;

    if args.dry_run {
        print_dry_run(&cfg, &args);
        return Ok(0);
    }

    if args.ops.is_empty() {
        bail!("no --op given; nothing to do");
    }

    let mut params = InputParameterSet::new();
    for (name, value) in args.params.iter() {
        params.add_input(name, value, ParamKind::Param);
    }
    for (name, path) in args.file_params.iter() {
        params.add_input(name, path, ParamKind::File);
    }

    let mut pipeline = StepPipeline::from_config(&cfg);
    if args.remote {
        pipeline.set_run_remote(true);
    }
    if args.debug {
        pipeline.set_debug(true);
    }

    if let Some(source) = args.source.as_ref() {
        if !pipeline.import(source) {
            bail!("could not import {:?}", source);
        }
    }

    let mut last = ExitOutcome::Rejected;
    for op in args.ops.iter() {
        last = pipeline.invoke(op, &params).await;
        info!(op = %op, step = pipeline.current_step(), outcome = %last, "step finished");
        if !last.success() {
            break;
        }
    }

    let mut exports_ok = true;
    if let Some(dest) = args.export.as_ref() {
        exports_ok &= pipeline.export(dest);
    }
    if !args.export_list.is_empty() {
        exports_ok &= pipeline.export_list(&args.export_list);
    }
    if let Some(dest) = args.export_log.as_ref() {
        exports_ok &= pipeline.export_log_all(dest);
    }
    if !exports_ok {
        warn!("one or more exports failed");
    }

    if args.keep_workdir {
        if let Some(dir) = pipeline.workdir() {
            info!(path = ?dir, "keeping working directory");
        }
    } else {
        pipeline.cleanup();
    }

    let code = match last {
        ExitOutcome::Code(0) if exports_ok => 0,
        ExitOutcome::Code(0) => 1,
        ExitOutcome::Code(c) if (1..=255).contains(&c) => c,
        _ => 1,
    };
    Ok(code)
}

/// Simple dry-run output: print pipeline settings and operations.
fn print_dry_run(cfg: &SiteConfig, args: &CliArgs) {
    println!("structpipe dry-run");
    println!(
        "  pipeline.work_root = {}",
        cfg.pipeline.effective_work_root().display()
    );
    println!(
        "  pipeline.run_remote = {}",
        cfg.pipeline.run_remote || args.remote
    );
    println!(
        "  scheduler.queue = {}",
        cfg.scheduler.queue.as_deref().unwrap_or("<unset>")
    );
    println!();

    println!("operations ({}):", cfg.operation.len());
    for (name, op) in cfg.operation.iter() {
        println!("  - {name} ({:?})", op.family);
        println!("      cmd: {}", op.cmd);
        if !op.outputs.is_empty() {
            println!("      outputs: {:?}", op.outputs);
        }
        if !op.required_params.is_empty() {
            println!("      required_params: {:?}", op.required_params);
        }
        if let Some(t) = op.timeout_secs {
            println!("      timeout_secs: {t}");
        }
        if let Some(m) = op.memory_mb {
            println!("      memory_mb: {m}");
        }
    }

    if !args.ops.is_empty() {
        println!();
        println!("chain: {}", args.ops.join(" -> "));
        for op in args.ops.iter() {
            if !cfg.operation.contains_key(op) {
                println!("  warning: '{op}' is not a configured operation");
            }
        }
    }
}
