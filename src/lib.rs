// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod ledger;
pub mod logging;
pub mod present;
pub mod sample;
pub mod sched;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{RunConfig, load_and_validate};
use crate::engine::{RunReport, Runtime};
use crate::exec::CommandBackend;
use crate::ledger::TaskLedger;
use crate::present::Command;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the task ledger (resuming from the completed-task log)
/// - the command backend and presenter
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<RunReport> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)?;
    if let Some(kind) = args.presenter {
        cfg.presenter = kind;
    }

    let ledger = TaskLedger::open(&cfg.tasks, &cfg.completed_log_path())?;

    if args.dry_run {
        print_dry_run(&cfg, &ledger);
        return Ok(RunReport {
            total: ledger.total(),
            ..RunReport::default()
        });
    }

    let backend = CommandBackend::new(cfg.worker.clone(), cfg.log_dir.clone())?;
    let presenter = present::from_kind(cfg.presenter);

    // Ctrl-C → terminate every worker and stop.
    let (control_tx, control_rx) = mpsc::unbounded_channel::<Command>();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("Ctrl+C received; terminating workers");
        let _ = control_tx.send(Command::Terminate);
    });

    let runtime = Runtime::new(&cfg, ledger, backend, presenter).with_control(control_rx);
    Ok(runtime.run().await?)
}

/// Dry-run output: limits, worker command and the runnable tasks.
fn print_dry_run(cfg: &RunConfig, ledger: &TaskLedger) {
    let limits = &cfg.limits;
    println!("memsched dry-run: {}", cfg.name);
    println!("  max_threads = {}", limits.max_threads);
    println!("  max_memory = {}", limits.max_memory);
    println!("  max_memory_hard_limit = {}", limits.max_memory_hard_limit);
    println!("  overmemory_raise_error = {}", limits.overmemory_raise_error);
    println!("  benchmarking_tasks = {}", limits.benchmarking_tasks);
    println!(
        "  main_thread_sleep = {}ms",
        limits.main_thread_sleep.as_millis()
    );
    println!("  worker.cmd = {}", cfg.worker.cmd);
    println!("  completed log = {}", ledger.log_path().display());
    println!();

    println!(
        "runnable tasks ({} of {} configured):",
        ledger.total(),
        cfg.tasks.len()
    );
    for task in ledger.tasks() {
        println!("  - [{}] {}", task.id, task.args);
        if !task.metadata.is_empty() {
            println!("      metadata: {}", task.metadata);
        }
        println!(
            "      expected: {} bytes, {:.1}s",
            task.expected_memory,
            task.expected_runtime.as_secs_f64()
        );
    }

    debug!("dry-run complete (no execution)");
}
