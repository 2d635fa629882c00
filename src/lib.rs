// src/lib.rs

//! Cooperative operation queue.
//!
//! An [`Operation`] is a cancellable, finish-once unit of work that may wait
//! on other operations. An [`OperationQueue`] starts operations once their
//! dependencies have finished, honours a concurrency limit, and notifies an
//! [`OperationQueueDelegate`] before each operation is added and after it
//! finishes.
//!
//! The `opqueue` binary drives the library from a TOML plan file.

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod operation;
pub mod plan;
pub mod types;

pub use engine::{OperationQueue, OperationQueueDelegate};
pub use errors::{OpQueueError, Result as OpResult};
pub use operation::{ExecutionError, Operation, OperationContext, WeakOperation, Work};
pub use types::{DependencyFailurePolicy, DispatcherKind, OperationId, OperationState};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{default_plan_path, load_and_validate};
use crate::config::model::ConfigFile;
use crate::plan::{Plan, QueueOverrides, ReportingDelegate};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading
/// - queue + operations
/// - a reporting delegate
/// - Ctrl-C → cancel all operations
pub async fn run(args: CliArgs) -> Result<()> {
    let plan_path = args.plan.clone().unwrap_or_else(default_plan_path);
    let cfg = load_and_validate(&plan_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let overrides = QueueOverrides {
        max_concurrent: args.max_concurrent,
        dispatcher: args.dispatcher,
    };
    let plan = Plan::from_config(&cfg, overrides)?;

    let reporter = Arc::new(ReportingDelegate::default());
    plan.queue().set_delegate(&reporter);

    // Ctrl-C → cooperative cancellation; the wait below still completes.
    {
        let queue = plan.queue().clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            queue.cancel_all_operations();
        });
    }

    info!(
        queue = plan.queue().name(),
        operations = plan.operations().len(),
        max_concurrent = ?plan.queue().max_concurrent_operation_count(),
        "submitting plan"
    );
    plan.submit()?;

    let wait = plan.queue().wait_until_all_operations_are_finished();
    match args.timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), wait)
            .await
            .map_err(|_| anyhow!("plan did not finish within {secs}s"))?,
        None => wait.await,
    }

    print_summary(&plan);

    if reporter.failed() > 0 {
        bail!(
            "{} of {} operations finished with errors",
            reporter.failed(),
            reporter.finished()
        );
    }
    Ok(())
}

fn print_summary(plan: &Plan) {
    println!("opqueue summary");
    for s in plan.summary() {
        let outcome = if s.errors.is_empty() { "ok" } else { "failed" };
        println!(
            "  - {} [{}] {} (executed: {}, cancelled: {})",
            s.name, s.state, outcome, s.executed, s.cancelled
        );
        for e in &s.errors {
            println!("      error: {e}");
        }
    }
}

/// Simple dry-run output: print queue settings and operations.
fn print_dry_run(cfg: &ConfigFile) {
    println!("opqueue dry-run");
    println!("  queue.name = {}", cfg.queue.name);
    match cfg.queue.max_concurrent_operations {
        Some(n) => println!("  queue.max_concurrent_operations = {n}"),
        None => println!("  queue.max_concurrent_operations = unbounded"),
    }
    println!("  queue.dispatcher = {:?}", cfg.queue.dispatcher);
    println!();

    println!("operations ({}):", cfg.operation.len());
    for (name, op) in cfg.operation.iter() {
        println!("  - {name}");
        println!("      delay_ms: {}", op.delay_ms);
        if !op.after.is_empty() {
            println!("      after: {:?}", op.after);
        }
        if let Some(ref error) = op.error {
            println!("      error: {error}");
        }
        println!("      on_failed_dependency: {:?}", op.on_failed_dependency);
    }

    debug!("dry-run complete (no execution)");
}
