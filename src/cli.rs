// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::DispatcherKind;

/// Command-line arguments for `opqueue`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "opqueue",
    version,
    about = "Run a plan of dependent, simulated operations through an operation queue.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML). Defaults to `Plan.toml`.
    #[arg(long, value_name = "PATH")]
    pub plan: Option<PathBuf>,

    /// Override `[queue].max_concurrent_operations`.
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Override `[queue].dispatcher` (tokio, thread, inline).
    #[arg(long, value_name = "KIND")]
    pub dispatcher: Option<DispatcherKind>,

    /// Give up waiting after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `OPQUEUE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the plan, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
