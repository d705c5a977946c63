// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::PresenterKind;

/// Command-line arguments for `memsched`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "memsched",
    version,
    about = "Run many independent tasks across worker processes within a memory budget.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Memsched.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Memsched.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MEMSCHED_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the runnable tasks, but don't start any workers.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[run].presenter` (print, headless).
    #[arg(long, value_name = "KIND")]
    pub presenter: Option<PresenterKind>,
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
