// src/logging.rs

//! Logging setup for `memsched` using `tracing` + `tracing-subscriber`.
//!
//! The filter is resolved from, in order:
//! 1. `--log-level`, which sets the level for `memsched` itself;
//! 2. `MEMSCHED_LOG`, either a bare level or full `EnvFilter` directives
//!    (e.g. `memsched::sched=debug,memsched::exec=trace`);
//! 3. `info` for `memsched`.
//!
//! Dependencies are held at `warn` unless the directives say otherwise.
//! Events go to STDERR with local-offset timestamps, matching the
//! `completion_time` column of the completed-task log. Stdout belongs to the
//! print presenter.

use anyhow::{Context, Result, anyhow};
use time::UtcOffset;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "MEMSCHED_LOG";

const DEPENDENCY_LEVEL: &str = "warn";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let directives = filter_directives(cli_level, env.as_deref());
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter `{directives}`"))?;

    // Module targets only help once someone is looking below `info`.
    let verbose = directives.contains("debug") || directives.contains("trace");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_timer(OffsetTime::new(offset, Rfc3339));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

/// `EnvFilter` directives for the given CLI level and `MEMSCHED_LOG` value.
pub fn filter_directives(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return crate_directives(level_name(level));
    }

    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => match parse_level_str(raw) {
            Some(level) => crate_directives(level),
            None => raw.to_string(),
        },
        None => crate_directives("info"),
    }
}

fn crate_directives(level: &str) -> String {
    format!("{DEPENDENCY_LEVEL},memsched={level}")
}

fn level_name(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

fn parse_level_str(s: &str) -> Option<&'static str> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some("error"),
        "warn" | "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        "trace" => Some("trace"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_beats_environment() {
        assert_eq!(
            filter_directives(Some(LogLevel::Debug), Some("memsched=trace")),
            "warn,memsched=debug"
        );
    }

    #[test]
    fn bare_env_level_scopes_to_this_crate() {
        assert_eq!(filter_directives(None, Some(" Warning ")), "warn,memsched=warn");
        assert_eq!(filter_directives(None, Some("TRACE")), "warn,memsched=trace");
    }

    #[test]
    fn env_directives_pass_through() {
        let raw = "memsched::sched=debug,tokio=info";
        assert_eq!(filter_directives(None, Some(raw)), raw);
        assert!(EnvFilter::try_new(filter_directives(None, Some(raw))).is_ok());
    }

    #[test]
    fn defaults_to_info() {
        assert_eq!(filter_directives(None, None), "warn,memsched=info");
        assert_eq!(filter_directives(None, Some("  ")), "warn,memsched=info");
    }
}
