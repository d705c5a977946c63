use std::str::FromStr;

use serde::Deserialize;

/// Which presentation backend the run loop reports to.
///
/// - `Print`: one status block per tick on stdout (default).
/// - `Headless`: no terminal output; snapshots only go to the log at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresenterKind {
    #[default]
    Print,
    Headless,
}

impl FromStr for PresenterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "print" => Ok(PresenterKind::Print),
            "headless" | "none" => Ok(PresenterKind::Headless),
            other => Err(format!(
                "invalid presenter: {other} (expected \"print\" or \"headless\")"
            )),
        }
    }
}

/// Which child processes an operation should also apply to.
///
/// Children are resolved at the moment of the operation; a child that has
/// already exited simply contributes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Children {
    /// The process alone.
    #[default]
    None,
    /// The process plus all of its current descendants.
    All,
    /// The process plus exactly these pids.
    Explicit(Vec<u32>),
}

impl From<bool> for Children {
    fn from(all: bool) -> Self {
        if all { Children::All } else { Children::None }
    }
}
