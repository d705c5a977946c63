// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::fmt;

use thiserror::Error;

use crate::ledger::TaskId;

#[derive(Error, Debug)]
pub enum MemschedError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Completed-task log error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("failed to spawn process for task {task}: {source}")]
    Spawn {
        task: TaskId,
        #[source]
        source: std::io::Error,
    },

    #[error("process {slot} failed while working on task {task} (exit code {exit_code})")]
    ProcessFailed {
        slot: usize,
        task: TaskId,
        exit_code: i32,
    },

    #[error("memory usage {usage} bytes exceeded the hard limit of {limit} bytes")]
    Overmemory { usage: u64, limit: u64 },

    #[error(
        "unable to reduce memory usage below budget even after evicting every process; \
         a single task likely exceeds the budget on its own (running at mitigation start: {})",
        RunningList(.running)
    )]
    MitigationFailed { running: Vec<(TaskId, u64)> },

    #[error(
        "task {task} expects {expected_memory} bytes, which can never fit in the \
         {max_memory} byte budget"
    )]
    Unschedulable {
        task: TaskId,
        expected_memory: u64,
        max_memory: u64,
    },

    #[error(
        "no uncompleted tasks found: either this run has already been completed, \
         or the task list is misconfigured"
    )]
    NoRunnableTasks,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Display helper for the task list carried by `MitigationFailed`.
struct RunningList<'a>(&'a [(TaskId, u64)]);

impl fmt::Display for RunningList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (task, memory)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "task {task} at {memory} bytes")?;
        }
        Ok(())
    }
}

/// Failure modes of result retrieval from a process handle.
///
/// These are local caller errors and never stop a run by themselves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResultError {
    #[error("process was not started with result capture enabled")]
    NotCaptured,

    #[error("process is still running")]
    StillRunning,

    #[error("process failed with exit code {0}")]
    ProcessFailed(i32),

    #[error("process exited successfully but no result is available")]
    NoResult,
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, MemschedError>;
