// src/ledger/task.rs

//! Task records and their lifecycle state.

use std::time::Duration;

use time::OffsetDateTime;

use crate::config::TaskSpec;

/// Stable index of a task within the ledger.
pub type TaskId = usize;

/// Where a task is in its lifecycle.
///
/// `Pending` is the only state with `remaining_to_do = true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for admission (or returned here by an eviction).
    Pending,
    /// Assigned to a slot with a live process.
    Running,
    /// Closed successfully and recorded in the completed log.
    Done,
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub args: String,
    pub metadata: String,
    pub expected_memory: u64,
    pub expected_runtime: Duration,
    pub observed_memory: Option<u64>,
    pub observed_runtime: Option<Duration>,
    pub completion_time: Option<OffsetDateTime>,
    pub state: TaskState,
    /// Value returned by the worker, when result capture is on.
    pub result: Option<String>,
}

impl Task {
    pub fn from_spec(id: TaskId, spec: &TaskSpec) -> Self {
        Self {
            id,
            args: spec.args.clone(),
            metadata: spec.metadata.clone(),
            expected_memory: spec.expected_memory,
            expected_runtime: spec.expected_runtime,
            observed_memory: None,
            observed_runtime: None,
            completion_time: None,
            state: TaskState::Pending,
            result: None,
        }
    }

    pub fn remaining_to_do(&self) -> bool {
        self.state == TaskState::Pending
    }
}

/// Measurements recorded when a task closes successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseStats {
    pub runtime: Duration,
    /// Peak sampled memory in bytes.
    pub memory: u64,
    pub completion_time: OffsetDateTime,
    pub result: Option<String>,
}
