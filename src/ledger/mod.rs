// src/ledger/mod.rs

//! The task ledger: authoritative table of every runnable task.
//!
//! - [`task`] holds the task record and its lifecycle state.
//! - [`store`] is the append-only completed-task log used for resuming.
//!
//! The ledger only holds tasks that still need to run. Tasks whose `args`
//! already appear in the completed log are dropped at construction and
//! never counted towards the run's total.

pub mod store;
pub mod task;

use std::path::Path;

use anyhow::anyhow;
use tracing::{debug, info};

use crate::config::TaskSpec;
use crate::errors::{MemschedError, Result};

pub use store::{CompletedLog, CompletedRow};
pub use task::{CloseStats, Task, TaskId, TaskState};

#[derive(Debug)]
pub struct TaskLedger {
    /// Runnable tasks in registration order. Ids are ascending.
    tasks: Vec<Task>,
    log: CompletedLog,
    completed: usize,
}

impl TaskLedger {
    /// Build the ledger from the configured task list and the completed log
    /// at `log_path`.
    ///
    /// A task's id is its position in the configured list, so ids stay the
    /// same across resumed runs.
    pub fn open(specs: &[TaskSpec], log_path: &Path) -> Result<Self> {
        let (log, done) = CompletedLog::open(log_path)?;

        let tasks: Vec<Task> = specs
            .iter()
            .enumerate()
            .filter(|(_, spec)| !done.contains(&spec.args))
            .map(|(id, spec)| Task::from_spec(id, spec))
            .collect();

        if tasks.is_empty() {
            return Err(MemschedError::NoRunnableTasks);
        }

        info!(
            configured = specs.len(),
            skipped = specs.len() - tasks.len(),
            runnable = tasks.len(),
            "task ledger initialised"
        );

        Ok(Self {
            tasks,
            log,
            completed: 0,
        })
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.index_of(id).map(|i| &self.tasks[i])
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Number of tasks this run has to complete.
    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Tasks still waiting for admission.
    pub fn pending(&self) -> usize {
        self.tasks.iter().filter(|t| t.remaining_to_do()).count()
    }

    pub fn is_finished(&self) -> bool {
        self.completed == self.tasks.len()
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    /// Pending tasks whose expected memory is strictly below `available`,
    /// in ledger order.
    pub fn eligible_tasks(&self, available: u64) -> impl Iterator<Item = &Task> + '_ {
        self.tasks
            .iter()
            .filter(move |t| t.remaining_to_do() && t.expected_memory < available)
    }

    pub fn first_eligible(&self, available: u64) -> Option<TaskId> {
        self.eligible_tasks(available).next().map(|t| t.id)
    }

    /// Pending task with the smallest expected memory, if any.
    pub fn smallest_pending(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.remaining_to_do())
            .min_by_key(|t| t.expected_memory)
    }

    pub fn mark_admitted(&mut self, id: TaskId) -> Result<()> {
        let task = self.transition(id, TaskState::Pending, TaskState::Running)?;
        debug!(task = task.id, args = %task.args, "task admitted");
        Ok(())
    }

    pub fn mark_closed(&mut self, id: TaskId, stats: CloseStats) -> Result<()> {
        let task = self.transition(id, TaskState::Running, TaskState::Done)?;
        task.observed_runtime = Some(stats.runtime);
        task.observed_memory = Some(stats.memory);
        task.completion_time = Some(stats.completion_time);
        task.result = stats.result;
        self.completed += 1;
        Ok(())
    }

    /// Return a running task to the pending pool.
    pub fn mark_evicted(&mut self, id: TaskId) -> Result<()> {
        let task = self.transition(id, TaskState::Running, TaskState::Pending)?;
        debug!(task = task.id, "task returned to pending pool");
        Ok(())
    }

    /// Append a closed task's row to the completed log.
    pub fn persist(&mut self, id: TaskId) -> Result<()> {
        let index = self.require(id)?;
        let task = &self.tasks[index];
        if task.state != TaskState::Done {
            return Err(anyhow!("task {id} cannot be persisted before it has closed").into());
        }
        let row = CompletedRow::from_task(task);
        self.log.append(&row)
    }

    fn index_of(&self, id: TaskId) -> Option<usize> {
        self.tasks.binary_search_by_key(&id, |t| t.id).ok()
    }

    fn require(&self, id: TaskId) -> Result<usize> {
        self.index_of(id)
            .ok_or_else(|| anyhow!("unknown task id {id}").into())
    }

    fn transition(&mut self, id: TaskId, from: TaskState, to: TaskState) -> Result<&mut Task> {
        let index = self.require(id)?;
        let task = &mut self.tasks[index];
        if task.state != from {
            return Err(anyhow!(
                "task {id} cannot move to {to:?}: expected {from:?}, found {:?}",
                task.state
            )
            .into());
        }
        task.state = to;
        Ok(task)
    }
}
