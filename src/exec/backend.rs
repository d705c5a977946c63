// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The scheduler never spawns processes itself; it asks a [`ProcessBackend`]
//! to launch a task and gets back a boxed [`ManagedProcess`]. This keeps the
//! admission and mitigation logic testable with a scripted backend, while
//! production uses [`CommandBackend`], which wraps [`ProcessHandle`].

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::{Duration, Instant};

use crate::config::WorkerConfig;
use crate::errors::{MemschedError, Result, ResultError};
use crate::exec::handle::{ExitState, ProcessHandle, ProcessSpec};
use crate::exec::protocol::file_stamp;
use crate::ledger::{Task, TaskId};
use crate::sample::ResourceUsage;
use crate::types::Children;

/// Everything the scheduler needs from one running worker.
pub trait ManagedProcess: Send {
    fn task(&self) -> TaskId;

    fn started_at(&self) -> Instant;

    /// Drain queued updates, returning the newest.
    fn poll_update(&mut self) -> Option<String>;

    fn exit_status(&mut self) -> io::Result<ExitState>;

    fn resource_usage(&mut self, children: &Children) -> ResourceUsage;

    /// Bounded wait for the worker's result after a successful exit.
    fn get_result(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, ResultError>> + Send + '_>>;

    fn terminate(&mut self, children: &Children) -> io::Result<()>;

    fn kill(&mut self, children: &Children) -> io::Result<()>;

    fn close(&mut self);
}

/// Something that can start a worker for a task.
pub trait ProcessBackend: Send {
    fn launch(&mut self, task: &Task, capture_result: bool) -> Result<Box<dyn ManagedProcess>>;
}

impl ManagedProcess for ProcessHandle {
    fn task(&self) -> TaskId {
        ProcessHandle::task(self)
    }

    fn started_at(&self) -> Instant {
        ProcessHandle::started_at(self)
    }

    fn poll_update(&mut self) -> Option<String> {
        ProcessHandle::poll_update(self)
    }

    fn exit_status(&mut self) -> io::Result<ExitState> {
        ProcessHandle::exit_status(self)
    }

    fn resource_usage(&mut self, children: &Children) -> ResourceUsage {
        ProcessHandle::resource_usage(self, children)
    }

    fn get_result(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, ResultError>> + Send + '_>> {
        Box::pin(ProcessHandle::get_result(self, timeout))
    }

    fn terminate(&mut self, children: &Children) -> io::Result<()> {
        ProcessHandle::terminate(self, children)
    }

    fn kill(&mut self, children: &Children) -> io::Result<()> {
        ProcessHandle::kill(self, children)
    }

    fn close(&mut self) {
        ProcessHandle::close(self)
    }
}

/// Production backend: runs the configured worker command through `sh -c`.
///
/// The task's `args` is passed as `$1` and in `MEMSCHED_TASK_ARGS`; its id in
/// `MEMSCHED_TASK_ID`. Worker stderr goes to `<log_dir>/<id> <stamp>.log`.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    worker: WorkerConfig,
    log_dir: PathBuf,
}

impl CommandBackend {
    pub fn new(worker: WorkerConfig, log_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&log_dir)?;
        Ok(Self { worker, log_dir })
    }

    fn spec_for(&self, task: &Task, capture_result: bool) -> ProcessSpec {
        ProcessSpec::shell(task.id, &self.worker.cmd)
            .arg("memsched-worker")
            .arg(task.args.clone())
            .env("MEMSCHED_TASK_ID", task.id.to_string())
            .env("MEMSCHED_TASK_ARGS", task.args.clone())
            .log_file(self.log_dir.join(format!("{} {}.log", task.id, file_stamp())))
            .capture_result(capture_result)
    }
}

impl ProcessBackend for CommandBackend {
    fn launch(&mut self, task: &Task, capture_result: bool) -> Result<Box<dyn ManagedProcess>> {
        let spec = self.spec_for(task, capture_result);
        let handle = ProcessHandle::start(spec).map_err(|source| MemschedError::Spawn {
            task: task.id,
            source,
        })?;
        Ok(Box::new(handle))
    }
}
