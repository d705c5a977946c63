// src/exec/handle.rs

//! Handle around one worker OS process.

use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::ResultError;
use crate::exec::protocol::{WorkerLine, parse_line};
use crate::exec::signal::{self, StopSignal};
use crate::ledger::TaskId;
use crate::sample::{ResourceSampler, ResourceUsage};
use crate::types::Children;

/// Liveness of a process as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Running,
    /// Exited normally with this code.
    Exited(i32),
    /// Terminated by this signal number.
    Signaled(i32),
}

impl ExitState {
    pub fn is_running(&self) -> bool {
        matches!(self, ExitState::Running)
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitState::Exited(0))
    }

    /// Exit code, with signals reported as the negated signal number.
    pub fn code(&self) -> Option<i32> {
        match *self {
            ExitState::Running => None,
            ExitState::Exited(code) => Some(code),
            ExitState::Signaled(sig) => Some(-sig),
        }
    }
}

impl From<std::process::ExitStatus> for ExitState {
    fn from(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitState::Exited(code),
            None => ExitState::Signaled(status.signal().unwrap_or(0)),
        }
    }
}

/// What to run for one task.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub task: TaskId,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Worker stderr is appended here; discarded when `None`.
    pub log_file: Option<PathBuf>,
    pub capture_result: bool,
}

impl ProcessSpec {
    /// Run `script` through `sh -c`.
    pub fn shell(task: TaskId, script: &str) -> Self {
        Self {
            task,
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: Vec::new(),
            log_file: None,
            capture_result: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    pub fn capture_result(mut self, capture: bool) -> Self {
        self.capture_result = capture;
        self
    }
}

enum ResultSlot {
    NotCaptured,
    Pending(oneshot::Receiver<String>),
    Consumed,
}

/// One started worker process.
///
/// The handle exclusively owns the child, its update/result channels and its
/// resource sampler. Nothing here blocks: exit checks use `try_wait`, update
/// reads drain a channel, and the only waits ([`join`](Self::join),
/// [`get_result`](Self::get_result)) take an explicit timeout.
pub struct ProcessHandle {
    task: TaskId,
    pid: u32,
    child: Option<Child>,
    exit: Option<ExitState>,
    sampler: ResourceSampler,
    updates: Option<mpsc::UnboundedReceiver<String>>,
    result: ResultSlot,
    reader: Option<JoinHandle<()>>,
    started_at: Instant,
    closed: bool,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("task", &self.task)
            .field("pid", &self.pid)
            .field("exit", &self.exit)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    /// Spawn the process and bind a sampler to its pid.
    ///
    /// Must be called from within a Tokio runtime: worker stdout is read by a
    /// background task that feeds the update and result channels.
    pub fn start(spec: ProcessSpec) -> io::Result<Self> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        match &spec.log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                cmd.stderr(Stdio::from(file));
            }
            None => {
                cmd.stderr(Stdio::null());
            }
        }

        let mut child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("process was reaped before its pid was read"))?;

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (result, result_tx) = if spec.capture_result {
            let (tx, rx) = oneshot::channel();
            (ResultSlot::Pending(rx), Some(tx))
        } else {
            (ResultSlot::NotCaptured, None)
        };

        let reader = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(forward_output(spec.task, stdout, update_tx, result_tx)));

        info!(task = spec.task, pid, program = %spec.program, "started worker process");

        Ok(Self {
            task: spec.task,
            pid,
            child: Some(child),
            exit: None,
            sampler: ResourceSampler::new(pid),
            updates: Some(update_rx),
            result,
            reader,
            started_at: Instant::now(),
            closed: false,
        })
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Drain every queued update and return the newest one.
    pub fn poll_update(&mut self) -> Option<String> {
        let rx = self.updates.as_mut()?;
        let mut latest = None;
        while let Ok(update) = rx.try_recv() {
            latest = Some(update);
        }
        latest
    }

    /// Non-blocking exit check. Once an exit is seen it is cached.
    pub fn exit_status(&mut self) -> io::Result<ExitState> {
        if let Some(state) = self.exit {
            return Ok(state);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(ExitState::Running);
        };
        match child.try_wait()? {
            Some(status) => {
                let state = ExitState::from(status);
                debug!(task = self.task, pid = self.pid, ?state, "worker process exited");
                self.exit = Some(state);
                Ok(state)
            }
            None => Ok(ExitState::Running),
        }
    }

    /// Wait up to `timeout` for the process to exit.
    pub async fn join(&mut self, timeout: Duration) -> io::Result<ExitState> {
        if let Some(state) = self.exit {
            return Ok(state);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(ExitState::Running);
        };
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                let state = ExitState::from(status?);
                self.exit = Some(state);
                Ok(state)
            }
            Err(_) => Ok(ExitState::Running),
        }
    }

    /// Current descendants of the process; empty once it has exited.
    pub fn children(&mut self) -> Vec<u32> {
        match self.exit_status() {
            Ok(ExitState::Running) => self.sampler.children(),
            _ => Vec::new(),
        }
    }

    /// CPU and memory of the process, optionally summed with its children.
    ///
    /// A reaped process reports zero: its pid may already belong to someone else.
    pub fn resource_usage(&mut self, children: &Children) -> ResourceUsage {
        if self.exit.is_some() {
            return ResourceUsage::default();
        }
        self.sampler.sample(children)
    }

    /// Retrieve the single result value sent by the worker.
    ///
    /// Only meaningful once the process has exited successfully; waits at most
    /// `timeout` for the value to come through the pipe.
    pub async fn get_result(&mut self, timeout: Duration) -> Result<String, ResultError> {
        if matches!(self.result, ResultSlot::NotCaptured) {
            return Err(ResultError::NotCaptured);
        }

        match self.exit_status() {
            Ok(ExitState::Running) | Err(_) => return Err(ResultError::StillRunning),
            Ok(state) if !state.success() => {
                return Err(ResultError::ProcessFailed(state.code().unwrap_or(-1)));
            }
            Ok(_) => {}
        }

        let ResultSlot::Pending(rx) = &mut self.result else {
            return Err(ResultError::NoResult);
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => {
                self.result = ResultSlot::Consumed;
                Ok(value)
            }
            Ok(Err(_)) => {
                // Worker closed stdout without sending a result.
                self.result = ResultSlot::Consumed;
                Err(ResultError::NoResult)
            }
            Err(_) => Err(ResultError::NoResult),
        }
    }

    /// Ask the process (and selected children) to stop with `SIGTERM`.
    pub fn terminate(&mut self, children: &Children) -> io::Result<()> {
        self.stop(StopSignal::Terminate, children)
    }

    /// Stop the process (and selected children) immediately with `SIGKILL`.
    pub fn kill(&mut self, children: &Children) -> io::Result<()> {
        self.stop(StopSignal::Kill, children)
    }

    fn stop(&mut self, signal: StopSignal, children: &Children) -> io::Result<()> {
        let exited = !self.exit_status()?.is_running();

        // Resolve children before signalling the root; once it dies they get
        // reparented and can no longer be found through it.
        let child_pids = match (children, exited) {
            (Children::All, true) => Vec::new(),
            _ => self.sampler.resolve_children(children),
        };

        if !exited {
            signal::send(self.pid, signal)?;
        }
        let delivered = signal::send_each(&child_pids, signal);

        debug!(
            task = self.task,
            pid = self.pid,
            ?signal,
            already_exited = exited,
            children = child_pids.len(),
            delivered,
            "stop signal sent"
        );
        Ok(())
    }

    /// Release the child, channels and reader task. Idempotent.
    ///
    /// A process that is still running when closed is killed.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut child) = self.child.take() {
            if self.exit.is_none() {
                match child.try_wait() {
                    Ok(Some(status)) => self.exit = Some(ExitState::from(status)),
                    _ => {
                        warn!(task = self.task, pid = self.pid, "closing a live process; killing it");
                        let _ = child.start_kill();
                        self.exit = Some(ExitState::Signaled(libc::SIGKILL));
                    }
                }
            }
        }

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.updates = None;
        if matches!(self.result, ResultSlot::Pending(_)) {
            self.result = ResultSlot::Consumed;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Split worker stdout into update and result messages.
async fn forward_output(
    task: TaskId,
    stdout: ChildStdout,
    updates: mpsc::UnboundedSender<String>,
    mut result: Option<oneshot::Sender<String>>,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                WorkerLine::Update(update) => {
                    let _ = updates.send(update);
                }
                WorkerLine::Result(value) => match result.take() {
                    Some(tx) => {
                        let _ = tx.send(value);
                    }
                    None => warn!(task, "ignoring result line (already received or not captured)"),
                },
            },
            Ok(None) => break,
            Err(e) => {
                debug!(task, error = %e, "stopped reading worker stdout");
                break;
            }
        }
    }
}
