use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use memsched::errors::{Result, ResultError};
use memsched::exec::{ExitState, ManagedProcess, ProcessBackend};
use memsched::ledger::{Task, TaskId};
use memsched::sample::ResourceUsage;
use memsched::types::Children;

/// Scripted behaviour of one fake worker.
#[derive(Debug, Clone)]
pub struct FakeScript {
    /// Exit on the n-th `exit_status` call; `None` runs until stopped.
    pub exit_after_polls: Option<u32>,
    pub exit_code: i32,
    pub memory: u64,
    pub updates: Vec<String>,
    pub result: Option<String>,
}

impl Default for FakeScript {
    fn default() -> Self {
        Self {
            exit_after_polls: Some(1),
            exit_code: 0,
            memory: 0,
            updates: Vec::new(),
            result: None,
        }
    }
}

impl FakeScript {
    pub fn exits_after(polls: u32) -> Self {
        Self {
            exit_after_polls: Some(polls),
            ..Self::default()
        }
    }

    pub fn runs_forever() -> Self {
        Self {
            exit_after_polls: None,
            ..Self::default()
        }
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn memory(mut self, bytes: u64) -> Self {
        self.memory = bytes;
        self
    }

    pub fn update(mut self, line: &str) -> Self {
        self.updates.push(line.to_string());
        self
    }

    pub fn result(mut self, value: &str) -> Self {
        self.result = Some(value.to_string());
        self
    }
}

#[derive(Debug)]
struct FakeState {
    base: Instant,
    scripts: HashMap<String, FakeScript>,
    default_script: FakeScript,
    memory_override: HashMap<TaskId, u64>,
    launched: Vec<TaskId>,
    terminated: Vec<TaskId>,
    killed: Vec<TaskId>,
    closed: Vec<TaskId>,
    live: HashSet<TaskId>,
    max_live: usize,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            base: Instant::now(),
            scripts: HashMap::new(),
            default_script: FakeScript::default(),
            memory_override: HashMap::new(),
            launched: Vec::new(),
            terminated: Vec::new(),
            killed: Vec::new(),
            closed: Vec::new(),
            live: HashSet::new(),
            max_live: 0,
        }
    }
}

/// A process backend whose workers follow a [`FakeScript`] keyed by task
/// `args`, and which records every launch and stop signal.
///
/// Clones share state, so tests keep one clone to inspect after handing the
/// other to the scheduler. Launch times are strictly increasing.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, args: &str, script: FakeScript) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(args.to_string(), script);
        self
    }

    pub fn default_script(self, script: FakeScript) -> Self {
        self.state.lock().unwrap().default_script = script;
        self
    }

    /// Override the memory reported for a task's live process.
    pub fn set_memory(&self, task: TaskId, bytes: u64) {
        self.state.lock().unwrap().memory_override.insert(task, bytes);
    }

    pub fn launched(&self) -> Vec<TaskId> {
        self.state.lock().unwrap().launched.clone()
    }

    pub fn terminated(&self) -> Vec<TaskId> {
        self.state.lock().unwrap().terminated.clone()
    }

    pub fn killed(&self) -> Vec<TaskId> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn closed(&self) -> Vec<TaskId> {
        self.state.lock().unwrap().closed.clone()
    }

    /// Most processes ever alive at once.
    pub fn max_live(&self) -> usize {
        self.state.lock().unwrap().max_live
    }
}

impl ProcessBackend for FakeBackend {
    fn launch(&mut self, task: &Task, capture_result: bool) -> Result<Box<dyn ManagedProcess>> {
        let mut state = self.state.lock().unwrap();
        let script = state
            .scripts
            .get(&task.args)
            .cloned()
            .unwrap_or_else(|| state.default_script.clone());

        let started_at = state.base + Duration::from_millis(state.launched.len() as u64 + 1);
        state.launched.push(task.id);
        state.live.insert(task.id);
        state.max_live = state.max_live.max(state.live.len());

        Ok(Box::new(FakeProcess {
            task: task.id,
            started_at,
            state: Arc::clone(&self.state),
            capture_result,
            polls: 0,
            exit: None,
            updates: script.updates.iter().cloned().collect(),
            result: script.result.clone(),
            script,
            closed: false,
        }))
    }
}

#[derive(Debug)]
pub struct FakeProcess {
    task: TaskId,
    started_at: Instant,
    state: Arc<Mutex<FakeState>>,
    capture_result: bool,
    script: FakeScript,
    polls: u32,
    exit: Option<ExitState>,
    updates: VecDeque<String>,
    result: Option<String>,
    closed: bool,
}

impl FakeProcess {
    fn finish(&mut self, exit: ExitState) {
        self.exit = Some(exit);
        self.state.lock().unwrap().live.remove(&self.task);
    }

    fn is_live(&self) -> bool {
        self.exit.is_none()
    }
}

impl ManagedProcess for FakeProcess {
    fn task(&self) -> TaskId {
        self.task
    }

    fn started_at(&self) -> Instant {
        self.started_at
    }

    fn poll_update(&mut self) -> Option<String> {
        let mut latest = None;
        while let Some(line) = self.updates.pop_front() {
            latest = Some(line);
        }
        latest
    }

    fn exit_status(&mut self) -> io::Result<ExitState> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        self.polls += 1;
        match self.script.exit_after_polls {
            Some(n) if self.polls >= n => {
                let exit = ExitState::Exited(self.script.exit_code);
                self.finish(exit);
                Ok(exit)
            }
            _ => Ok(ExitState::Running),
        }
    }

    fn resource_usage(&mut self, _children: &Children) -> ResourceUsage {
        if !self.is_live() {
            return ResourceUsage::default();
        }
        let memory = self
            .state
            .lock()
            .unwrap()
            .memory_override
            .get(&self.task)
            .copied()
            .unwrap_or(self.script.memory);
        ResourceUsage {
            cpu_percent: 0.0,
            memory,
        }
    }

    fn get_result(
        &mut self,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, ResultError>> + Send + '_>> {
        Box::pin(async move {
            if !self.capture_result {
                return Err(ResultError::NotCaptured);
            }
            match self.exit {
                None | Some(ExitState::Running) => Err(ResultError::StillRunning),
                Some(exit) if !exit.success() => {
                    Err(ResultError::ProcessFailed(exit.code().unwrap_or(-1)))
                }
                Some(_) => self.result.take().ok_or(ResultError::NoResult),
            }
        })
    }

    fn terminate(&mut self, _children: &Children) -> io::Result<()> {
        if self.is_live() {
            self.state.lock().unwrap().terminated.push(self.task);
            self.finish(ExitState::Signaled(15));
        }
        Ok(())
    }

    fn kill(&mut self, _children: &Children) -> io::Result<()> {
        if self.is_live() {
            self.state.lock().unwrap().killed.push(self.task);
            self.finish(ExitState::Signaled(9));
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.is_live() {
            self.finish(ExitState::Signaled(9));
        }
        self.state.lock().unwrap().closed.push(self.task);
    }
}
