use std::sync::{Arc, Mutex};

use memsched::engine::StatusSnapshot;
use memsched::errors::Result;
use memsched::present::{Command, Presenter};

#[derive(Debug, Default)]
struct Log {
    started: bool,
    stopped: bool,
    snapshots: Vec<StatusSnapshot>,
    /// (deliver once this many updates have been seen, command)
    scheduled: Vec<(usize, Command)>,
}

/// Presenter that records every snapshot and replays scheduled commands.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    log: Arc<Mutex<Log>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `command` from `get_commands` once `updates` snapshots have
    /// been received.
    pub fn send_after(&self, updates: usize, command: Command) {
        self.log.lock().unwrap().scheduled.push((updates, command));
    }

    pub fn snapshots(&self) -> Vec<StatusSnapshot> {
        self.log.lock().unwrap().snapshots.clone()
    }

    pub fn started(&self) -> bool {
        self.log.lock().unwrap().started
    }

    pub fn stopped(&self) -> bool {
        self.log.lock().unwrap().stopped
    }

    pub fn boxed(&self) -> Box<dyn Presenter> {
        Box::new(self.clone())
    }
}

impl Presenter for RecordingPresenter {
    fn start(&mut self) -> Result<()> {
        self.log.lock().unwrap().started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().stopped = true;
    }

    fn update(&mut self, snapshot: &StatusSnapshot) {
        self.log.lock().unwrap().snapshots.push(snapshot.clone());
    }

    fn get_commands(&mut self) -> Option<Vec<Command>> {
        let mut log = self.log.lock().unwrap();
        let seen = log.snapshots.len();
        let (due, later): (Vec<_>, Vec<_>) =
            log.scheduled.drain(..).partition(|(after, _)| *after <= seen);
        log.scheduled = later;
        if due.is_empty() {
            None
        } else {
            Some(due.into_iter().map(|(_, c)| c).collect())
        }
    }
}
