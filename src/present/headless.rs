// src/present/headless.rs

use tracing::debug;

use crate::engine::StatusSnapshot;
use crate::errors::Result;
use crate::present::{Command, Presenter};

/// Presenter that renders nothing; snapshots only go to `debug` logs.
#[derive(Debug, Default)]
pub struct HeadlessPresenter {
    updates: u64,
}

impl HeadlessPresenter {
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl Presenter for HeadlessPresenter {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {
        debug!(updates = self.updates, "headless presenter stopped");
    }

    fn update(&mut self, snapshot: &StatusSnapshot) {
        self.updates += 1;
        debug!(
            active = snapshot.active_threads,
            cap = snapshot.thread_cap,
            memory = snapshot.memory_used,
            expected = snapshot.expected_memory,
            remaining = snapshot.remaining_tasks,
            "status"
        );
    }

    fn get_commands(&mut self) -> Option<Vec<Command>> {
        None
    }
}
