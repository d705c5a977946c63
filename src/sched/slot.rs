// src/sched/slot.rs

use std::fmt;
use std::time::Instant;

use crate::exec::ManagedProcess;
use crate::ledger::TaskId;
use crate::sample::ResourceUsage;

/// Placeholder shown for a slot with nothing to report.
pub const IDLE_UPDATE: &str = "-";

/// One of the fixed `max_threads` process slots.
///
/// A slot owns the process of its assigned task; the assigned task id is the
/// process's task, so the two can never disagree.
pub struct ProcessSlot {
    index: usize,
    process: Option<Box<dyn ManagedProcess>>,
    latest_update: String,
    start_time: Option<Instant>,
    last_usage: ResourceUsage,
    peak_memory: u64,
}

impl fmt::Debug for ProcessSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSlot")
            .field("index", &self.index)
            .field("assigned", &self.assigned())
            .field("latest_update", &self.latest_update)
            .field("last_usage", &self.last_usage)
            .field("peak_memory", &self.peak_memory)
            .finish_non_exhaustive()
    }
}

impl ProcessSlot {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            process: None,
            latest_update: IDLE_UPDATE.to_string(),
            start_time: None,
            last_usage: ResourceUsage::default(),
            peak_memory: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_free(&self) -> bool {
        self.process.is_none()
    }

    pub fn assigned(&self) -> Option<TaskId> {
        self.process.as_ref().map(|p| p.task())
    }

    pub fn latest_update(&self) -> &str {
        &self.latest_update
    }

    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    pub fn last_usage(&self) -> ResourceUsage {
        self.last_usage
    }

    pub fn peak_memory(&self) -> u64 {
        self.peak_memory
    }

    pub(crate) fn process_mut(&mut self) -> Option<&mut (dyn ManagedProcess + 'static)> {
        self.process.as_deref_mut()
    }

    pub(crate) fn assign(&mut self, process: Box<dyn ManagedProcess>) {
        debug_assert!(self.is_free(), "slot {} assigned twice", self.index);
        self.start_time = Some(process.started_at());
        self.process = Some(process);
        self.latest_update = IDLE_UPDATE.to_string();
        self.last_usage = ResourceUsage::default();
        self.peak_memory = 0;
    }

    pub(crate) fn set_update(&mut self, update: String) {
        self.latest_update = update;
    }

    pub(crate) fn record_usage(&mut self, usage: ResourceUsage) {
        self.last_usage = usage;
        self.peak_memory = self.peak_memory.max(usage.memory);
    }

    /// Close the slot's process (if any) and return the slot to idle.
    pub(crate) fn reset(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.close();
        }
        self.latest_update = IDLE_UPDATE.to_string();
        self.start_time = None;
        self.last_usage = ResourceUsage::default();
        self.peak_memory = 0;
    }
}
