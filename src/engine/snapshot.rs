// src/engine/snapshot.rs

use time::OffsetDateTime;

use crate::engine::model::UsageModel;
use crate::exec::ProcessBackend;
use crate::exec::protocol::now_local;
use crate::ledger::{TaskId, TaskLedger};
use crate::sched::Scheduler;

#[derive(Debug, Clone, PartialEq)]
pub struct SlotStatus {
    pub index: usize,
    pub task: Option<TaskId>,
    pub latest_update: String,
    /// Last sampled memory of the slot's process tree.
    pub memory: u64,
}

/// Everything a presenter gets to see about one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub slots: Vec<SlotStatus>,
    pub active_threads: usize,
    /// Concurrency cap in force (1 while benchmarking).
    pub thread_cap: usize,
    pub max_threads: usize,
    pub memory_used: u64,
    pub max_memory: u64,
    pub hard_limit: u64,
    pub cpu_percent: f64,
    pub expected_memory: u64,
    pub completed_tasks: usize,
    pub remaining_tasks: usize,
    pub total_tasks: usize,
    pub evictions: usize,
    pub expected_finish: Option<OffsetDateTime>,
    pub admitting: bool,
}

impl StatusSnapshot {
    pub fn capture<B: ProcessBackend>(
        scheduler: &Scheduler<B>,
        ledger: &TaskLedger,
        model: &UsageModel,
    ) -> Self {
        let limits = scheduler.limits();
        let usage = scheduler.usage();
        let remaining = ledger.total() - ledger.completed();
        let thread_cap = scheduler.effective_cap();

        let slots = scheduler
            .slots()
            .iter()
            .map(|slot| SlotStatus {
                index: slot.index(),
                task: slot.assigned(),
                latest_update: slot.latest_update().to_string(),
                memory: slot.last_usage().memory,
            })
            .collect();

        Self {
            slots,
            active_threads: scheduler.occupied(),
            thread_cap,
            max_threads: limits.max_threads,
            memory_used: usage.memory,
            max_memory: limits.max_memory,
            hard_limit: limits.max_memory_hard_limit,
            cpu_percent: usage.cpu_percent,
            expected_memory: scheduler.expected_memory(),
            completed_tasks: ledger.completed(),
            remaining_tasks: remaining,
            total_tasks: ledger.total(),
            evictions: scheduler.evictions(),
            expected_finish: model.expected_finish(remaining, thread_cap, now_local()),
            admitting: scheduler.is_admitting(),
        }
    }
}
