// src/sched/mitigation.rs

//! Overmemory eviction planning.
//!
//! Planning is pure: given the running slots with their last sampled memory,
//! pick the eviction order and decide whether it brings usage back under the
//! soft budget. The scheduler carries the plan out.

use std::time::Instant;

use crate::ledger::TaskId;

/// A running slot as seen at the start of mitigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningSlot {
    pub slot: usize,
    pub task: TaskId,
    pub started_at: Instant,
    pub memory: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionPlan {
    /// Slot indices, in the order they are evicted.
    pub evict: Vec<usize>,
    /// Usage left once every planned eviction has happened.
    pub remaining: u64,
    /// `false` when evicting everything still cannot keep the run under
    /// budget: usage stays above it, or one task alone exceeds it and would
    /// just be admitted again.
    pub converged: bool,
}

/// Youngest first; ties go to the highest slot index.
pub fn eviction_order(running: &[RunningSlot]) -> Vec<RunningSlot> {
    let mut order = running.to_vec();
    order.sort_by(|a, b| {
        b.started_at
            .cmp(&a.started_at)
            .then_with(|| b.slot.cmp(&a.slot))
    });
    order
}

pub fn plan_evictions(running: &[RunningSlot], usage: u64, budget: u64) -> EvictionPlan {
    let mut remaining = usage;
    let mut evict = Vec::new();

    for victim in eviction_order(running) {
        if remaining <= budget {
            break;
        }
        remaining = remaining.saturating_sub(victim.memory);
        evict.push(victim.slot);
    }

    let evicted_everything = !running.is_empty() && evict.len() == running.len();
    let converged = if evicted_everything {
        remaining <= budget && running.iter().all(|r| r.memory <= budget)
    } else {
        remaining <= budget
    };

    EvictionPlan {
        evict,
        remaining,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn running(memories: &[u64]) -> Vec<RunningSlot> {
        let base = Instant::now();
        memories
            .iter()
            .enumerate()
            .map(|(i, &memory)| RunningSlot {
                slot: i,
                task: i + 10,
                started_at: base + Duration::from_secs(i as u64),
                memory,
            })
            .collect()
    }

    #[test]
    fn evicts_youngest_until_under_budget() {
        let slots = running(&[400, 300, 500]);
        let plan = plan_evictions(&slots, 1200, 800);
        assert_eq!(plan.evict, vec![2]);
        assert_eq!(plan.remaining, 700);
        assert!(plan.converged);
    }

    #[test]
    fn ties_break_on_highest_slot_index() {
        let now = Instant::now();
        let slots: Vec<_> = (0..3)
            .map(|i| RunningSlot {
                slot: i,
                task: i,
                started_at: now,
                memory: 100,
            })
            .collect();
        let order: Vec<_> = eviction_order(&slots).iter().map(|r| r.slot).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn oversized_oldest_task_fails_after_evicting_all() {
        // 0.5, 0.5, 4.0 GiB-ish with the big one started first.
        let slots = running(&[4000, 500, 500]);
        let plan = plan_evictions(&slots, 5000, 1000);
        assert_eq!(plan.evict, vec![2, 1, 0]);
        assert!(!plan.converged);
    }

    #[test]
    fn oversized_youngest_task_is_evicted_alone() {
        let slots = running(&[500, 500, 4000]);
        let plan = plan_evictions(&slots, 5000, 1000);
        assert_eq!(plan.evict, vec![2]);
        assert_eq!(plan.remaining, 1000);
        assert!(plan.converged);
    }

    #[test]
    fn eviction_count_bounded_by_running_slots() {
        let slots = running(&[100, 100]);
        let plan = plan_evictions(&slots, 10_000, 50);
        assert_eq!(plan.evict.len(), 2);
        assert!(!plan.converged);
    }
}
