// src/sched/mod.rs

//! Memory-aware admission control and eviction.
//!
//! - [`slot`] is the fixed pool entry owning one worker process.
//! - [`mitigation`] plans youngest-first evictions under memory pressure.
//! - [`scheduler`] runs the per-tick poll / throttle / refresh / mitigate /
//!   admit cycle.

pub mod mitigation;
pub mod scheduler;
pub mod slot;

pub use mitigation::{EvictionPlan, RunningSlot, plan_evictions};
pub use scheduler::{Scheduler, SchedulerOptions, TickOutcome};
pub use slot::{IDLE_UPDATE, ProcessSlot};
