// src/engine/mod.rs

//! Run loop for memsched.
//!
//! - [`runtime`] drives the scheduler tick by tick, talks to the presenter
//!   and handles control commands.
//! - [`snapshot`] assembles the per-tick status view.
//! - [`model`] keeps the resource usage model behind the finish estimate.

pub mod model;
pub mod runtime;
pub mod snapshot;

use std::collections::BTreeMap;
use std::time::Duration;

use crate::ledger::TaskId;

pub use model::UsageModel;
pub use runtime::Runtime;
pub use snapshot::{SlotStatus, StatusSnapshot};

/// Knobs of the run loop that are not part of the run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// How long workers get to exit after a graceful terminate before they
    /// are killed.
    pub terminate_grace: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            terminate_grace: Duration::from_secs(5),
        }
    }
}

/// Summary returned when the run loop ends without a fatal error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub completed: usize,
    pub total: usize,
    pub evictions: usize,
    /// Captured worker results, by task id.
    pub results: BTreeMap<TaskId, String>,
    /// `true` if a control command ended the run before every task completed.
    pub stopped_early: bool,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}
