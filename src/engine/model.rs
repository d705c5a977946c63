// src/engine/model.rs

use std::time::Duration;

use time::OffsetDateTime;
use tracing::debug;

use crate::ledger::{TaskLedger, TaskState};

/// Running averages over completed tasks.
///
/// Refitting walks the whole ledger, so the run loop only does it when a
/// slot closed or nothing is running.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageModel {
    samples: usize,
    mean_runtime: Option<Duration>,
    mean_memory: Option<u64>,
}

impl UsageModel {
    pub fn refit(&mut self, ledger: &TaskLedger) {
        let mut samples = 0usize;
        let mut runtime = 0f64;
        let mut memory = 0u128;

        for task in ledger.tasks().iter().filter(|t| t.state == TaskState::Done) {
            if let (Some(r), Some(m)) = (task.observed_runtime, task.observed_memory) {
                samples += 1;
                runtime += r.as_secs_f64();
                memory += u128::from(m);
            }
        }

        if samples == 0 {
            *self = Self::default();
            return;
        }

        self.samples = samples;
        self.mean_runtime = Some(Duration::from_secs_f64(runtime / samples as f64));
        self.mean_memory = u64::try_from(memory / samples as u128).ok();
        debug!(
            samples,
            mean_runtime_ms = self.mean_runtime.map(|d| d.as_millis() as u64),
            mean_memory = self.mean_memory,
            "usage model refitted"
        );
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn mean_runtime(&self) -> Option<Duration> {
        self.mean_runtime
    }

    pub fn mean_memory(&self) -> Option<u64> {
        self.mean_memory
    }

    /// Best-effort finish time for `remaining` tasks run `parallelism` at a
    /// time. `None` when nothing has completed yet.
    pub fn expected_finish(
        &self,
        remaining: usize,
        parallelism: usize,
        now: OffsetDateTime,
    ) -> Option<OffsetDateTime> {
        if remaining == 0 {
            return Some(now);
        }
        let mean = self.mean_runtime?;
        let waves = remaining.div_ceil(parallelism.max(1));
        let total = mean.checked_mul(u32::try_from(waves).ok()?)?;
        now.checked_add(time::Duration::try_from(total).ok()?)
    }
}
