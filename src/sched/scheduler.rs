// src/sched/scheduler.rs

use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::config::{Limits, RunConfig};
use crate::errors::{MemschedError, Result, ResultError};
use crate::exec::protocol::now_local;
use crate::exec::{ExitState, ProcessBackend, StopSignal};
use crate::ledger::{CloseStats, TaskId, TaskLedger};
use crate::sample::ResourceUsage;
use crate::sched::mitigation::{RunningSlot, plan_evictions};
use crate::sched::slot::ProcessSlot;
use crate::types::Children;

/// How often a mass eviction checks whether signalled processes have gone.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub capture_result: bool,
    pub result_timeout: Duration,
}

impl SchedulerOptions {
    pub fn from_config(cfg: &RunConfig) -> Self {
        Self {
            capture_result: cfg.worker.capture_result,
            result_timeout: cfg.worker.result_timeout,
        }
    }
}

/// What happened during one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub closed: usize,
    pub evicted: usize,
    pub started: usize,
    /// Occupied slots at the end of the tick.
    pub occupied: usize,
}

/// Admission controller over a fixed pool of process slots.
///
/// Each [`tick`](Scheduler::tick) runs, in order: poll, throttle check,
/// usage refresh, overmemory mitigation, admission. The scheduler and the
/// ledger are only ever touched from the run loop.
pub struct Scheduler<B: ProcessBackend> {
    backend: B,
    limits: Limits,
    options: SchedulerOptions,
    slots: Vec<ProcessSlot>,
    throttle_lifted: bool,
    /// Sum of `expected_memory` over tasks currently in a slot.
    expected_memory: u64,
    /// Observed usage summed over occupied slots at the last refresh.
    usage: ResourceUsage,
    evictions: usize,
    admitting: bool,
}

impl<B: ProcessBackend> std::fmt::Debug for Scheduler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("limits", &self.limits)
            .field("slots", &self.slots)
            .field("throttle_lifted", &self.throttle_lifted)
            .field("expected_memory", &self.expected_memory)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

impl<B: ProcessBackend> Scheduler<B> {
    pub fn new(backend: B, limits: Limits, options: SchedulerOptions) -> Self {
        let slots = (0..limits.max_threads).map(ProcessSlot::new).collect();
        let throttle_lifted = limits.benchmarking_tasks == 0;
        Self {
            backend,
            limits,
            options,
            slots,
            throttle_lifted,
            expected_memory: 0,
            usage: ResourceUsage::default(),
            evictions: 0,
            admitting: true,
        }
    }

    pub fn slots(&self) -> &[ProcessSlot] {
        &self.slots
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_free()).count()
    }

    /// 1 while benchmarking, `max_threads` afterwards.
    pub fn effective_cap(&self) -> usize {
        if self.throttle_lifted {
            self.limits.max_threads
        } else {
            1
        }
    }

    pub fn throttle_lifted(&self) -> bool {
        self.throttle_lifted
    }

    pub fn usage(&self) -> ResourceUsage {
        self.usage
    }

    pub fn expected_memory(&self) -> u64 {
        self.expected_memory
    }

    pub fn evictions(&self) -> usize {
        self.evictions
    }

    pub fn is_admitting(&self) -> bool {
        self.admitting
    }

    pub fn available_memory(&self) -> u64 {
        self.limits
            .max_memory
            .saturating_sub(self.usage.memory.max(self.expected_memory))
    }

    /// Let running slots drain without starting anything new.
    pub fn stop_admitting(&mut self) {
        if self.admitting {
            info!(occupied = self.occupied(), "admission stopped; draining running tasks");
        }
        self.admitting = false;
    }

    /// Swap in a new, already validated set of limits.
    ///
    /// `max_threads` is fixed for the lifetime of the slot pool.
    pub fn set_limits(&mut self, limits: Limits) {
        debug_assert_eq!(limits.max_threads, self.slots.len());
        info!(
            max_memory = limits.max_memory,
            hard_limit = limits.max_memory_hard_limit,
            sleep_ms = limits.main_thread_sleep.as_millis() as u64,
            "limits updated"
        );
        self.limits = limits;
    }

    pub async fn tick(&mut self, ledger: &mut TaskLedger) -> Result<TickOutcome> {
        let closed = self.poll(ledger).await?;
        self.update_throttle(ledger.completed());
        self.refresh_usage();
        let evicted = self.mitigate(ledger)?;
        let started = if self.admitting { self.admit(ledger)? } else { 0 };

        Ok(TickOutcome {
            closed,
            evicted,
            started,
            occupied: self.occupied(),
        })
    }

    /// Drain updates and close every slot whose process exited cleanly.
    async fn poll(&mut self, ledger: &mut TaskLedger) -> Result<usize> {
        let mut closed = 0;

        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            let Some(process) = slot.process_mut() else {
                continue;
            };
            let task = process.task();
            let update = process.poll_update();
            let status = process.exit_status()?;
            if let Some(update) = update {
                slot.set_update(update);
            }

            match status {
                ExitState::Running => {}
                state if state.success() => {
                    self.close_slot(index, ledger).await?;
                    closed += 1;
                }
                state => {
                    let exit_code = state.code().unwrap_or(-1);
                    error!(slot = index, task, exit_code, "worker process failed");
                    return Err(MemschedError::ProcessFailed {
                        slot: index,
                        task,
                        exit_code,
                    });
                }
            }
        }

        Ok(closed)
    }

    async fn close_slot(&mut self, index: usize, ledger: &mut TaskLedger) -> Result<()> {
        let capture = self.options.capture_result;
        let timeout = self.options.result_timeout;

        let slot = &mut self.slots[index];
        let runtime = slot.start_time().map(|t| t.elapsed()).unwrap_or_default();
        let memory = slot.peak_memory();
        let Some(process) = slot.process_mut() else {
            return Ok(());
        };
        let task = process.task();

        let result = if capture {
            match process.get_result(timeout).await {
                Ok(value) => Some(value),
                Err(ResultError::NoResult) => {
                    warn!(slot = index, task, "worker exited without sending a result");
                    None
                }
                Err(err) => {
                    warn!(slot = index, task, %err, "could not retrieve worker result");
                    None
                }
            }
        } else {
            None
        };
        slot.reset();

        let completion_time = now_local();
        ledger.mark_closed(
            task,
            CloseStats {
                runtime,
                memory,
                completion_time,
                result,
            },
        )?;
        ledger.persist(task)?;
        self.release_expected(ledger, task);

        info!(
            slot = index,
            task,
            memory,
            runtime_ms = runtime.as_millis() as u64,
            completed = ledger.completed(),
            total = ledger.total(),
            "task completed"
        );
        Ok(())
    }

    fn update_throttle(&mut self, completed: usize) {
        if !self.throttle_lifted && completed > self.limits.benchmarking_tasks {
            self.throttle_lifted = true;
            info!(
                completed,
                max_threads = self.limits.max_threads,
                "benchmarking finished; lifting concurrency cap"
            );
        }
    }

    fn refresh_usage(&mut self) {
        let mut total = ResourceUsage::default();
        for slot in &mut self.slots {
            let Some(process) = slot.process_mut() else {
                continue;
            };
            let usage = process.resource_usage(&Children::All);
            slot.record_usage(usage);
            trace!(
                slot = slot.index(),
                memory = usage.memory,
                cpu = usage.cpu_percent,
                "sampled slot"
            );
            total = total + usage;
        }
        self.usage = total;
        debug!(
            memory = total.memory,
            cpu = total.cpu_percent,
            expected = self.expected_memory,
            "usage refreshed"
        );
    }

    /// Kill the youngest processes while observed usage is above the hard
    /// limit. Returns the number of evictions.
    fn mitigate(&mut self, ledger: &mut TaskLedger) -> Result<usize> {
        let usage = self.usage.memory;
        let limit = self.limits.max_memory_hard_limit;
        if usage <= limit {
            return Ok(0);
        }

        if self.limits.overmemory_raise_error {
            error!(memory = usage, limit, "hard memory limit exceeded");
            return Err(MemschedError::Overmemory { usage, limit });
        }

        let running: Vec<RunningSlot> = self
            .slots
            .iter()
            .filter_map(|slot| {
                Some(RunningSlot {
                    slot: slot.index(),
                    task: slot.assigned()?,
                    started_at: slot.start_time().unwrap_or_else(Instant::now),
                    memory: slot.last_usage().memory,
                })
            })
            .collect();

        let plan = plan_evictions(&running, usage, self.limits.max_memory);
        warn!(
            memory = usage,
            limit,
            budget = self.limits.max_memory,
            victims = plan.evict.len(),
            "hard memory limit exceeded; evicting youngest processes"
        );

        for &index in &plan.evict {
            self.evict_slot(index, ledger, StopSignal::Kill)?;
        }
        self.usage = self
            .slots
            .iter()
            .filter(|s| !s.is_free())
            .map(|s| s.last_usage())
            .sum();

        if !plan.converged {
            let running = running.iter().map(|r| (r.task, r.memory)).collect();
            error!(remaining = plan.remaining, "overmemory mitigation failed");
            return Err(MemschedError::MitigationFailed { running });
        }

        Ok(plan.evict.len())
    }

    /// First-fit admission into the lowest free slots.
    fn admit(&mut self, ledger: &mut TaskLedger) -> Result<usize> {
        let cap = self.effective_cap();
        let mut available = self.available_memory();
        let mut started = 0;

        while self.occupied() < cap && available > 0 {
            let Some(index) = self.slots.iter().position(|s| s.is_free()) else {
                break;
            };
            let Some(task_id) = ledger.first_eligible(available) else {
                break;
            };
            let Some(task) = ledger.get(task_id) else {
                break;
            };
            let expected = task.expected_memory;

            let process = self.backend.launch(task, self.options.capture_result)?;
            self.slots[index].assign(process);
            ledger.mark_admitted(task_id)?;
            self.expected_memory += expected;
            available -= expected;
            started += 1;

            info!(
                slot = index,
                task = task_id,
                expected_memory = expected,
                available,
                "task admitted"
            );
        }

        if started == 0 && self.occupied() == 0 {
            if let Some(task) = ledger.smallest_pending() {
                if task.expected_memory >= self.limits.max_memory {
                    error!(
                        task = task.id,
                        expected_memory = task.expected_memory,
                        "no pending task fits the memory budget"
                    );
                    return Err(MemschedError::Unschedulable {
                        task: task.id,
                        expected_memory: task.expected_memory,
                        max_memory: self.limits.max_memory,
                    });
                }
            }
        }

        Ok(started)
    }

    /// Stop a slot's process and return its task to the pending pool.
    fn evict_slot(&mut self, index: usize, ledger: &mut TaskLedger, signal: StopSignal) -> Result<()> {
        let slot = &mut self.slots[index];
        let memory = slot.last_usage().memory;
        let Some(process) = slot.process_mut() else {
            return Ok(());
        };
        let task = process.task();

        let sent = match signal {
            StopSignal::Terminate => process.terminate(&Children::All),
            StopSignal::Kill => process.kill(&Children::All),
        };
        if let Err(err) = sent {
            warn!(slot = index, task, %err, "failed to signal evicted process");
        }
        slot.reset();

        ledger.mark_evicted(task)?;
        self.release_expected(ledger, task);
        self.evictions += 1;

        warn!(slot = index, task, memory, ?signal, "evicted task");
        Ok(())
    }

    /// Stop every running slot with `signal`, give processes up to `grace`
    /// to exit, then close them. Evicted tasks go back to pending; workers
    /// that exited cleanly before being stopped are recorded as completed.
    pub async fn evict_all(
        &mut self,
        ledger: &mut TaskLedger,
        signal: StopSignal,
        grace: Duration,
    ) -> Result<usize> {
        self.close_finished(ledger).await?;

        for slot in &mut self.slots {
            let index = slot.index();
            if let Some(process) = slot.process_mut() {
                let sent = match signal {
                    StopSignal::Terminate => process.terminate(&Children::All),
                    StopSignal::Kill => process.kill(&Children::All),
                };
                if let Err(err) = sent {
                    warn!(slot = index, task = process.task(), %err, "failed to signal process");
                }
            }
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && !self.all_exited() {
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        self.close_finished(ledger).await?;

        let mut evicted = 0;
        for index in 0..self.slots.len() {
            if !self.slots[index].is_free() {
                self.evict_slot(index, ledger, StopSignal::Kill)?;
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    /// Close every slot whose worker already exited with status 0.
    async fn close_finished(&mut self, ledger: &mut TaskLedger) -> Result<usize> {
        let mut closed = 0;
        for index in 0..self.slots.len() {
            let Some(process) = self.slots[index].process_mut() else {
                continue;
            };
            if matches!(process.exit_status(), Ok(state) if state.success()) {
                self.close_slot(index, ledger).await?;
                closed += 1;
            }
        }
        Ok(closed)
    }

    fn all_exited(&mut self) -> bool {
        self.slots.iter_mut().all(|slot| match slot.process_mut() {
            Some(process) => !matches!(process.exit_status(), Ok(ExitState::Running)),
            None => true,
        })
    }

    fn release_expected(&mut self, ledger: &TaskLedger, task: TaskId) {
        if let Some(task) = ledger.get(task) {
            self.expected_memory = self.expected_memory.saturating_sub(task.expected_memory);
        }
    }
}
