// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::engine::model::UsageModel;
use crate::engine::snapshot::StatusSnapshot;
use crate::engine::{RunReport, RuntimeOptions};
use crate::errors::Result;
use crate::exec::{ProcessBackend, StopSignal};
use crate::ledger::TaskLedger;
use crate::present::{Command, Presenter};
use crate::sched::{Scheduler, SchedulerOptions};

enum Flow {
    Continue,
    Exit,
}

/// The cooperative run loop: tick, refit, report, handle commands, sleep.
///
/// Workers are separate OS processes; this loop is the only thing that
/// touches the scheduler and the ledger.
pub struct Runtime<B: ProcessBackend> {
    scheduler: Scheduler<B>,
    ledger: TaskLedger,
    presenter: Box<dyn Presenter>,
    model: UsageModel,
    options: RuntimeOptions,
    control_rx: Option<mpsc::UnboundedReceiver<Command>>,
    queued: Vec<Command>,
}

impl<B: ProcessBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("ledger", &self.ledger)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl<B: ProcessBackend> Runtime<B> {
    pub fn new(
        config: &RunConfig,
        ledger: TaskLedger,
        backend: B,
        presenter: Box<dyn Presenter>,
    ) -> Self {
        let scheduler = Scheduler::new(
            backend,
            config.limits.clone(),
            SchedulerOptions::from_config(config),
        );
        Self {
            scheduler,
            ledger,
            presenter,
            model: UsageModel::default(),
            options: RuntimeOptions::default(),
            control_rx: None,
            queued: Vec::new(),
        }
    }

    /// Also accept commands from outside the presenter (e.g. Ctrl-C).
    pub fn with_control(mut self, rx: mpsc::UnboundedReceiver<Command>) -> Self {
        self.control_rx = Some(rx);
        self
    }

    pub fn with_options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    /// Run until every task completed, a command ended the run, or a fatal
    /// error occurred. On a fatal error every worker is killed first.
    pub async fn run(mut self) -> Result<RunReport> {
        info!(
            tasks = self.ledger.total(),
            max_threads = self.scheduler.limits().max_threads,
            max_memory = self.scheduler.limits().max_memory,
            "memsched runtime started"
        );
        self.presenter.start()?;

        let outcome = self.drive().await;
        if let Err(err) = &outcome {
            error!(%err, "run failed; stopping all workers");
            if let Err(cleanup) = self
                .scheduler
                .evict_all(&mut self.ledger, StopSignal::Kill, Duration::ZERO)
                .await
            {
                warn!(%cleanup, "failed to stop workers after fatal error");
            }
        }
        self.presenter.stop();

        let stopped_early = outcome?;
        let report = self.report(stopped_early);
        info!(
            completed = report.completed,
            total = report.total,
            evictions = report.evictions,
            stopped_early,
            "runtime exiting"
        );
        Ok(report)
    }

    async fn drive(&mut self) -> Result<bool> {
        loop {
            let tick = self.scheduler.tick(&mut self.ledger).await?;
            if tick.closed > 0 || tick.occupied == 0 {
                self.model.refit(&self.ledger);
            }

            let snapshot = StatusSnapshot::capture(&self.scheduler, &self.ledger, &self.model);
            self.presenter.update(&snapshot);

            if self.ledger.is_finished() {
                return Ok(false);
            }

            for command in self.collect_commands() {
                if let Flow::Exit = self.handle_command(command).await? {
                    return Ok(true);
                }
            }

            if !self.scheduler.is_admitting() && self.scheduler.occupied() == 0 {
                info!(
                    completed = self.ledger.completed(),
                    "running tasks drained after stop"
                );
                return Ok(true);
            }

            self.sleep().await;
        }
    }

    fn collect_commands(&mut self) -> Vec<Command> {
        let mut commands = std::mem::take(&mut self.queued);
        if let Some(from_presenter) = self.presenter.get_commands() {
            commands.extend(from_presenter);
        }
        if let Some(rx) = self.control_rx.as_mut() {
            while let Ok(command) = rx.try_recv() {
                commands.push(command);
            }
        }
        commands
    }

    async fn handle_command(&mut self, command: Command) -> Result<Flow> {
        info!(?command, "received command");
        match command {
            Command::Stop => {
                self.scheduler.stop_admitting();
                Ok(Flow::Continue)
            }
            Command::Terminate => {
                let evicted = self
                    .scheduler
                    .evict_all(
                        &mut self.ledger,
                        StopSignal::Terminate,
                        self.options.terminate_grace,
                    )
                    .await?;
                info!(evicted, "terminated all workers");
                Ok(Flow::Exit)
            }
            Command::Kill => {
                let evicted = self
                    .scheduler
                    .evict_all(&mut self.ledger, StopSignal::Kill, Duration::ZERO)
                    .await?;
                info!(evicted, "killed all workers");
                Ok(Flow::Exit)
            }
            Command::UpdateConfig(patch) => {
                match self.scheduler.limits().patched(&patch) {
                    Ok(limits) => self.scheduler.set_limits(limits),
                    Err(err) => warn!(%err, ?patch, "ignoring invalid configuration patch"),
                }
                Ok(Flow::Continue)
            }
        }
    }

    /// Sleep one poll interval, waking early if a control command arrives.
    async fn sleep(&mut self) {
        let interval = self.scheduler.limits().main_thread_sleep;
        let received = match self.control_rx.as_mut() {
            Some(rx) => tokio::select! {
                _ = tokio::time::sleep(interval) => None,
                command = rx.recv() => Some(command),
            },
            None => {
                tokio::time::sleep(interval).await;
                None
            }
        };

        match received {
            Some(Some(command)) => self.queued.push(command),
            Some(None) => self.control_rx = None,
            None => {}
        }
    }

    fn report(&self, stopped_early: bool) -> RunReport {
        let results: BTreeMap<_, _> = self
            .ledger
            .tasks()
            .iter()
            .filter_map(|t| Some((t.id, t.result.clone()?)))
            .collect();

        RunReport {
            completed: self.ledger.completed(),
            total: self.ledger.total(),
            evictions: self.scheduler.evictions(),
            results,
            stopped_early,
        }
    }
}
