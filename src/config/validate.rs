// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

use crate::config::host::HostResources;
use crate::config::model::{
    ConfigPatch, Limits, LimitsSection, RawConfigFile, RunConfig, TaskConfig, TaskSpec,
    WorkerConfig,
};
use crate::errors::{MemschedError, Result};

impl TryFrom<RawConfigFile> for RunConfig {
    type Error = MemschedError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        RunConfig::resolve(raw, HostResources::global())
    }
}

impl RunConfig {
    /// Validate `raw` and fill host-derived defaults from `host`.
    pub fn resolve(raw: RawConfigFile, host: &HostResources) -> Result<Self> {
        ensure_has_tasks(&raw)?;
        ensure_unique_args(&raw.task)?;

        let limits = resolve_limits(&raw.limits, host)?;
        validate_limits(&limits)?;

        if raw.worker.cmd.trim().is_empty() {
            return Err(MemschedError::ConfigError(
                "[worker].cmd must not be empty".to_string(),
            ));
        }
        let worker = WorkerConfig {
            cmd: raw.worker.cmd,
            capture_result: raw.worker.capture_result,
            result_timeout: Duration::from_millis(raw.worker.result_timeout_ms),
        };

        let tasks = raw
            .task
            .into_iter()
            .map(|t| resolve_task(t, &limits))
            .collect::<Result<Vec<_>>>()?;

        Ok(RunConfig {
            name: raw.run.name,
            log_dir: raw.run.log_dir,
            presenter: raw.run.presenter,
            limits,
            worker,
            tasks,
        })
    }
}

impl Limits {
    /// Produce a new, re-validated set of limits with `patch` applied.
    ///
    /// `self` is left untouched; callers swap the result in whole.
    pub fn patched(&self, patch: &ConfigPatch) -> Result<Limits> {
        let mut next = self.clone();
        if let Some(max_memory) = patch.max_memory {
            next.max_memory = max_memory;
        }
        if let Some(hard) = patch.max_memory_hard_limit {
            next.max_memory_hard_limit = hard;
        }
        if let Some(sleep) = patch.main_thread_sleep {
            next.main_thread_sleep = sleep;
        }
        validate_limits(&next)?;
        Ok(next)
    }
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(MemschedError::ConfigError(
            "config must contain at least one [[task]] entry".to_string(),
        ));
    }
    Ok(())
}

fn ensure_unique_args(tasks: &[TaskConfig]) -> Result<()> {
    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.args.as_str()) {
            return Err(MemschedError::ConfigError(format!(
                "task args must be unique; '{}' appears more than once",
                task.args
            )));
        }
    }
    Ok(())
}

fn resolve_limits(section: &LimitsSection, host: &HostResources) -> Result<Limits> {
    if !section.default_expected_runtime_secs.is_finite()
        || section.default_expected_runtime_secs < 0.0
    {
        return Err(MemschedError::ConfigError(format!(
            "[limits].default_expected_runtime_secs must be a non-negative number (got {})",
            section.default_expected_runtime_secs
        )));
    }

    if section.failed_task_repeats > 0 {
        warn!(
            failed_task_repeats = section.failed_task_repeats,
            "failed_task_repeats is not supported; any task failure stops the run"
        );
    }

    Ok(Limits {
        max_threads: section.max_threads.unwrap_or(host.cpu_count),
        max_memory: section.max_memory.unwrap_or_else(|| host.default_max_memory()),
        max_memory_hard_limit: section
            .max_memory_hard_limit
            .unwrap_or_else(|| host.default_hard_limit()),
        overmemory_raise_error: section.overmemory_raise_error,
        benchmarking_tasks: section.benchmarking_tasks,
        main_thread_sleep: Duration::from_millis(section.main_thread_sleep_ms),
        default_expected_memory: section.default_expected_memory,
        default_expected_runtime: Duration::from_secs_f64(section.default_expected_runtime_secs),
        failed_task_repeats: section.failed_task_repeats,
    })
}

fn validate_limits(limits: &Limits) -> Result<()> {
    if limits.max_threads == 0 {
        return Err(MemschedError::ConfigError(
            "[limits].max_threads must be >= 1 (got 0)".to_string(),
        ));
    }
    if limits.max_memory == 0 {
        return Err(MemschedError::ConfigError(
            "[limits].max_memory must be > 0".to_string(),
        ));
    }
    if limits.max_memory_hard_limit < limits.max_memory {
        return Err(MemschedError::ConfigError(format!(
            "[limits].max_memory_hard_limit ({}) must not be below max_memory ({})",
            limits.max_memory_hard_limit, limits.max_memory
        )));
    }
    if limits.main_thread_sleep.is_zero() {
        return Err(MemschedError::ConfigError(
            "[limits].main_thread_sleep_ms must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn resolve_task(task: TaskConfig, limits: &Limits) -> Result<TaskSpec> {
    let expected_runtime = match task.expected_runtime_secs {
        Some(secs) if !secs.is_finite() || secs < 0.0 => {
            return Err(MemschedError::ConfigError(format!(
                "task '{}' has an invalid expected_runtime_secs ({secs})",
                task.args
            )));
        }
        Some(secs) => Duration::from_secs_f64(secs),
        None => limits.default_expected_runtime,
    };

    Ok(TaskSpec {
        expected_memory: task.expected_memory.unwrap_or(limits.default_expected_memory),
        expected_runtime,
        args: task.args,
        metadata: task.metadata,
    })
}
