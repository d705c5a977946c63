// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::PresenterKind;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [run]
/// name = "fit_models"
/// log_dir = "logs"
///
/// [limits]
/// max_threads = 4
/// max_memory = 8_000_000_000
/// max_memory_hard_limit = 10_000_000_000
/// benchmarking_tasks = 2
///
/// [worker]
/// cmd = "python fit.py \"$1\""
///
/// [[task]]
/// args = "galaxy-17"
/// metadata = "field A"
/// ```
///
/// Everything except `[worker].cmd` and at least one `[[task]]` has a default.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub limits: LimitsSection,

    #[serde(default)]
    pub worker: WorkerSection,

    /// All tasks from `[[task]]`, in registration order.
    #[serde(default)]
    pub task: Vec<TaskConfig>,
}

/// `[run]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    #[serde(default = "default_run_name")]
    pub name: String,

    /// Directory for the completed-task log and per-task logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default)]
    pub presenter: PresenterKind,
}

fn default_run_name() -> String {
    "untitled_run".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            name: default_run_name(),
            log_dir: default_log_dir(),
            presenter: PresenterKind::default(),
        }
    }
}

/// `[limits]` section.
///
/// Memory values are in bytes. `None` means "derive from the host".
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsSection {
    #[serde(default)]
    pub max_threads: Option<usize>,

    /// Soft budget used for admission and as the mitigation target.
    #[serde(default)]
    pub max_memory: Option<u64>,

    /// Observed usage above this triggers overmemory mitigation.
    #[serde(default)]
    pub max_memory_hard_limit: Option<u64>,

    /// Fail the run instead of evicting processes on a hard-limit breach.
    #[serde(default)]
    pub overmemory_raise_error: bool,

    /// Number of tasks to complete at a concurrency of 1 before lifting the cap.
    #[serde(default)]
    pub benchmarking_tasks: usize,

    #[serde(default = "default_sleep_ms")]
    pub main_thread_sleep_ms: u64,

    #[serde(default = "default_expected_memory")]
    pub default_expected_memory: u64,

    #[serde(default = "default_expected_runtime_secs")]
    pub default_expected_runtime_secs: f64,

    /// Accepted for compatibility; failures are always fatal.
    #[serde(default)]
    pub failed_task_repeats: u32,
}

fn default_sleep_ms() -> u64 {
    1000
}

fn default_expected_memory() -> u64 {
    100 * 1024 * 1024
}

fn default_expected_runtime_secs() -> f64 {
    1.0
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_threads: None,
            max_memory: None,
            max_memory_hard_limit: None,
            overmemory_raise_error: false,
            benchmarking_tasks: 0,
            main_thread_sleep_ms: default_sleep_ms(),
            default_expected_memory: default_expected_memory(),
            default_expected_runtime_secs: default_expected_runtime_secs(),
            failed_task_repeats: 0,
        }
    }
}

/// `[worker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Shell command run through `sh -c`. The task's `args` is `$1`.
    #[serde(default)]
    pub cmd: String,

    #[serde(default)]
    pub capture_result: bool,

    #[serde(default = "default_result_timeout_ms")]
    pub result_timeout_ms: u64,
}

fn default_result_timeout_ms() -> u64 {
    1000
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            cmd: String::new(),
            capture_result: false,
            result_timeout_ms: default_result_timeout_ms(),
        }
    }
}

/// `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Payload identity; must be unique within the run.
    pub args: String,

    /// Carried through to the completed-task log untouched.
    #[serde(default)]
    pub metadata: String,

    #[serde(default)]
    pub expected_memory: Option<u64>,

    #[serde(default)]
    pub expected_runtime_secs: Option<f64>,
}

/// Validated, immutable run configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>` (or
/// [`RunConfig::resolve`]) so every instance has passed validation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub name: String,
    pub log_dir: PathBuf,
    pub presenter: PresenterKind,
    pub limits: Limits,
    pub worker: WorkerConfig,
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    pub max_threads: usize,
    pub max_memory: u64,
    pub max_memory_hard_limit: u64,
    pub overmemory_raise_error: bool,
    pub benchmarking_tasks: usize,
    pub main_thread_sleep: Duration,
    pub default_expected_memory: u64,
    pub default_expected_runtime: Duration,
    pub failed_task_repeats: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub cmd: String,
    pub capture_result: bool,
    pub result_timeout: Duration,
}

/// One configured task with its estimates resolved against the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub args: String,
    pub metadata: String,
    pub expected_memory: u64,
    pub expected_runtime: Duration,
}

/// Partial update to the limits, delivered by a presenter at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub max_memory: Option<u64>,
    pub max_memory_hard_limit: Option<u64>,
    pub main_thread_sleep: Option<Duration>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.max_memory.is_none()
            && self.max_memory_hard_limit.is_none()
            && self.main_thread_sleep.is_none()
    }
}

impl RunConfig {
    /// Path of the durable completed-task log for this run.
    pub fn completed_log_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}_completed_tasks.csv", self.name))
    }
}
