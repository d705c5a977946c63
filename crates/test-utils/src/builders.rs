#![allow(dead_code)]

use std::path::Path;

use memsched::config::{HostResources, RawConfigFile, RunConfig, TaskConfig};

/// Fixed host used by every builder, so defaults never depend on the machine.
pub const TEST_HOST: HostResources = HostResources {
    cpu_count: 4,
    total_memory: 16 * 1024 * 1024 * 1024,
};

/// Builder for `RunConfig` to simplify test setup.
///
/// Starts from a config with a `true` worker, a 10ms poll interval and no
/// tasks.
pub struct ConfigBuilder {
    raw: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut raw = RawConfigFile::default();
        raw.worker.cmd = "true".to_string();
        raw.limits.main_thread_sleep_ms = 10;
        Self { raw }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.raw.run.name = name.to_string();
        self
    }

    pub fn log_dir(mut self, dir: &Path) -> Self {
        self.raw.run.log_dir = dir.to_path_buf();
        self
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.raw.task.push(task);
        self
    }

    /// Add a task with just `args` and an expected memory.
    pub fn task(self, args: &str, expected_memory: u64) -> Self {
        self.with_task(TaskBuilder::new(args).expected_memory(expected_memory).build())
    }

    pub fn max_threads(mut self, n: usize) -> Self {
        self.raw.limits.max_threads = Some(n);
        self
    }

    pub fn max_memory(mut self, bytes: u64) -> Self {
        self.raw.limits.max_memory = Some(bytes);
        self
    }

    pub fn hard_limit(mut self, bytes: u64) -> Self {
        self.raw.limits.max_memory_hard_limit = Some(bytes);
        self
    }

    pub fn overmemory_raise_error(mut self, val: bool) -> Self {
        self.raw.limits.overmemory_raise_error = val;
        self
    }

    pub fn benchmarking_tasks(mut self, n: usize) -> Self {
        self.raw.limits.benchmarking_tasks = n;
        self
    }

    pub fn sleep_ms(mut self, ms: u64) -> Self {
        self.raw.limits.main_thread_sleep_ms = ms;
        self
    }

    pub fn default_expected_memory(mut self, bytes: u64) -> Self {
        self.raw.limits.default_expected_memory = bytes;
        self
    }

    pub fn worker_cmd(mut self, cmd: &str) -> Self {
        self.raw.worker.cmd = cmd.to_string();
        self
    }

    pub fn capture_result(mut self, val: bool) -> Self {
        self.raw.worker.capture_result = val;
        self
    }

    pub fn result_timeout_ms(mut self, ms: u64) -> Self {
        self.raw.worker.result_timeout_ms = ms;
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.raw
    }

    pub fn build(self) -> RunConfig {
        RunConfig::resolve(self.raw, &TEST_HOST)
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskBuilder {
    task: TaskConfig,
}

impl TaskBuilder {
    pub fn new(args: &str) -> Self {
        Self {
            task: TaskConfig {
                args: args.to_string(),
                metadata: String::new(),
                expected_memory: None,
                expected_runtime_secs: None,
            },
        }
    }

    pub fn metadata(mut self, metadata: &str) -> Self {
        self.task.metadata = metadata.to_string();
        self
    }

    pub fn expected_memory(mut self, bytes: u64) -> Self {
        self.task.expected_memory = Some(bytes);
        self
    }

    pub fn expected_runtime_secs(mut self, secs: f64) -> Self {
        self.task.expected_runtime_secs = Some(secs);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
