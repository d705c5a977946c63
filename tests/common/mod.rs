#![allow(dead_code)]

use std::path::Path;

use memsched::config::RunConfig;
use memsched::ledger::TaskLedger;

pub use memsched_test_utils::builders::{ConfigBuilder, TaskBuilder};
pub use memsched_test_utils::fake_backend::{FakeBackend, FakeScript};
pub use memsched_test_utils::init_tracing;
pub use memsched_test_utils::recording_presenter::RecordingPresenter;
pub use memsched_test_utils::with_timeout;

/// Open a ledger for `cfg` with its completed log under `dir`.
pub fn open_ledger(cfg: &RunConfig, dir: &Path) -> TaskLedger {
    TaskLedger::open(&cfg.tasks, &dir.join("completed.csv")).expect("ledger should open")
}
