// tests/ledger_resume.rs

mod common;
use crate::common::{ConfigBuilder, FakeBackend, RecordingPresenter, init_tracing, with_timeout};

use std::fs;

use memsched::config::RunConfig;
use memsched::engine::Runtime;
use memsched::errors::MemschedError;
use memsched::ledger::{CompletedLog, CompletedRow, TaskLedger};

fn row(args: &str) -> CompletedRow {
    CompletedRow {
        args: args.to_string(),
        metadata: String::new(),
        runtime: 2.0,
        memory: 1024,
        expected_runtime: 1.0,
        expected_memory: 512,
        completion_time: "2026-03-01T12:00:00Z".to_string(),
        remaining_to_do: false,
    }
}

fn config(dir: &std::path::Path, args: &[&str]) -> RunConfig {
    args.iter()
        .fold(
            ConfigBuilder::new()
                .name("resume")
                .log_dir(dir)
                .max_threads(2)
                .max_memory(1_000)
                .hard_limit(2_000),
            |b, a| b.task(a, 1),
        )
        .build()
}

#[test]
fn logged_tasks_are_excluded_from_the_runnable_set() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.csv");
    let (mut log, _) = CompletedLog::open(&path).unwrap();
    log.append(&row("5")).unwrap();

    let cfg = config(dir.path(), &["5", "6"]);
    let ledger = TaskLedger::open(&cfg.tasks, &path).unwrap();

    let args: Vec<_> = ledger.tasks().iter().map(|t| t.args.as_str()).collect();
    assert_eq!(args, vec!["6"]);
    assert_eq!(ledger.total(), 1);
    assert_eq!(ledger.tasks()[0].id, 1);
}

#[test]
fn fully_logged_run_has_nothing_to_do() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.csv");
    let (mut log, _) = CompletedLog::open(&path).unwrap();
    log.append(&row("a")).unwrap();

    let cfg = config(dir.path(), &["a"]);
    let err = TaskLedger::open(&cfg.tasks, &path).unwrap_err();
    assert!(matches!(err, MemschedError::NoRunnableTasks));
}

#[tokio::test]
async fn resumed_run_appends_without_a_second_header() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let first = config(dir.path(), &["a", "b"]);
    let ledger = TaskLedger::open(&first.tasks, &first.completed_log_path()).unwrap();
    let report = with_timeout(
        Runtime::new(&first, ledger, FakeBackend::new(), RecordingPresenter::new().boxed()).run(),
    )
    .await
    .unwrap();
    assert_eq!(report.completed, 2);

    let second = config(dir.path(), &["a", "b", "c"]);
    let ledger = TaskLedger::open(&second.tasks, &second.completed_log_path()).unwrap();
    assert_eq!(ledger.total(), 1);
    let report = with_timeout(
        Runtime::new(&second, ledger, FakeBackend::new(), RecordingPresenter::new().boxed()).run(),
    )
    .await
    .unwrap();
    assert_eq!(report.completed, 1);

    let text = fs::read_to_string(second.completed_log_path()).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "args,metadata,runtime,memory,expected_runtime,expected_memory,completion_time,remaining_to_do"
    );
    assert!(lines[1..].iter().all(|l| !l.starts_with("args,")));
    assert!(lines[3].starts_with("c,"));
    assert!(lines[3].ends_with(",false"));
}
