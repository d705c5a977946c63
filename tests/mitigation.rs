// tests/mitigation.rs

mod common;
use crate::common::{ConfigBuilder, FakeBackend, FakeScript, init_tracing, open_ledger};

use memsched::config::RunConfig;
use memsched::errors::MemschedError;
use memsched::ledger::TaskLedger;
use memsched::sched::{Scheduler, SchedulerOptions};

/// Three forever-running tasks with expected memory 1, all admitted on the
/// first tick in slot order, then given the observed memories in `memory`.
async fn three_running(
    cfg: &RunConfig,
    dir: &std::path::Path,
    memory: [u64; 3],
) -> (Scheduler<FakeBackend>, TaskLedger, FakeBackend) {
    let backend = FakeBackend::new().default_script(FakeScript::runs_forever());
    let mut ledger = open_ledger(cfg, dir);
    let mut sched = Scheduler::new(
        backend.clone(),
        cfg.limits.clone(),
        SchedulerOptions::from_config(cfg),
    );

    let tick = sched.tick(&mut ledger).await.unwrap();
    assert_eq!(tick.started, 3);
    for (task, bytes) in memory.into_iter().enumerate() {
        backend.set_memory(task, bytes);
    }
    (sched, ledger, backend)
}

fn config(soft: u64, hard: u64, raise: bool) -> RunConfig {
    ConfigBuilder::new()
        .max_threads(3)
        .max_memory(soft)
        .hard_limit(hard)
        .overmemory_raise_error(raise)
        .task("a", 1)
        .task("b", 1)
        .task("c", 1)
        .build()
}

#[tokio::test]
async fn youngest_process_is_evicted_and_readmitted() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(1_000, 1_500, false);
    let (mut sched, mut ledger, backend) = three_running(&cfg, dir.path(), [400, 400, 900]).await;

    let tick = sched.tick(&mut ledger).await.unwrap();

    assert_eq!(tick.evicted, 1);
    assert_eq!(backend.killed(), vec![2]);
    assert_eq!(sched.evictions(), 1);
    // Back under budget with room to spare, so the evicted task goes again.
    assert_eq!(tick.started, 1);
    assert_eq!(backend.launched(), vec![0, 1, 2, 2]);
    assert!(!ledger.get(2).unwrap().remaining_to_do());
}

#[tokio::test]
async fn raise_error_fails_without_evicting() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(1_000, 1_500, true);
    let (mut sched, mut ledger, backend) = three_running(&cfg, dir.path(), [400, 400, 900]).await;

    let err = sched.tick(&mut ledger).await.unwrap_err();

    assert!(matches!(
        err,
        MemschedError::Overmemory {
            usage: 1_700,
            limit: 1_500
        }
    ));
    assert!(backend.killed().is_empty());
}

#[tokio::test]
async fn oversized_oldest_task_fails_after_evicting_everything() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(1_000, 2_000, false);
    let (mut sched, mut ledger, backend) =
        three_running(&cfg, dir.path(), [4_000, 500, 500]).await;

    let err = sched.tick(&mut ledger).await.unwrap_err();

    assert_eq!(backend.killed(), vec![2, 1, 0]);
    match &err {
        MemschedError::MitigationFailed { running } => {
            assert_eq!(running, &vec![(0, 4_000), (1, 500), (2, 500)]);
        }
        other => panic!("expected MitigationFailed, got {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("task 0 at 4000 bytes"));
    assert!(msg.contains("task 2 at 500 bytes"));
    assert!(ledger.tasks().iter().all(|t| t.remaining_to_do()));
}

#[tokio::test]
async fn oversized_youngest_task_is_evicted_alone() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(1_000, 2_000, false);
    let (mut sched, mut ledger, backend) =
        three_running(&cfg, dir.path(), [500, 500, 4_000]).await;

    let tick = sched.tick(&mut ledger).await.unwrap();

    assert_eq!(tick.evicted, 1);
    assert_eq!(backend.killed(), vec![2]);
    assert_eq!(sched.usage().memory, 1_000);
    // Observed usage sits exactly at the budget: nothing is admitted.
    assert_eq!(tick.started, 0);
    assert!(ledger.get(2).unwrap().remaining_to_do());
    assert_eq!(tick.occupied, 2);
}

#[tokio::test]
async fn usage_at_hard_limit_does_not_trigger_mitigation() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(1_000, 1_500, true);
    let (mut sched, mut ledger, backend) = three_running(&cfg, dir.path(), [500, 500, 500]).await;

    let tick = sched.tick(&mut ledger).await.unwrap();

    assert_eq!(tick.evicted, 0);
    assert!(backend.killed().is_empty());
}
