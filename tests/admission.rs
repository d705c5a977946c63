// tests/admission.rs

mod common;
use crate::common::{ConfigBuilder, FakeBackend, FakeScript, TaskBuilder, init_tracing, open_ledger};

use memsched::errors::MemschedError;
use memsched::sched::{Scheduler, SchedulerOptions};

fn scheduler(cfg: &memsched::config::RunConfig, backend: FakeBackend) -> Scheduler<FakeBackend> {
    Scheduler::new(backend, cfg.limits.clone(), SchedulerOptions::from_config(cfg))
}

#[tokio::test]
async fn two_small_tasks_admitted_in_one_tick() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = ConfigBuilder::new()
        .max_threads(2)
        .max_memory(3)
        .hard_limit(100)
        .task("a", 1)
        .task("b", 1)
        .build();
    let backend = FakeBackend::new().default_script(FakeScript::runs_forever());
    let mut ledger = open_ledger(&cfg, dir.path());
    let mut sched = scheduler(&cfg, backend.clone());

    let tick = sched.tick(&mut ledger).await.unwrap();

    assert_eq!(tick.started, 2);
    assert_eq!(tick.occupied, 2);
    assert_eq!(sched.available_memory(), 1);
    assert_eq!(sched.slots()[0].assigned(), Some(0));
    assert_eq!(sched.slots()[1].assigned(), Some(1));
    assert_eq!(backend.launched(), vec![0, 1]);
}

#[tokio::test]
async fn benchmark_throttle_lifts_after_more_than_benchmarking_tasks_completed() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = ConfigBuilder::new()
        .max_threads(3)
        .max_memory(1_000)
        .hard_limit(2_000)
        .benchmarking_tasks(2)
        .task("t0", 1)
        .task("t1", 1)
        .task("t2", 1)
        .task("t3", 1)
        .task("t4", 1)
        .build();
    let backend = FakeBackend::new();
    let mut ledger = open_ledger(&cfg, dir.path());
    let mut sched = scheduler(&cfg, backend.clone());

    let first = sched.tick(&mut ledger).await.unwrap();
    assert_eq!((first.started, first.occupied), (1, 1));
    assert_eq!(sched.effective_cap(), 1);

    let second = sched.tick(&mut ledger).await.unwrap();
    assert_eq!(second.closed, 1);
    assert_eq!((second.started, second.occupied), (1, 1));
    assert_eq!(sched.effective_cap(), 1);

    // Exactly `benchmarking_tasks` completed: still serial.
    let third = sched.tick(&mut ledger).await.unwrap();
    assert_eq!(third.closed, 1);
    assert_eq!(ledger.completed(), 2);
    assert!(!sched.throttle_lifted());
    assert_eq!(sched.effective_cap(), 1);
    assert_eq!((third.started, third.occupied), (1, 1));

    let fourth = sched.tick(&mut ledger).await.unwrap();
    assert_eq!(fourth.closed, 1);
    assert_eq!(ledger.completed(), 3);
    assert_eq!(sched.effective_cap(), 3);
    assert_eq!((fourth.started, fourth.occupied), (2, 2));

    assert_eq!(backend.launched(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn single_benchmark_task_keeps_cap_until_second_completion() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = ConfigBuilder::new()
        .max_threads(3)
        .max_memory(1_000)
        .hard_limit(2_000)
        .benchmarking_tasks(1)
        .task("t0", 1)
        .task("t1", 1)
        .task("t2", 1)
        .task("t3", 1)
        .build();
    let backend = FakeBackend::new();
    let mut ledger = open_ledger(&cfg, dir.path());
    let mut sched = scheduler(&cfg, backend.clone());

    sched.tick(&mut ledger).await.unwrap();
    let second = sched.tick(&mut ledger).await.unwrap();

    assert_eq!(ledger.completed(), 1);
    assert_eq!(sched.effective_cap(), 1);
    assert_eq!(second.started, 1);
}

#[tokio::test]
async fn first_fit_skips_tasks_that_do_not_fit() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = ConfigBuilder::new()
        .max_threads(4)
        .max_memory(10)
        .hard_limit(100)
        .task("huge", 12)
        .task("a", 4)
        .task("b", 4)
        .task("c", 4)
        .build();
    let backend = FakeBackend::new().default_script(FakeScript::runs_forever());
    let mut ledger = open_ledger(&cfg, dir.path());
    let mut sched = scheduler(&cfg, backend.clone());

    let tick = sched.tick(&mut ledger).await.unwrap();

    assert_eq!(tick.started, 2);
    assert_eq!(backend.launched(), vec![1, 2]);
    assert_eq!(sched.expected_memory(), 8);
    assert!(ledger.get(0).unwrap().remaining_to_do());
    assert!(ledger.get(3).unwrap().remaining_to_do());
}

#[tokio::test]
async fn freed_slot_is_reused_lowest_index_first() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = ConfigBuilder::new()
        .max_threads(3)
        .max_memory(1_000)
        .hard_limit(2_000)
        .task("a", 1)
        .task("b", 1)
        .task("c", 1)
        .task("d", 1)
        .build();
    let backend = FakeBackend::new()
        .default_script(FakeScript::runs_forever())
        .script("b", FakeScript::exits_after(1));
    let mut ledger = open_ledger(&cfg, dir.path());
    let mut sched = scheduler(&cfg, backend.clone());

    sched.tick(&mut ledger).await.unwrap();
    let tick = sched.tick(&mut ledger).await.unwrap();

    assert_eq!(tick.closed, 1);
    assert_eq!(tick.started, 1);
    let assigned: Vec<_> = sched.slots().iter().map(|s| s.assigned()).collect();
    assert_eq!(assigned, vec![Some(0), Some(3), Some(2)]);
    assert_eq!(ledger.completed(), 1);
}

#[tokio::test]
async fn observed_usage_limits_admission() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = ConfigBuilder::new()
        .max_threads(2)
        .max_memory(10)
        .hard_limit(100)
        .task("a", 1)
        .task("b", 1)
        .task("c", 3)
        .build();
    let backend = FakeBackend::new()
        .default_script(FakeScript::runs_forever())
        .script("b", FakeScript::exits_after(2));
    let mut ledger = open_ledger(&cfg, dir.path());
    let mut sched = scheduler(&cfg, backend.clone());

    sched.tick(&mut ledger).await.unwrap();
    backend.set_memory(0, 8);
    sched.tick(&mut ledger).await.unwrap();
    let tick = sched.tick(&mut ledger).await.unwrap();

    assert_eq!(tick.closed, 1);
    assert_eq!(tick.started, 0);
    assert_eq!(sched.usage().memory, 8);
    assert_eq!(sched.available_memory(), 2);
    assert!(sched.slots()[1].is_free());
    assert!(ledger.get(2).unwrap().remaining_to_do());
}

#[tokio::test]
async fn task_larger_than_budget_is_unschedulable() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = ConfigBuilder::new()
        .max_threads(2)
        .max_memory(50)
        .hard_limit(100)
        .with_task(TaskBuilder::new("big").expected_memory(50).build())
        .build();
    let mut ledger = open_ledger(&cfg, dir.path());
    let mut sched = scheduler(&cfg, FakeBackend::new());

    let err = sched.tick(&mut ledger).await.unwrap_err();
    assert!(matches!(
        err,
        MemschedError::Unschedulable {
            task: 0,
            expected_memory: 50,
            max_memory: 50
        }
    ));
}
