// tests/scheduler_properties.rs

use std::collections::HashSet;

use proptest::prelude::*;

use memsched::ledger::{TaskLedger, TaskState};
use memsched::sched::{Scheduler, SchedulerOptions};
use memsched_test_utils::builders::{ConfigBuilder, TaskBuilder};
use memsched_test_utils::fake_backend::{FakeBackend, FakeScript};

const MAX_MEMORY: u64 = 100;
const HARD_LIMIT: u64 = 150;
const MAX_TICKS: usize = 500;

#[derive(Debug, Clone)]
struct TaskPlan {
    expected_memory: u64,
    exit_after: u32,
    memory: u64,
}

fn task_plan() -> impl Strategy<Value = TaskPlan> {
    (1..60u64, 1..5u32, 0..=40u64).prop_map(|(expected_memory, exit_after, memory)| TaskPlan {
        expected_memory,
        exit_after,
        memory,
    })
}

fn check_invariants(sched: &Scheduler<FakeBackend>, ledger: &TaskLedger, benchmarking: usize) {
    let assigned: Vec<_> = sched.slots().iter().filter_map(|s| s.assigned()).collect();
    let unique: HashSet<_> = assigned.iter().copied().collect();
    assert_eq!(unique.len(), assigned.len(), "task assigned twice: {assigned:?}");

    assert!(sched.occupied() <= sched.effective_cap());
    if benchmarking > 0 && ledger.completed() <= benchmarking {
        assert_eq!(sched.effective_cap(), 1);
    }

    let mut expected_running = 0;
    for task in ledger.tasks() {
        let in_slot = unique.contains(&task.id);
        match task.state {
            TaskState::Pending => assert!(!in_slot),
            TaskState::Running => {
                assert!(in_slot);
                expected_running += task.expected_memory;
            }
            TaskState::Done => assert!(!in_slot && task.observed_runtime.is_some()),
        }
    }
    assert_eq!(expected_running, sched.expected_memory());
    assert!(expected_running <= MAX_MEMORY);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn admission_and_eviction_keep_invariants(
        max_threads in 1..5usize,
        benchmarking in 0..4usize,
        plans in proptest::collection::vec(task_plan(), 1..10),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = ConfigBuilder::new()
            .max_threads(max_threads)
            .max_memory(MAX_MEMORY)
            .hard_limit(HARD_LIMIT)
            .benchmarking_tasks(benchmarking);
        let mut backend = FakeBackend::new();
        for (i, plan) in plans.iter().enumerate() {
            let args = format!("t{i}");
            builder = builder.with_task(
                TaskBuilder::new(&args).expected_memory(plan.expected_memory).build(),
            );
            backend = backend.script(
                &args,
                FakeScript::exits_after(plan.exit_after).memory(plan.memory),
            );
        }
        let cfg = builder.build();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        rt.block_on(async {
            let mut ledger =
                TaskLedger::open(&cfg.tasks, &dir.path().join("completed.csv")).unwrap();
            let mut sched = Scheduler::new(
                backend.clone(),
                cfg.limits.clone(),
                SchedulerOptions::from_config(&cfg),
            );

            let mut ticks = 0;
            while !ledger.is_finished() {
                sched.tick(&mut ledger).await.unwrap();
                check_invariants(&sched, &ledger, benchmarking);
                ticks += 1;
                assert!(ticks < MAX_TICKS, "run did not finish");
            }

            assert_eq!(ledger.completed(), plans.len());
            assert!(backend.max_live() <= max_threads);
        });
    }
}
