//! Serial and parallel suites.

use std::sync::Arc;

use fsm_workload::simulations::memory::MemoryCluster;
use fsm_workload::{
    ExecutionMode, RunOptions, Scope, StateError, WorkloadDescription, WorkloadRunner,
    WorkloadSuite,
};

use super::{events, init_tracing, record, runtime, EventLog};

fn tagged(log: &EventLog, name: &'static str) -> WorkloadDescription<MemoryCluster> {
    let setup_log = Arc::clone(log);
    let step_log = Arc::clone(log);
    let teardown_log = Arc::clone(log);

    WorkloadDescription::builder(name)
        .setup_fn(move |ctx, _data| {
            let log = Arc::clone(&setup_log);
            Box::pin(async move {
                record(&log, format!("setup:{name}:{}", ctx.collection()));
                Ok(())
            })
        })
        .state_fn("init", move |_ctx, _data| {
            let log = Arc::clone(&step_log);
            Box::pin(async move {
                record(&log, format!("step:{name}"));
                tokio::task::yield_now().await;
                Ok(())
            })
        })
        .transition("init", [("init", 1.0)])
        .teardown_fn(move |_ctx, _data| {
            let log = Arc::clone(&teardown_log);
            Box::pin(async move {
                record(&log, format!("teardown:{name}"));
                Ok(())
            })
        })
        .thread_count(2)
        .iterations(3)
        .build()
        .expect("valid workload")
}

fn run_suite(suite: &WorkloadSuite<MemoryCluster>, options: RunOptions) -> fsm_workload::SuiteReport {
    runtime().block_on(async {
        let runner = WorkloadRunner::connect(MemoryCluster::standalone())
            .await
            .expect("connect");
        suite.run(&runner, &options).await.expect("suite runs")
    })
}

fn position(events: &[String], prefix: &str) -> Vec<usize> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.starts_with(prefix))
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn test_serial_runs_one_lifecycle_after_another() {
    init_tracing();
    let log = EventLog::default();

    let suite = WorkloadSuite::new(ExecutionMode::Serial)
        .workload(tagged(&log, "first"))
        .workload(tagged(&log, "second"));
    let report = run_suite(&suite, RunOptions::default().collection("suite"));

    assert!(report.is_success());
    assert_eq!(report.runs.len(), 2);

    let events = events(&log);
    let first_end = position(&events, "teardown:first")[0];
    let second_start = position(&events, "setup:second")[0];
    assert!(first_end < second_start);
    assert_eq!(events[0], "setup:first:suite_0");
    assert_eq!(events[second_start], "setup:second:suite_1");
    assert_eq!(position(&events, "step:first").len(), 6);
    assert_eq!(position(&events, "step:second").len(), 6);
}

#[test]
fn test_parallel_setups_then_workers_then_teardowns() {
    init_tracing();
    let log = EventLog::default();

    let suite = WorkloadSuite::new(ExecutionMode::Parallel)
        .workload(tagged(&log, "first"))
        .workload(tagged(&log, "second"));
    let report = run_suite(&suite, RunOptions::default().seed(5));

    assert!(report.is_success());
    assert_eq!(report.run("first").expect("first").seed, 5);
    assert_eq!(report.run("second").expect("second").seed, 6);

    let events = events(&log);
    assert_eq!(events.len(), 2 + 12 + 2);
    assert!(events[0].starts_with("setup:first"));
    assert!(events[1].starts_with("setup:second"));
    assert_eq!(events[14], "teardown:first");
    assert_eq!(events[15], "teardown:second");
    assert!(events[2..14].iter().all(|e| e.starts_with("step:")));
}

#[test]
fn test_parallel_forces_shared_ownership() {
    init_tracing();

    let conditional = || {
        WorkloadDescription::builder("conditional")
            .state_fn("init", |_ctx, _data| {
                Box::pin(async {
                    Err(StateError::when_owned(Scope::Collection, "count drifted"))
                })
            })
            .build()
            .expect("valid workload")
    };

    let parallel = WorkloadSuite::new(ExecutionMode::Parallel).workload(conditional());
    let report = run_suite(&parallel, RunOptions::exclusive());
    assert!(report.is_success());
    assert_eq!(report.runs[0].skipped_checks(), 1);

    let serial = WorkloadSuite::new(ExecutionMode::Serial).workload(conditional());
    let report = run_suite(&serial, RunOptions::exclusive());
    assert!(!report.is_success());
    assert_eq!(report.failed().count(), 1);
    assert!(report.to_string().contains("count drifted"));
}

#[test]
fn test_parallel_setup_failure_keeps_earlier_teardowns() {
    init_tracing();

    let broken_teardown = WorkloadDescription::builder("a")
        .state_fn("init", |_ctx, _data| Box::pin(async { Ok(()) }))
        .teardown_fn(|_ctx, _data| {
            Box::pin(async { Err(StateError::fatal("a teardown broke")) })
        })
        .build()
        .expect("valid workload");
    let broken_setup = WorkloadDescription::builder("b")
        .setup_fn(|_ctx, _data| Box::pin(async { Err(StateError::fatal("b setup broke")) }))
        .state_fn("init", |_ctx, _data| Box::pin(async { Ok(()) }))
        .build()
        .expect("valid workload");

    let suite = WorkloadSuite::new(ExecutionMode::Parallel)
        .workload(broken_teardown)
        .workload(broken_setup);

    let err = runtime().block_on(async {
        let runner = WorkloadRunner::connect(MemoryCluster::standalone())
            .await
            .expect("connect");
        suite
            .run(&runner, &RunOptions::default())
            .await
            .expect_err("setup of b aborts the suite")
    });

    match &err {
        fsm_workload::WorkloadError::SuiteAborted { error, runs } => {
            assert!(matches!(
                **error,
                fsm_workload::WorkloadError::Setup { ref workload, .. } if workload == "b"
            ));
            assert_eq!(runs.len(), 1);
            assert_eq!(
                runs[0].teardown_error.as_ref().map(StateError::message),
                Some("a teardown broke")
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.finished_runs().len(), 1);
    let message = err.to_string();
    assert!(message.contains("b setup broke"), "{message}");
    assert!(message.contains("a teardown broke"), "{message}");
}
