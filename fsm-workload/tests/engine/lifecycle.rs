//! Setup, teardown and ownership semantics of a run.

use std::sync::Arc;

use fsm_workload::simulations::memory::MemoryCluster;
use fsm_workload::{
    ClusterKind, Ownership, RunOptions, Scope, StateError, WorkerData, WorkloadDescription,
    WorkloadError, WorkloadRunner,
};

use super::{events, init_tracing, record, runtime, EventLog};

fn logged(log: &EventLog, fail_setup: bool, fail_teardown: bool) -> WorkloadDescription<MemoryCluster> {
    let setup_log = Arc::clone(log);
    let step_log = Arc::clone(log);
    let teardown_log = Arc::clone(log);

    WorkloadDescription::builder("logged")
        .setup_fn(move |ctx, data| {
            let log = Arc::clone(&setup_log);
            Box::pin(async move {
                record(&log, format!("setup:{}", ctx.collection()));
                if fail_setup {
                    return Err(StateError::fatal("setup refused"));
                }
                data.set("answer", 42)
            })
        })
        .state_fn("init", move |_ctx, data| {
            let log = Arc::clone(&step_log);
            Box::pin(async move {
                let answer = data.require::<u64>("answer")?;
                fsm_workload::assert_always!(answer == 42, "setup data not visible");
                record(&log, format!("step:{}", data.require::<u64>("tid")?));
                Ok(())
            })
        })
        .transition("init", [("init", 1.0)])
        .teardown_fn(move |ctx, data| {
            let log = Arc::clone(&teardown_log);
            Box::pin(async move {
                record(&log, format!("teardown:{}", data.require::<u64>("answer")?));
                assert!(data.tid().is_none());
                assert_eq!(ctx.workload(), "logged");
                if fail_teardown {
                    return Err(StateError::fatal("cleanup failed"));
                }
                Ok(())
            })
        })
        .data(WorkerData::new().with("answer", 0))
        .thread_count(3)
        .iterations(4)
        .build()
        .expect("valid workload")
}

fn run(
    workload: &WorkloadDescription<MemoryCluster>,
    options: RunOptions,
) -> Result<fsm_workload::RunReport, WorkloadError> {
    runtime().block_on(async {
        WorkloadRunner::connect(MemoryCluster::replica_set("rs0", 3))
            .await?
            .run(workload, &options)
            .await
    })
}

#[test]
fn test_setup_before_steps_before_teardown() {
    init_tracing();
    let log = EventLog::default();

    let report = run(
        &logged(&log, false, false),
        RunOptions::default().collection("lifecycle"),
    )
    .expect("run succeeds");

    let events = events(&log);
    assert_eq!(events.len(), 1 + 3 * 4 + 1);
    assert_eq!(events.first().map(String::as_str), Some("setup:lifecycle"));
    assert_eq!(events.last().map(String::as_str), Some("teardown:42"));
    for tid in 0..3 {
        let steps = events.iter().filter(|e| **e == format!("step:{tid}")).count();
        assert_eq!(steps, 4);
    }

    assert_eq!(report.collection, "lifecycle");
    let topology = report.topology.expect("topology");
    assert_eq!(topology.kind, ClusterKind::ReplicaSet);
    assert_eq!(topology.shard_names, vec!["rs0"]);
}

#[test]
fn test_setup_failure_spawns_nothing() {
    init_tracing();
    let log = EventLog::default();

    let err = run(&logged(&log, true, false), RunOptions::default()).expect_err("setup fails");

    match err {
        WorkloadError::Setup { workload, error } => {
            assert_eq!(workload, "logged");
            assert_eq!(error.message(), "setup refused");
        }
        other => panic!("unexpected error: {other}"),
    }
    let events = events(&log);
    assert_eq!(events.len(), 1);
    assert!(events[0].starts_with("setup:"));
}

#[test]
fn test_teardown_failure_fails_the_run() {
    init_tracing();
    let log = EventLog::default();

    let err = run(&logged(&log, false, true), RunOptions::default()).expect_err("teardown fails");

    let report = err.report().expect("report");
    assert!(report.failures.is_empty());
    assert_eq!(
        report.teardown_error.as_ref().map(StateError::message),
        Some("cleanup failed")
    );
    assert_eq!(report.total_steps(), 12);
}

#[test]
fn test_teardown_runs_after_worker_failures() {
    init_tracing();
    let log = EventLog::default();
    let teardown_log = Arc::clone(&log);

    let workload = WorkloadDescription::builder("fails")
        .state_fn("init", |_ctx, _data| {
            Box::pin(async { Err(StateError::fatal("always broken")) })
        })
        .teardown_fn(move |_ctx, _data| {
            let log = Arc::clone(&teardown_log);
            Box::pin(async move {
                record(&log, "teardown");
                Ok(())
            })
        })
        .thread_count(4)
        .build()
        .expect("valid workload");

    let err = run(&workload, RunOptions::default()).expect_err("workers fail");

    assert_eq!(events(&log), vec!["teardown".to_string()]);
    let report = err.report().expect("report");
    assert_eq!(report.failures.len(), 4);
    assert!(report.teardown_error.is_none());
}

fn conditional() -> WorkloadDescription<MemoryCluster> {
    WorkloadDescription::builder("conditional")
        .state_fn("init", |_ctx, _data| {
            Box::pin(async {
                fsm_workload::assert_when_owns_db!(false, "database has foreign collections");
                Ok(())
            })
        })
        .state_fn("count", |_ctx, _data| {
            Box::pin(async {
                Err(StateError::when_owned(
                    Scope::Collection,
                    "document count drifted",
                ))
            })
        })
        .transition("init", [("count", 1.0)])
        .transition("count", [("init", 1.0)])
        .thread_count(2)
        .iterations(6)
        .build()
        .expect("valid workload")
}

#[test]
fn test_conditional_checks_skipped_when_shared() {
    init_tracing();

    let report = run(&conditional(), RunOptions::shared()).expect("run succeeds");

    assert_eq!(report.ownership, Ownership::Shared);
    assert_eq!(report.skipped_checks(), 12);
    assert_eq!(report.total_steps(), 12);
}

#[test]
fn test_conditional_checks_enforced_by_ownership() {
    init_tracing();

    let err = run(
        &conditional(),
        RunOptions::default().ownership(Ownership::Collection),
    )
    .expect_err("collection checks enforced");
    let report = err.report().expect("report");
    for failure in &report.failures {
        assert_eq!(failure.state, "count");
        assert_eq!(failure.step, 1);
    }
    // The database-scoped check at step 0 was skipped.
    assert_eq!(report.skipped_checks(), 2);

    let err = run(&conditional(), RunOptions::exclusive()).expect_err("all checks enforced");
    let report = err.report().expect("report");
    for failure in &report.failures {
        assert_eq!(failure.state, "init");
        assert_eq!(failure.step, 0);
    }
}

#[test]
fn test_skip_predicate_prevents_run() {
    init_tracing();
    let log = EventLog::default();

    let workload = logged(&log, false, false)
        .extend(|_, _| {
            Ok(fsm_workload::WorkloadOverrides::new().skip_when(|topology| {
                (!topology.is_sharded()).then(|| "requires a sharded cluster".to_string())
            }))
        })
        .expect("derive");

    let report = run(&workload, RunOptions::default()).expect("skipped run is ok");

    assert!(report.is_skipped());
    assert!(report.summary().contains("requires a sharded cluster"));
    assert!(events(&log).is_empty());

    let report = runtime()
        .block_on(async {
            WorkloadRunner::connect(MemoryCluster::sharded(2, 1, 1))
                .await?
                .run(&workload, &RunOptions::default())
                .await
        })
        .expect("sharded run");
    assert!(!report.is_skipped());
}

fn conditional_hooks(fail_setup: bool) -> WorkloadDescription<MemoryCluster> {
    WorkloadDescription::builder("conditional_hooks")
        .setup_fn(move |_ctx, data| {
            Box::pin(async move {
                fsm_workload::assert_when_owns_db!(!fail_setup, "database not empty before setup");
                data.set("ready", true)
            })
        })
        .state_fn("init", |_ctx, _data| Box::pin(async { Ok(()) }))
        .teardown_fn(|_ctx, _data| {
            Box::pin(async {
                fsm_workload::assert_when_owned!(false, "count drifted under sharing");
                Ok(())
            })
        })
        .thread_count(2)
        .build()
        .expect("valid workload")
}

#[test]
fn test_conditional_teardown_check_follows_ownership() {
    init_tracing();

    let report = run(&conditional_hooks(false), RunOptions::shared()).expect("shared run succeeds");
    assert!(report.teardown_error.is_none());
    assert_eq!(report.hook_skipped_checks, 1);
    assert_eq!(report.skipped_checks(), 1);

    let err = run(
        &conditional_hooks(false),
        RunOptions::default().ownership(Ownership::Collection),
    )
    .expect_err("owned collection enforces teardown check");
    let report = err.report().expect("report");
    assert!(report.failures.is_empty());
    assert_eq!(
        report.teardown_error.as_ref().map(StateError::message),
        Some("count drifted under sharing")
    );
}

#[test]
fn test_conditional_setup_check_follows_ownership() {
    init_tracing();

    let report = run(&conditional_hooks(true), RunOptions::shared())
        .expect("database check skipped when nothing is owned");
    assert_eq!(report.total_steps(), 2);
    // One skipped in setup, one in teardown.
    assert_eq!(report.hook_skipped_checks, 2);

    let err = run(&conditional_hooks(true), RunOptions::exclusive()).expect_err("setup enforced");
    match err {
        WorkloadError::Setup { error, .. } => {
            assert_eq!(error.message(), "database not empty before setup");
        }
        other => panic!("unexpected error: {other}"),
    }
}
