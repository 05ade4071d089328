//! End-to-end state machine scenarios.

use fsm_workload::simulations::memory::MemoryCluster;
use fsm_workload::{
    RunOptions, StateContext, StateResult, WorkerData, WorkerPhase, WorkloadDescription,
    WorkloadError, WorkloadRunner,
};

use super::{init_tracing, runtime};

/// Append the current state to the worker's `trace`.
async fn trace(ctx: StateContext<'_, MemoryCluster>, data: &mut WorkerData) -> StateResult {
    let mut trace: Vec<String> = data.get("trace")?.unwrap_or_default();
    trace.push(ctx.state().to_string());
    data.set("trace", trace)
}

fn alternating(threads: usize, iterations: u64) -> WorkloadDescription<MemoryCluster> {
    WorkloadDescription::builder("alternate")
        .state_fn("a", |ctx, data| Box::pin(trace(ctx, data)))
        .state_fn("b", |ctx, data| Box::pin(trace(ctx, data)))
        .start_state("a")
        .transition("a", [("b", 1.0)])
        .transition("b", [("a", 1.0)])
        .thread_count(threads)
        .iterations(iterations)
        .build()
        .expect("valid workload")
}

#[test]
fn test_alternating_states() {
    init_tracing();

    let report = runtime().block_on(async {
        let runner = WorkloadRunner::connect(MemoryCluster::standalone())
            .await
            .expect("connect");
        runner
            .run(&alternating(4, 10), &RunOptions::default())
            .await
            .expect("run succeeds")
    });

    assert!(report.is_success());
    assert_eq!(report.workers.len(), 4);
    assert_eq!(report.total_steps(), 40);

    let expected: Vec<String> = ["a", "b"].iter().cycle().take(10).map(|s| s.to_string()).collect();
    for (tid, worker) in report.workers.iter().enumerate() {
        assert_eq!(worker.tid, tid);
        assert_eq!(worker.phase, WorkerPhase::Completed);
        assert_eq!(worker.steps, 10);
        assert_eq!(worker.data.tid(), Some(tid));
        assert_eq!(
            worker.data.get::<Vec<String>>("trace").expect("trace"),
            Some(expected.clone())
        );
    }
}

#[test]
fn test_always_failure_stops_every_worker() {
    init_tracing();

    let workload = WorkloadDescription::builder("fatal")
        .state_fn("init", |_ctx, _data| {
            Box::pin(async {
                fsm_workload::assert_always!(1 + 1 == 3, "arithmetic is broken");
                Ok(())
            })
        })
        .thread_count(2)
        .iterations(1)
        .build()
        .expect("valid workload");

    let err = runtime().block_on(async {
        let runner = WorkloadRunner::connect(MemoryCluster::standalone())
            .await
            .expect("connect");
        runner
            .run(&workload, &RunOptions::default())
            .await
            .expect_err("run fails")
    });

    let report = err.report().expect("failure carries the report");
    assert_eq!(report.failed_tids(), vec![0, 1]);
    for failure in &report.failures {
        assert_eq!(failure.state, "init");
        assert_eq!(failure.step, 0);
        assert_eq!(failure.error.message(), "arithmetic is broken");
    }
    for worker in &report.workers {
        assert_eq!(worker.phase, WorkerPhase::FailedFatally);
    }

    let groups = report.failure_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].workers, vec![(0, 0), (1, 0)]);

    let message = err.to_string();
    assert!(message.contains("fatal"), "{message}");
    assert!(message.contains("[0, 1]"), "{message}");
}

#[test]
fn test_failure_of_one_worker_does_not_cancel_others() {
    init_tracing();

    let workload = WorkloadDescription::builder("one_fails")
        .state_fn("init", |ctx, data| {
            Box::pin(async move {
                let tid = data.require::<u64>("tid")?;
                fsm_workload::assert_always!(
                    !(tid == 1 && ctx.step() == 2),
                    "tid 1 gives up at step 2"
                );
                Ok(())
            })
        })
        .transition("init", [("init", 1.0)])
        .thread_count(3)
        .iterations(5)
        .build()
        .expect("valid workload");

    let err = runtime().block_on(async {
        let runner = WorkloadRunner::connect(MemoryCluster::standalone())
            .await
            .expect("connect");
        runner
            .run(&workload, &RunOptions::default())
            .await
            .expect_err("run fails")
    });

    let report = err.report().expect("report");
    assert_eq!(report.failed_tids(), vec![1]);
    assert_eq!(report.failures[0].step, 2);
    assert_eq!(report.worker(0).expect("tid 0").steps, 5);
    assert_eq!(report.worker(1).expect("tid 1").steps, 2);
    assert_eq!(report.worker(2).expect("tid 2").phase, WorkerPhase::Completed);
}

#[test]
fn test_terminal_state_completes_early() {
    init_tracing();

    let workload = WorkloadDescription::builder("terminal")
        .state_fn("init", |ctx, data| Box::pin(trace(ctx, data)))
        .state_fn("work", |ctx, data| Box::pin(trace(ctx, data)))
        .state_fn("done", |ctx, data| Box::pin(trace(ctx, data)))
        .transition("init", [("work", 1.0)])
        .transition("work", [("done", 1.0)])
        .thread_count(2)
        .iterations(100)
        .build()
        .expect("valid workload");

    let report = runtime().block_on(async {
        let runner = WorkloadRunner::connect(MemoryCluster::standalone())
            .await
            .expect("connect");
        runner
            .run(&workload, &RunOptions::default())
            .await
            .expect("run succeeds")
    });

    for worker in &report.workers {
        assert_eq!(worker.phase, WorkerPhase::Completed);
        assert_eq!(worker.final_state, "done");
        assert_eq!(worker.steps, 3);
        assert_eq!(
            worker.data.get::<Vec<String>>("trace").expect("trace"),
            Some(vec!["init".into(), "work".into(), "done".into()])
        );
    }
}

#[test]
fn test_same_seed_same_transitions() {
    init_tracing();

    let workload = WorkloadDescription::builder("random_walk")
        .state_fn("a", |ctx, data| Box::pin(trace(ctx, data)))
        .state_fn("b", |ctx, data| Box::pin(trace(ctx, data)))
        .state_fn("c", |ctx, data| Box::pin(trace(ctx, data)))
        .start_state("a")
        .transition("a", [("a", 1.0), ("b", 2.0), ("c", 1.0)])
        .transition("b", [("a", 1.0), ("c", 1.0)])
        .transition("c", [("a", 3.0), ("b", 1.0)])
        .thread_count(3)
        .iterations(40)
        .build()
        .expect("valid workload");

    let traces = |seed: u64| {
        let report = runtime().block_on(async {
            let runner = WorkloadRunner::connect(MemoryCluster::standalone())
                .await
                .expect("connect");
            runner
                .run(&workload, &RunOptions::default().seed(seed))
                .await
                .expect("run succeeds")
        });
        assert_eq!(report.seed, seed);
        report
            .workers
            .iter()
            .map(|w| {
                w.data
                    .get::<Vec<String>>("trace")
                    .expect("trace")
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
    };

    let first = traces(1234);
    let second = traces(1234);
    assert_eq!(first, second);
    assert!(first.iter().all(|t| t.len() == 40));
    // Workers draw from distinct streams.
    assert_ne!(first[0], first[1]);
}

#[test]
fn test_invalid_workload_never_runs() {
    let workload = WorkloadDescription::<MemoryCluster>::builder("bad")
        .state_fn("init", |_ctx, _data| Box::pin(async { Ok(()) }))
        .build()
        .expect("valid workload");
    let broken = workload
        .extend(|_, _| {
            Ok(fsm_workload::WorkloadOverrides::new().transition("init", [("init", 0.0)]))
        })
        .expect_err("zero total weight");
    assert_eq!(
        broken,
        fsm_workload::ConfigError::ZeroTotalWeight("init".into())
    );

    let err = runtime().block_on(async {
        let cluster = MemoryCluster::standalone();
        cluster.set_unreachable(true);
        WorkloadRunner::connect(cluster)
            .await
            .expect_err("discovery fails")
    });
    assert!(matches!(err, WorkloadError::Cluster(_)));
}
