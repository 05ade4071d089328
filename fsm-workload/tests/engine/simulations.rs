//! The reference CRUD workloads against the in-memory cluster.

use serde_json::json;

use fsm_workload::simulations::crud::{crud, crud_with_refresh, SEED_DOCS};
use fsm_workload::simulations::memory::{MemoryCluster, MemoryConnection};
use fsm_workload::simulations::run_in_memory;
use fsm_workload::{Ownership, Role, RunOptions, WorkerData, WorkerPhase, WorkloadOverrides};

use super::init_tracing;

#[test]
fn test_crud_completes_and_cleans_up() {
    init_tracing();
    let cluster = MemoryCluster::sharded(2, 3, 2);
    let workload = crud().expect("valid workload");

    let report = run_in_memory(
        cluster.clone(),
        &workload,
        &RunOptions::exclusive().collection("crud").seed(11),
    )
    .expect("crud succeeds");

    assert_eq!(report.workers.len(), 4);
    assert_eq!(report.total_steps(), 200);
    assert_eq!(report.skipped_checks(), 0);
    assert!(cluster.store().collections().is_empty());
}

#[test]
fn test_crud_documents_match_worker_data() {
    init_tracing();
    let cluster = MemoryCluster::replica_set("rs0", 3);
    let workload = crud()
        .expect("valid workload")
        .extend(|_, _| {
            Ok(WorkloadOverrides::new().data(WorkerData::new().with("drop_on_teardown", false)))
        })
        .expect("derive");

    let report = run_in_memory(cluster.clone(), &workload, &RunOptions::default().collection("kept"))
        .expect("crud succeeds");

    let store = cluster.store();
    assert_eq!(store.count_where("kept", |d| d["seed"] == json!(true)), SEED_DOCS);
    for worker in &report.workers {
        let docs: Vec<u64> = worker.data.get("docs").expect("docs").unwrap_or_default();
        let tid = worker.tid as u64;
        assert_eq!(store.count_where("kept", |d| d["tid"] == json!(tid)), docs.len());
        for id in docs {
            assert_eq!(store.get("kept", id).expect("document")["tid"], json!(tid));
        }
    }
}

#[test]
fn test_derived_crud_refreshes_and_counts_inserts() {
    init_tracing();
    let cluster = MemoryCluster::sharded(1, 3, 1);
    let workload = crud_with_refresh().expect("valid workload");
    assert_eq!(workload.name(), "crud_with_refresh");
    assert!(workload.state("refresh").is_some());

    let report = run_in_memory(cluster.clone(), &workload, &RunOptions::default().seed(3))
        .expect("derived crud succeeds");

    for worker in &report.workers {
        assert_eq!(worker.phase, WorkerPhase::Completed);
        let inserted = worker.data.get::<u64>("inserted").expect("inserted");
        assert!(inserted.is_some_and(|n| n >= 1), "tid {}", worker.tid);
    }
    let refreshes: u64 = report
        .workers
        .iter()
        .map(|w| w.data.get::<u64>("refreshes").expect("refreshes").unwrap_or(0))
        .sum();
    assert!(cluster.discoveries() as u64 >= 1 + refreshes);
}

#[test]
fn test_interference_is_conditional() {
    init_tracing();

    // Setup loses a seed document, as if another workload deleted it.
    let interfered = || {
        crud()
            .expect("valid workload")
            .extend(|_, _| {
                Ok(WorkloadOverrides::new()
                    .name("interfered")
                    .iterations(200)
                    .override_setup_fn(|parent, ctx, data| {
                        Box::pin(async move {
                            parent.run(ctx, data).await?;
                            let conn: MemoryConnection = ctx.cluster().get_one(&Role::Router)?;
                            let removed = conn.store().remove(ctx.collection(), 0);
                            fsm_workload::assert_always!(removed, "seed document 0 missing");
                            Ok(())
                        })
                    }))
            })
            .expect("derive")
    };

    let report = run_in_memory(
        MemoryCluster::standalone(),
        &interfered(),
        &RunOptions::shared().seed(8),
    )
    .expect("shared run tolerates interference");
    assert!(report.skipped_checks() > 0);

    let err = run_in_memory(
        MemoryCluster::standalone(),
        &interfered(),
        &RunOptions::default().ownership(Ownership::Collection).seed(8),
    )
    .expect_err("owned run detects interference");
    let report = err.report().expect("report");
    let groups = report.failure_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].state, "check");
    assert_eq!(
        groups[0].message,
        format!("expected {SEED_DOCS} seed documents, found {}", SEED_DOCS - 1)
    );
}
