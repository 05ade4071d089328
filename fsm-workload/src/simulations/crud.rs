//! CRUD workload against the in-memory cluster.
//!
//! Every worker inserts, updates and removes documents tagged with its own
//! `tid`, remembering their ids in its private data. `check` verifies the
//! worker's own documents, which nothing else touches, with
//! `assert_always!`, and the seed documents inserted by `setup`, which other
//! workloads on the same collection could remove, with
//! `assert_when_owned!`.

use serde_json::json;

use crate::cluster::Role;
use crate::error::{ConfigResult, StateResult};
use crate::workload::{
    HookContext, StateContext, WorkerData, WorkloadDescription, WorkloadOverrides,
};

use super::memory::{MemoryCluster, MemoryConnection};

/// Documents inserted by `setup` before workers start.
pub const SEED_DOCS: usize = 5;

fn router(cluster: &crate::cluster::ConnectionCache<MemoryCluster>) -> StateResult<MemoryConnection> {
    Ok(cluster.get_one(&Role::Router)?)
}

fn docs(data: &WorkerData) -> StateResult<Vec<u64>> {
    Ok(data.get("docs")?.unwrap_or_default())
}

async fn init(_ctx: StateContext<'_, MemoryCluster>, data: &mut WorkerData) -> StateResult {
    data.set("docs", Vec::<u64>::new())
}

async fn insert(ctx: StateContext<'_, MemoryCluster>, data: &mut WorkerData) -> StateResult {
    let tid = data.require::<u64>("tid")?;
    let id = router(ctx.cluster())?
        .store()
        .insert(ctx.collection(), json!({"tid": tid, "value": ctx.step()}));

    let mut ids = docs(data)?;
    ids.push(id);
    data.set("docs", ids)
}

async fn update(ctx: StateContext<'_, MemoryCluster>, data: &mut WorkerData) -> StateResult {
    let tid = data.require::<u64>("tid")?;
    let ids = docs(data)?;
    let Some(&id) = ids.last() else {
        return Ok(());
    };

    let updated = router(ctx.cluster())?.store().update(
        ctx.collection(),
        id,
        json!({"tid": tid, "value": ctx.step(), "updated": true}),
    );
    crate::assert_always!(updated, "tid {tid} lost its document {id}");
    Ok(())
}

async fn remove(ctx: StateContext<'_, MemoryCluster>, data: &mut WorkerData) -> StateResult {
    let mut ids = docs(data)?;
    let Some(id) = ids.pop() else {
        return Ok(());
    };

    let removed = router(ctx.cluster())?
        .store()
        .remove(ctx.collection(), id);
    crate::assert_always!(removed, "document {id} was already gone");
    data.set("docs", ids)
}

async fn check(ctx: StateContext<'_, MemoryCluster>, data: &mut WorkerData) -> StateResult {
    let tid = data.require::<u64>("tid")?;
    let expected = docs(data)?.len();
    let seeds = data.require::<usize>("seed_docs")?;
    let conn = router(ctx.cluster())?;

    let own = conn
        .store()
        .count_where(ctx.collection(), |doc| doc["tid"] == json!(tid));
    crate::assert_always!(
        own == expected,
        "tid {tid} expected {expected} documents, found {own}"
    );

    let found = conn
        .store()
        .count_where(ctx.collection(), |doc| doc["seed"] == json!(true));
    crate::assert_when_owned!(
        found == seeds,
        "expected {seeds} seed documents, found {found}"
    );
    Ok(())
}

async fn setup(ctx: HookContext<'_, MemoryCluster>, data: &mut WorkerData) -> StateResult {
    let conn = router(ctx.cluster())?;
    for i in 0..SEED_DOCS {
        conn.store()
            .insert(ctx.collection(), json!({"seed": true, "n": i}));
    }
    data.set("seed_docs", SEED_DOCS)
}

async fn teardown(ctx: HookContext<'_, MemoryCluster>, data: &mut WorkerData) -> StateResult {
    if data.get::<bool>("drop_on_teardown")?.unwrap_or(true) {
        router(ctx.cluster())?
            .store()
            .drop_collection(ctx.collection());
    }
    Ok(())
}

/// The CRUD workload.
pub fn crud() -> ConfigResult<WorkloadDescription<MemoryCluster>> {
    WorkloadDescription::builder("crud")
        .state_fn("init", |ctx, data| Box::pin(init(ctx, data)))
        .state_fn("insert", |ctx, data| Box::pin(insert(ctx, data)))
        .state_fn("update", |ctx, data| Box::pin(update(ctx, data)))
        .state_fn("remove", |ctx, data| Box::pin(remove(ctx, data)))
        .state_fn("check", |ctx, data| Box::pin(check(ctx, data)))
        .transition("init", [("insert", 1.0)])
        .transition(
            "insert",
            [("insert", 0.4), ("update", 0.2), ("remove", 0.2), ("check", 0.2)],
        )
        .transition("update", [("insert", 0.5), ("check", 0.5)])
        .transition("remove", [("insert", 0.7), ("check", 0.3)])
        .transition("check", [("insert", 1.0)])
        .setup_fn(|ctx, data| Box::pin(setup(ctx, data)))
        .teardown_fn(|ctx, data| Box::pin(teardown(ctx, data)))
        .data(WorkerData::new().with("drop_on_teardown", true))
        .thread_count(4)
        .iterations(50)
        .build()
}

/// [`crud`] plus a `refresh` state that re-discovers the topology, and an
/// `insert` that counts its calls after delegating to the base one.
pub fn crud_with_refresh() -> ConfigResult<WorkloadDescription<MemoryCluster>> {
    crud()?.extend(|_, _| {
        Ok(WorkloadOverrides::new()
            .name("crud_with_refresh")
            .state_fn("refresh", |ctx, data| {
                Box::pin(async move {
                    ctx.cluster().refresh().await?;
                    let refreshes = data.get::<u64>("refreshes")?.unwrap_or(0);
                    data.set("refreshes", refreshes + 1)
                })
            })
            .override_state_fn("insert", |parent, ctx, data| {
                Box::pin(async move {
                    parent.execute(ctx, data).await?;
                    let inserted = data.get::<u64>("inserted")?.unwrap_or(0);
                    data.set("inserted", inserted + 1)
                })
            })
            .transition("check", [("insert", 0.8), ("refresh", 0.2)])
            .transition("refresh", [("insert", 1.0)])
            .data(WorkerData::new().with("refreshes", 0).with("inserted", 0)))
    })
}
