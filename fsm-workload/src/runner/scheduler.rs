//! Runs a workload: setup, concurrent workers, teardown.
//!
//! A run goes through these phases:
//!
//! 1. **Prepare**: validate, evaluate `skip`, run `setup` against the data
//!    template (sequential)
//! 2. **Spawn**: one tokio task per worker, each with a private copy of the
//!    template
//! 3. **Join**: wait for every worker; a failure never cancels the others
//! 4. **Finish**: run `teardown` exactly once and aggregate the report
//!
//! [`WorkloadSuite`](super::WorkloadSuite) drives the same phases for several
//! workloads at once.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{instrument, Instrument};

use crate::cluster::{ConnectionCache, SeedConnection, TopologyInfo};
use crate::error::{StateError, StateResult, WorkloadError, WorkloadResult};
use crate::fsm::rng::random_run_seed;
use crate::workload::{BoxedHook, HookContext, WorkerData, WorkloadDescription};

use super::config::RunOptions;
use super::report::{RunReport, WorkerFailure, WorkerOutcome};
use super::worker::{panic_message, WorkerContext};

type WorkerHandle = (usize, JoinHandle<(WorkerOutcome, Option<WorkerFailure>)>);

/// State recorded for a worker whose task ended without reporting back.
pub const ABORTED_STATE: &str = "<task aborted>";

/// A workload whose `setup` has run and whose workers can be spawned.
pub(crate) struct PreparedRun<S: SeedConnection> {
    workload: Arc<WorkloadDescription<S>>,
    options: RunOptions,
    collection: Arc<str>,
    seed: u64,
    template: WorkerData,
    topology: TopologyInfo,
    hook_skipped_checks: u64,
    started: Instant,
}

impl<S: SeedConnection> PreparedRun<S> {
    pub(crate) fn name(&self) -> &str {
        self.workload.name()
    }
}

/// Outcome of [`WorkloadRunner::prepare`].
pub(crate) enum Prepared<S: SeedConnection> {
    Skipped(RunReport),
    Ready(PreparedRun<S>),
}

/// Runs workloads against one cluster.
pub struct WorkloadRunner<S: SeedConnection> {
    cache: ConnectionCache<S>,
}

impl<S: SeedConnection> Clone for WorkloadRunner<S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<S: SeedConnection> std::fmt::Debug for WorkloadRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadRunner")
            .field("cache", &self.cache)
            .finish()
    }
}

impl<S: SeedConnection> WorkloadRunner<S> {
    /// Build the connection cache through `seed`.
    pub async fn connect(seed: S) -> WorkloadResult<Self> {
        let cache = ConnectionCache::build(seed).await?;
        Ok(Self { cache })
    }

    /// Run against an existing cache.
    pub fn with_cache(cache: ConnectionCache<S>) -> Self {
        Self { cache }
    }

    /// The shared connection cache.
    pub fn cache(&self) -> &ConnectionCache<S> {
        &self.cache
    }

    /// Run `workload` to completion.
    ///
    /// Returns the report when every worker completed and teardown
    /// succeeded, [`WorkloadError::RunFailed`] carrying the report otherwise.
    /// Configuration, cluster and setup errors return before any worker is
    /// spawned.
    #[instrument(skip_all, fields(workload = %workload.name()))]
    pub async fn run(
        &self,
        workload: &WorkloadDescription<S>,
        options: &RunOptions,
    ) -> WorkloadResult<RunReport> {
        let run = match self.prepare(workload.clone(), options.clone()).await? {
            Prepared::Skipped(report) => return Ok(report),
            Prepared::Ready(run) => run,
        };

        let handles = self.spawn(&run);
        let (workers, failures) = join_workers(handles).await;
        self.finish(run, workers, failures).await
    }

    /// Validate, evaluate `skip` and run `setup`.
    pub(crate) async fn prepare(
        &self,
        workload: WorkloadDescription<S>,
        options: RunOptions,
    ) -> WorkloadResult<Prepared<S>> {
        workload.validate()?;

        let seed = options.seed.unwrap_or_else(random_run_seed);
        let topology = self.cache.topology();

        if let Some(reason) = workload.skip_reason(&topology) {
            tracing::info!(workload = %workload.name(), %reason, "Skipping workload");
            return Ok(Prepared::Skipped(RunReport::skipped(
                workload.name(),
                &options.collection,
                seed,
                options.ownership,
                topology,
                reason,
            )));
        }

        let collection: Arc<str> = Arc::from(options.collection.as_str());
        let started = Instant::now();
        let mut template = workload.data().clone();
        let mut hook_skipped_checks = 0;

        if let Some(setup) = workload.setup() {
            tracing::debug!("Setting up workload: {}", workload.name());
            let ctx = HookContext::new(&self.cache, &collection, &topology, workload.name());
            if let Err(error) = run_hook(setup, ctx, &mut template).await {
                if options.ownership.enforces(error.severity()) {
                    tracing::error!("Workload '{}' setup failed: {}", workload.name(), error);
                    return Err(WorkloadError::Setup {
                        workload: workload.name().to_string(),
                        error,
                    });
                }
                tracing::debug!(error = %error, "Conditional setup check skipped");
                hook_skipped_checks += 1;
            }
        }

        tracing::info!(
            workload = %workload.name(),
            seed,
            threads = workload.thread_count(),
            iterations = workload.iterations(),
            ownership = ?options.ownership,
            "Workload prepared"
        );

        Ok(Prepared::Ready(PreparedRun {
            workload: Arc::new(workload),
            options,
            collection,
            seed,
            template,
            topology,
            hook_skipped_checks,
            started,
        }))
    }

    /// Spawn one task per worker.
    pub(crate) fn spawn(&self, run: &PreparedRun<S>) -> Vec<WorkerHandle> {
        tracing::debug!(
            "Spawning {} worker(s) for workload '{}'",
            run.workload.thread_count(),
            run.name()
        );

        (0..run.workload.thread_count())
            .map(|tid| {
                let worker = WorkerContext::new(
                    tid,
                    Arc::clone(&run.workload),
                    self.cache.clone(),
                    Arc::clone(&run.collection),
                    run.options.ownership,
                    &run.template,
                    run.seed,
                );
                let span = tracing::debug_span!("worker", workload = %run.name(), tid);
                (tid, tokio::spawn(worker.run().instrument(span)))
            })
            .collect()
    }

    /// Run `teardown` and aggregate the report.
    pub(crate) async fn finish(
        &self,
        run: PreparedRun<S>,
        workers: Vec<WorkerOutcome>,
        failures: Vec<WorkerFailure>,
    ) -> WorkloadResult<RunReport> {
        let mut teardown_error = None;
        let mut hook_skipped_checks = run.hook_skipped_checks;
        if let Some(teardown) = run.workload.teardown() {
            tracing::debug!("Tearing down workload: {}", run.name());
            let topology = self.cache.topology();
            let ctx = HookContext::new(&self.cache, &run.collection, &topology, run.name());
            let mut data = run.template.clone();
            if let Err(error) = run_hook(teardown, ctx, &mut data).await {
                if run.options.ownership.enforces(error.severity()) {
                    tracing::error!("Workload '{}' teardown failed: {}", run.name(), error);
                    teardown_error = Some(error);
                } else {
                    tracing::debug!(error = %error, "Conditional teardown check skipped");
                    hook_skipped_checks += 1;
                }
            }
        }

        let report = RunReport {
            workload: run.name().to_string(),
            collection: run.options.collection,
            seed: run.seed,
            ownership: run.options.ownership,
            skipped: None,
            topology: Some(run.topology),
            workers,
            failures,
            teardown_error,
            hook_skipped_checks,
            wall_time: run.started.elapsed(),
        };

        if report.is_success() {
            tracing::info!(
                workload = %report.workload,
                steps = report.total_steps(),
                skipped_checks = report.skipped_checks(),
                "Workload completed"
            );
            Ok(report)
        } else {
            tracing::error!(
                workload = %report.workload,
                seed = report.seed,
                "Workload FAILED: {}",
                report.summary()
            );
            Err(WorkloadError::RunFailed(Box::new(report)))
        }
    }
}

/// Wait for every worker, in `tid` order.
pub(crate) async fn join_workers(
    handles: Vec<WorkerHandle>,
) -> (Vec<WorkerOutcome>, Vec<WorkerFailure>) {
    let mut workers = Vec::with_capacity(handles.len());
    let mut failures = Vec::new();

    for (tid, handle) in handles {
        match handle.await {
            Ok((outcome, failure)) => {
                workers.push(outcome);
                failures.extend(failure);
            }
            Err(err) => {
                tracing::error!(tid, "Worker task failed: {}", err);
                failures.push(WorkerFailure {
                    tid,
                    step: 0,
                    state: ABORTED_STATE.to_string(),
                    error: StateError::from_error(err),
                });
            }
        }
    }

    (workers, failures)
}

async fn run_hook<S: SeedConnection>(
    hook: &BoxedHook<S>,
    ctx: HookContext<'_, S>,
    data: &mut WorkerData,
) -> StateResult {
    match AssertUnwindSafe(hook.run(ctx, data)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(StateError::fatal(format!(
            "hook panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

/// Build the connection cache through `seed` and run `workload` once.
pub async fn run_workload<S: SeedConnection>(
    seed: S,
    workload: &WorkloadDescription<S>,
    options: &RunOptions,
) -> WorkloadResult<RunReport> {
    WorkloadRunner::connect(seed).await?.run(workload, options).await
}
