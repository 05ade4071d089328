//! Running several workloads against one cluster.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::cluster::SeedConnection;
use crate::error::{WorkloadError, WorkloadResult};
use crate::workload::WorkloadDescription;

use super::config::{Ownership, RunOptions};
use super::report::RunReport;
use super::scheduler::{join_workers, Prepared, WorkloadRunner};

/// How a suite schedules its workloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Each workload runs its whole lifecycle before the next one starts.
    #[default]
    Serial,
    /// Setups run in order, then every worker of every workload runs at
    /// once, then teardowns run in order. Ownership is always `Shared`.
    Parallel,
}

/// Reports of every workload in a suite, in declaration order.
#[derive(Debug)]
pub struct SuiteReport {
    /// Mode the suite ran in.
    pub mode: ExecutionMode,
    /// One report per workload.
    pub runs: Vec<RunReport>,
    /// Wall-clock time of the whole suite.
    pub wall_time: Duration,
}

impl SuiteReport {
    /// True if every workload succeeded or was skipped.
    pub fn is_success(&self) -> bool {
        self.runs.iter().all(RunReport::is_success)
    }

    /// Reports of failed workloads.
    pub fn failed(&self) -> impl Iterator<Item = &RunReport> {
        self.runs.iter().filter(|r| !r.is_success())
    }

    /// Report of the workload named `name`.
    pub fn run(&self, name: &str) -> Option<&RunReport> {
        self.runs.iter().find(|r| r.workload == name)
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Suite Report ({:?}) ===", self.mode)?;
        writeln!(f, "Workloads: {}", self.runs.len())?;
        writeln!(f, "Failed: {}", self.failed().count())?;
        writeln!(f, "Wall Time: {:?}", self.wall_time)?;
        for run in &self.runs {
            writeln!(f)?;
            write!(f, "{run}")?;
        }
        Ok(())
    }
}

/// An ordered list of workloads run against one cluster.
pub struct WorkloadSuite<S: SeedConnection> {
    workloads: Vec<WorkloadDescription<S>>,
    mode: ExecutionMode,
}

impl<S: SeedConnection> fmt::Debug for WorkloadSuite<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadSuite")
            .field(
                "workloads",
                &self.workloads.iter().map(|w| w.name()).collect::<Vec<_>>(),
            )
            .field("mode", &self.mode)
            .finish()
    }
}

impl<S: SeedConnection> Default for WorkloadSuite<S> {
    fn default() -> Self {
        Self::new(ExecutionMode::Serial)
    }
}

fn aborted(error: WorkloadError, runs: Vec<RunReport>) -> WorkloadError {
    tracing::error!(finished = runs.len(), "Suite aborted: {}", error);
    WorkloadError::SuiteAborted {
        error: Box::new(error),
        runs,
    }
}

impl<S: SeedConnection> WorkloadSuite<S> {
    /// Empty suite.
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            workloads: Vec::new(),
            mode,
        }
    }

    /// Append a workload.
    pub fn workload(mut self, workload: WorkloadDescription<S>) -> Self {
        self.workloads.push(workload);
        self
    }

    /// Scheduling mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run every workload.
    ///
    /// Workload `i` runs against `{collection}_{i}`, with seed `seed + i` if
    /// a seed is set. Failed runs are collected into the report; only
    /// configuration, cluster and setup errors abort the suite, with
    /// [`WorkloadError::SuiteAborted`] carrying the runs finished so far.
    #[instrument(skip_all, fields(mode = ?self.mode, workloads = self.workloads.len()))]
    pub async fn run(
        &self,
        runner: &WorkloadRunner<S>,
        options: &RunOptions,
    ) -> WorkloadResult<SuiteReport> {
        let started = Instant::now();
        let runs = match self.mode {
            ExecutionMode::Serial => self.run_serial(runner, options).await?,
            ExecutionMode::Parallel => self.run_parallel(runner, options).await?,
        };

        let report = SuiteReport {
            mode: self.mode,
            runs,
            wall_time: started.elapsed(),
        };
        tracing::info!(
            failed = report.failed().count(),
            "Suite finished: {} workload(s)",
            report.runs.len()
        );
        Ok(report)
    }

    fn options_for(&self, index: usize, options: &RunOptions) -> RunOptions {
        let mut options = options.clone();
        options.collection = format!("{}_{}", options.collection, index);
        options.seed = options.seed.map(|seed| seed.wrapping_add(index as u64));
        if self.mode == ExecutionMode::Parallel {
            options.ownership = Ownership::Shared;
        }
        options
    }

    async fn run_serial(
        &self,
        runner: &WorkloadRunner<S>,
        options: &RunOptions,
    ) -> WorkloadResult<Vec<RunReport>> {
        let mut runs = Vec::with_capacity(self.workloads.len());
        for (index, workload) in self.workloads.iter().enumerate() {
            let options = self.options_for(index, options);
            match runner.run(workload, &options).await {
                Ok(report) => runs.push(report),
                Err(WorkloadError::RunFailed(report)) => runs.push(*report),
                Err(err) => return Err(aborted(err, runs)),
            }
        }
        Ok(runs)
    }

    async fn run_parallel(
        &self,
        runner: &WorkloadRunner<S>,
        options: &RunOptions,
    ) -> WorkloadResult<Vec<RunReport>> {
        let mut prepared: Vec<Prepared<S>> = Vec::with_capacity(self.workloads.len());

        for (index, workload) in self.workloads.iter().enumerate() {
            let options = self.options_for(index, options);
            match runner.prepare(workload.clone(), options).await {
                Ok(run) => prepared.push(run),
                Err(err) => {
                    // Workloads already set up still get their teardown.
                    let mut runs = Vec::with_capacity(prepared.len());
                    for run in prepared {
                        match run {
                            Prepared::Skipped(report) => runs.push(report),
                            Prepared::Ready(run) => {
                                match runner.finish(run, Vec::new(), Vec::new()).await {
                                    Ok(report) => runs.push(report),
                                    Err(WorkloadError::RunFailed(report)) => runs.push(*report),
                                    Err(other) => {
                                        tracing::error!("Teardown after aborted suite: {}", other)
                                    }
                                }
                            }
                        }
                    }
                    return Err(aborted(err, runs));
                }
            }
        }

        let handles: Vec<_> = prepared
            .iter()
            .map(|run| match run {
                Prepared::Ready(run) => runner.spawn(run),
                Prepared::Skipped(_) => Vec::new(),
            })
            .collect();

        let mut joined = Vec::with_capacity(handles.len());
        for handles in handles {
            joined.push(join_workers(handles).await);
        }

        let mut runs = Vec::with_capacity(prepared.len());
        for (run, (workers, failures)) in prepared.into_iter().zip(joined) {
            match run {
                Prepared::Skipped(report) => runs.push(report),
                Prepared::Ready(run) => match runner.finish(run, workers, failures).await {
                    Ok(report) => runs.push(report),
                    Err(WorkloadError::RunFailed(report)) => runs.push(*report),
                    Err(err) => return Err(aborted(err, runs)),
                },
            }
        }
        Ok(runs)
    }
}
