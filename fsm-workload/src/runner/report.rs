//! Workload run results.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::TopologyInfo;
use crate::error::{Severity, StateError};
use crate::workload::WorkerData;

use super::config::Ownership;

/// Lifecycle of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerPhase {
    /// Spawned but not yet stepping.
    Created,
    /// Stepping through the state machine.
    Running,
    /// Ran out of iterations or reached a terminal state.
    Completed,
    /// Stopped by an enforced failure.
    FailedFatally,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerPhase::Created => write!(f, "created"),
            WorkerPhase::Running => write!(f, "running"),
            WorkerPhase::Completed => write!(f, "completed"),
            WorkerPhase::FailedFatally => write!(f, "failed"),
        }
    }
}

/// Final state of one worker.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    /// Worker id.
    pub tid: usize,
    /// Phase the worker ended in.
    pub phase: WorkerPhase,
    /// Number of behaviors executed.
    pub steps: u64,
    /// State the worker was in when it stopped.
    pub final_state: String,
    /// The worker's private data at the end of the run.
    pub data: WorkerData,
    /// Conditional failures treated as no-ops.
    pub skipped_checks: u64,
}

/// An enforced failure that stopped a worker.
#[derive(Debug)]
pub struct WorkerFailure {
    /// Worker id.
    pub tid: usize,
    /// 0-based step index at which the behavior failed.
    pub step: u64,
    /// State whose behavior failed.
    pub state: String,
    /// The failure itself.
    pub error: StateError,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tid {} failed in state '{}' at step {}: {}",
            self.tid, self.state, self.step, self.error
        )
    }
}

/// Identical failures from several workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureGroup {
    /// State whose behavior failed.
    pub state: String,
    /// Failure message shared by the group.
    pub message: String,
    /// Severity shared by the group.
    pub severity: Severity,
    /// Failing workers with the step each failed at.
    pub workers: Vec<(usize, u64)>,
}

/// Result of running one workload.
#[derive(Debug)]
pub struct RunReport {
    /// Workload name.
    pub workload: String,
    /// Collection the workload ran against.
    pub collection: String,
    /// Run seed transitions were drawn from.
    pub seed: u64,
    /// Ownership the run declared.
    pub ownership: Ownership,
    /// Why the workload did not run, if it was skipped.
    pub skipped: Option<String>,
    /// Topology at setup time.
    pub topology: Option<TopologyInfo>,
    /// One outcome per worker that ran to an end, ordered by `tid`.
    pub workers: Vec<WorkerOutcome>,
    /// Enforced worker failures, ordered by `tid`.
    pub failures: Vec<WorkerFailure>,
    /// Failure of the `teardown` hook.
    pub teardown_error: Option<StateError>,
    /// Conditional failures of `setup` or `teardown` treated as no-ops.
    pub hook_skipped_checks: u64,
    /// Wall-clock time from setup to the end of teardown.
    pub wall_time: Duration,
}

impl RunReport {
    /// Report for a workload whose skip predicate fired.
    pub(crate) fn skipped(
        workload: &str,
        collection: &str,
        seed: u64,
        ownership: Ownership,
        topology: TopologyInfo,
        reason: String,
    ) -> Self {
        Self {
            workload: workload.to_string(),
            collection: collection.to_string(),
            seed,
            ownership,
            skipped: Some(reason),
            topology: Some(topology),
            workers: Vec::new(),
            failures: Vec::new(),
            teardown_error: None,
            hook_skipped_checks: 0,
            wall_time: Duration::ZERO,
        }
    }

    /// True if no worker failed and teardown succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.teardown_error.is_none()
    }

    /// True if the workload did not run.
    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    /// Behaviors executed across all workers.
    pub fn total_steps(&self) -> u64 {
        self.workers.iter().map(|w| w.steps).sum()
    }

    /// Conditional failures skipped across all workers and hooks.
    pub fn skipped_checks(&self) -> u64 {
        self.hook_skipped_checks + self.workers.iter().map(|w| w.skipped_checks).sum::<u64>()
    }

    /// Outcome of worker `tid`.
    pub fn worker(&self, tid: usize) -> Option<&WorkerOutcome> {
        self.workers.iter().find(|w| w.tid == tid)
    }

    /// Ids of the workers that failed.
    pub fn failed_tids(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.tid).collect()
    }

    /// Failures grouped by state and message, in order of first occurrence.
    pub fn failure_groups(&self) -> Vec<FailureGroup> {
        let mut index: BTreeMap<(&str, &str), usize> = BTreeMap::new();
        let mut groups: Vec<FailureGroup> = Vec::new();

        for failure in &self.failures {
            let key = (failure.state.as_str(), failure.error.message());
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(FailureGroup {
                    state: failure.state.clone(),
                    message: failure.error.message().to_string(),
                    severity: failure.error.severity(),
                    workers: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].workers.push((failure.tid, failure.step));
        }

        groups
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        if let Some(reason) = &self.skipped {
            return format!("skipped: {reason}");
        }

        let mut parts = Vec::new();
        if !self.failures.is_empty() {
            parts.push(format!(
                "{} of {} worker(s) failed fatally (tids {:?})",
                self.failures.len(),
                self.workers.len().max(self.failures.len()),
                self.failed_tids()
            ));
        }
        if let Some(err) = &self.teardown_error {
            parts.push(format!("teardown failed: {err}"));
        }
        if parts.is_empty() {
            format!("{} worker(s) completed", self.workers.len())
        } else {
            parts.join("; ")
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Workload Report: {} ===", self.workload)?;
        writeln!(f, "Collection: {}", self.collection)?;
        writeln!(f, "Seed: {}", self.seed)?;
        writeln!(f, "Ownership: {:?}", self.ownership)?;

        if let Some(reason) = &self.skipped {
            writeln!(f, "Skipped: {reason}")?;
            return Ok(());
        }

        writeln!(f, "Workers: {}", self.workers.len())?;
        writeln!(f, "Steps: {}", self.total_steps())?;
        writeln!(f, "Skipped checks: {}", self.skipped_checks())?;
        writeln!(f, "Wall Time: {:?}", self.wall_time)?;

        let groups = self.failure_groups();
        if !groups.is_empty() {
            writeln!(f)?;
            writeln!(f, "=== Worker Failures ===")?;
            for group in &groups {
                writeln!(
                    f,
                    "  - state '{}': {} ({} worker(s))",
                    group.state,
                    group.message,
                    group.workers.len()
                )?;
                for (tid, step) in &group.workers {
                    writeln!(f, "      tid {tid} at step {step}")?;
                }
            }
        }

        if let Some(err) = &self.teardown_error {
            writeln!(f)?;
            writeln!(f, "=== Teardown Failure ===")?;
            writeln!(f, "  - {err}")?;
        }

        Ok(())
    }
}
