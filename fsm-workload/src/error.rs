//! Error types for workload configuration, cluster access and execution.

use std::fmt;

use thiserror::Error;

use crate::runner::report::RunReport;

/// What a conditional assertion needs to own before it is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// The workload's target collection.
    Collection,
    /// The whole database holding the target collection.
    Database,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Collection => write!(f, "collection"),
            Scope::Database => write!(f, "database"),
        }
    }
}

/// How the engine treats a failed state behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Must hold regardless of concurrent interference. Stops the worker.
    Fatal,
    /// Only holds when the run exclusively owns the given scope.
    Conditional(Scope),
}

/// Failure returned by a state behavior or a lifecycle hook.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StateError {
    severity: Severity,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StateError {
    /// An always-fatal failure.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            message: message.into(),
            source: None,
        }
    }

    /// A failure that only counts when the run owns `scope`.
    pub fn when_owned(scope: Scope, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Conditional(scope),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an arbitrary error as an always-fatal failure.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            severity: Severity::Fatal,
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Failure severity.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Human-readable failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for conditional-on-ownership failures.
    pub fn is_conditional(&self) -> bool {
        matches!(self.severity, Severity::Conditional(_))
    }
}

impl From<ClusterError> for StateError {
    fn from(err: ClusterError) -> Self {
        StateError::from_error(err)
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::from_error(err)
    }
}

/// Result type for state behaviors and hooks.
pub type StateResult<T = ()> = Result<T, StateError>;

/// Errors detected while resolving a workload description.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `start_state` does not name a state.
    #[error("start state '{0}' is not a known state")]
    UnknownStartState(String),
    /// A transition row is keyed by a state that does not exist.
    #[error("transitions declared for unknown state '{0}'")]
    UnknownTransitionSource(String),
    /// A transition points to a state that does not exist.
    #[error("transition '{from}' -> '{to}' targets an unknown state")]
    UnknownTransitionTarget {
        /// Source state.
        from: String,
        /// Missing target state.
        to: String,
    },
    /// A weight is negative, NaN or infinite.
    #[error("transition '{from}' -> '{to}' has invalid weight {weight}")]
    InvalidWeight {
        /// Source state.
        from: String,
        /// Target state.
        to: String,
        /// Offending weight.
        weight: f64,
    },
    /// All weights of a non-empty row are zero.
    #[error("transitions from '{0}' have a zero total weight")]
    ZeroTotalWeight(String),
    /// `thread_count` was zero.
    #[error("thread count must be at least 1")]
    NoThreads,
    /// A super lookup named a state the base does not have.
    #[error("base workload has no state '{0}' to delegate to")]
    UnknownSuperState(String),
    /// The description was built without any state.
    #[error("workload '{0}' declares no states")]
    NoStates(String),
}

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised by the cluster connection cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// Topology discovery through the seed connection failed.
    #[error("topology discovery failed: {0}")]
    Discovery(String),
    /// The role is no longer part of the topology (e.g. a drained shard).
    #[error("role {0} is not present in the current topology")]
    RoleNotPresent(String),
}

/// Result type for cluster access.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that end a workload run.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// The description failed validation; nothing ran.
    #[error("invalid workload configuration: {0}")]
    Config(#[from] ConfigError),
    /// The connection cache could not be built; nothing ran.
    #[error("cluster unavailable: {0}")]
    Cluster(#[from] ClusterError),
    /// `setup` failed; no worker was spawned.
    #[error("setup of workload '{workload}' failed: {error}")]
    Setup {
        /// Workload name.
        workload: String,
        /// Underlying failure.
        error: StateError,
    },
    /// At least one worker failed fatally or teardown failed.
    #[error("workload '{}' failed: {}", .0.workload, .0.summary())]
    RunFailed(Box<RunReport>),
    /// A suite stopped early; `runs` holds the workloads already finished.
    #[error("suite aborted: {error}{}", earlier_failures(.runs))]
    SuiteAborted {
        /// What stopped the suite.
        error: Box<WorkloadError>,
        /// Reports of the workloads that finished before the suite stopped.
        runs: Vec<RunReport>,
    },
}

fn earlier_failures(runs: &[RunReport]) -> String {
    let failed: Vec<String> = runs
        .iter()
        .filter(|run| !run.is_success())
        .map(|run| format!("'{}': {}", run.workload, run.summary()))
        .collect();
    if failed.is_empty() {
        String::new()
    } else {
        format!(" (earlier failures: {})", failed.join("; "))
    }
}

impl WorkloadError {
    /// The run report when the run got as far as spawning workers.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            WorkloadError::RunFailed(report) => Some(report),
            _ => None,
        }
    }

    /// Reports of the workloads a suite finished before it stopped.
    pub fn finished_runs(&self) -> &[RunReport] {
        match self {
            WorkloadError::SuiteAborted { runs, .. } => runs,
            _ => &[],
        }
    }
}

/// Result type for workload runs.
pub type WorkloadResult<T> = Result<T, WorkloadError>;
