//! Workload execution.
//!
//! ## Submodules
//!
//! - `config` - [`RunOptions`] and [`Ownership`]
//! - `worker` - one worker stepping through the state machine
//! - `scheduler` - [`WorkloadRunner`]: setup, workers, teardown
//! - `suite` - [`WorkloadSuite`]: several workloads, serial or parallel
//! - `report` - [`RunReport`] and per-worker outcomes
//! - `display` - colored terminal output for reports

pub mod config;
pub mod display;
pub mod report;
pub mod scheduler;
pub mod suite;
mod worker;

pub use config::{Ownership, RunOptions, DEFAULT_COLLECTION};
pub use display::{eprint_report, eprint_suite_report};
pub use report::{FailureGroup, RunReport, WorkerFailure, WorkerOutcome, WorkerPhase};
pub use scheduler::{run_workload, WorkloadRunner, ABORTED_STATE};
pub use suite::{ExecutionMode, SuiteReport, WorkloadSuite};
