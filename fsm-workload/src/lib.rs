//! # fsm-workload
//!
//! Concurrent probabilistic state-machine workloads against a running
//! database cluster.
//!
//! A workload is a set of named state behaviors, a weighted transition table
//! between them, and optional `setup`/`teardown` hooks. The runner spawns
//! `thread_count` workers; each steps through the state machine for
//! `iterations` steps with a private copy of the workload's data, picking
//! the next state at random according to the weights.
//!
//! ## Core Components
//!
//! - [`WorkloadDescription`]: states, transitions, hooks and data template
//! - [`WorkloadOverrides`]: derive a workload from another one, with access
//!   to the base behaviors through a [`SuperView`]
//! - [`ConnectionCache`]: role-indexed cluster connections shared by workers
//! - [`WorkloadRunner`]: setup, concurrent workers, teardown
//! - [`WorkloadSuite`]: several workloads, serial or parallel
//! - Assertion macros: [`assert_always!`], [`assert_when_owned!`],
//!   [`assert_when_owns_db!`]
//!
//! ## Failure semantics
//!
//! | Failure | Effect |
//! |---------|--------|
//! | `assert_always!`, any `?` error, panic | worker stops, run fails |
//! | `assert_when_owned!` | enforced only if the run owns the collection |
//! | `assert_when_owns_db!` | enforced only if the run owns the database |
//! | `setup` error | nothing is spawned, run fails |
//! | `teardown` error | run fails after every worker finished |
//!
//! Conditional failures in `setup` and `teardown` follow the same ownership
//! rule as in states: when not enforced they are counted as skipped checks.
//!
//! A failing worker never cancels the others, and `teardown` always runs.
//!
//! ## Quick Start
//!
//! ```ignore
//! use fsm_workload::{RunOptions, WorkloadDescription, WorkloadRunner};
//!
//! let workload = WorkloadDescription::builder("alternate")
//!     .state_fn("a", |_ctx, _data| Box::pin(async { Ok(()) }))
//!     .state_fn("b", |_ctx, _data| Box::pin(async { Ok(()) }))
//!     .start_state("a")
//!     .transition("a", [("b", 1.0)])
//!     .transition("b", [("a", 1.0)])
//!     .thread_count(4)
//!     .iterations(10)
//!     .build()?;
//!
//! let runner = WorkloadRunner::connect(seed).await?;
//! let report = runner.run(&workload, &RunOptions::default().seed(42)).await?;
//! ```
//!
//! Debugging a failing run: every report carries its seed, and the same seed
//! replays the same transitions.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod assertions;
pub mod cluster;
pub mod error;
pub mod fsm;
pub mod runner;
pub mod simulations;
pub mod workload;

pub use cluster::{
    ClusterKind, ClusterTopology, ConnectionCache, ReplicaSetConnections, Role, SeedConnection,
    TopologyInfo, TopologySnapshot,
};
pub use error::{
    ClusterError, ClusterResult, ConfigError, ConfigResult, Scope, Severity, StateError,
    StateResult, WorkloadError, WorkloadResult,
};
pub use fsm::{Transition, TransitionRng, TransitionTable};
pub use runner::{
    eprint_report, eprint_suite_report, run_workload, ExecutionMode, FailureGroup, Ownership,
    RunOptions, RunReport, SuiteReport, WorkerFailure, WorkerOutcome, WorkerPhase,
    WorkloadRunner, WorkloadSuite,
};
pub use workload::{
    derive, hook_fn, noop_hook, noop_state, state_fn, BoxedHook, BoxedState, HookContext,
    LifecycleHook, StateBehavior, StateContext, SuperView, WithSuper, WorkerData,
    WorkloadBuilder, WorkloadDescription, WorkloadOverrides,
};
