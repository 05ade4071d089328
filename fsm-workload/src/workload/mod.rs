//! Workload descriptions.
//!
//! ## Submodules
//!
//! - `state` - [`StateBehavior`] and [`LifecycleHook`] traits plus closure adapters
//! - `context` - contexts handed to behaviors and hooks
//! - `data` - [`WorkerData`], the per-worker private fields
//! - `description` - [`WorkloadDescription`] and its builder
//! - `derive` - composing a description from a base plus [`WorkloadOverrides`]

pub mod context;
pub mod data;
pub mod derive;
pub mod description;
pub mod state;

pub use context::{HookContext, StateContext};
pub use data::{WorkerData, TID_KEY};
pub use derive::{derive, SuperView, WorkloadOverrides};
pub use description::{SkipPredicate, WorkloadBuilder, WorkloadDescription, DEFAULT_START_STATE};
pub use state::{
    hook_fn, noop_hook, noop_state, state_fn, BoxedHook, BoxedState, LifecycleHook,
    StateBehavior, WithSuper,
};
