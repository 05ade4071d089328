//! Deriving a workload from another one.
//!
//! An extension receives the base description and a [`SuperView`] of its
//! states and hooks, and returns [`WorkloadOverrides`]. Anything the
//! overrides leave out is inherited as-is, sharing the base's `Arc`s.
//!
//! Overrides that call into the base (`override_state_fn`,
//! `override_setup_fn`, `override_teardown_fn`) are bound to the base
//! implementation when the derived description is resolved. A chain
//! `A -> B -> C` therefore resolves to the same flat description as
//! deriving `C` directly from the already-resolved `B`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::cluster::{SeedConnection, TopologyInfo};
use crate::error::{ConfigError, ConfigResult, StateResult};
use crate::fsm::TransitionTable;

use super::context::{HookContext, StateContext};
use super::data::WorkerData;
use super::description::{SkipPredicate, WorkloadDescription};
use super::state::{
    hook_fn, noop_hook, state_fn, BoxedHook, BoxedState, StateBehavior, WithSuper,
};

/// Snapshot of the base workload's behaviors, for delegation.
pub struct SuperView<S: SeedConnection> {
    states: BTreeMap<String, BoxedState<S>>,
    setup: BoxedHook<S>,
    teardown: BoxedHook<S>,
}

impl<S: SeedConnection> SuperView<S> {
    /// Capture the behaviors of `base`.
    pub fn of(base: &WorkloadDescription<S>) -> Self {
        Self {
            states: base.states.clone(),
            setup: base.setup.clone().unwrap_or_else(noop_hook),
            teardown: base.teardown.clone().unwrap_or_else(noop_hook),
        }
    }

    /// The base behavior of `state`.
    pub fn state(&self, state: &str) -> ConfigResult<BoxedState<S>> {
        self.states
            .get(state)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownSuperState(state.to_string()))
    }

    /// The base `setup`, or a no-op if the base has none.
    pub fn setup(&self) -> BoxedHook<S> {
        Arc::clone(&self.setup)
    }

    /// The base `teardown`, or a no-op if the base has none.
    pub fn teardown(&self) -> BoxedHook<S> {
        Arc::clone(&self.teardown)
    }
}

impl<S: SeedConnection> fmt::Debug for SuperView<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuperView")
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

type WrapState<S> = Box<dyn FnOnce(BoxedState<S>) -> BoxedState<S>>;
type WrapHook<S> = Box<dyn FnOnce(BoxedHook<S>) -> BoxedHook<S>>;

enum StateOverride<S: SeedConnection> {
    Replace(BoxedState<S>),
    Wrap(WrapState<S>),
}

enum HookOverride<S: SeedConnection> {
    Replace(BoxedHook<S>),
    Wrap(WrapHook<S>),
}

impl<S: SeedConnection> HookOverride<S> {
    fn resolve(self, parent: BoxedHook<S>) -> BoxedHook<S> {
        match self {
            HookOverride::Replace(hook) => hook,
            HookOverride::Wrap(wrap) => wrap(parent),
        }
    }
}

/// Changes an extension applies on top of its base.
pub struct WorkloadOverrides<S: SeedConnection> {
    name: Option<String>,
    states: Vec<(String, StateOverride<S>)>,
    transitions: Option<TransitionTable>,
    transition_rows: TransitionTable,
    start_state: Option<String>,
    thread_count: Option<usize>,
    iterations: Option<u64>,
    data: WorkerData,
    setup: Option<HookOverride<S>>,
    teardown: Option<HookOverride<S>>,
    skip: Option<Option<SkipPredicate>>,
}

impl<S: SeedConnection> Default for WorkloadOverrides<S> {
    fn default() -> Self {
        Self {
            name: None,
            states: Vec::new(),
            transitions: None,
            transition_rows: TransitionTable::new(),
            start_state: None,
            thread_count: None,
            iterations: None,
            data: WorkerData::new(),
            setup: None,
            teardown: None,
            skip: None,
        }
    }
}

impl<S: SeedConnection> WorkloadOverrides<S> {
    /// No overrides: the derived workload equals the base.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename the derived workload.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add or replace a state.
    pub fn state(self, name: impl Into<String>, behavior: impl StateBehavior<S>) -> Self {
        self.state_boxed(name, Arc::new(behavior))
    }

    /// Add or replace a state with an already shared behavior.
    pub fn state_boxed(mut self, name: impl Into<String>, behavior: BoxedState<S>) -> Self {
        self.states
            .push((name.into(), StateOverride::Replace(behavior)));
        self
    }

    /// Add or replace a state from a closure.
    pub fn state_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(StateContext<'a, S>, &'a mut WorkerData) -> BoxFuture<'a, StateResult>
            + Send
            + Sync
            + 'static,
    {
        self.state_boxed(name, state_fn(f))
    }

    /// Replace a base state with a closure that receives the base behavior.
    ///
    /// Fails at derivation with [`ConfigError::UnknownSuperState`] if the
    /// base has no such state.
    pub fn override_state_fn<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a BoxedState<S>,
                StateContext<'a, S>,
                &'a mut WorkerData,
            ) -> BoxFuture<'a, StateResult>
            + Send
            + Sync
            + 'static,
    {
        let wrap: WrapState<S> =
            Box::new(move |parent| Arc::new(WithSuper::new(parent, f)) as BoxedState<S>);
        self.states.push((name.into(), StateOverride::Wrap(wrap)));
        self
    }

    /// Replace the whole transition table.
    pub fn transitions(mut self, table: TransitionTable) -> Self {
        self.transitions = Some(table);
        self
    }

    /// Replace the successors of one state, keeping the other rows.
    pub fn transition<I, T>(mut self, from: impl Into<String>, successors: I) -> Self
    where
        I: IntoIterator<Item = (T, f64)>,
        T: Into<String>,
    {
        self.transition_rows.set(from, successors);
        self
    }

    /// Change the start state.
    pub fn start_state(mut self, state: impl Into<String>) -> Self {
        self.start_state = Some(state.into());
        self
    }

    /// Change the number of workers.
    pub fn thread_count(mut self, threads: usize) -> Self {
        self.thread_count = Some(threads);
        self
    }

    /// Change the number of steps per worker.
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.iterations = Some(iterations);
        self
    }

    /// Merge fields into the data template; these keys win.
    pub fn data(mut self, data: WorkerData) -> Self {
        self.data.merge(data);
        self
    }

    /// Replace `setup`.
    pub fn setup(mut self, hook: BoxedHook<S>) -> Self {
        self.setup = Some(HookOverride::Replace(hook));
        self
    }

    /// Replace `setup` with a closure.
    pub fn setup_fn<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(HookContext<'a, S>, &'a mut WorkerData) -> BoxFuture<'a, StateResult>
            + Send
            + Sync
            + 'static,
    {
        self.setup(hook_fn(f))
    }

    /// Replace `setup` with a closure that receives the base `setup`.
    pub fn override_setup_fn<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a BoxedHook<S>,
                HookContext<'a, S>,
                &'a mut WorkerData,
            ) -> BoxFuture<'a, StateResult>
            + Send
            + Sync
            + 'static,
    {
        self.setup = Some(HookOverride::Wrap(wrap_hook(f)));
        self
    }

    /// Replace `teardown`.
    pub fn teardown(mut self, hook: BoxedHook<S>) -> Self {
        self.teardown = Some(HookOverride::Replace(hook));
        self
    }

    /// Replace `teardown` with a closure.
    pub fn teardown_fn<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(HookContext<'a, S>, &'a mut WorkerData) -> BoxFuture<'a, StateResult>
            + Send
            + Sync
            + 'static,
    {
        self.teardown(hook_fn(f))
    }

    /// Replace `teardown` with a closure that receives the base `teardown`.
    pub fn override_teardown_fn<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a BoxedHook<S>,
                HookContext<'a, S>,
                &'a mut WorkerData,
            ) -> BoxFuture<'a, StateResult>
            + Send
            + Sync
            + 'static,
    {
        self.teardown = Some(HookOverride::Wrap(wrap_hook(f)));
        self
    }

    /// Replace the skip predicate.
    pub fn skip_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TopologyInfo) -> Option<String> + Send + Sync + 'static,
    {
        self.skip = Some(Some(Arc::new(predicate)));
        self
    }

    /// Drop the inherited skip predicate.
    pub fn never_skip(mut self) -> Self {
        self.skip = Some(None);
        self
    }

    fn apply(
        self,
        view: &SuperView<S>,
        derived: &mut WorkloadDescription<S>,
    ) -> ConfigResult<()> {
        if let Some(name) = self.name {
            derived.name = name;
        }

        for (name, state) in self.states {
            let behavior = match state {
                StateOverride::Replace(behavior) => behavior,
                StateOverride::Wrap(wrap) => wrap(view.state(&name)?),
            };
            derived.states.insert(name, behavior);
        }

        if let Some(table) = self.transitions {
            derived.transitions = table;
        }
        derived.transitions.merge(self.transition_rows);

        if let Some(state) = self.start_state {
            derived.start_state = state;
        }
        if let Some(threads) = self.thread_count {
            derived.thread_count = threads;
        }
        if let Some(iterations) = self.iterations {
            derived.iterations = iterations;
        }
        derived.data.merge(self.data);

        if let Some(setup) = self.setup {
            derived.setup = Some(setup.resolve(view.setup()));
        }
        if let Some(teardown) = self.teardown {
            derived.teardown = Some(teardown.resolve(view.teardown()));
        }
        if let Some(skip) = self.skip {
            derived.skip = skip;
        }

        Ok(())
    }
}

fn wrap_hook<S, F>(f: F) -> WrapHook<S>
where
    S: SeedConnection,
    F: for<'a> Fn(&'a BoxedHook<S>, HookContext<'a, S>, &'a mut WorkerData) -> BoxFuture<'a, StateResult>
        + Send
        + Sync
        + 'static,
{
    Box::new(move |parent| Arc::new(WithSuper::new(parent, f)) as BoxedHook<S>)
}

/// Resolve `extension` against `base` into a new, validated description.
pub fn derive<S, F>(base: &WorkloadDescription<S>, extension: F) -> ConfigResult<WorkloadDescription<S>>
where
    S: SeedConnection,
    F: FnOnce(&WorkloadDescription<S>, &SuperView<S>) -> ConfigResult<WorkloadOverrides<S>>,
{
    let view = SuperView::of(base);
    let overrides = extension(base, &view)?;

    let mut derived = base.clone();
    overrides.apply(&view, &mut derived)?;
    derived.validate()?;

    tracing::debug!(
        base = %base.name(),
        derived = %derived.name(),
        states = derived.states.len(),
        "Workload derived"
    );
    Ok(derived)
}

impl<S: SeedConnection> WorkloadDescription<S> {
    /// Derive a new description from this one. See [`derive`].
    pub fn extend<F>(&self, extension: F) -> ConfigResult<WorkloadDescription<S>>
    where
        F: FnOnce(&WorkloadDescription<S>, &SuperView<S>) -> ConfigResult<WorkloadOverrides<S>>,
    {
        derive(self, extension)
    }
}
