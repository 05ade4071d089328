//! Resolved workload descriptions and the builder that produces them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::cluster::{SeedConnection, TopologyInfo};
use crate::error::{ConfigError, ConfigResult, StateResult};
use crate::fsm::TransitionTable;

use super::context::{HookContext, StateContext};
use super::data::WorkerData;
use super::state::{hook_fn, state_fn, BoxedHook, BoxedState, StateBehavior};

/// State every worker starts in unless told otherwise.
pub const DEFAULT_START_STATE: &str = "init";

/// Predicate deciding from the topology whether a workload can run here.
///
/// Returns the reason to skip, or `None` to run.
pub type SkipPredicate = Arc<dyn Fn(&TopologyInfo) -> Option<String> + Send + Sync>;

/// A fully-resolved, immutable workload.
///
/// Built with [`WorkloadDescription::builder`] or derived from another
/// description with [`WorkloadDescription::extend`]. Both validate, so a
/// value of this type always satisfies: the start state exists, every
/// transition source and target exists, weights are sane and
/// `thread_count >= 1`.
pub struct WorkloadDescription<S: SeedConnection> {
    pub(crate) name: String,
    pub(crate) states: BTreeMap<String, BoxedState<S>>,
    pub(crate) transitions: TransitionTable,
    pub(crate) start_state: String,
    pub(crate) thread_count: usize,
    pub(crate) iterations: u64,
    pub(crate) data: WorkerData,
    pub(crate) setup: Option<BoxedHook<S>>,
    pub(crate) teardown: Option<BoxedHook<S>>,
    pub(crate) skip: Option<SkipPredicate>,
}

impl<S: SeedConnection> Clone for WorkloadDescription<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            states: self.states.clone(),
            transitions: self.transitions.clone(),
            start_state: self.start_state.clone(),
            thread_count: self.thread_count,
            iterations: self.iterations,
            data: self.data.clone(),
            setup: self.setup.clone(),
            teardown: self.teardown.clone(),
            skip: self.skip.clone(),
        }
    }
}

impl<S: SeedConnection> fmt::Debug for WorkloadDescription<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadDescription")
            .field("name", &self.name)
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .field("transitions", &self.transitions)
            .field("start_state", &self.start_state)
            .field("thread_count", &self.thread_count)
            .field("iterations", &self.iterations)
            .field("data", &self.data)
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

impl<S: SeedConnection> WorkloadDescription<S> {
    /// Start building a workload called `name`.
    pub fn builder(name: impl Into<String>) -> WorkloadBuilder<S> {
        WorkloadBuilder::new(name)
    }

    /// Name used in logs and reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Behavior for `state`.
    pub fn state(&self, state: &str) -> Option<&BoxedState<S>> {
        self.states.get(state)
    }

    /// State names in sorted order.
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    /// The transition table.
    pub fn transitions(&self) -> &TransitionTable {
        &self.transitions
    }

    /// State every worker starts in.
    pub fn start_state(&self) -> &str {
        &self.start_state
    }

    /// Number of workers to spawn.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Steps each worker performs.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Template each worker's private data is cloned from.
    pub fn data(&self) -> &WorkerData {
        &self.data
    }

    /// The `setup` hook, if any.
    pub fn setup(&self) -> Option<&BoxedHook<S>> {
        self.setup.as_ref()
    }

    /// The `teardown` hook, if any.
    pub fn teardown(&self) -> Option<&BoxedHook<S>> {
        self.teardown.as_ref()
    }

    /// Reason this workload cannot run against `topology`, if any.
    pub fn skip_reason(&self, topology: &TopologyInfo) -> Option<String> {
        self.skip.as_ref().and_then(|skip| skip(topology))
    }

    /// Check every structural invariant.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.states.is_empty() {
            return Err(ConfigError::NoStates(self.name.clone()));
        }
        if self.thread_count == 0 {
            return Err(ConfigError::NoThreads);
        }
        if !self.states.contains_key(&self.start_state) {
            return Err(ConfigError::UnknownStartState(self.start_state.clone()));
        }
        let names: BTreeSet<&str> = self.state_names().collect();
        self.transitions.validate(&names)
    }
}

/// Builder for [`WorkloadDescription`].
pub struct WorkloadBuilder<S: SeedConnection> {
    description: WorkloadDescription<S>,
}

impl<S: SeedConnection> WorkloadBuilder<S> {
    /// New builder with one thread, one iteration and start state `init`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            description: WorkloadDescription {
                name: name.into(),
                states: BTreeMap::new(),
                transitions: TransitionTable::new(),
                start_state: DEFAULT_START_STATE.to_string(),
                thread_count: 1,
                iterations: 1,
                data: WorkerData::new(),
                setup: None,
                teardown: None,
                skip: None,
            },
        }
    }

    /// Add a state implemented by a [`StateBehavior`].
    pub fn state(mut self, name: impl Into<String>, behavior: impl StateBehavior<S>) -> Self {
        self.description
            .states
            .insert(name.into(), Arc::new(behavior));
        self
    }

    /// Add a state from an already shared behavior.
    pub fn state_boxed(mut self, name: impl Into<String>, behavior: BoxedState<S>) -> Self {
        self.description.states.insert(name.into(), behavior);
        self
    }

    /// Add a state from a closure.
    pub fn state_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(StateContext<'a, S>, &'a mut WorkerData) -> BoxFuture<'a, StateResult>
            + Send
            + Sync
            + 'static,
    {
        self.state_boxed(name, state_fn(f))
    }

    /// Declare the successors of `from` in order.
    pub fn transition<I, T>(mut self, from: impl Into<String>, successors: I) -> Self
    where
        I: IntoIterator<Item = (T, f64)>,
        T: Into<String>,
    {
        self.description.transitions.set(from, successors);
        self
    }

    /// Replace the whole transition table.
    pub fn transitions(mut self, table: TransitionTable) -> Self {
        self.description.transitions = table;
        self
    }

    /// Set the start state.
    pub fn start_state(mut self, state: impl Into<String>) -> Self {
        self.description.start_state = state.into();
        self
    }

    /// Set the number of workers.
    pub fn thread_count(mut self, threads: usize) -> Self {
        self.description.thread_count = threads;
        self
    }

    /// Set the number of steps per worker.
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.description.iterations = iterations;
        self
    }

    /// Set the data template.
    pub fn data(mut self, data: WorkerData) -> Self {
        self.description.data = data;
        self
    }

    /// Set the `setup` hook.
    pub fn setup(mut self, hook: BoxedHook<S>) -> Self {
        self.description.setup = Some(hook);
        self
    }

    /// Set the `setup` hook from a closure.
    pub fn setup_fn<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(HookContext<'a, S>, &'a mut WorkerData) -> BoxFuture<'a, StateResult>
            + Send
            + Sync
            + 'static,
    {
        self.setup(hook_fn(f))
    }

    /// Set the `teardown` hook.
    pub fn teardown(mut self, hook: BoxedHook<S>) -> Self {
        self.description.teardown = Some(hook);
        self
    }

    /// Set the `teardown` hook from a closure.
    pub fn teardown_fn<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(HookContext<'a, S>, &'a mut WorkerData) -> BoxFuture<'a, StateResult>
            + Send
            + Sync
            + 'static,
    {
        self.teardown(hook_fn(f))
    }

    /// Skip the workload when `predicate` returns a reason.
    pub fn skip_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TopologyInfo) -> Option<String> + Send + Sync + 'static,
    {
        self.description.skip = Some(Arc::new(predicate));
        self
    }

    /// Validate and return the description.
    pub fn build(self) -> ConfigResult<WorkloadDescription<S>> {
        self.description.validate()?;
        Ok(self.description)
    }
}
