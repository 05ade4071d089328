//! Contexts handed to state behaviors and lifecycle hooks.
//!
//! Both are small bundles of borrowed handles: the shared connection cache,
//! the collection the workload targets, and a little positional information
//! for logging. They are `Copy` so a behavior can pass its context on to the
//! super implementation it wraps.

use crate::cluster::{ConnectionCache, SeedConnection, TopologyInfo};

/// Context for one invocation of a state behavior.
pub struct StateContext<'a, S: SeedConnection> {
    cluster: &'a ConnectionCache<S>,
    collection: &'a str,
    state: &'a str,
    step: u64,
}

impl<S: SeedConnection> Clone for StateContext<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: SeedConnection> Copy for StateContext<'_, S> {}

impl<'a, S: SeedConnection> StateContext<'a, S> {
    /// Create a new state context.
    pub fn new(
        cluster: &'a ConnectionCache<S>,
        collection: &'a str,
        state: &'a str,
        step: u64,
    ) -> Self {
        Self {
            cluster,
            collection,
            state,
            step,
        }
    }

    /// The shared connection cache.
    pub fn cluster(&self) -> &'a ConnectionCache<S> {
        self.cluster
    }

    /// Collection the workload targets.
    pub fn collection(&self) -> &'a str {
        self.collection
    }

    /// Name of the state being executed.
    pub fn state(&self) -> &'a str {
        self.state
    }

    /// 0-based index of this step within the worker's run.
    pub fn step(&self) -> u64 {
        self.step
    }
}

/// Context for `setup` and `teardown`.
pub struct HookContext<'a, S: SeedConnection> {
    cluster: &'a ConnectionCache<S>,
    collection: &'a str,
    topology: &'a TopologyInfo,
    workload: &'a str,
}

impl<S: SeedConnection> Clone for HookContext<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: SeedConnection> Copy for HookContext<'_, S> {}

impl<'a, S: SeedConnection> HookContext<'a, S> {
    /// Create a new hook context.
    pub fn new(
        cluster: &'a ConnectionCache<S>,
        collection: &'a str,
        topology: &'a TopologyInfo,
        workload: &'a str,
    ) -> Self {
        Self {
            cluster,
            collection,
            topology,
            workload,
        }
    }

    /// The shared connection cache.
    pub fn cluster(&self) -> &'a ConnectionCache<S> {
        self.cluster
    }

    /// Collection the workload targets.
    pub fn collection(&self) -> &'a str {
        self.collection
    }

    /// Topology as seen when the hook started.
    pub fn topology(&self) -> &'a TopologyInfo {
        self.topology
    }

    /// Name of the workload the hook belongs to.
    pub fn workload(&self) -> &'a str {
        self.workload
    }
}
