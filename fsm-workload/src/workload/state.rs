//! State behaviors and lifecycle hooks.
//!
//! A workload is a set of named state behaviors plus optional `setup` and
//! `teardown` hooks. Implement the traits directly, or use the closure
//! adapters for the common case:
//!
//! ```ignore
//! builder.state_fn("insert", |ctx, data| Box::pin(async move {
//!     let conn = ctx.cluster().get_one(&Role::Router)?;
//!     conn.insert(ctx.collection(), data.require::<u64>("tid")?);
//!     Ok(())
//! }));
//! ```
//!
//! Overriding a behavior during derivation wraps it in [`WithSuper`], a
//! record of the new behavior and the one it replaced. The pair is built once
//! when the derived description is resolved, so delegation never looks
//! anything up at call time.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::cluster::SeedConnection;
use crate::error::StateResult;

use super::context::{HookContext, StateContext};
use super::data::WorkerData;

/// Shared handle to a state behavior.
pub type BoxedState<S> = Arc<dyn StateBehavior<S>>;

/// Shared handle to a lifecycle hook.
pub type BoxedHook<S> = Arc<dyn LifecycleHook<S>>;

/// Behavior executed when a worker is in a given state.
#[async_trait]
pub trait StateBehavior<S: SeedConnection>: Send + Sync + 'static {
    /// Run the behavior against the cluster, mutating only `data`.
    async fn execute(&self, ctx: StateContext<'_, S>, data: &mut WorkerData) -> StateResult;
}

/// `setup` or `teardown` of a workload.
#[async_trait]
pub trait LifecycleHook<S: SeedConnection>: Send + Sync + 'static {
    /// Run the hook. `setup` may write to the data template.
    async fn run(&self, ctx: HookContext<'_, S>, data: &mut WorkerData) -> StateResult;
}

/// Closure-based state behavior.
struct FnState<F> {
    f: F,
}

#[async_trait]
impl<S, F> StateBehavior<S> for FnState<F>
where
    S: SeedConnection,
    F: for<'a> Fn(StateContext<'a, S>, &'a mut WorkerData) -> BoxFuture<'a, StateResult>
        + Send
        + Sync
        + 'static,
{
    async fn execute(&self, ctx: StateContext<'_, S>, data: &mut WorkerData) -> StateResult {
        (self.f)(ctx, data).await
    }
}

/// Create a state behavior from a closure returning a boxed future.
pub fn state_fn<S, F>(f: F) -> BoxedState<S>
where
    S: SeedConnection,
    F: for<'a> Fn(StateContext<'a, S>, &'a mut WorkerData) -> BoxFuture<'a, StateResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnState { f })
}

/// A state behavior that does nothing.
pub fn noop_state<S: SeedConnection>() -> BoxedState<S> {
    Arc::new(Noop)
}

/// An override bound to the behavior it replaced.
///
/// `current` receives `parent` on every call and decides whether, and when,
/// to delegate to it.
pub struct WithSuper<P, F> {
    parent: P,
    current: F,
}

impl<P, F> WithSuper<P, F> {
    /// Bind `current` to `parent`.
    pub fn new(parent: P, current: F) -> Self {
        Self { parent, current }
    }

    /// The replaced implementation.
    pub fn parent(&self) -> &P {
        &self.parent
    }
}

impl<P, F> fmt::Debug for WithSuper<P, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithSuper").finish_non_exhaustive()
    }
}

#[async_trait]
impl<S, F> StateBehavior<S> for WithSuper<BoxedState<S>, F>
where
    S: SeedConnection,
    F: for<'a> Fn(
            &'a BoxedState<S>,
            StateContext<'a, S>,
            &'a mut WorkerData,
        ) -> BoxFuture<'a, StateResult>
        + Send
        + Sync
        + 'static,
{
    async fn execute(&self, ctx: StateContext<'_, S>, data: &mut WorkerData) -> StateResult {
        (self.current)(&self.parent, ctx, data).await
    }
}

#[async_trait]
impl<S, F> LifecycleHook<S> for WithSuper<BoxedHook<S>, F>
where
    S: SeedConnection,
    F: for<'a> Fn(
            &'a BoxedHook<S>,
            HookContext<'a, S>,
            &'a mut WorkerData,
        ) -> BoxFuture<'a, StateResult>
        + Send
        + Sync
        + 'static,
{
    async fn run(&self, ctx: HookContext<'_, S>, data: &mut WorkerData) -> StateResult {
        (self.current)(&self.parent, ctx, data).await
    }
}

/// Closure-based lifecycle hook.
struct FnHook<F> {
    f: F,
}

#[async_trait]
impl<S, F> LifecycleHook<S> for FnHook<F>
where
    S: SeedConnection,
    F: for<'a> Fn(HookContext<'a, S>, &'a mut WorkerData) -> BoxFuture<'a, StateResult>
        + Send
        + Sync
        + 'static,
{
    async fn run(&self, ctx: HookContext<'_, S>, data: &mut WorkerData) -> StateResult {
        (self.f)(ctx, data).await
    }
}

/// Create a lifecycle hook from a closure returning a boxed future.
pub fn hook_fn<S, F>(f: F) -> BoxedHook<S>
where
    S: SeedConnection,
    F: for<'a> Fn(HookContext<'a, S>, &'a mut WorkerData) -> BoxFuture<'a, StateResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnHook { f })
}

/// A hook that does nothing; what `super` resolves to when the base has none.
pub fn noop_hook<S: SeedConnection>() -> BoxedHook<S> {
    Arc::new(Noop)
}

struct Noop;

#[async_trait]
impl<S: SeedConnection> StateBehavior<S> for Noop {
    async fn execute(&self, _ctx: StateContext<'_, S>, _data: &mut WorkerData) -> StateResult {
        Ok(())
    }
}

#[async_trait]
impl<S: SeedConnection> LifecycleHook<S> for Noop {
    async fn run(&self, _ctx: HookContext<'_, S>, _data: &mut WorkerData) -> StateResult {
        Ok(())
    }
}
