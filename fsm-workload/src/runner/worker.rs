//! One worker stepping through the state machine.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::cluster::{ConnectionCache, SeedConnection};
use crate::error::StateError;
use crate::fsm::TransitionRng;
use crate::workload::{StateContext, WorkerData, WorkloadDescription};

use super::config::Ownership;
use super::report::{WorkerFailure, WorkerOutcome, WorkerPhase};

/// Execution context of one worker.
///
/// Owns its private data and RNG; shares the description and the
/// connection cache with every other worker of the run.
pub(crate) struct WorkerContext<S: SeedConnection> {
    tid: usize,
    workload: Arc<WorkloadDescription<S>>,
    cache: ConnectionCache<S>,
    collection: Arc<str>,
    ownership: Ownership,
    data: WorkerData,
    state: String,
    step: u64,
    phase: WorkerPhase,
    skipped_checks: u64,
    rng: TransitionRng,
}

impl<S: SeedConnection> WorkerContext<S> {
    pub(crate) fn new(
        tid: usize,
        workload: Arc<WorkloadDescription<S>>,
        cache: ConnectionCache<S>,
        collection: Arc<str>,
        ownership: Ownership,
        template: &WorkerData,
        run_seed: u64,
    ) -> Self {
        let state = workload.start_state().to_string();
        Self {
            tid,
            workload,
            cache,
            collection,
            ownership,
            data: template.for_worker(tid),
            state,
            step: 0,
            phase: WorkerPhase::Created,
            skipped_checks: 0,
            rng: TransitionRng::new(run_seed, tid),
        }
    }

    /// Step until the iterations run out, a terminal state is reached, or
    /// an enforced failure stops the worker.
    pub(crate) async fn run(mut self) -> (WorkerOutcome, Option<WorkerFailure>) {
        self.phase = WorkerPhase::Running;
        tracing::debug!(tid = self.tid, state = %self.state, "Worker started");

        let mut failure = None;
        let iterations = self.workload.iterations();

        while self.phase == WorkerPhase::Running {
            if self.step >= iterations {
                self.phase = WorkerPhase::Completed;
                break;
            }

            if let Err(error) = self.execute_current().await {
                if self.ownership.enforces(error.severity()) {
                    tracing::warn!(
                        tid = self.tid,
                        state = %self.state,
                        step = self.step,
                        error = %error,
                        "Worker failed"
                    );
                    failure = Some(WorkerFailure {
                        tid: self.tid,
                        step: self.step,
                        state: self.state.clone(),
                        error,
                    });
                    self.phase = WorkerPhase::FailedFatally;
                    break;
                }
                self.skipped_checks += 1;
                tracing::debug!(
                    tid = self.tid,
                    state = %self.state,
                    error = %error,
                    "Conditional check skipped"
                );
            }

            self.step += 1;
            if self.step == iterations {
                self.phase = WorkerPhase::Completed;
                break;
            }

            let transitions = self.workload.transitions();
            if transitions.is_terminal(&self.state) {
                tracing::debug!(tid = self.tid, state = %self.state, "Terminal state reached");
                self.phase = WorkerPhase::Completed;
                break;
            }
            match transitions.pick_next(&self.state, self.rng.draw()) {
                Some(next) => self.state = next.to_string(),
                None => self.phase = WorkerPhase::Completed,
            }
        }

        tracing::debug!(
            tid = self.tid,
            phase = %self.phase,
            steps = self.step,
            draws = self.rng.draw_count(),
            "Worker finished"
        );

        let outcome = WorkerOutcome {
            tid: self.tid,
            phase: self.phase,
            steps: self.step,
            final_state: self.state,
            data: self.data,
            skipped_checks: self.skipped_checks,
        };
        (outcome, failure)
    }

    async fn execute_current(&mut self) -> Result<(), StateError> {
        let behavior = match self.workload.state(&self.state) {
            Some(behavior) => Arc::clone(behavior),
            None => {
                return Err(StateError::fatal(format!(
                    "no behavior for state '{}'",
                    self.state
                )))
            }
        };

        let ctx = StateContext::new(&self.cache, &self.collection, &self.state, self.step);
        match AssertUnwindSafe(behavior.execute(ctx, &mut self.data))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(StateError::fatal(format!(
                "behavior panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
