//! Task-per-unit fan-out with an in-order fan-in.
//!
//! Every input gets its own unit, unconditionally. Units are never cancelled
//! because a sibling failed: the caller waits for all of them, then the
//! results are folded by input index. This wastes the work of units that run
//! after a failure is already known, in exchange for zero coordination between
//! units; call latency is that of the slowest unit.
//!
//! Units belong to the call: dropping the call future before the barrier
//! aborts every unit still pending. A blocking unit whose closure already
//! started cannot be interrupted; aborting it only detaches its thread.

use super::join::settle;
use super::sequential::SequentialRunner;
use crate::result::{collect_in_order, AggregateResult, AttemptResult};
use crate::telemetry::Telemetry;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::task::AbortOnDropHandle;

/// Parallel executor spawning one unit per input on the current tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct ConcurrentRunner {
    telemetry: Arc<Telemetry>,
}

impl ConcurrentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares an externally owned [`Telemetry`] instead of the runner's own.
    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Sequential, fail-fast map in the calling task. See [`SequentialRunner::map`].
    pub async fn map<I, O, E, F, Fut>(&self, action: F, inputs: Vec<I>) -> AggregateResult<O, E>
    where
        F: FnMut(I) -> Fut,
        Fut: Future<Output = AttemptResult<O, E>>,
    {
        self.telemetry.record_call(inputs.len());
        let result = SequentialRunner::new().map(action, inputs).await;
        if result.is_err() {
            self.telemetry.record_failed_units(1);
        }
        result
    }

    /// Runs `action` on every input concurrently, one tokio task per input.
    ///
    /// Returns the outputs in input order, or the error of the lowest-index
    /// failing input once every unit has finished. A panicking unit is re-raised
    /// in the caller after the join barrier.
    pub async fn map_concurrently<I, O, E, F, Fut>(
        &self,
        action: F,
        inputs: Vec<I>,
    ) -> AggregateResult<O, E>
    where
        I: Send + 'static,
        O: Send + 'static,
        E: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AttemptResult<O, E>> + Send + 'static,
    {
        self.telemetry.record_call(inputs.len());
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let action = Arc::new(action);
        let handles: Vec<AbortOnDropHandle<AttemptResult<O, E>>> = inputs
            .into_iter()
            .map(|input| {
                let action = action.clone();
                AbortOnDropHandle::new(tokio::spawn(async move { action(input).await }))
            })
            .collect();

        tracing::debug!(units = handles.len(), "spawned one task per input");
        self.fan_in(join_all(handles).await)
    }

    /// Like [`ConcurrentRunner::map_concurrently`] for synchronous actions: each
    /// unit runs on its own blocking-pool thread.
    ///
    /// Dropping the call only keeps units that have not started from running;
    /// a closure already executing runs to completion on a detached thread.
    pub async fn map_concurrently_blocking<I, O, E, F>(
        &self,
        action: F,
        inputs: Vec<I>,
    ) -> AggregateResult<O, E>
    where
        I: Send + 'static,
        O: Send + 'static,
        E: Send + 'static,
        F: Fn(I) -> AttemptResult<O, E> + Send + Sync + 'static,
    {
        self.telemetry.record_call(inputs.len());
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let action = Arc::new(action);
        let handles: Vec<AbortOnDropHandle<AttemptResult<O, E>>> = inputs
            .into_iter()
            .map(|input| {
                let action = action.clone();
                AbortOnDropHandle::new(tokio::task::spawn_blocking(move || action(input)))
            })
            .collect();

        tracing::debug!(units = handles.len(), "spawned one blocking thread per input");
        self.fan_in(join_all(handles).await)
    }

    fn fan_in<O, E>(
        &self,
        joined: Vec<Result<AttemptResult<O, E>, JoinError>>,
    ) -> AggregateResult<O, E> {
        let results: Vec<AttemptResult<O, E>> = joined
            .into_iter()
            .enumerate()
            .map(|(unit, joined)| settle(unit, joined))
            .collect();

        let failed = results.iter().filter(|result| result.is_err()).count();
        self.telemetry.record_failed_units(failed);
        tracing::trace!(units = results.len(), failed, "all units joined");

        collect_in_order(results)
    }
}
