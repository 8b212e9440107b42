use crate::result::{AggregateResult, AttemptResult};
use std::future::Future;

/// Runs an action on each input in turn, in the calling task.
///
/// Stops at the first error: inputs after the failing one are never handed to
/// the action. Mostly useful as the reference behaviour for the concurrent
/// runner, whose outcomes must match this one for the same inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialRunner;

impl SequentialRunner {
    pub fn new() -> Self {
        Self
    }

    pub async fn map<I, O, E, F, Fut>(&self, mut action: F, inputs: Vec<I>) -> AggregateResult<O, E>
    where
        F: FnMut(I) -> Fut,
        Fut: Future<Output = AttemptResult<O, E>>,
    {
        let mut outputs = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.into_iter().enumerate() {
            match action(input).await {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    tracing::debug!(unit = index, "sequential map stopped at failing input");
                    return Err(err);
                }
            }
        }

        Ok(outputs)
    }
}
