use super::retry_on_output;
use crate::result::{AggregateResult, AttemptResult};
use crate::retry::{RetryPolicy, RetryStatus};
use crate::runner::ConcurrentRunner;
use crate::telemetry::Telemetry;
use std::future::Future;
use std::sync::Arc;

/// Runs an action concurrently on every input, retrying each unit on its own.
///
/// Each unit keeps its own [`RetryStatus`]; all of them follow the same
/// [`RetryPolicy`]. The aggregate fails only if some unit ends on an error,
/// meaning the action hit a condition where retrying is pointless.
///
/// ```no_run
/// # async fn demo() {
/// use std::time::Duration;
/// use fanmap::retry::{constant_delay, limit_retries};
/// use fanmap::RetryRunner;
///
/// let runner = RetryRunner::new(constant_delay(Duration::from_millis(100)) + limit_retries(10));
/// let output = runner
///     .map_concurrently_retry(
///         |_status, ready: &bool| !*ready,
///         |job: u32| async move { Ok::<_, anyhow::Error>(job % 2 == 0) },
///         vec![1, 2, 3],
///     )
///     .await;
/// # let _ = output;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryRunner {
    runner: ConcurrentRunner,
    policy: Arc<RetryPolicy>,
}

impl RetryRunner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            runner: ConcurrentRunner::new(),
            policy: Arc::new(policy),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.runner = self.runner.with_telemetry(telemetry);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The underlying runner, for plain `map`/`map_concurrently` calls.
    pub fn runner(&self) -> &ConcurrentRunner {
        &self.runner
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.runner.telemetry()
    }

    /// Like [`ConcurrentRunner::map_concurrently`], with every unit wrapped in
    /// a retry loop.
    ///
    /// A unit repeats `action` on its input while `should_retry` asks for it and
    /// the policy allows it. Errors end the unit immediately. When the policy
    /// runs out, the last output is kept even if `should_retry` still wanted
    /// another attempt.
    pub async fn map_concurrently_retry<I, O, E, P, F, Fut>(
        &self,
        should_retry: P,
        action: F,
        inputs: Vec<I>,
    ) -> AggregateResult<O, E>
    where
        I: Clone + Send + Sync + 'static,
        O: Send + 'static,
        E: Send + 'static,
        P: Fn(RetryStatus, &O) -> bool + Send + Sync + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AttemptResult<O, E>> + Send + 'static,
    {
        let policy = self.policy.clone();
        let telemetry = self.runner.telemetry();
        let should_retry = Arc::new(should_retry);
        let action = Arc::new(action);

        let unit = move |input: I| {
            let policy = policy.clone();
            let telemetry = telemetry.clone();
            let should_retry = should_retry.clone();
            let action = action.clone();

            async move {
                policy
                    .retry(
                        |status, result: &AttemptResult<O, E>| {
                            retry_on_output(result, |output| should_retry(status, output))
                        },
                        |status| {
                            telemetry.record_attempt();
                            if status.iteration() > 0 {
                                telemetry.record_retry();
                            }
                            action(input.clone())
                        },
                    )
                    .await
            }
        };

        self.runner.map_concurrently(unit, inputs).await
    }
}
