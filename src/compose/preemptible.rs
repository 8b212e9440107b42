use super::retry_on_output;
use crate::result::{AggregateResult, AttemptResult};
use crate::retry::{CancellationSignal, PreemptibleRetry, PreemptibleRetryStatus, RetryPolicy};
use crate::runner::ConcurrentRunner;
use crate::telemetry::Telemetry;
use std::future::Future;
use std::sync::Arc;

/// Concurrent per-unit retry whose retries can be stopped across all units.
///
/// Every unit follows the same [`PreemptibleRetry`] and shares the caller's
/// [`CancellationSignal`] and condition. Once the condition holds, no unit
/// starts another attempt; attempts already running finish normally and their
/// results are part of the aggregate.
///
/// ```no_run
/// # async fn demo() {
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use fanmap::retry::{constant_delay, exponential_backoff, limit_retries, CancellationSignal};
/// use fanmap::PreemptibleRetryRunner;
///
/// let runner = PreemptibleRetryRunner::new(
///     constant_delay(Duration::from_millis(100)) + limit_retries(100),
///     exponential_backoff(Duration::from_millis(1)) + limit_retries(10),
/// );
/// let signal = Arc::new(CancellationSignal::new());
/// let stop = Arc::new(AtomicBool::new(false));
///
/// let cond = {
///     let stop = stop.clone();
///     move || stop.load(Ordering::SeqCst)
/// };
/// let action = {
///     let signal = signal.clone();
///     move |job: u32| {
///         let stop = stop.clone();
///         let signal = signal.clone();
///         async move {
///             if job == 0 {
///                 stop.store(true, Ordering::SeqCst);
///                 signal.notify();
///             }
///             Ok::<_, anyhow::Error>(job)
///         }
///     }
/// };
///
/// let output = runner
///     .map_concurrently_preemptible_retry(signal, cond, |_, _: &u32| true, action, vec![0, 1, 2])
///     .await;
/// # let _ = output;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PreemptibleRetryRunner {
    runner: ConcurrentRunner,
    policy: Arc<PreemptibleRetry>,
}

impl PreemptibleRetryRunner {
    /// Builds the runner from the policies of the two retry phases.
    pub fn new(before: RetryPolicy, after: RetryPolicy) -> Self {
        Self::from_policy(PreemptibleRetry::new(before, after))
    }

    pub fn from_policy(policy: PreemptibleRetry) -> Self {
        Self {
            runner: ConcurrentRunner::new(),
            policy: Arc::new(policy),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.runner = self.runner.with_telemetry(telemetry);
        self
    }

    pub fn policy(&self) -> &PreemptibleRetry {
        &self.policy
    }

    pub fn runner(&self) -> &ConcurrentRunner {
        &self.runner
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.runner.telemetry()
    }

    /// Runs `action` concurrently on every input with a preemptible retry loop
    /// per unit.
    ///
    /// `signal` and `cond` are handed unchanged to every unit's loop. Errors end
    /// a unit immediately, exactly as in
    /// [`RetryRunner::map_concurrently_retry`](crate::RetryRunner::map_concurrently_retry).
    pub async fn map_concurrently_preemptible_retry<I, O, E, C, P, F, Fut>(
        &self,
        signal: Arc<CancellationSignal>,
        cond: C,
        should_retry: P,
        action: F,
        inputs: Vec<I>,
    ) -> AggregateResult<O, E>
    where
        I: Clone + Send + Sync + 'static,
        O: Send + 'static,
        E: Send + 'static,
        C: Fn() -> bool + Send + Sync + 'static,
        P: Fn(PreemptibleRetryStatus, &O) -> bool + Send + Sync + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AttemptResult<O, E>> + Send + 'static,
    {
        let policy = self.policy.clone();
        let telemetry = self.runner.telemetry();
        let cond = Arc::new(cond);
        let should_retry = Arc::new(should_retry);
        let action = Arc::new(action);

        let unit = move |input: I| {
            let policy = policy.clone();
            let telemetry = telemetry.clone();
            let signal = signal.clone();
            let cond = cond.clone();
            let should_retry = should_retry.clone();
            let action = action.clone();

            async move {
                policy
                    .retry(
                        &signal,
                        || cond(),
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

impl From<PreemptibleRetry> for PreemptibleRetryRunner {
    fn from(policy: PreemptibleRetry) -> Self {
        Self::from_policy(policy)
    }
}
