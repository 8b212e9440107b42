//! Two-phase retry that can be cut short by a shared cancellation condition.

use super::backoff::wait_for_signal;
use super::policy::{duration_to_millis, RetryPolicy, RetryStatus};
use std::future::Future;
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Wakes units waiting between attempts so they re-check their cancellation
/// condition.
///
/// The signal carries no state of its own: the caller flips whatever flag its
/// condition reads, then calls [`CancellationSignal::notify`].
#[derive(Debug, Default)]
pub struct CancellationSignal {
    notify: Notify,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes every unit currently waiting between two attempts.
    pub fn notify(&self) {
        self.notify.notify_waiters();
    }

    pub(crate) fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    /// Governed by the `before` policy.
    Before,
    /// Governed by the `after` policy, once `before` ran out of retries.
    After,
}

/// Attempt state owned by a single unit's preemptible retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreemptibleRetryStatus {
    phase: RetryPhase,
    status: RetryStatus,
    iteration: usize,
}

impl PreemptibleRetryStatus {
    fn new() -> Self {
        Self {
            phase: RetryPhase::Before,
            status: RetryStatus::new(),
            iteration: 0,
        }
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    /// Status local to the current phase; it restarts when the phase changes.
    pub fn status(&self) -> RetryStatus {
        self.status
    }

    /// Retries performed so far across both phases.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    fn enter_after(self) -> Self {
        Self {
            phase: RetryPhase::After,
            status: RetryStatus::new(),
            iteration: self.iteration,
        }
    }

    fn advance(self, delay: Duration) -> Self {
        Self {
            phase: self.phase,
            status: self.status.advance(delay),
            iteration: self.iteration.saturating_add(1),
        }
    }
}

/// A `before` policy followed by an `after` policy, both preemptible.
///
/// A unit starts in [`RetryPhase::Before`]. When `before` stops, the unit moves
/// to [`RetryPhase::After`] with a fresh phase status and continues under
/// `after` until that one stops too. Only `before` running out moves a unit to
/// `after`; a notification on the signal never does. In either phase, once the caller's
/// condition holds no further attempt is started; an attempt already running
/// always completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreemptibleRetry {
    before: RetryPolicy,
    after: RetryPolicy,
}

impl PreemptibleRetry {
    pub fn new(before: RetryPolicy, after: RetryPolicy) -> Self {
        Self { before, after }
    }

    pub fn before(&self) -> &RetryPolicy {
        &self.before
    }

    pub fn after(&self) -> &RetryPolicy {
        &self.after
    }

    /// Runs `action` until `should_retry` declines, both phases stop, or `cond`
    /// is observed to hold at an attempt boundary.
    ///
    /// `cond` is evaluated after every attempt the predicate wants to repeat and
    /// whenever `signal` is notified during the wait that follows. The last
    /// attempt's value is returned in every case.
    pub async fn retry<T, C, P, A, Fut>(
        &self,
        signal: &CancellationSignal,
        cond: C,
        mut should_retry: P,
        mut action: A,
    ) -> T
    where
        C: Fn() -> bool,
        P: FnMut(PreemptibleRetryStatus, &T) -> bool,
        A: FnMut(PreemptibleRetryStatus) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut status = PreemptibleRetryStatus::new();

        loop {
            let result = action(status).await;
            if !should_retry(status, &result) {
                return result;
            }

            if cond() {
                tracing::debug!(
                    attempts = status.iteration + 1,
                    phase = ?status.phase,
                    "cancellation condition holds; not retrying"
                );
                return result;
            }

            let Some((next, delay)) = self.next_step(status) else {
                tracing::debug!(
                    attempts = status.iteration + 1,
                    "both retry phases exhausted; returning last attempt"
                );
                return result;
            };

            tracing::trace!(
                attempt = status.iteration + 1,
                phase = ?next.phase,
                delay_ms = duration_to_millis(delay),
                "attempt not accepted; waiting for retry"
            );

            if wait_for_signal(signal, &cond, delay).await {
                tracing::debug!(
                    attempts = status.iteration + 1,
                    "cancellation condition observed while waiting; not retrying"
                );
                return result;
            }

            status = next.advance(delay);
        }
    }

    fn next_step(&self, status: PreemptibleRetryStatus) -> Option<(PreemptibleRetryStatus, Duration)> {
        match status.phase {
            RetryPhase::Before => match self.before.next_delay(&status.status) {
                Some(delay) => Some((status, delay)),
                None => {
                    let entered = status.enter_after();
                    tracing::debug!(
                        attempts = status.iteration + 1,
                        "before phase exhausted; switching to after phase"
                    );
                    self.after
                        .next_delay(&entered.status)
                        .map(|delay| (entered, delay))
                }
            },
            RetryPhase::After => self
                .after
                .next_delay(&status.status)
                .map(|delay| (status, delay)),
        }
    }
}
