//! Composable retry policies.
//!
//! A policy is a set of steps that each vote on the delay before the next
//! attempt. Combining policies with `+` keeps every step: the combined policy
//! stops as soon as any step stops and otherwise waits for the largest delay.
//!
//! ```
//! use std::time::Duration;
//! use fanmap::retry::{constant_delay, limit_retries};
//!
//! let policy = constant_delay(Duration::from_millis(100)) + limit_retries(10);
//! ```

use super::backoff::sleep_or_yield;
use anyhow::{bail, Result};
use std::future::Future;
use std::ops::Add;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_DELAY_MS: u64 = 50;
const DEFAULT_RETRY_LIMIT: usize = 5;

/// Attempt state owned by a single unit's retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStatus {
    iteration: usize,
    cumulative_delay: Duration,
    previous_delay: Option<Duration>,
    started: Instant,
}

impl RetryStatus {
    /// Status of the first attempt of a loop starting now.
    pub fn new() -> Self {
        Self {
            iteration: 0,
            cumulative_delay: Duration::ZERO,
            previous_delay: None,
            started: Instant::now(),
        }
    }

    /// Number of retries performed so far; `0` during the first attempt.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Sum of all delays waited so far.
    pub fn cumulative_delay(&self) -> Duration {
        self.cumulative_delay
    }

    pub fn previous_delay(&self) -> Option<Duration> {
        self.previous_delay
    }

    /// Wall-clock time since the loop started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn advance(self, delay: Duration) -> Self {
        Self {
            iteration: self.iteration.saturating_add(1),
            cumulative_delay: self.cumulative_delay.saturating_add(delay),
            previous_delay: Some(delay),
            started: self.started,
        }
    }
}

impl Default for RetryStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    ConstantDelay(Duration),
    ExponentialBackoff(Duration),
    LimitRetries(usize),
}

impl Step {
    fn vote(&self, status: &RetryStatus) -> Option<Duration> {
        match *self {
            Step::ConstantDelay(delay) => Some(delay),
            Step::ExponentialBackoff(base) => Some(exponential_delay(base, status.iteration)),
            Step::LimitRetries(limit) => (status.iteration < limit).then_some(Duration::ZERO),
        }
    }
}

/// Immutable description of how a unit is retried.
///
/// The description is shared by every unit of a call; each unit threads its own
/// [`RetryStatus`] through [`RetryPolicy::retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    steps: Vec<Step>,
    max_delay: Option<Duration>,
    cumulative_budget: Option<Duration>,
}

/// Waits `delay` between attempts, forever.
pub fn constant_delay(delay: Duration) -> RetryPolicy {
    RetryPolicy::from_step(Step::ConstantDelay(delay))
}

/// Waits `base * 2^n` before retry `n + 1`, forever.
pub fn exponential_backoff(base: Duration) -> RetryPolicy {
    RetryPolicy::from_step(Step::ExponentialBackoff(base))
}

/// Allows at most `limit` retries, without delay of its own.
pub fn limit_retries(limit: usize) -> RetryPolicy {
    RetryPolicy::from_step(Step::LimitRetries(limit))
}

/// Stops once the next delay would push the total waited time past `budget`.
pub fn limit_cumulative_delay(budget: Duration) -> RetryPolicy {
    RetryPolicy {
        cumulative_budget: Some(budget),
        ..RetryPolicy::immediate()
    }
}

impl RetryPolicy {
    /// Retries immediately and without limit. Combine it with a limit.
    pub fn immediate() -> Self {
        Self {
            steps: Vec::new(),
            max_delay: None,
            cumulative_budget: None,
        }
    }

    /// Returns a builder that validates settings coming from configuration.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    fn from_step(step: Step) -> Self {
        Self {
            steps: vec![step],
            ..Self::immediate()
        }
    }

    /// Clamps every delay produced by the policy to `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(
            self.max_delay
                .map_or(max_delay, |current| current.min(max_delay)),
        );
        self
    }

    /// Delay to wait before the retry following `status`, or `None` to stop.
    pub fn next_delay(&self, status: &RetryStatus) -> Option<Duration> {
        let mut delay = Duration::ZERO;
        for step in &self.steps {
            delay = delay.max(step.vote(status)?);
        }

        if let Some(max_delay) = self.max_delay {
            delay = delay.min(max_delay);
        }

        if let Some(budget) = self.cumulative_budget {
            if status.cumulative_delay.saturating_add(delay) > budget {
                return None;
            }
        }

        Some(delay)
    }

    /// Runs `action` until `should_retry` declines or the policy stops.
    ///
    /// Returns whatever the last attempt produced. Stopping because the policy
    /// ran out of budget is not an error of its own: the last value is returned
    /// even though `should_retry` asked for another attempt.
    pub async fn retry<T, P, A, Fut>(&self, mut should_retry: P, mut action: A) -> T
    where
        P: FnMut(RetryStatus, &T) -> bool,
        A: FnMut(RetryStatus) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut status = RetryStatus::new();

        loop {
            let result = action(status).await;
            if !should_retry(status, &result) {
                return result;
            }

            let Some(delay) = self.next_delay(&status) else {
                tracing::debug!(
                    attempts = status.iteration + 1,
                    "retry policy exhausted; returning last attempt"
                );
                return result;
            };

            tracing::trace!(
                attempt = status.iteration + 1,
                delay_ms = duration_to_millis(delay),
                "attempt not accepted; retrying"
            );
            sleep_or_yield(delay).await;
            status = status.advance(delay);
        }
    }
}

impl Default for RetryPolicy {
    /// 50ms between attempts, at most 5 retries.
    fn default() -> Self {
        constant_delay(Duration::from_millis(DEFAULT_DELAY_MS)) + limit_retries(DEFAULT_RETRY_LIMIT)
    }
}

impl Add for RetryPolicy {
    type Output = RetryPolicy;

    fn add(mut self, rhs: RetryPolicy) -> RetryPolicy {
        self.steps.extend(rhs.steps);
        self.max_delay = min_option(self.max_delay, rhs.max_delay);
        self.cumulative_budget = min_option(self.cumulative_budget, rhs.cumulative_budget);
        self
    }
}

/// Builds a [`RetryPolicy`] from individually supplied settings.
#[derive(Debug, Default, Clone)]
pub struct RetryPolicyBuilder {
    constant_delay: Option<Duration>,
    exponential_backoff: Option<Duration>,
    limit_retries: Option<usize>,
    limit_cumulative_delay: Option<Duration>,
    max_delay: Option<Duration>,
}

impl RetryPolicyBuilder {
    pub fn constant_delay(mut self, delay: Duration) -> Self {
        self.constant_delay = Some(delay);
        self
    }

    pub fn exponential_backoff(mut self, base: Duration) -> Self {
        self.exponential_backoff = Some(base);
        self
    }

    pub fn limit_retries(mut self, limit: usize) -> Self {
        self.limit_retries = Some(limit);
        self
    }

    pub fn limit_cumulative_delay(mut self, budget: Duration) -> Self {
        self.limit_cumulative_delay = Some(budget);
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn build(self) -> Result<RetryPolicy> {
        let RetryPolicyBuilder {
            constant_delay: constant,
            exponential_backoff: exponential,
            limit_retries: limit,
            limit_cumulative_delay: budget,
            max_delay,
        } = self;

        if constant.is_none()
            && exponential.is_none()
            && limit.is_none()
            && budget.is_none()
        {
            bail!("retry policy needs at least one delay or limit setting");
        }

        if constant.is_some() && exponential.is_some() {
            bail!("constant_delay and exponential_backoff are mutually exclusive");
        }

        if exponential.is_some_and(|base| base.is_zero()) {
            bail!("exponential_backoff base must be greater than 0");
        }

        if budget.is_some_and(|budget| budget.is_zero()) {
            bail!("limit_cumulative_delay must be greater than 0");
        }

        if let Some(max_delay) = max_delay {
            if max_delay.is_zero() {
                bail!("max_delay must be greater than 0");
            }
            if let Some(base) = constant.or(exponential) {
                if max_delay < base {
                    bail!(
                        "max_delay ({}ms) must not be smaller than the base delay ({}ms)",
                        duration_to_millis(max_delay),
                        duration_to_millis(base),
                    );
                }
            }
        }

        let mut policy = RetryPolicy::immediate();
        if let Some(delay) = constant {
            policy = policy + constant_delay(delay);
        }
        if let Some(base) = exponential {
            policy = policy + exponential_backoff(base);
        }
        if let Some(limit) = limit {
            policy = policy + limit_retries(limit);
        }
        if let Some(budget) = budget {
            policy = policy + limit_cumulative_delay(budget);
        }
        if let Some(max_delay) = max_delay {
            policy = policy.with_max_delay(max_delay);
        }

        Ok(policy)
    }
}

fn exponential_delay(base: Duration, iteration: usize) -> Duration {
    u32::try_from(iteration)
        .ok()
        .and_then(|exponent| 2u32.checked_pow(exponent))
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

fn min_option(left: Option<Duration>, right: Option<Duration>) -> Option<Duration> {
    match (left, right) {
        (Some(left), Some(right)) => Some(left.min(right)),
        (left, right) => left.or(right),
    }
}

pub(crate) fn duration_to_millis(delay: Duration) -> u64 {
    delay.as_millis().min(u128::from(u64::MAX)) as u64
}
