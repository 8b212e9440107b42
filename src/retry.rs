//! Retry policies consumed by the retry compositions: a composable
//! [`RetryPolicy`] and the two-phase, signal-aware [`PreemptibleRetry`].

mod backoff;
pub mod policy;
pub mod preemptible;

pub use policy::{
    constant_delay, exponential_backoff, limit_cumulative_delay, limit_retries, RetryPolicy,
    RetryPolicyBuilder, RetryStatus,
};
pub use preemptible::{CancellationSignal, PreemptibleRetry, PreemptibleRetryStatus, RetryPhase};
