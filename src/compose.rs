//! Retry loops composed with the concurrent runner: every input becomes one
//! unit running its own, independent retry loop.

pub mod preemptible;
pub mod retry;

pub use preemptible::PreemptibleRetryRunner;
pub use retry::RetryRunner;

use crate::result::AttemptResult;

/// Adapts a caller predicate on outputs to a predicate on attempt results.
///
/// An error is terminal: it is never retried and the caller's predicate is not
/// consulted for it.
pub(crate) fn retry_on_output<O, E>(
    result: &AttemptResult<O, E>,
    should_retry: impl FnOnce(&O) -> bool,
) -> bool {
    result.as_ref().is_ok_and(should_retry)
}
