use super::preemptible::CancellationSignal;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;

pub(crate) async fn sleep_or_yield(delay: Duration) {
    if delay.is_zero() {
        yield_now().await;
        return;
    }

    sleep(delay).await;
}

/// Waits up to `delay` between two attempts.
///
/// Every notification on `signal` re-evaluates `cond`; the wait ends early with
/// `true` as soon as `cond` holds. The notification is armed before `cond` is
/// read so a notify racing with the check is not lost.
pub(crate) async fn wait_for_signal<C>(
    signal: &CancellationSignal,
    cond: &C,
    delay: Duration,
) -> bool
where
    C: Fn() -> bool,
{
    let timer = sleep(delay);
    tokio::pin!(timer);

    loop {
        let notified = signal.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if cond() {
            return true;
        }

        tokio::select! {
            _ = &mut timer => return cond(),
            _ = notified.as_mut() => {}
        }
    }
}
