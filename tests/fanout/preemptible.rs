use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::{init_tracing, AttemptLog};
use fanmap::retry::{constant_delay, limit_retries};
use fanmap::{CancellationSignal, PreemptibleRetry, PreemptibleRetryRunner, Telemetry};
use tokio::time::{sleep, timeout};

const UNITS: usize = 4;
const TRIGGER_ATTEMPT: usize = 5;

#[tokio::test(start_paused = true)]
async fn no_unit_retries_after_condition_is_raised() {
    init_tracing();
    let runner = PreemptibleRetryRunner::new(
        constant_delay(Duration::from_millis(10)) + limit_retries(10_000),
        constant_delay(Duration::from_millis(10)) + limit_retries(10_000),
    );
    let signal = Arc::new(CancellationSignal::new());
    let stop = Arc::new(AtomicBool::new(false));
    let log = AttemptLog::new();

    let cond = {
        let stop = stop.clone();
        move || stop.load(Ordering::SeqCst)
    };
    let action = {
        let signal = signal.clone();
        let stop = stop.clone();
        let log = log.clone();
        move |input: usize| {
            let attempt = log.record(input);
            if input == 0 && attempt == TRIGGER_ATTEMPT {
                stop.store(true, Ordering::SeqCst);
                signal.notify();
            }
            async move { Ok::<_, anyhow::Error>(attempt) }
        }
    };

    let output = runner
        .map_concurrently_preemptible_retry(
            signal,
            cond,
            |_, _: &usize| true,
            action,
            (0..UNITS).collect(),
        )
        .await
        .unwrap();

    assert!(stop.load(Ordering::SeqCst));
    assert_eq!(output[0], TRIGGER_ATTEMPT);
    for input in 0..UNITS {
        assert!(
            log.count(input) <= TRIGGER_ATTEMPT,
            "input {input} made {} attempts",
            log.count(input)
        );
    }
    assert!(log.total() <= UNITS * TRIGGER_ATTEMPT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn notify_wakes_units_waiting_on_long_delays() {
    init_tracing();
    let runner = PreemptibleRetryRunner::from_policy(PreemptibleRetry::new(
        constant_delay(Duration::from_secs(3600)) + limit_retries(5),
        limit_retries(0),
    ));
    let signal = Arc::new(CancellationSignal::new());
    let stop = Arc::new(AtomicBool::new(false));
    let log = AttemptLog::new();

    let cond = {
        let stop = stop.clone();
        move || stop.load(Ordering::SeqCst)
    };
    let action = {
        let signal = signal.clone();
        let stop = stop.clone();
        let log = log.clone();
        move |input: usize| {
            log.record(input);
            let signal = signal.clone();
            let stop = stop.clone();
            async move {
                if input == 0 {
                    sleep(Duration::from_millis(50)).await;
                    stop.store(true, Ordering::SeqCst);
                    signal.notify();
                }
                Ok::<_, anyhow::Error>(input)
            }
        }
    };

    let output = timeout(
        Duration::from_secs(10),
        runner.map_concurrently_preemptible_retry(
            signal,
            cond,
            |_, _: &usize| true,
            action,
            (0..UNITS).collect(),
        ),
    )
    .await
    .expect("units should be woken by the signal")
    .unwrap();

    assert_eq!(output, (0..UNITS).collect::<Vec<_>>());
    assert_eq!(log.total(), UNITS);
}

#[tokio::test(start_paused = true)]
async fn raised_condition_allows_exactly_one_attempt_per_unit() {
    init_tracing();
    let telemetry = Arc::new(Telemetry::default());
    let runner = PreemptibleRetryRunner::new(limit_retries(100), limit_retries(100))
        .with_telemetry(telemetry.clone());
    let log = AttemptLog::new();
    let recorder = log.clone();

    let output = runner
        .map_concurrently_preemptible_retry(
            Arc::new(CancellationSignal::new()),
            || true,
            |_, _: &usize| true,
            move |input: usize| {
                recorder.record(input);
                async move { Ok::<_, String>(input) }
            },
            (0..UNITS).collect(),
        )
        .await;

    assert_eq!(output, Ok((0..UNITS).collect()));
    assert_eq!(log.total(), UNITS);
    let snapshot = telemetry.snapshot();
    assert_eq!(snapshot.attempts, UNITS as u64);
    assert_eq!(snapshot.retries, 0);
}

#[tokio::test(start_paused = true)]
async fn error_ends_unit_and_fails_aggregate_despite_cancellation() {
    init_tracing();
    let runner = PreemptibleRetryRunner::new(limit_retries(3), limit_retries(3));
    let log = AttemptLog::new();
    let recorder = log.clone();

    let result = runner
        .map_concurrently_preemptible_retry(
            Arc::new(CancellationSignal::new()),
            || false,
            |_, _: &usize| true,
            move |input: usize| {
                let attempt = recorder.record(input);
                async move {
                    if input == 2 {
                        Err(format!("input {input} is unusable"))
                    } else {
                        Ok(attempt)
                    }
                }
            },
            (0..UNITS).collect(),
        )
        .await;

    assert_eq!(result, Err("input 2 is unusable".to_string()));
    assert_eq!(log.count(2), 1);
    assert_eq!(log.count(0), 7);
}

#[tokio::test]
async fn empty_input_never_invokes_anything() {
    let runner = PreemptibleRetryRunner::new(limit_retries(3), limit_retries(3));
    let log = AttemptLog::new();
    let recorder = log.clone();

    let output = runner
        .map_concurrently_preemptible_retry(
            Arc::new(CancellationSignal::new()),
            || false,
            |_, _: &usize| true,
            move |input: usize| {
                recorder.record(input);
                async move { Ok::<_, String>(input) }
            },
            Vec::new(),
        )
        .await;

    assert_eq!(output, Ok(Vec::new()));
    assert_eq!(log.total(), 0);
    assert_eq!(runner.telemetry().units(), 0);
}
