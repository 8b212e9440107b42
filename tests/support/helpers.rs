use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Counts how many times the action ran for each input.
#[derive(Clone, Default)]
pub struct AttemptLog {
    counts: Arc<Mutex<BTreeMap<usize, usize>>>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one attempt on `input` and returns its attempt number (1-based).
    pub fn record(&self, input: usize) -> usize {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(input).or_insert(0);
        *count += 1;
        *count
    }

    pub fn count(&self, input: usize) -> usize {
        self.counts
            .lock()
            .unwrap()
            .get(&input)
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.lock().unwrap().values().sum()
    }

    pub fn invoked_inputs(&self) -> Vec<usize> {
        self.counts.lock().unwrap().keys().copied().collect()
    }
}

/// Delay that makes later inputs finish before earlier ones.
pub fn reversed_delay(input: usize, len: usize) -> Duration {
    Duration::from_millis((len.saturating_sub(input) * 15) as u64)
}
