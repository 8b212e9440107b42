pub mod compose;
pub mod result;
pub mod retry;
pub mod runner;
pub mod telemetry;

pub use compose::{PreemptibleRetryRunner, RetryRunner};
pub use result::{collect_in_order, AggregateResult, AttemptResult};
pub use retry::{
    CancellationSignal, PreemptibleRetry, PreemptibleRetryStatus, RetryPhase, RetryPolicy,
    RetryPolicyBuilder, RetryStatus,
};
pub use runner::{ConcurrentRunner, SequentialRunner};
pub use telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
