//! Fan-out/fan-in executors: a fail-fast sequential reference runner and the
//! task-per-unit concurrent runner built on top of tokio.

pub mod concurrent;
mod join;
pub mod sequential;

pub use concurrent::ConcurrentRunner;
pub use sequential::SequentialRunner;
