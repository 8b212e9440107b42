use std::any::Any;
use tokio::task::JoinError;

/// Unwraps a joined unit, resuming its panic in the caller if it had one.
///
/// Units are only aborted once the caller has dropped the call, so a non-panic
/// `JoinError` reaching this point means the runtime is shutting down.
pub(crate) fn settle<T>(unit: usize, joined: Result<T, JoinError>) -> T {
    match joined {
        Ok(value) => value,
        Err(err) => match err.try_into_panic() {
            Ok(payload) => {
                let panic_msg = panic_message(payload.as_ref());
                tracing::error!(unit, panic = %panic_msg, "unit panicked; resuming in caller");
                std::panic::resume_unwind(payload)
            }
            Err(err) => {
                tracing::error!(unit, error = %err, "unit did not run to completion");
                panic!("unit {unit} did not run to completion: {err}")
            }
        },
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
