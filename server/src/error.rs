use gate_shared::{ConnectionId, FrameError};
use log::error;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

/// Everything the gateway core can report to a caller.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("connection limit of {limit} reached")]
    CapacityExceeded { limit: usize },
    #[error("connection id {0} is already registered")]
    IdConflict(ConnectionId),
    #[error("no live connection with id {0}")]
    InvalidTarget(ConnectionId),
    #[error("outbound queue of connection {id} stayed full for {timeout:?}")]
    BackpressureTimeout { id: ConnectionId, timeout: Duration },
    #[error("connection {0} is closed")]
    LinkClosed(ConnectionId),
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
    #[error("recovered from panic: {0}")]
    Fault(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Turns a caught panic payload into a `Fault`.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        GateError::Fault(message)
    }
}

/// Logs a panic caught at a task boundary, with the task's stack when
/// `RUST_BACKTRACE` is set.
pub(crate) fn log_panic(task: &str, id: impl Display, cause: &str) {
    error!("[PANIC] {} id: {} cause: {}", task, id, cause);
    let trace = Backtrace::capture();
    if trace.status() == BacktraceStatus::Captured {
        error!("[PANIC] {} stack:\n{}", task, trace);
    }
}
