//! Error taxonomy for the event bus core.
//!
//! `EventBusError` is raised to callers at API boundaries (validation and
//! lifecycle violations). `HandlerError` is the Rust realization of "any
//! exception raised by a user handler": it is captured inside the
//! subscriber that invoked the handler and never surfaces through
//! `EventBusError`.

use thiserror::Error;

/// Errors raised directly to callers of the public API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// A null/empty/non-positive/negative argument was supplied where the
    /// contract forbids it (e.g. a negative delay, a non-positive batch
    /// size, an unknown scheduled-task id).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid for the component's current lifecycle
    /// state (e.g. `publish` while not `RUNNING`, any call after
    /// `shutdown`).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An `ExceptionTimeout` publish exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The calling thread was interrupted while awaiting a timed publish.
    #[error("operation was interrupted")]
    Interrupted,
}

/// The captured failure of a single user handler invocation. Never
/// surfaced outside the subscriber that owns the failing handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler returned `Err` with this message.
    #[error("{0}")]
    Failed(String),

    /// The handler panicked; the panic payload, downcast to a string where
    /// possible, is preserved as the message.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }

    pub(crate) fn from_panic_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        HandlerError::Panicked(message)
    }
}
