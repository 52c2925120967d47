//! Errors surfaced by `send` and `publish`.

/// Errors returned from request dispatch.
///
/// Routing failures (`HandlerNotFound`, `AmbiguousHandler`) are raised before
/// any middleware runs. Failures from handlers and middleware code arrive as
/// `Execution` and display exactly as the original error did.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no handler registered for request type {request_type}")]
    HandlerNotFound { request_type: &'static str },
    #[error(
        "request type {request_type} has {} handlers registered: {}",
        .candidates.len(),
        .candidates.join(", ")
    )]
    AmbiguousHandler {
        request_type: &'static str,
        candidates: Vec<String>,
    },
    #[error("pipeline for {request_type} produced a value that is not a {expected}")]
    TypeMismatch {
        request_type: &'static str,
        expected: &'static str,
    },
    #[error("dispatch of {request_type} was cancelled")]
    Cancelled { request_type: &'static str },
    #[error("{request_type} timed out after {timeout_ms}ms")]
    Timeout {
        request_type: &'static str,
        timeout_ms: u64,
    },
    #[error("mediator overloaded, try again later")]
    Overloaded,
    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

impl DispatchError {
    /// Routing errors mean registration is wrong; retrying cannot help.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DispatchError::HandlerNotFound { .. } | DispatchError::AmbiguousHandler { .. }
        )
    }
}

/// Errors returned from `publish`.
///
/// Delivery failures never appear here; they are recorded in the
/// [`PublishReport`](courier_core::PublishReport).
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("notification middleware failed while publishing {notification_type}: {source:#}")]
    Middleware {
        notification_type: &'static str,
        source: anyhow::Error,
    },
}
