//! Request dispatcher: routes a request through its pipeline to its single handler.

use std::any::type_name;
use std::sync::Arc;
use std::time::Instant;

use courier_core::{LifecycleEvent, MessageInfo, Request};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::handler::{HandlerBinding, HandlerRegistry};
use crate::observer::LifecycleObserver;
use crate::pipeline::{PipelineBuilder, RequestMiddlewareStore};
use crate::statistics::ExecutionStatistics;

/// Resolves the handler binding, builds the pipeline for this request
/// instance and runs it.
#[derive(Clone)]
pub struct RequestDispatcher {
    handlers: Arc<HandlerRegistry>,
    middleware: Arc<RequestMiddlewareStore>,
    statistics: Arc<ExecutionStatistics>,
    observer: Arc<dyn LifecycleObserver>,
}

impl RequestDispatcher {
    #[must_use]
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        middleware: Arc<RequestMiddlewareStore>,
        statistics: Arc<ExecutionStatistics>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        Self {
            handlers,
            middleware,
            statistics,
            observer,
        }
    }

    /// Dispatches `request` to its handler.
    ///
    /// Every call counts as one attempt in the statistics, whether or not it
    /// succeeds.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::HandlerNotFound`] / [`DispatchError::AmbiguousHandler`]
    ///   when `R` is not bound to exactly one handler. No middleware runs.
    /// - Any error a middleware or the handler returned, unchanged.
    pub async fn send<R: Request>(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<R::Response, DispatchError> {
        let info = MessageInfo::of_request::<R>();
        self.statistics.record_dispatch(&info);
        self.observer.on_event(&LifecycleEvent::DispatchStarted {
            request_type: info.type_name,
            kind: info.kind,
        });

        let started = Instant::now();
        let result = self.route(info, &request, cancel).await;

        self.observer.on_event(&LifecycleEvent::DispatchCompleted {
            request_type: info.type_name,
            kind: info.kind,
            duration: started.elapsed(),
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    async fn route<R: Request>(
        &self,
        info: MessageInfo,
        request: &R,
        cancel: &CancellationToken,
    ) -> Result<R::Response, DispatchError> {
        let entry = match self.handlers.resolve(info.type_id) {
            HandlerBinding::Single(entry) => entry,
            HandlerBinding::Missing => {
                return Err(DispatchError::HandlerNotFound {
                    request_type: info.type_name,
                })
            }
            HandlerBinding::Multiple(candidates) => {
                return Err(DispatchError::AmbiguousHandler {
                    request_type: info.type_name,
                    candidates,
                })
            }
        };

        let envelope = Envelope::new(info, request, cancel);
        let pipeline = PipelineBuilder::build(&self.middleware, &envelope);
        trace!(
            request = info.type_name,
            handler = entry.name(),
            middleware = ?pipeline,
            "dispatching"
        );

        let response = pipeline.execute(&envelope, entry.handler()).await?;
        response
            .downcast::<R::Response>()
            .map(|response| *response)
            .map_err(|_| DispatchError::TypeMismatch {
                request_type: info.type_name,
                expected: type_name::<R::Response>(),
            })
    }
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("handlers", &self.handlers)
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
