//! `tower::Service` adapter over [`Mediator::send`].
//!
//! Lets a host stack tower layers (transport, rate limiting, retries) in
//! front of dispatch. The service is ready whenever the mediator is; load
//! shedding, if wanted, is the concurrency limit middleware's job.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use courier_core::Request;
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::error::DispatchError;
use crate::mediator::Mediator;

/// Dispatches any [`Request`] it is called with.
#[derive(Debug, Clone)]
pub struct MediatorService {
    mediator: Mediator,
    cancel: CancellationToken,
}

impl MediatorService {
    #[must_use]
    pub fn new(mediator: Mediator) -> Self {
        Self {
            mediator,
            cancel: CancellationToken::new(),
        }
    }

    /// Every call made through this service observes `cancel`.
    #[must_use]
    pub fn with_cancellation(mediator: Mediator, cancel: CancellationToken) -> Self {
        Self { mediator, cancel }
    }
}

impl<R: Request> Service<R> for MediatorService {
    type Response = R::Response;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<R::Response, DispatchError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: R) -> Self::Future {
        let mediator = self.mediator.clone();
        let cancel = self.cancel.clone();
        Box::pin(async move { mediator.send_with(request, &cancel).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use courier_core::RequestKind;
    use tower::ServiceExt;

    use super::*;
    use crate::handler::RequestHandler;
    use crate::middleware::CancellationMiddleware;
    use crate::pipeline::Registration;

    struct Square(u32);

    impl Request for Square {
        type Response = u32;
        const KIND: RequestKind = RequestKind::Query;
    }

    struct Shout(&'static str);

    impl Request for Shout {
        type Response = String;
        const KIND: RequestKind = RequestKind::Query;
    }

    struct Calculator;

    #[async_trait]
    impl RequestHandler<Square> for Calculator {
        async fn handle(
            &self,
            request: &Square,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<u32> {
            Ok(request.0 * request.0)
        }
    }

    #[async_trait]
    impl RequestHandler<Shout> for Calculator {
        async fn handle(
            &self,
            request: &Shout,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<String> {
            Ok(request.0.to_uppercase())
        }
    }

    fn mediator() -> Mediator {
        Mediator::builder()
            .handler::<Square, _>(Calculator)
            .handler::<Shout, _>(Calculator)
            .middleware(Registration::request_fixed(CancellationMiddleware))
            .build()
    }

    #[tokio::test]
    async fn oneshot_dispatches_any_request_type() {
        let service = MediatorService::new(mediator());

        assert_eq!(service.clone().oneshot(Square(7)).await.unwrap(), 49);
        assert_eq!(service.oneshot(Shout("hi")).await.unwrap(), "HI");
    }

    #[tokio::test]
    async fn composes_with_tower_combinators() {
        let service =
            ServiceExt::<Square>::map_response(MediatorService::new(mediator()), |n: u32| n + 1);

        assert_eq!(service.oneshot(Square(3)).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn routing_errors_surface_as_service_errors() {
        struct Unknown;

        impl Request for Unknown {
            type Response = ();
            const KIND: RequestKind = RequestKind::Command;
        }

        let err = MediatorService::new(mediator())
            .oneshot(Unknown)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::HandlerNotFound { .. }));
    }

    #[tokio::test]
    async fn shared_token_cancels_calls() {
        let cancel = CancellationToken::new();
        let service = MediatorService::with_cancellation(mediator(), cancel.clone());
        cancel.cancel();

        let err = service.oneshot(Square(2)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled { .. }));
    }
}
