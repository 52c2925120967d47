//! Stops a request once its caller has cancelled.

use async_trait::async_trait;
use courier_core::FixedOrder;
use tracing::debug;

use super::RequestMiddleware;
use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::pipeline::{ErasedResponse, Next};

/// Fails with `DispatchError::Cancelled` instead of running the rest of the
/// chain when the request's token has fired. Work already running further
/// in is not interrupted.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancellationMiddleware;

impl FixedOrder for CancellationMiddleware {
    const ORDER: i32 = -100;
}

#[async_trait]
impl RequestMiddleware for CancellationMiddleware {
    async fn handle(
        &self,
        envelope: &Envelope<'_>,
        next: Next<'_>,
    ) -> Result<ErasedResponse, DispatchError> {
        if envelope.is_cancelled() {
            debug!(request = envelope.type_name(), "request cancelled before handling");
            return Err(DispatchError::Cancelled {
                request_type: envelope.type_name(),
            });
        }
        next.run(envelope).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use courier_core::{Request, RequestKind};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::handler::RequestHandler;
    use crate::mediator::Mediator;
    use crate::pipeline::Registration;

    struct Archive;

    impl Request for Archive {
        type Response = ();
        const KIND: RequestKind = RequestKind::Command;
    }

    struct Archiver {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RequestHandler<Archive> for Archiver {
        async fn handle(
            &self,
            _request: &Archive,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn mediator(calls: &Arc<AtomicUsize>) -> Mediator {
        Mediator::builder()
            .handler::<Archive, _>(Archiver {
                calls: Arc::clone(calls),
            })
            .middleware(Registration::request_fixed(CancellationMiddleware))
            .build()
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mediator = mediator(&calls);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = mediator.send_with(Archive, &cancel).await.unwrap_err();

        assert!(matches!(err, DispatchError::Cancelled { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(mediator.statistics().commands_executed(), 1);
    }

    #[tokio::test]
    async fn live_token_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mediator = mediator(&calls);

        mediator.send_with(Archive, &CancellationToken::new()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
