//! Tracing spans and timing for dispatch and publish.
//!
//! Each dispatch (or publish) runs inside an `info_span!` that records the
//! duration and outcome once the inner chain returns, and the duration is
//! also recorded as a `metrics` histogram.

use std::time::Instant;

use async_trait::async_trait;
use courier_core::FixedOrder;
use tracing::Instrument;

use super::{NotificationMiddleware, RequestMiddleware};
use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::pipeline::{ErasedResponse, Next, NotificationNext};

// ---------------------------------------------------------------------------
// InstrumentationMiddleware
// ---------------------------------------------------------------------------

/// Outermost request middleware: one span per dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstrumentationMiddleware;

impl FixedOrder for InstrumentationMiddleware {
    const ORDER: i32 = -300;
}

#[async_trait]
impl RequestMiddleware for InstrumentationMiddleware {
    async fn handle(
        &self,
        envelope: &Envelope<'_>,
        next: Next<'_>,
    ) -> Result<ErasedResponse, DispatchError> {
        let request = envelope.type_name();
        let kind = envelope.kind().as_str();
        let span = tracing::info_span!(
            "dispatch",
            request = request,
            kind = kind,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = next.run(envelope).await;
            let elapsed = start.elapsed();

            let outcome = match &result {
                Ok(_) => "ok",
                Err(_) => "error",
            };

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = elapsed.as_millis() as u64;
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);
            metrics::histogram!("courier_dispatch_duration_seconds", "kind" => kind)
                .record(elapsed.as_secs_f64());

            match &result {
                Ok(_) => tracing::info!(request, duration_ms, "request handled"),
                Err(err) => tracing::warn!(request, duration_ms, error = %err, "request failed"),
            }

            result
        }
        .instrument(span)
        .await
    }
}

// ---------------------------------------------------------------------------
// NotificationInstrumentationMiddleware
// ---------------------------------------------------------------------------

/// Outermost notification middleware: one span covering the whole fan-out.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationInstrumentationMiddleware;

impl FixedOrder for NotificationInstrumentationMiddleware {
    const ORDER: i32 = -300;
}

#[async_trait]
impl NotificationMiddleware for NotificationInstrumentationMiddleware {
    async fn handle(
        &self,
        envelope: &Envelope<'_>,
        next: NotificationNext<'_>,
    ) -> anyhow::Result<()> {
        let notification = envelope.type_name();
        let span = tracing::info_span!(
            "publish",
            notification = notification,
            duration_ms = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = next.run(envelope).await;
            let elapsed = start.elapsed();

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = elapsed.as_millis() as u64;
            tracing::Span::current().record("duration_ms", duration_ms);
            metrics::histogram!("courier_publish_duration_seconds").record(elapsed.as_secs_f64());
            tracing::debug!(notification, duration_ms, "notification fan-out finished");

            result
        }
        .instrument(span)
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
