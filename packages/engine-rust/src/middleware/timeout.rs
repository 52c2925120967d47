//! Timeout middleware for requests.
//!
//! Fails requests that run past their deadline with `DispatchError::Timeout`.
//! The deadline is the configured default unless the request type has an
//! override.

use std::any::TypeId;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{FixedOrder, Request};
use tracing::warn;

use super::RequestMiddleware;
use crate::config::MediatorConfig;
use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::pipeline::{ErasedResponse, Next};

/// Per-request deadline around everything inside it, handler included.
///
/// The inner future is dropped when the deadline passes, so a handler that
/// never yields cannot be interrupted.
#[derive(Debug, Clone)]
pub struct TimeoutMiddleware {
    default: Duration,
    overrides: HashMap<TypeId, (&'static str, Duration)>,
}

impl TimeoutMiddleware {
    #[must_use]
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &MediatorConfig) -> Self {
        Self::new(Duration::from_millis(config.default_request_timeout_ms))
    }

    /// Uses `timeout` instead of the default for requests of type `R`.
    #[must_use]
    pub fn with_override<R: Request>(mut self, timeout: Duration) -> Self {
        self.overrides.insert(
            TypeId::of::<R>(),
            (std::any::type_name::<R>(), timeout),
        );
        self
    }

    #[must_use]
    pub fn timeout_for(&self, type_id: TypeId) -> Duration {
        self.overrides
            .get(&type_id)
            .map_or(self.default, |(_, timeout)| *timeout)
    }
}

impl FixedOrder for TimeoutMiddleware {
    const ORDER: i32 = -200;
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl RequestMiddleware for TimeoutMiddleware {
    fn configuration(&self) -> Option<String> {
        let mut overrides: Vec<String> = self
            .overrides
            .values()
            .map(|(name, timeout)| {
                format!(
                    "{}={}ms",
                    courier_core::names::short_type_name(name),
                    millis(*timeout)
                )
            })
            .collect();
        overrides.sort();
        if overrides.is_empty() {
            Some(format!("default={}ms", millis(self.default)))
        } else {
            Some(format!(
                "default={}ms, {}",
                millis(self.default),
                overrides.join(", ")
            ))
        }
    }

    async fn handle(
        &self,
        envelope: &Envelope<'_>,
        next: Next<'_>,
    ) -> Result<ErasedResponse, DispatchError> {
        let limit = self.timeout_for(envelope.info().type_id);
        match tokio::time::timeout(limit, next.run(envelope)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                let timeout_ms = millis(limit);
                warn!(request = envelope.type_name(), timeout_ms, "request timed out");
                Err(DispatchError::Timeout {
                    request_type: envelope.type_name(),
                    timeout_ms,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use courier_core::RequestKind;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::handler::RequestHandler;
    use crate::mediator::Mediator;
    use crate::pipeline::Registration;

    /// Request whose handler sleeps for `delay_ms`.
    struct Slow {
        delay_ms: u64,
    }

    impl Request for Slow {
        type Response = &'static str;
        const KIND: RequestKind = RequestKind::Query;
    }

    struct Report {
        delay_ms: u64,
    }

    impl Request for Report {
        type Response = &'static str;
        const KIND: RequestKind = RequestKind::Query;
    }

    struct Sleeper;

    #[async_trait]
    impl RequestHandler<Slow> for Sleeper {
        async fn handle(
            &self,
            request: &Slow,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<&'static str> {
            tokio::time::sleep(Duration::from_millis(request.delay_ms)).await;
            Ok("done")
        }
    }

    #[async_trait]
    impl RequestHandler<Report> for Sleeper {
        async fn handle(
            &self,
            request: &Report,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<&'static str> {
            tokio::time::sleep(Duration::from_millis(request.delay_ms)).await;
            Ok("report")
        }
    }

    fn mediator(timeout: TimeoutMiddleware) -> Mediator {
        Mediator::builder()
            .handler::<Slow, _>(Sleeper)
            .handler::<Report, _>(Sleeper)
            .middleware(Registration::request_fixed(timeout))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn fast_request_passes_through() {
        let mediator = mediator(TimeoutMiddleware::new(Duration::from_millis(100)));
        assert_eq!(mediator.send(Slow { delay_ms: 10 }).await.unwrap(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_times_out() {
        let mediator = mediator(TimeoutMiddleware::new(Duration::from_millis(50)));

        let err = mediator.send(Slow { delay_ms: 500 }).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Timeout { timeout_ms: 50, .. }
        ));
        assert!(err.to_string().contains("timed out after 50ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn override_applies_to_its_request_type_only() {
        let timeout = TimeoutMiddleware::new(Duration::from_millis(50))
            .with_override::<Report>(Duration::from_secs(5));
        let mediator = mediator(timeout);

        assert_eq!(mediator.send(Report { delay_ms: 500 }).await.unwrap(), "report");
        assert!(mediator.send(Slow { delay_ms: 500 }).await.is_err());
    }

    #[test]
    fn configuration_lists_overrides() {
        let timeout = TimeoutMiddleware::new(Duration::from_millis(250))
            .with_override::<Report>(Duration::from_secs(2));
        assert_eq!(
            timeout.configuration().as_deref(),
            Some("default=250ms, Report=2000ms")
        );
        assert_eq!(
            TimeoutMiddleware::new(Duration::from_secs(1)).configuration().as_deref(),
            Some("default=1000ms")
        );
    }

    #[test]
    fn built_from_config() {
        let config = MediatorConfig {
            default_request_timeout_ms: 1234,
            ..MediatorConfig::default()
        };
        let timeout = TimeoutMiddleware::from_config(&config);
        assert_eq!(timeout.timeout_for(TypeId::of::<Slow>()), Duration::from_millis(1234));
    }
}
