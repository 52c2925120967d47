//! Read-only view of the registered middleware.
//!
//! Every listing goes through [`PipelineBuilder`], the same code that builds
//! the chain for `send` and `publish`, so the order reported here is the
//! order middleware execute in.

use std::sync::Arc;

use courier_core::{MessageInfo, Notification, OrderSource, Request};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::envelope::Envelope;
use crate::middleware::PipelineStage;
use crate::pipeline::{
    MiddlewareDescriptor, NotificationMiddlewareStore, PipelineBuilder, RequestMiddlewareStore,
};

/// One middleware as the inspector reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareInfo {
    pub name: String,
    /// Resolved order; lower wraps outer.
    pub order: i64,
    pub order_source: OrderSource,
    /// e.g. `Timeout [-200 (fixed)] type:GetOrder`
    pub display: String,
    pub constraint: String,
    pub conditional: bool,
    pub configuration: Option<String>,
}

impl MiddlewareInfo {
    fn from_descriptor<M: ?Sized>(descriptor: &MiddlewareDescriptor<M>) -> Self {
        let order_source = descriptor.order_source();
        let constraint = descriptor.constraint().to_string();
        let mut display = format!("{} [{}] {}", descriptor.name(), order_source, constraint);
        if descriptor.is_conditional() {
            display.push_str(" (conditional)");
        }
        Self {
            name: descriptor.name().to_string(),
            order: order_source.value(),
            order_source,
            display,
            constraint,
            conditional: descriptor.is_conditional(),
            configuration: descriptor.configuration().map(str::to_string),
        }
    }
}

/// Both pipelines, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareAnalysis {
    pub request_middleware: Vec<MiddlewareInfo>,
    pub notification_middleware: Vec<MiddlewareInfo>,
}

/// Inspector over the request and notification middleware stores.
#[derive(Debug, Clone)]
pub struct PipelineInspector {
    requests: Arc<RequestMiddlewareStore>,
    notifications: Arc<NotificationMiddlewareStore>,
}

impl PipelineInspector {
    #[must_use]
    pub fn new(
        requests: Arc<RequestMiddlewareStore>,
        notifications: Arc<NotificationMiddlewareStore>,
    ) -> Self {
        Self {
            requests,
            notifications,
        }
    }

    /// Every registered request middleware, ignoring constraints and
    /// conditions.
    #[must_use]
    pub fn get_registered_middleware(&self) -> Vec<MiddlewareInfo> {
        describe(&PipelineBuilder::ordered(&self.requests))
    }

    #[must_use]
    pub fn get_registered_notification_middleware(&self) -> Vec<MiddlewareInfo> {
        describe(&PipelineBuilder::ordered(&self.notifications))
    }

    #[must_use]
    pub fn analyze_middleware(&self) -> MiddlewareAnalysis {
        MiddlewareAnalysis {
            request_middleware: self.get_registered_middleware(),
            notification_middleware: self.get_registered_notification_middleware(),
        }
    }

    /// The request middleware that would wrap this request instance, in
    /// execution order.
    #[must_use]
    pub fn analyze_for<R: Request>(&self, request: &R) -> Vec<MiddlewareInfo> {
        let cancel = CancellationToken::new();
        let envelope = Envelope::new(MessageInfo::of_request::<R>(), request, &cancel);
        describe(PipelineBuilder::build(&self.requests, &envelope).stages())
    }

    /// The notification middleware that would wrap a publish of this
    /// notification instance, in execution order.
    #[must_use]
    pub fn analyze_for_notification<N: Notification>(
        &self,
        notification: &N,
    ) -> Vec<MiddlewareInfo> {
        let cancel = CancellationToken::new();
        let envelope = Envelope::new(MessageInfo::of_notification::<N>(), notification, &cancel);
        describe(PipelineBuilder::build(&self.notifications, &envelope).stages())
    }
}

fn describe<M: ?Sized + PipelineStage>(
    descriptors: &[Arc<MiddlewareDescriptor<M>>],
) -> Vec<MiddlewareInfo> {
    descriptors
        .iter()
        .map(|d| MiddlewareInfo::from_descriptor(d))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use courier_core::{Constraint, RequestKind};
    use parking_lot::Mutex;

    use super::*;
    use crate::error::DispatchError;
    use crate::handler::RequestHandler;
    use crate::mediator::Mediator;
    use crate::middleware::{RequestMiddleware, TimeoutMiddleware};
    use crate::pipeline::{ErasedResponse, Next, Registration};

    struct Transfer {
        amount: u64,
    }

    impl Request for Transfer {
        type Response = ();
        const KIND: RequestKind = RequestKind::Command;
    }

    struct Balance;

    impl Request for Balance {
        type Response = u64;
        const KIND: RequestKind = RequestKind::Query;
    }

    struct Bank;

    #[async_trait]
    impl RequestHandler<Transfer> for Bank {
        async fn handle(
            &self,
            _request: &Transfer,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl RequestHandler<Balance> for Bank {
        async fn handle(
            &self,
            _request: &Balance,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<u64> {
            Ok(100)
        }
    }

    /// Appends its name to a shared log on entry.
    struct Trace {
        name: &'static str,
        order: Option<i32>,
        constraint: Constraint,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RequestMiddleware for Trace {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn order(&self) -> Option<i32> {
            self.order
        }

        fn constraint(&self) -> Constraint {
            self.constraint
        }

        async fn handle(
            &self,
            envelope: &Envelope<'_>,
            next: Next<'_>,
        ) -> Result<ErasedResponse, DispatchError> {
            self.log.lock().push(self.name.to_string());
            next.run(envelope).await
        }
    }

    fn mediator(log: &Arc<Mutex<Vec<String>>>) -> Mediator {
        let trace = |name, order, constraint| Trace {
            name,
            order,
            constraint,
            log: Arc::clone(log),
        };
        Mediator::builder()
            .handler::<Transfer, _>(Bank)
            .handler::<Balance, _>(Bank)
            .middleware(Registration::request(trace("validate", Some(10), Constraint::Commands)))
            .middleware(Registration::request(trace("audit", None, Constraint::Any)))
            .middleware(
                Registration::request(trace("fraud", Some(5), Constraint::Commands))
                    .when(|e| e.downcast_ref::<Transfer>().is_some_and(|t| t.amount > 1_000)),
            )
            .middleware(Registration::request(trace("cache", Some(-10), Constraint::Queries)))
            .middleware(Registration::request_fixed(TimeoutMiddleware::new(
                std::time::Duration::from_secs(1),
            )))
            .build()
    }

    fn names(infos: &[MiddlewareInfo]) -> Vec<&str> {
        infos.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn registered_middleware_in_resolved_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inspector = mediator(&log).inspector();

        let infos = inspector.get_registered_middleware();

        assert_eq!(
            names(&infos),
            vec!["TimeoutMiddleware", "cache", "audit", "fraud", "validate"]
        );
        let timeout = &infos[0];
        assert_eq!(timeout.order, -200);
        assert_eq!(timeout.order_source, OrderSource::Fixed(-200));
        assert_eq!(timeout.configuration.as_deref(), Some("default=1000ms"));
        assert_eq!(timeout.display, "TimeoutMiddleware [-200 (fixed)] any");
        assert_eq!(infos[2].order_source, OrderSource::Positional(1));
        assert!(infos[3].conditional);
        assert!(infos[3].display.ends_with("(conditional)"));
    }

    #[test]
    fn conditional_middleware_listed_only_when_predicate_holds() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inspector = mediator(&log).inspector();

        let small = inspector.analyze_for(&Transfer { amount: 10 });
        let large = inspector.analyze_for(&Transfer { amount: 5_000 });
        let query = inspector.analyze_for(&Balance);

        assert_eq!(names(&small), vec!["TimeoutMiddleware", "audit", "validate"]);
        assert_eq!(
            names(&large),
            vec!["TimeoutMiddleware", "audit", "fraud", "validate"]
        );
        assert_eq!(names(&query), vec!["TimeoutMiddleware", "cache", "audit"]);
    }

    #[tokio::test]
    async fn reported_order_matches_execution_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mediator = mediator(&log);
        let inspector = mediator.inspector();

        for amount in [10, 5_000] {
            log.lock().clear();
            let request = Transfer { amount };
            let expected: Vec<String> = inspector
                .analyze_for(&request)
                .into_iter()
                .map(|i| i.name)
                .filter(|name| name != "TimeoutMiddleware")
                .collect();

            mediator.send(request).await.unwrap();

            assert_eq!(*log.lock(), expected);
        }
    }

    #[test]
    fn analysis_serializes_both_pipelines() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let analysis = mediator(&log).inspector().analyze_middleware();

        assert_eq!(analysis.request_middleware.len(), 5);
        assert!(analysis.notification_middleware.is_empty());
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(
            json["request_middleware"][0]["order_source"],
            serde_json::json!({ "source": "fixed", "value": -200 })
        );
    }
}
