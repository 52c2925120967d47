//! Notification publisher: notification middleware, then isolated fan-out.
//!
//! Targets are selected once per publish (typed subscribers, broadcast
//! subscribers, then notification handlers) and invoked one after another.
//! A failing or panicking target is recorded and never stops delivery to the
//! rest. Cancellation is checked before each target; a delivery already in
//! progress always runs to completion.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use courier_core::{
    DeliveryFailure, DeliveryOutcome, LifecycleEvent, MessageInfo, Notification, PublishReport,
};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::error::PublishError;
use crate::handler::HandlerRegistry;
use crate::observer::LifecycleObserver;
use crate::pipeline::chain::FanOut;
use crate::pipeline::{NotificationMiddlewareStore, PipelineBuilder};
use crate::statistics::ExecutionStatistics;
use crate::subscribers::{DeliveryTarget, SubscriberRegistry};

#[derive(Clone)]
pub struct NotificationPublisher {
    subscribers: Arc<SubscriberRegistry>,
    handlers: Arc<HandlerRegistry>,
    middleware: Arc<NotificationMiddlewareStore>,
    statistics: Arc<ExecutionStatistics>,
    observer: Arc<dyn LifecycleObserver>,
    catch_panics: bool,
}

impl NotificationPublisher {
    #[must_use]
    pub fn new(
        subscribers: Arc<SubscriberRegistry>,
        handlers: Arc<HandlerRegistry>,
        middleware: Arc<NotificationMiddlewareStore>,
        statistics: Arc<ExecutionStatistics>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        Self {
            subscribers,
            handlers,
            middleware,
            statistics,
            observer,
            catch_panics: true,
        }
    }

    /// When `false`, a panicking target unwinds through `publish`.
    #[must_use]
    pub fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }

    /// Publishes `notification` to every interested target.
    ///
    /// Having no targets is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Middleware`] if a notification middleware
    /// failed. Delivery failures are reported in the returned
    /// [`PublishReport`], never as an error.
    pub async fn publish<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<PublishReport, PublishError> {
        let info = MessageInfo::of_notification::<N>();
        self.statistics.record_publish(&info);
        self.observer.on_event(&LifecycleEvent::PublishStarted {
            notification_type: info.type_name,
        });

        let started = Instant::now();
        let envelope = Envelope::new(info, &notification, cancel);
        let pipeline = PipelineBuilder::build(&self.middleware, &envelope);
        let step = FanOutStep {
            publisher: self,
            report: Mutex::new(None),
        };

        if let Err(source) = pipeline.execute(&envelope, &step).await {
            self.statistics.record_publish_aborted();
            let err = PublishError::Middleware {
                notification_type: info.type_name,
                source,
            };
            self.observer.on_event(&LifecycleEvent::PublishCompleted {
                notification_type: info.type_name,
                duration: started.elapsed(),
                success: false,
                outcome: None,
                error: Some(err.to_string()),
            });
            return Err(err);
        }

        let report = step.report.into_inner().unwrap_or_else(|| {
            debug!(
                notification = info.type_name,
                "notification middleware short-circuited the fan-out"
            );
            PublishReport::short_circuited(info.type_name)
        });
        let outcome = report.outcome();
        self.statistics.record_publish_outcome(outcome);
        self.observer.on_event(&LifecycleEvent::PublishCompleted {
            notification_type: info.type_name,
            duration: started.elapsed(),
            success: true,
            outcome: Some(outcome),
            error: None,
        });
        Ok(report)
    }

    async fn deliver_all(&self, envelope: &Envelope<'_>) -> PublishReport {
        let info = envelope.info();
        let mut targets = self.subscribers.snapshot(info.type_id);
        targets.extend(self.handlers.notification_targets(info.type_id));

        let mut deliveries = Vec::with_capacity(targets.len());
        let mut skipped = 0;
        for (index, target) in targets.iter().enumerate() {
            if envelope.is_cancelled() {
                skipped = targets.len() - index;
                debug!(
                    notification = info.type_name,
                    skipped, "publish cancelled before remaining targets"
                );
                break;
            }

            let started = Instant::now();
            let result = self.deliver_one(target.as_ref(), envelope).await;
            let elapsed = started.elapsed();

            self.statistics.record_delivery(result.is_ok());
            if let Err(failure) = &result {
                warn!(
                    notification = info.type_name,
                    target = target.name(),
                    target_kind = target.kind().as_str(),
                    panicked = failure.is_panic(),
                    error = %failure,
                    "notification delivery failed"
                );
            }
            self.observer.on_event(&LifecycleEvent::DeliveryCompleted {
                notification_type: info.type_name,
                target: target.name().to_string(),
                target_kind: target.kind(),
                duration: elapsed,
                success: result.is_ok(),
                error: result.as_ref().err().map(ToString::to_string),
            });

            deliveries.push(DeliveryOutcome {
                target: target.name().to_string(),
                kind: target.kind(),
                elapsed,
                result,
            });
        }

        PublishReport {
            notification_type: info.type_name,
            deliveries,
            skipped,
            cancelled: skipped > 0,
            fanned_out: true,
        }
    }

    async fn deliver_one(
        &self,
        target: &dyn DeliveryTarget,
        envelope: &Envelope<'_>,
    ) -> Result<(), DeliveryFailure> {
        let delivery = target.deliver(envelope);
        let result = if self.catch_panics {
            match AssertUnwindSafe(delivery).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => return Err(DeliveryFailure::from_panic(payload.as_ref())),
            }
        } else {
            delivery.await
        };
        result.map_err(DeliveryFailure::from_error)
    }
}

impl std::fmt::Debug for NotificationPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPublisher")
            .field("subscribers", &self.subscribers)
            .field("middleware", &self.middleware)
            .field("catch_panics", &self.catch_panics)
            .finish_non_exhaustive()
    }
}

/// Terminal step of the notification chain for one publish call.
struct FanOutStep<'p> {
    publisher: &'p NotificationPublisher,
    report: Mutex<Option<PublishReport>>,
}

#[async_trait]
impl FanOut for FanOutStep<'_> {
    async fn fan_out(&self, envelope: &Envelope<'_>) {
        let report = self.publisher.deliver_all(envelope).await;
        *self.report.lock() = Some(report);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use courier_core::{PublishOutcome, TargetKind};
    use tokio::sync::Notify;

    use super::*;
    use crate::handler::NotificationHandler;
    use crate::inspector::PipelineInspector;
    use crate::middleware::NotificationMiddleware;
    use crate::observer::tests::RecordingObserver;
    use crate::pipeline::{NotificationNext, Registration, RequestMiddlewareStore};
    use crate::subscribers::{BroadcastSubscriber, Subscriber};

    struct OrderShipped {
        id: u32,
    }

    impl Notification for OrderShipped {}

    /// Subscriber that optionally fails and counts its deliveries.
    struct Recorder {
        fail: bool,
        seen: AtomicUsize,
    }

    impl Recorder {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                seen: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                seen: AtomicUsize::new(0),
            })
        }

        fn seen(&self) -> usize {
            self.seen.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Subscriber<OrderShipped> for Recorder {
        async fn on_notification(
            &self,
            _notification: &OrderShipped,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("recorder rejected delivery");
            }
            Ok(())
        }
    }

    struct Panicker;

    #[async_trait]
    impl Subscriber<OrderShipped> for Panicker {
        async fn on_notification(
            &self,
            notification: &OrderShipped,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<()> {
            panic!("cannot ship order {}", notification.id);
        }
    }

    /// Cancels the caller's token while being delivered to.
    struct Canceller {
        token: CancellationToken,
    }

    #[async_trait]
    impl Subscriber<OrderShipped> for Canceller {
        async fn on_notification(
            &self,
            _notification: &OrderShipped,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<()> {
            self.token.cancel();
            Ok(())
        }
    }

    struct Everything {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl BroadcastSubscriber for Everything {
        async fn on_any(&self, _envelope: &Envelope<'_>) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ShippingEmail {
        sent: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NotificationHandler<OrderShipped> for ShippingEmail {
        async fn handle(
            &self,
            _notification: &OrderShipped,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        publisher: NotificationPublisher,
        subscribers: Arc<SubscriberRegistry>,
        handlers: Arc<HandlerRegistry>,
        middleware: Arc<NotificationMiddlewareStore>,
        statistics: Arc<ExecutionStatistics>,
        observer: Arc<RecordingObserver>,
    }

    fn fixture() -> Fixture {
        let subscribers = Arc::new(SubscriberRegistry::new());
        let handlers = Arc::new(HandlerRegistry::new());
        let middleware = Arc::new(NotificationMiddlewareStore::new());
        let statistics = Arc::new(ExecutionStatistics::new());
        let observer = Arc::new(RecordingObserver::default());
        let publisher = NotificationPublisher::new(
            Arc::clone(&subscribers),
            Arc::clone(&handlers),
            Arc::clone(&middleware),
            Arc::clone(&statistics),
            observer.clone(),
        );
        Fixture {
            publisher,
            subscribers,
            handlers,
            middleware,
            statistics,
            observer,
        }
    }

    async fn publish(f: &Fixture) -> PublishReport {
        f.publisher
            .publish(OrderShipped { id: 1 }, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn no_subscribers_is_vacuous_success() {
        let f = fixture();
        let report = publish(&f).await;

        assert_eq!(report.outcome(), PublishOutcome::AllSucceeded);
        assert_eq!(report.attempted(), 0);
        assert!(report.fanned_out);
        assert_eq!(f.statistics.notifications_published(), 1);
    }

    #[tokio::test]
    async fn one_failure_of_three_is_partial() {
        let f = fixture();
        let subscribers = [Recorder::ok(), Recorder::failing(), Recorder::ok()];
        for s in &subscribers {
            f.subscribers.subscribe::<OrderShipped, _>(s);
        }

        let report = publish(&f).await;

        assert_eq!(
            report.outcome(),
            PublishOutcome::PartialFailure {
                failed: 1,
                attempted: 3
            }
        );
        assert_eq!(report.succeeded(), 2);
        assert!(subscribers.iter().all(|s| s.seen() == 1));
        let snapshot = f.statistics.snapshot();
        assert_eq!(snapshot.deliveries.succeeded, 2);
        assert_eq!(snapshot.deliveries.failed, 1);
        assert_eq!(snapshot.publishes.partial_failure, 1);
    }

    #[tokio::test]
    async fn all_failing_is_total() {
        let f = fixture();
        let subscribers = [Recorder::failing(), Recorder::failing(), Recorder::failing()];
        for s in &subscribers {
            f.subscribers.subscribe::<OrderShipped, _>(s);
        }

        let report = publish(&f).await;

        assert_eq!(report.outcome(), PublishOutcome::TotalFailure { attempted: 3 });
        let (_, failure) = report.failures().next().unwrap();
        assert_eq!(failure.message(), "recorder rejected delivery");
        assert_eq!(f.statistics.snapshot().publishes.total_failure, 1);
    }

    #[tokio::test]
    async fn panicking_subscriber_is_isolated() {
        let f = fixture();
        let after = Recorder::ok();
        f.subscribers.subscribe::<OrderShipped, _>(&Arc::new(Panicker));
        f.subscribers.subscribe::<OrderShipped, _>(&after);

        let report = publish(&f).await;

        assert_eq!(after.seen(), 1);
        let (outcome, failure) = report.failures().next().unwrap();
        assert_eq!(outcome.target, "Panicker");
        assert!(failure.is_panic());
        assert!(failure.message().contains("cannot ship order 1"));
    }

    #[tokio::test]
    async fn cancellation_gates_remaining_targets() {
        let f = fixture();
        let token = CancellationToken::new();
        let first = Arc::new(Canceller {
            token: token.clone(),
        });
        let second = Recorder::ok();
        let third = Recorder::ok();
        f.subscribers.subscribe::<OrderShipped, _>(&first);
        f.subscribers.subscribe::<OrderShipped, _>(&second);
        f.subscribers.subscribe::<OrderShipped, _>(&third);

        let report = f
            .publisher
            .publish(OrderShipped { id: 2 }, &token)
            .await
            .unwrap();

        assert_eq!(report.attempted(), 1);
        assert_eq!(report.skipped, 2);
        assert!(report.cancelled);
        assert_eq!(report.outcome(), PublishOutcome::AllSucceeded);
        assert_eq!(second.seen() + third.seen(), 0);
    }

    #[tokio::test]
    async fn fan_out_order_is_typed_broadcast_then_handlers() {
        let f = fixture();
        let sent = Arc::new(AtomicUsize::new(0));
        let everything = Arc::new(Everything {
            seen: AtomicUsize::new(0),
        });
        f.handlers
            .register_notification::<OrderShipped, _>(ShippingEmail {
                sent: Arc::clone(&sent),
            });
        f.subscribers.subscribe_all(&everything);
        f.subscribers.subscribe::<OrderShipped, _>(&Recorder::ok());

        let report = publish(&f).await;

        let kinds: Vec<_> = report.deliveries.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![TargetKind::Subscriber, TargetKind::Broadcast, TargetKind::Handler]
        );
        assert_eq!(sent.load(Ordering::SeqCst), 1);
        assert_eq!(everything.seen.load(Ordering::SeqCst), 1);
    }

    /// Blocks inside delivery until released.
    struct Gate {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Subscriber<OrderShipped> for Gate {
        async fn on_notification(
            &self,
            _notification: &OrderShipped,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<()> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn unsubscribe_during_publish_applies_to_next_publish() {
        let f = fixture();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let gate = Arc::new(Gate {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        });
        let late = Recorder::ok();
        f.subscribers.subscribe::<OrderShipped, _>(&gate);
        f.subscribers.subscribe::<OrderShipped, _>(&late);

        let publisher = f.publisher.clone();
        let in_flight = tokio::spawn(async move {
            publisher
                .publish(OrderShipped { id: 3 }, &CancellationToken::new())
                .await
                .unwrap()
        });

        entered.notified().await;
        assert!(f.subscribers.unsubscribe::<OrderShipped, _>(&late));
        release.notify_one();

        let first = in_flight.await.unwrap();
        assert_eq!(first.attempted(), 2);
        assert_eq!(late.seen(), 1);

        f.subscribers.unsubscribe::<OrderShipped, _>(&gate);
        let second = publish(&f).await;
        assert_eq!(second.attempted(), 0);
        assert_eq!(late.seen(), 1);
    }

    struct FailingMiddleware;

    #[async_trait]
    impl NotificationMiddleware for FailingMiddleware {
        async fn handle(
            &self,
            _envelope: &Envelope<'_>,
            _next: NotificationNext<'_>,
        ) -> anyhow::Result<()> {
            anyhow::bail!("audit store offline")
        }
    }

    struct Swallow;

    #[async_trait]
    impl NotificationMiddleware for Swallow {
        async fn handle(
            &self,
            _envelope: &Envelope<'_>,
            _next: NotificationNext<'_>,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn middleware_failure_aborts_publish() {
        let f = fixture();
        let subscriber = Recorder::ok();
        f.subscribers.subscribe::<OrderShipped, _>(&subscriber);
        f.middleware
            .register(Registration::notification(FailingMiddleware));

        let err = f
            .publisher
            .publish(OrderShipped { id: 4 }, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("audit store offline"));
        assert_eq!(subscriber.seen(), 0);
        assert_eq!(f.statistics.snapshot().publishes.aborted, 1);
        let events = f.observer.events.lock();
        assert!(matches!(
            events.last(),
            Some(LifecycleEvent::PublishCompleted { success: false, .. })
        ));
    }

    #[tokio::test]
    async fn short_circuit_skips_fan_out() {
        let f = fixture();
        let subscriber = Recorder::ok();
        f.subscribers.subscribe::<OrderShipped, _>(&subscriber);
        f.middleware.register(Registration::notification(Swallow));

        let report = publish(&f).await;

        assert!(!report.fanned_out);
        assert_eq!(report.attempted(), 0);
        assert_eq!(subscriber.seen(), 0);
    }

    #[tokio::test]
    async fn delivery_events_are_emitted_per_target() {
        let f = fixture();
        f.subscribers.subscribe::<OrderShipped, _>(&Recorder::ok());
        f.subscribers.subscribe::<OrderShipped, _>(&Recorder::failing());

        publish(&f).await;

        let events = f.observer.events.lock();
        let deliveries: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                LifecycleEvent::DeliveryCompleted { success, .. } => Some(*success),
                _ => None,
            })
            .collect();
        assert_eq!(deliveries, vec![true, false]);
        assert!(matches!(events[0], LifecycleEvent::PublishStarted { .. }));
    }

    /// Logs entry and exit around the rest of the chain.
    struct Tagged {
        tag: &'static str,
        order: i32,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotificationMiddleware for Tagged {
        fn name(&self) -> String {
            self.tag.to_string()
        }

        fn order(&self) -> Option<i32> {
            Some(self.order)
        }

        async fn handle(
            &self,
            envelope: &Envelope<'_>,
            next: NotificationNext<'_>,
        ) -> anyhow::Result<()> {
            self.log.lock().push(format!(">{}", self.tag));
            let result = next.run(envelope).await;
            self.log.lock().push(format!("<{}", self.tag));
            result
        }
    }

    #[tokio::test]
    async fn notification_middleware_follow_order_and_conditions() {
        let f = fixture();
        let log = Arc::new(Mutex::new(Vec::new()));
        f.middleware.register(Registration::notification(Tagged {
            tag: "b",
            order: 20,
            log: Arc::clone(&log),
        }));
        f.middleware.register(
            Registration::notification(Tagged {
                tag: "a",
                order: 10,
                log: Arc::clone(&log),
            })
            .when(|e| e.downcast_ref::<OrderShipped>().is_some_and(|o| o.id >= 100)),
        );
        let inspector = PipelineInspector::new(
            Arc::new(RequestMiddlewareStore::new()),
            Arc::clone(&f.middleware),
        );
        let names = |n: &OrderShipped| -> Vec<String> {
            inspector
                .analyze_for_notification(n)
                .into_iter()
                .map(|m| m.name)
                .collect()
        };

        let bulk = OrderShipped { id: 100 };
        assert_eq!(names(&bulk), vec!["a", "b"]);
        f.publisher
            .publish(bulk, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec![">a", ">b", "<b", "<a"]);

        log.lock().clear();
        let single = OrderShipped { id: 1 };
        assert_eq!(names(&single), vec!["b"]);
        f.publisher
            .publish(single, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec![">b", "<b"]);
    }

    #[tokio::test]
    async fn uncaught_panic_unwinds_through_publish() {
        let f = fixture();
        let after = Recorder::ok();
        f.subscribers.subscribe::<OrderShipped, _>(&Arc::new(Panicker));
        f.subscribers.subscribe::<OrderShipped, _>(&after);
        let publisher = f.publisher.clone().with_catch_panics(false);

        let joined = tokio::spawn(async move {
            publisher
                .publish(OrderShipped { id: 5 }, &CancellationToken::new())
                .await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(after.seen(), 0);
    }

    /// Runs only for bulk shipments, declared on the middleware itself.
    struct BulkAudit {
        declares_condition: bool,
    }

    #[async_trait]
    impl NotificationMiddleware for BulkAudit {
        fn is_conditional(&self) -> bool {
            self.declares_condition
        }

        fn should_run(&self, envelope: &Envelope<'_>) -> bool {
            envelope
                .downcast_ref::<OrderShipped>()
                .is_some_and(|o| o.id >= 100)
        }

        async fn handle(
            &self,
            envelope: &Envelope<'_>,
            next: NotificationNext<'_>,
        ) -> anyhow::Result<()> {
            next.run(envelope).await
        }
    }

    #[test]
    fn conditional_flag_is_reported_as_declared() {
        let f = fixture();
        f.middleware.register(Registration::notification(BulkAudit {
            declares_condition: true,
        }));
        f.middleware.register(Registration::notification(BulkAudit {
            declares_condition: false,
        }));
        let inspector = PipelineInspector::new(
            Arc::new(RequestMiddlewareStore::new()),
            Arc::clone(&f.middleware),
        );

        let listed = inspector.get_registered_notification_middleware();
        assert!(listed[0].conditional);
        assert!(!listed[1].conditional);
        assert!(inspector
            .analyze_for_notification(&OrderShipped { id: 1 })
            .is_empty());
        assert_eq!(
            inspector
                .analyze_for_notification(&OrderShipped { id: 100 })
                .len(),
            2
        );
    }
}
