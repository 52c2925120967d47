//! Mediator facade: one handle over dispatch, publish, subscriptions and
//! introspection.
//!
//! [`MediatorBuilder`] is the explicit registration step the host performs
//! before dispatching. Registries and stores stay copy-on-write afterwards,
//! so handlers, middleware and subscribers may still be added at runtime.

use std::sync::Arc;

use courier_core::{Notification, OrderSource, PublishReport, Request};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::analysis::{AnalysisReport, RequestCatalog};
use crate::config::MediatorConfig;
use crate::dispatcher::RequestDispatcher;
use crate::error::{DispatchError, PublishError};
use crate::handler::{HandlerRegistry, NotificationHandler, RequestHandler};
use crate::inspector::PipelineInspector;
use crate::middleware::{
    CancellationMiddleware, ConcurrencyLimitMiddleware, InstrumentationMiddleware,
    NotificationInstrumentationMiddleware, NotificationMiddleware, RequestMiddleware,
    TimeoutMiddleware,
};
use crate::observer::{CompositeLifecycleObserver, LifecycleObserver};
use crate::pipeline::{NotificationMiddlewareStore, Registration, RequestMiddlewareStore};
use crate::publisher::NotificationPublisher;
use crate::statistics::{ExecutionStatistics, StatisticsSnapshot};
use crate::subscribers::{BroadcastSubscriber, Subscriber, SubscriberRegistry};

// ---------------------------------------------------------------------------
// Mediator
// ---------------------------------------------------------------------------

/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Mediator {
    config: Arc<MediatorConfig>,
    handlers: Arc<HandlerRegistry>,
    request_middleware: Arc<RequestMiddlewareStore>,
    notification_middleware: Arc<NotificationMiddlewareStore>,
    subscribers: Arc<SubscriberRegistry>,
    statistics: Arc<ExecutionStatistics>,
    dispatcher: RequestDispatcher,
    publisher: NotificationPublisher,
}

impl Mediator {
    #[must_use]
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    /// Dispatches `request` with a token that is never cancelled.
    ///
    /// # Errors
    ///
    /// See [`RequestDispatcher::send`].
    pub async fn send<R: Request>(&self, request: R) -> Result<R::Response, DispatchError> {
        self.dispatcher.send(request, &CancellationToken::new()).await
    }

    /// Dispatches `request` under the caller's cancellation token.
    ///
    /// # Errors
    ///
    /// See [`RequestDispatcher::send`].
    pub async fn send_with<R: Request>(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<R::Response, DispatchError> {
        self.dispatcher.send(request, cancel).await
    }

    /// Publishes `notification` with a token that is never cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Middleware`] if a notification middleware
    /// failed.
    pub async fn publish<N: Notification>(
        &self,
        notification: N,
    ) -> Result<PublishReport, PublishError> {
        self.publisher
            .publish(notification, &CancellationToken::new())
            .await
    }

    /// Publishes `notification` under the caller's cancellation token.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Middleware`] if a notification middleware
    /// failed.
    pub async fn publish_with<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<PublishReport, PublishError> {
        self.publisher.publish(notification, cancel).await
    }

    pub fn subscribe<N, S>(&self, subscriber: &Arc<S>) -> bool
    where
        N: Notification,
        S: Subscriber<N>,
    {
        self.subscribers.subscribe::<N, S>(subscriber)
    }

    pub fn subscribe_all<S: BroadcastSubscriber>(&self, subscriber: &Arc<S>) -> bool {
        self.subscribers.subscribe_all(subscriber)
    }

    pub fn unsubscribe<N, S>(&self, subscriber: &Arc<S>) -> bool
    where
        N: Notification,
        S: Subscriber<N>,
    {
        self.subscribers.unsubscribe::<N, S>(subscriber)
    }

    pub fn unsubscribe_all<S: BroadcastSubscriber>(&self, subscriber: &Arc<S>) -> bool {
        self.subscribers.unsubscribe_all(subscriber)
    }

    pub fn register_handler<R, H>(&self, handler: H)
    where
        R: Request,
        H: RequestHandler<R>,
    {
        self.handlers.register_request::<R, H>(handler);
    }

    pub fn register_notification_handler<N, H>(&self, handler: H)
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        self.handlers.register_notification::<N, H>(handler);
    }

    /// Applies to dispatches that build their pipeline after this returns.
    pub fn register_middleware(
        &self,
        registration: Registration<dyn RequestMiddleware>,
    ) -> OrderSource {
        self.request_middleware.register(registration)
    }

    pub fn register_notification_middleware(
        &self,
        registration: Registration<dyn NotificationMiddleware>,
    ) -> OrderSource {
        self.notification_middleware.register(registration)
    }

    #[must_use]
    pub fn inspector(&self) -> PipelineInspector {
        PipelineInspector::new(
            Arc::clone(&self.request_middleware),
            Arc::clone(&self.notification_middleware),
        )
    }

    #[must_use]
    pub fn analyze_queries(&self, catalog: &RequestCatalog) -> AnalysisReport {
        catalog.analyze_queries(&self.handlers)
    }

    #[must_use]
    pub fn analyze_commands(&self, catalog: &RequestCatalog) -> AnalysisReport {
        catalog.analyze_commands(&self.handlers)
    }

    #[must_use]
    pub fn report_statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }

    #[must_use]
    pub fn statistics(&self) -> &ExecutionStatistics {
        &self.statistics
    }

    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    #[must_use]
    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    #[must_use]
    pub fn config(&self) -> &MediatorConfig {
        &self.config
    }
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("handlers", &self.handlers)
            .field("request_middleware", &self.request_middleware.len())
            .field("notification_middleware", &self.notification_middleware.len())
            .field("subscribers", &self.subscribers)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// MediatorBuilder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MediatorBuilder {
    config: MediatorConfig,
    handlers: HandlerRegistry,
    request_middleware: RequestMiddlewareStore,
    notification_middleware: NotificationMiddlewareStore,
    observers: Vec<Arc<dyn LifecycleObserver>>,
    builtins: bool,
}

impl MediatorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: MediatorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn handler<R, H>(self, handler: H) -> Self
    where
        R: Request,
        H: RequestHandler<R>,
    {
        self.handlers.register_request::<R, H>(handler);
        self
    }

    #[must_use]
    pub fn notification_handler<N, H>(self, handler: H) -> Self
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        self.handlers.register_notification::<N, H>(handler);
        self
    }

    #[must_use]
    pub fn middleware(self, registration: Registration<dyn RequestMiddleware>) -> Self {
        self.request_middleware.register(registration);
        self
    }

    #[must_use]
    pub fn notification_middleware(
        self,
        registration: Registration<dyn NotificationMiddleware>,
    ) -> Self {
        self.notification_middleware.register(registration);
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Adds instrumentation, concurrency limit, timeout and cancellation
    /// middleware, configured from [`MediatorConfig`] when `build` runs.
    ///
    /// Outermost to innermost:
    /// 1. `InstrumentationMiddleware` (-300)
    /// 2. `ConcurrencyLimitMiddleware` (-250)
    /// 3. `TimeoutMiddleware` (-200)
    /// 4. `CancellationMiddleware` (-100)
    ///
    /// Notification pipelines get `NotificationInstrumentationMiddleware` (-300).
    #[must_use]
    pub fn with_builtin_middleware(mut self) -> Self {
        self.builtins = true;
        self
    }

    #[must_use]
    pub fn build(self) -> Mediator {
        let MediatorBuilder {
            config,
            handlers,
            request_middleware,
            notification_middleware,
            observers,
            builtins,
        } = self;

        if builtins {
            request_middleware.register(Registration::request_fixed(InstrumentationMiddleware));
            request_middleware.register(Registration::request_fixed(
                ConcurrencyLimitMiddleware::from_config(&config),
            ));
            request_middleware.register(Registration::request_fixed(
                TimeoutMiddleware::from_config(&config),
            ));
            request_middleware.register(Registration::request_fixed(CancellationMiddleware));
            notification_middleware.register(Registration::notification_fixed(
                NotificationInstrumentationMiddleware,
            ));
        }

        let config = Arc::new(config);
        let handlers = Arc::new(handlers);
        let request_middleware = Arc::new(request_middleware);
        let notification_middleware = Arc::new(notification_middleware);
        let subscribers = Arc::new(SubscriberRegistry::new());
        let statistics = Arc::new(ExecutionStatistics::new());
        let observer: Arc<dyn LifecycleObserver> =
            Arc::new(CompositeLifecycleObserver::new(observers));

        let dispatcher = RequestDispatcher::new(
            Arc::clone(&handlers),
            Arc::clone(&request_middleware),
            Arc::clone(&statistics),
            Arc::clone(&observer),
        );
        let publisher = NotificationPublisher::new(
            Arc::clone(&subscribers),
            Arc::clone(&handlers),
            Arc::clone(&notification_middleware),
            Arc::clone(&statistics),
            observer,
        )
        .with_catch_panics(config.catch_subscriber_panics);

        debug!(
            request_middleware = request_middleware.len(),
            notification_middleware = notification_middleware.len(),
            "mediator built"
        );

        Mediator {
            config,
            handlers,
            request_middleware,
            notification_middleware,
            subscribers,
            statistics,
            dispatcher,
            publisher,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
