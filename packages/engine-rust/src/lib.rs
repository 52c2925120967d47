//! Courier engine: request dispatch, middleware pipelines and notification
//! fan-out.
//!
//! A [`Mediator`] routes each [`Request`](courier_core::Request) to its single
//! handler through an ordered chain of request middleware, and publishes each
//! [`Notification`](courier_core::Notification) through notification
//! middleware to every subscriber and notification handler, isolating
//! failures per target.

pub mod analysis;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod inspector;
pub mod mediator;
pub mod middleware;
pub mod observer;
pub mod pipeline;
pub mod publisher;
pub mod service;
pub mod statistics;
pub mod subscribers;
pub mod telemetry;

pub use analysis::{AnalysisReport, RequestAnalysis, RequestCatalog};
pub use config::{LogConfig, MediatorConfig};
pub use dispatcher::RequestDispatcher;
pub use envelope::Envelope;
pub use error::{DispatchError, PublishError};
pub use handler::{
    HandlerBinding, HandlerRegistry, HandlerStatus, NotificationHandler, RequestHandler,
};
pub use inspector::{MiddlewareAnalysis, MiddlewareInfo, PipelineInspector};
pub use mediator::{Mediator, MediatorBuilder};
pub use middleware::{
    NotificationMiddleware, RequestMiddleware, Typed, TypedMiddleware, TypedNext,
};
pub use observer::{CompositeLifecycleObserver, LifecycleObserver, TracingLifecycleObserver};
pub use pipeline::{Next, NotificationNext, Registration};
pub use publisher::NotificationPublisher;
pub use service::MediatorService;
pub use statistics::{ExecutionStatistics, StatisticsSnapshot};
pub use subscribers::{BroadcastSubscriber, Subscriber, SubscriberRegistry, SubscriptionTarget};
