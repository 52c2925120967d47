//! Lifecycle observer trait and composite implementation.
//!
//! Defines [`LifecycleObserver`] for reacting to dispatch and publish
//! lifecycle events, and [`CompositeLifecycleObserver`] which fans events out
//! to several observers. The dispatcher and the publisher emit events;
//! exporting them is up to the observer.

use std::sync::Arc;

use courier_core::LifecycleEvent;
use tracing::{debug, info, warn};

/// Observer of lifecycle events.
///
/// Called inline on the dispatching task, so implementations should be cheap
/// and must not block.
///
/// Used as `Arc<dyn LifecycleObserver>`.
pub trait LifecycleObserver: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

/// Composite observer that fans out to multiple observers.
///
/// An empty composite discards every event.
#[derive(Default)]
pub struct CompositeLifecycleObserver {
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl CompositeLifecycleObserver {
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn LifecycleObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl LifecycleObserver for CompositeLifecycleObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// Writes every event to `tracing`: starts at debug, successes at info,
/// failures at warn.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLifecycleObserver;

impl LifecycleObserver for TracingLifecycleObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::DispatchStarted { request_type, kind } => {
                debug!(request = request_type, kind = kind.as_str(), "dispatch started");
            }
            LifecycleEvent::DispatchCompleted {
                request_type,
                kind,
                duration,
                success: true,
                ..
            } => {
                info!(
                    request = request_type,
                    kind = kind.as_str(),
                    duration_us = duration_micros(*duration),
                    "dispatch completed"
                );
            }
            LifecycleEvent::DispatchCompleted {
                request_type,
                kind,
                duration,
                error,
                ..
            } => {
                warn!(
                    request = request_type,
                    kind = kind.as_str(),
                    duration_us = duration_micros(*duration),
                    error = error.as_deref().unwrap_or("unknown"),
                    "dispatch failed"
                );
            }
            LifecycleEvent::PublishStarted { notification_type } => {
                debug!(notification = notification_type, "publish started");
            }
            LifecycleEvent::DeliveryCompleted {
                notification_type,
                target,
                target_kind,
                duration,
                success,
                error,
            } => {
                if *success {
                    debug!(
                        notification = notification_type,
                        target = %target,
                        target_kind = target_kind.as_str(),
                        duration_us = duration_micros(*duration),
                        "delivered"
                    );
                } else {
                    warn!(
                        notification = notification_type,
                        target = %target,
                        target_kind = target_kind.as_str(),
                        error = error.as_deref().unwrap_or("unknown"),
                        "delivery failed"
                    );
                }
            }
            LifecycleEvent::PublishCompleted {
                notification_type,
                duration,
                success,
                outcome,
                error,
            } => {
                let outcome = outcome.map_or("aborted", |o| o.as_str());
                if *success {
                    info!(
                        notification = notification_type,
                        duration_us = duration_micros(*duration),
                        outcome,
                        "publish completed"
                    );
                } else {
                    warn!(
                        notification = notification_type,
                        duration_us = duration_micros(*duration),
                        outcome,
                        error = error.as_deref().unwrap_or("unknown"),
                        "publish failed"
                    );
                }
            }
        }
    }
}

fn duration_micros(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
