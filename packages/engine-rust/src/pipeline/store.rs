//! Middleware descriptor store.
//!
//! Registration resolves each middleware's order once and appends an
//! immutable descriptor. The descriptor list is copy-on-write through
//! `ArcSwap`, so pipeline builds running concurrently with a registration see
//! either the old list or the new one, never a partial update.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use courier_core::{Constraint, FixedOrder, OrderKey, OrderSource};
use tracing::debug;

use crate::envelope::Envelope;
use crate::middleware::{NotificationMiddleware, PipelineStage, RequestMiddleware};

/// Registration-time condition evaluated against each message instance.
pub type Predicate = Arc<dyn Fn(&Envelope<'_>) -> bool + Send + Sync>;

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// A middleware waiting to be added to a store.
pub struct Registration<M: ?Sized> {
    middleware: Arc<M>,
    fixed: Option<i32>,
    predicate: Option<Predicate>,
}

impl<M: ?Sized> Registration<M> {
    /// Adds a condition on top of the middleware's own `should_run`.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Envelope<'_>) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate = Arc::new(predicate);
        self.predicate = Some(predicate);
        self
    }
}

impl Registration<dyn RequestMiddleware> {
    #[must_use]
    pub fn request<T: RequestMiddleware>(middleware: T) -> Self {
        let middleware: Arc<dyn RequestMiddleware> = Arc::new(middleware);
        Self {
            middleware,
            fixed: None,
            predicate: None,
        }
    }

    /// Registers with the type's compile-time order.
    #[must_use]
    pub fn request_fixed<T: RequestMiddleware + FixedOrder>(middleware: T) -> Self {
        Self {
            fixed: Some(T::ORDER),
            ..Self::request(middleware)
        }
    }
}

impl Registration<dyn NotificationMiddleware> {
    #[must_use]
    pub fn notification<T: NotificationMiddleware>(middleware: T) -> Self {
        let middleware: Arc<dyn NotificationMiddleware> = Arc::new(middleware);
        Self {
            middleware,
            fixed: None,
            predicate: None,
        }
    }

    #[must_use]
    pub fn notification_fixed<T: NotificationMiddleware + FixedOrder>(middleware: T) -> Self {
        Self {
            fixed: Some(T::ORDER),
            ..Self::notification(middleware)
        }
    }
}

// ---------------------------------------------------------------------------
// MiddlewareDescriptor
// ---------------------------------------------------------------------------

/// A registered middleware with its resolved order and filters.
pub struct MiddlewareDescriptor<M: ?Sized> {
    middleware: Arc<M>,
    name: String,
    order: OrderSource,
    sequence: usize,
    constraint: Constraint,
    conditional: bool,
    predicate: Option<Predicate>,
    configuration: Option<String>,
}

impl<M: ?Sized + PipelineStage> MiddlewareDescriptor<M> {
    fn from_registration(registration: Registration<M>, sequence: usize) -> Self {
        let Registration {
            middleware,
            fixed,
            predicate,
        } = registration;
        let order = OrderSource::resolve(fixed, middleware.stage_order(), sequence);
        Self {
            name: middleware.stage_name(),
            constraint: middleware.stage_constraint(),
            conditional: middleware.stage_conditional(),
            configuration: middleware.stage_configuration(),
            middleware,
            order,
            sequence,
            predicate,
        }
    }

    /// Constraint first, then the registration predicate, then the
    /// middleware's own condition.
    #[must_use]
    pub fn applies_to(&self, envelope: &Envelope<'_>) -> bool {
        self.constraint.accepts(envelope.info())
            && self.predicate.as_ref().map_or(true, |p| p(envelope))
            && self.middleware.stage_applies(envelope)
    }
}

impl<M: ?Sized> MiddlewareDescriptor<M> {
    #[must_use]
    pub fn middleware(&self) -> &Arc<M> {
        &self.middleware
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn order_source(&self) -> OrderSource {
        self.order
    }

    #[must_use]
    pub fn key(&self) -> OrderKey {
        OrderKey::new(self.order, self.sequence)
    }

    #[must_use]
    pub fn constraint(&self) -> Constraint {
        self.constraint
    }

    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.conditional || self.predicate.is_some()
    }

    #[must_use]
    pub fn configuration(&self) -> Option<&str> {
        self.configuration.as_deref()
    }
}

impl<M: ?Sized> fmt::Debug for MiddlewareDescriptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareDescriptor")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("sequence", &self.sequence)
            .field("constraint", &self.constraint)
            .field("conditional", &self.is_conditional())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// MiddlewareStore
// ---------------------------------------------------------------------------

/// Registered middleware of one pipeline kind, in discovery order.
pub struct MiddlewareStore<M: ?Sized> {
    descriptors: ArcSwap<Vec<Arc<MiddlewareDescriptor<M>>>>,
    next_sequence: AtomicUsize,
}

impl<M: ?Sized + PipelineStage> MiddlewareStore<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptors: ArcSwap::from_pointee(Vec::new()),
            next_sequence: AtomicUsize::new(0),
        }
    }

    /// Adds a middleware. Its discovery position is the number of
    /// registrations before it.
    pub fn register(&self, registration: Registration<M>) -> OrderSource {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let descriptor = Arc::new(MiddlewareDescriptor::from_registration(
            registration,
            sequence,
        ));
        let order = descriptor.order_source();
        debug!(
            middleware = descriptor.name(),
            order = %order,
            constraint = %descriptor.constraint(),
            "middleware registered"
        );
        self.descriptors.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&descriptor));
            next
        });
        order
    }
}

impl<M: ?Sized> MiddlewareStore<M> {
    /// The current descriptor list, unaffected by later registrations.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<MiddlewareDescriptor<M>>>> {
        self.descriptors.load_full()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M: ?Sized + PipelineStage> Default for MiddlewareStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ?Sized> fmt::Debug for MiddlewareStore<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareStore")
            .field("descriptors", &self.descriptors.load().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::DispatchError;
    use crate::pipeline::{ErasedResponse, Next};

    struct Passthrough {
        order: Option<i32>,
    }

    #[async_trait]
    impl RequestMiddleware for Passthrough {
        fn order(&self) -> Option<i32> {
            self.order
        }

        async fn handle(
            &self,
            envelope: &Envelope<'_>,
            next: Next<'_>,
        ) -> Result<ErasedResponse, DispatchError> {
            next.run(envelope).await
        }
    }

    struct Pinned;

    impl FixedOrder for Pinned {
        const ORDER: i32 = -10;
    }

    #[async_trait]
    impl RequestMiddleware for Pinned {
        fn order(&self) -> Option<i32> {
            Some(99)
        }

        async fn handle(
            &self,
            envelope: &Envelope<'_>,
            next: Next<'_>,
        ) -> Result<ErasedResponse, DispatchError> {
            next.run(envelope).await
        }
    }

    #[test]
    fn registration_resolves_order_sources() {
        let store = MiddlewareStore::<dyn RequestMiddleware>::new();
        let positional = store.register(Registration::request(Passthrough { order: None }));
        let declared = store.register(Registration::request(Passthrough { order: Some(7) }));
        let fixed = store.register(Registration::request_fixed(Pinned));

        assert_eq!(positional, OrderSource::Positional(0));
        assert_eq!(declared, OrderSource::Declared(7));
        assert_eq!(fixed, OrderSource::Fixed(-10));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_registration() {
        let store = MiddlewareStore::<dyn RequestMiddleware>::new();
        store.register(Registration::request(Passthrough { order: None }));
        let before = store.snapshot();
        store.register(Registration::request(Passthrough { order: None }));

        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn predicate_marks_descriptor_conditional() {
        let store = MiddlewareStore::<dyn RequestMiddleware>::new();
        store.register(Registration::request(Passthrough { order: None }).when(|_| false));
        store.register(Registration::request(Passthrough { order: None }));

        let snapshot = store.snapshot();
        assert!(snapshot[0].is_conditional());
        assert!(!snapshot[1].is_conditional());
        assert_eq!(snapshot[0].name(), "Passthrough");
        assert_eq!(snapshot[0].constraint(), Constraint::Any);
    }

    #[test]
    fn concurrent_registration_keeps_every_descriptor() {
        let store = Arc::new(MiddlewareStore::<dyn RequestMiddleware>::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.register(Registration::request(Passthrough { order: None }));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 200);
        let mut sequences: Vec<_> = snapshot.iter().map(|d| d.key().sequence).collect();
        sequences.sort_unstable();
        sequences.dedup();
        assert_eq!(sequences.len(), 200);
    }
}
