//! Subscriber registry for runtime observers of notifications.
//!
//! Subscriptions are keyed by [`SubscriptionTarget`]: either one notification
//! type or every notification. The table is copy-on-write through `ArcSwap`,
//! so a publish iterates an immutable snapshot while subscribe and
//! unsubscribe swap in a new table. Removing a subscriber mid-publish
//! therefore affects the next publish, not the current one.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use courier_core::names::short_type_name;
use courier_core::{Notification, TargetKind};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// Subscriber traits
// ---------------------------------------------------------------------------

/// Observer of one notification type.
///
/// A single object may implement this for several notification types and
/// subscribe to each independently.
#[async_trait]
pub trait Subscriber<N: Notification>: Send + Sync + 'static {
    async fn on_notification(
        &self,
        notification: &N,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()>;
}

/// Observer of every published notification.
#[async_trait]
pub trait BroadcastSubscriber: Send + Sync + 'static {
    async fn on_any(&self, envelope: &Envelope<'_>) -> anyhow::Result<()>;
}

/// Anything the fan-out step delivers a notification to.
#[async_trait]
pub(crate) trait DeliveryTarget: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> TargetKind;

    async fn deliver(&self, envelope: &Envelope<'_>) -> anyhow::Result<()>;
}

struct TypedTarget<N, S> {
    name: String,
    subscriber: Arc<S>,
    _notification: PhantomData<fn(&N)>,
}

#[async_trait]
impl<N: Notification, S: Subscriber<N>> DeliveryTarget for TypedTarget<N, S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Subscriber
    }

    async fn deliver(&self, envelope: &Envelope<'_>) -> anyhow::Result<()> {
        let notification = envelope.downcast_ref::<N>().ok_or_else(|| {
            anyhow::anyhow!(
                "{} delivered to subscriber of {}",
                envelope.type_name(),
                type_name::<N>()
            )
        })?;
        self.subscriber
            .on_notification(notification, envelope.cancel())
            .await
    }
}

struct BroadcastTarget<S> {
    name: String,
    subscriber: Arc<S>,
}

#[async_trait]
impl<S: BroadcastSubscriber> DeliveryTarget for BroadcastTarget<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Broadcast
    }

    async fn deliver(&self, envelope: &Envelope<'_>) -> anyhow::Result<()> {
        self.subscriber.on_any(envelope).await
    }
}

// ---------------------------------------------------------------------------
// SubscriberRegistry
// ---------------------------------------------------------------------------

/// What a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionTarget {
    Typed(TypeId),
    Broadcast,
}

impl SubscriptionTarget {
    #[must_use]
    pub fn of<N: Notification>() -> Self {
        SubscriptionTarget::Typed(TypeId::of::<N>())
    }
}

#[derive(Clone)]
struct Subscription {
    /// Address of the subscriber object; identity for unsubscribe.
    identity: usize,
    target: Arc<dyn DeliveryTarget>,
}

type SubscriberTable = HashMap<SubscriptionTarget, Vec<Subscription>>;

/// Thread-safe store of runtime subscriptions.
pub struct SubscriberRegistry {
    table: ArcSwap<SubscriberTable>,
}

fn identity_of<S>(subscriber: &Arc<S>) -> usize {
    Arc::as_ptr(subscriber) as usize
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Subscribes `subscriber` to notifications of type `N`.
    ///
    /// Returns `false` if this object already holds that subscription.
    pub fn subscribe<N, S>(&self, subscriber: &Arc<S>) -> bool
    where
        N: Notification,
        S: Subscriber<N>,
    {
        let target: Arc<dyn DeliveryTarget> = Arc::new(TypedTarget::<N, S> {
            name: short_type_name(type_name::<S>()),
            subscriber: Arc::clone(subscriber),
            _notification: PhantomData,
        });
        self.insert(SubscriptionTarget::of::<N>(), identity_of(subscriber), target)
    }

    /// Subscribes `subscriber` to every notification.
    pub fn subscribe_all<S: BroadcastSubscriber>(&self, subscriber: &Arc<S>) -> bool {
        let target: Arc<dyn DeliveryTarget> = Arc::new(BroadcastTarget {
            name: short_type_name(type_name::<S>()),
            subscriber: Arc::clone(subscriber),
        });
        self.insert(
            SubscriptionTarget::Broadcast,
            identity_of(subscriber),
            target,
        )
    }

    /// Removes the `N` subscription of `subscriber`. Other subscriptions of
    /// the same object are untouched. Returns `false` if it was not subscribed.
    pub fn unsubscribe<N, S>(&self, subscriber: &Arc<S>) -> bool
    where
        N: Notification,
        S: Subscriber<N>,
    {
        self.remove(SubscriptionTarget::of::<N>(), identity_of(subscriber))
    }

    pub fn unsubscribe_all<S: BroadcastSubscriber>(&self, subscriber: &Arc<S>) -> bool {
        self.remove(SubscriptionTarget::Broadcast, identity_of(subscriber))
    }

    /// Drops every subscription held by `subscriber`, typed or broadcast.
    /// Returns how many were removed.
    pub fn remove_subscriber<S>(&self, subscriber: &Arc<S>) -> usize {
        let identity = identity_of(subscriber);
        let mut removed = 0;
        self.table.rcu(|current| {
            removed = 0;
            let mut next = SubscriberTable::clone(current);
            for subscriptions in next.values_mut() {
                let before = subscriptions.len();
                subscriptions.retain(|s| s.identity != identity);
                removed += before - subscriptions.len();
            }
            next.retain(|_, subscriptions| !subscriptions.is_empty());
            next
        });
        removed
    }

    #[must_use]
    pub fn subscriber_count(&self, target: SubscriptionTarget) -> usize {
        self.table.load().get(&target).map_or(0, Vec::len)
    }

    /// Names of the subscribers a publish of `type_id` would select now,
    /// typed subscribers first.
    #[must_use]
    pub fn subscriber_names(&self, type_id: TypeId) -> Vec<String> {
        self.snapshot(type_id)
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Targets for one publish: typed subscribers in subscription order,
    /// then broadcast subscribers.
    pub(crate) fn snapshot(&self, type_id: TypeId) -> Vec<Arc<dyn DeliveryTarget>> {
        let table = self.table.load();
        let typed = table.get(&SubscriptionTarget::Typed(type_id));
        let broadcast = table.get(&SubscriptionTarget::Broadcast);
        typed
            .into_iter()
            .chain(broadcast)
            .flatten()
            .map(|s| Arc::clone(&s.target))
            .collect()
    }

    fn insert(
        &self,
        key: SubscriptionTarget,
        identity: usize,
        target: Arc<dyn DeliveryTarget>,
    ) -> bool {
        let mut added = false;
        self.table.rcu(|current| {
            let mut next = SubscriberTable::clone(current);
            let subscriptions = next.entry(key).or_default();
            added = !subscriptions.iter().any(|s| s.identity == identity);
            if added {
                subscriptions.push(Subscription {
                    identity,
                    target: Arc::clone(&target),
                });
            }
            next
        });
        debug!(subscriber = target.name(), ?key, added, "subscribe");
        added
    }

    fn remove(&self, key: SubscriptionTarget, identity: usize) -> bool {
        let mut removed = false;
        self.table.rcu(|current| {
            removed = false;
            let mut next = SubscriberTable::clone(current);
            if let Some(subscriptions) = next.get_mut(&key) {
                let before = subscriptions.len();
                subscriptions.retain(|s| s.identity != identity);
                removed = subscriptions.len() != before;
                if subscriptions.is_empty() {
                    next.remove(&key);
                }
            }
            next
        });
        debug!(?key, removed, "unsubscribe");
        removed
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.load();
        f.debug_struct("SubscriberRegistry")
            .field("targets", &table.len())
            .field(
                "subscriptions",
                &table.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
