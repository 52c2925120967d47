//! Handler registry: request type -> handler bindings.
//!
//! Populated by the host before dispatching. Reads take a shard read lock and
//! clone the binding, so a registration racing with `send` is seen either
//! fully or not at all.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use courier_core::{MessageInfo, Notification, Request};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    ErasedRequestHandler, NotificationHandler, NotificationHandlerAdapter, RequestHandler,
    RequestHandlerAdapter,
};
use crate::subscribers::DeliveryTarget;

/// Cardinality of the handlers bound to a request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerStatus {
    Single,
    Missing,
    Multiple,
}

/// A registered request handler.
#[derive(Clone)]
pub struct HandlerEntry {
    handler: Arc<dyn ErasedRequestHandler>,
}

impl HandlerEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        self.handler.name()
    }

    pub(crate) fn handler(&self) -> &dyn ErasedRequestHandler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name())
            .finish()
    }
}

/// Handler binding for one request type at the moment it was resolved.
#[derive(Debug, Clone)]
pub enum HandlerBinding {
    Single(HandlerEntry),
    Missing,
    /// Names of every candidate handler, in registration order.
    Multiple(Vec<String>),
}

impl HandlerBinding {
    #[must_use]
    pub fn status(&self) -> HandlerStatus {
        match self {
            HandlerBinding::Single(_) => HandlerStatus::Single,
            HandlerBinding::Missing => HandlerStatus::Missing,
            HandlerBinding::Multiple(_) => HandlerStatus::Multiple,
        }
    }

    #[must_use]
    pub fn handler_names(&self) -> Vec<String> {
        match self {
            HandlerBinding::Single(entry) => vec![entry.name().to_string()],
            HandlerBinding::Missing => Vec::new(),
            HandlerBinding::Multiple(names) => names.clone(),
        }
    }
}

/// Request handlers and notification handlers keyed by message `TypeId`.
#[derive(Default)]
pub struct HandlerRegistry {
    requests: DashMap<TypeId, Vec<HandlerEntry>>,
    notifications: DashMap<TypeId, Vec<Arc<dyn DeliveryTarget>>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a handler to `R`. Binding a second handler makes `R` ambiguous.
    pub fn register_request<R, H>(&self, handler: H)
    where
        R: Request,
        H: RequestHandler<R>,
    {
        let adapter: Arc<dyn ErasedRequestHandler> =
            Arc::new(RequestHandlerAdapter::<R, H>::new(handler));
        let info = MessageInfo::of_request::<R>();
        debug!(
            request = info.type_name,
            handler = adapter.name(),
            "request handler registered"
        );
        self.requests
            .entry(info.type_id)
            .or_default()
            .push(HandlerEntry { handler: adapter });
    }

    /// Adds a handler invoked for every published `N`.
    pub fn register_notification<N, H>(&self, handler: H)
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        let adapter: Arc<dyn DeliveryTarget> =
            Arc::new(NotificationHandlerAdapter::<N, H>::new(handler));
        let info = MessageInfo::of_notification::<N>();
        debug!(
            notification = info.type_name,
            handler = adapter.name(),
            "notification handler registered"
        );
        self.notifications
            .entry(info.type_id)
            .or_default()
            .push(adapter);
    }

    #[must_use]
    pub fn resolve(&self, type_id: TypeId) -> HandlerBinding {
        let Some(entries) = self.requests.get(&type_id) else {
            return HandlerBinding::Missing;
        };
        match entries.as_slice() {
            [] => HandlerBinding::Missing,
            [single] => HandlerBinding::Single(single.clone()),
            many => HandlerBinding::Multiple(many.iter().map(|e| e.name().to_string()).collect()),
        }
    }

    #[must_use]
    pub fn resolve_request<R: Request>(&self) -> HandlerBinding {
        self.resolve(TypeId::of::<R>())
    }

    pub(crate) fn notification_targets(&self, type_id: TypeId) -> Vec<Arc<dyn DeliveryTarget>> {
        self.notifications
            .get(&type_id)
            .map(|targets| targets.clone())
            .unwrap_or_default()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("request_types", &self.requests.len())
            .field("notification_types", &self.notifications.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
