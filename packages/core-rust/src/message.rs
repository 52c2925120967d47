//! Request and notification contracts.
//!
//! A [`Request`] is routed to exactly one handler and comes in two kinds:
//! commands (intent to change state, usually `Response = ()`) and queries
//! (read a typed value). A [`Notification`] is broadcast to any number of
//! interested parties, including none.

use std::any::{type_name, TypeId};

use serde::{Deserialize, Serialize};

use crate::names;

/// Kind of a routed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Command,
    Query,
}

/// Kind of any message flowing through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Command,
    Query,
    Notification,
}

impl From<RequestKind> for MessageKind {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Command => MessageKind::Command,
            RequestKind::Query => MessageKind::Query,
        }
    }
}

impl MessageKind {
    /// Lowercase label used in logs and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Command => "command",
            MessageKind::Query => "query",
            MessageKind::Notification => "notification",
        }
    }
}

/// An immutable value representing intent, dispatched to a single handler.
///
/// ```ignore
/// struct GetOrder { id: u64 }
///
/// impl Request for GetOrder {
///     type Response = Option<Order>;
///     const KIND: RequestKind = RequestKind::Query;
/// }
/// ```
pub trait Request: Send + Sync + 'static {
    /// Value produced by the handler. Commands use `()`.
    type Response: Send + 'static;

    /// Whether this request is a command or a query.
    const KIND: RequestKind;

    /// Marker capabilities matched by [`Constraint::Marker`](crate::Constraint::Marker).
    fn capabilities() -> &'static [&'static str] {
        &[]
    }
}

/// An immutable value broadcast to zero or more subscribers and handlers.
pub trait Notification: Send + Sync + 'static {
    /// Marker capabilities matched by [`Constraint::Marker`](crate::Constraint::Marker).
    fn capabilities() -> &'static [&'static str] {
        &[]
    }
}

/// Static description of a concrete message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    pub type_id: TypeId,
    /// Fully qualified type name as reported by `std::any::type_name`.
    pub type_name: &'static str,
    pub kind: MessageKind,
    pub capabilities: &'static [&'static str],
}

impl MessageInfo {
    #[must_use]
    pub fn of_request<R: Request>() -> Self {
        Self {
            type_id: TypeId::of::<R>(),
            type_name: type_name::<R>(),
            kind: R::KIND.into(),
            capabilities: R::capabilities(),
        }
    }

    #[must_use]
    pub fn of_notification<N: Notification>() -> Self {
        Self {
            type_id: TypeId::of::<N>(),
            type_name: type_name::<N>(),
            kind: MessageKind::Notification,
            capabilities: N::capabilities(),
        }
    }

    /// Type name with module paths stripped, e.g. `GetOrder`.
    #[must_use]
    pub fn short_name(&self) -> String {
        names::short_type_name(self.type_name)
    }

    /// Module path the type was declared in, e.g. `shop::orders`.
    #[must_use]
    pub fn module_path(&self) -> &'static str {
        names::module_path(self.type_name)
    }

    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(&capability)
    }
}
