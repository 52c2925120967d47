//! Type constraints restricting which messages a middleware wraps.

use std::any::{type_name, TypeId};
use std::fmt;

use crate::message::{MessageInfo, MessageKind};
use crate::names;

/// Which messages a middleware applies to.
///
/// Unconstrained middleware (`Any`) wraps every message of its pipeline.
/// `Commands` and `Queries` never match notifications, and `Notifications`
/// never matches routed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Constraint {
    #[default]
    Any,
    Commands,
    Queries,
    Notifications,
    /// Messages declaring the named capability.
    Marker(&'static str),
    /// One concrete message type.
    Exact {
        type_id: TypeId,
        type_name: &'static str,
    },
}

impl Constraint {
    #[must_use]
    pub fn exact<T: 'static>() -> Self {
        Constraint::Exact {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Returns `true` if a message described by `info` passes this constraint.
    #[must_use]
    pub fn accepts(&self, info: &MessageInfo) -> bool {
        match self {
            Constraint::Any => true,
            Constraint::Commands => info.kind == MessageKind::Command,
            Constraint::Queries => info.kind == MessageKind::Query,
            Constraint::Notifications => info.kind == MessageKind::Notification,
            Constraint::Marker(capability) => info.has_capability(capability),
            Constraint::Exact { type_id, .. } => *type_id == info.type_id,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Any => f.write_str("any"),
            Constraint::Commands => f.write_str("commands"),
            Constraint::Queries => f.write_str("queries"),
            Constraint::Notifications => f.write_str("notifications"),
            Constraint::Marker(capability) => write!(f, "marker:{capability}"),
            Constraint::Exact { type_name, .. } => {
                write!(f, "type:{}", names::short_type_name(type_name))
            }
        }
    }
}
