//! Lifecycle event shape observed by instrumentation.
//!
//! The engine defines what an event carries; exporting it (logs, traces,
//! dashboards) is left to whoever observes it.

use std::time::Duration;

use serde::Serialize;

use crate::message::MessageKind;
use crate::outcome::{PublishOutcome, TargetKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    DispatchStarted {
        request_type: &'static str,
        kind: MessageKind,
    },
    DispatchCompleted {
        request_type: &'static str,
        kind: MessageKind,
        duration: Duration,
        success: bool,
        error: Option<String>,
    },
    PublishStarted {
        notification_type: &'static str,
    },
    DeliveryCompleted {
        notification_type: &'static str,
        target: String,
        target_kind: TargetKind,
        duration: Duration,
        success: bool,
        error: Option<String>,
    },
    PublishCompleted {
        notification_type: &'static str,
        duration: Duration,
        success: bool,
        outcome: Option<PublishOutcome>,
        error: Option<String>,
    },
}

impl LifecycleEvent {
    /// Type name of the request or notification the event is about.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            LifecycleEvent::DispatchStarted { request_type, .. }
            | LifecycleEvent::DispatchCompleted { request_type, .. } => request_type,
            LifecycleEvent::PublishStarted { notification_type }
            | LifecycleEvent::DeliveryCompleted {
                notification_type, ..
            }
            | LifecycleEvent::PublishCompleted {
                notification_type, ..
            } => notification_type,
        }
    }

    /// `None` for start events.
    #[must_use]
    pub fn success(&self) -> Option<bool> {
        match self {
            LifecycleEvent::DispatchStarted { .. } | LifecycleEvent::PublishStarted { .. } => None,
            LifecycleEvent::DispatchCompleted { success, .. }
            | LifecycleEvent::DeliveryCompleted { success, .. }
            | LifecycleEvent::PublishCompleted { success, .. } => Some(*success),
        }
    }
}
