//! Per-target delivery outcomes and their publish-level classification.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What kind of party received a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Subscribed to the notification's exact type.
    Subscriber,
    /// Subscribed to every notification.
    Broadcast,
    /// Registered notification handler.
    Handler,
}

impl TargetKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Subscriber => "subscriber",
            TargetKind::Broadcast => "broadcast",
            TargetKind::Handler => "handler",
        }
    }
}

/// A delivery target that returned an error or panicked.
///
/// The original error is kept so reporting can downcast it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct DeliveryFailure {
    message: String,
    error: Option<Arc<anyhow::Error>>,
    panicked: bool,
}

impl DeliveryFailure {
    #[must_use]
    pub fn from_error(error: anyhow::Error) -> Self {
        Self {
            message: format!("{error:#}"),
            error: Some(Arc::new(error)),
            panicked: false,
        }
    }

    /// Builds a failure from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self {
            message: format!("delivery panicked: {detail}"),
            error: None,
            panicked: true,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The error the target returned. `None` for panics.
    #[must_use]
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn is_panic(&self) -> bool {
        self.panicked
    }
}

/// Result of delivering one notification to one target.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub target: String,
    pub kind: TargetKind,
    pub elapsed: Duration,
    pub result: Result<(), DeliveryFailure>,
}

impl DeliveryOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Classification of one publish call over the targets it attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Every attempted delivery succeeded, including the vacuous zero-target case.
    AllSucceeded,
    /// Between 1 and N-1 of N attempted deliveries failed.
    PartialFailure { failed: usize, attempted: usize },
    /// All N attempted deliveries failed, N > 0.
    TotalFailure { attempted: usize },
}

impl PublishOutcome {
    #[must_use]
    pub fn classify(attempted: usize, failed: usize) -> Self {
        debug_assert!(failed <= attempted);
        if failed == 0 {
            PublishOutcome::AllSucceeded
        } else if failed >= attempted {
            PublishOutcome::TotalFailure { attempted }
        } else {
            PublishOutcome::PartialFailure { failed, attempted }
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PublishOutcome::AllSucceeded => "all_succeeded",
            PublishOutcome::PartialFailure { .. } => "partial_failure",
            PublishOutcome::TotalFailure { .. } => "total_failure",
        }
    }
}

/// Everything a publish call did.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub notification_type: &'static str,
    /// Outcomes of attempted targets, in delivery order.
    pub deliveries: Vec<DeliveryOutcome>,
    /// Selected targets never attempted because cancellation was signalled.
    pub skipped: usize,
    pub cancelled: bool,
    /// `false` when a notification middleware did not continue to the fan-out.
    pub fanned_out: bool,
}

impl PublishReport {
    /// Report for a publish whose middleware chain never reached the fan-out.
    #[must_use]
    pub fn short_circuited(notification_type: &'static str) -> Self {
        Self {
            notification_type,
            deliveries: Vec::new(),
            skipped: 0,
            cancelled: false,
            fanned_out: false,
        }
    }

    #[must_use]
    pub fn attempted(&self) -> usize {
        self.deliveries.len()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.deliveries.iter().filter(|d| d.is_success()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }

    #[must_use]
    pub fn outcome(&self) -> PublishOutcome {
        PublishOutcome::classify(self.attempted(), self.failed())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&DeliveryOutcome, &DeliveryFailure)> {
        self.deliveries
            .iter()
            .filter_map(|d| d.result.as_ref().err().map(|failure| (d, failure)))
    }
}
