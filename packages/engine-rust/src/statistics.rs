//! Execution statistics.
//!
//! An explicitly constructed service the mediator owns and shares by `Arc`.
//! Counters are atomics, so recording never blocks readers and a snapshot is
//! at worst slightly behind concurrent writers. Per-type counters sit in a
//! copy-on-write table: only the first dispatch of a new type swaps the table,
//! and snapshots read it without taking a lock. Every increment is mirrored
//! to the `metrics` facade for whichever exporter the host installs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use courier_core::{MessageInfo, MessageKind, PublishOutcome};
use serde::{Deserialize, Serialize};

/// Monotonic process-wide counters, reset only on request.
#[derive(Debug, Default)]
pub struct ExecutionStatistics {
    queries: AtomicU64,
    commands: AtomicU64,
    notifications: AtomicU64,
    deliveries_succeeded: AtomicU64,
    deliveries_failed: AtomicU64,
    publish_all_succeeded: AtomicU64,
    publish_partial_failure: AtomicU64,
    publish_total_failure: AtomicU64,
    publish_aborted: AtomicU64,
    per_type: ArcSwap<HashMap<&'static str, Arc<AtomicU64>>>,
}

impl ExecutionStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one dispatch attempt, whatever its result.
    pub fn record_dispatch(&self, info: &MessageInfo) {
        match info.kind {
            MessageKind::Query => {
                self.queries.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("courier_queries_total").increment(1);
            }
            MessageKind::Command => {
                self.commands.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("courier_commands_total").increment(1);
            }
            MessageKind::Notification => {}
        }
        self.bump_type(info.type_name);
    }

    /// Counts one publish call.
    pub fn record_publish(&self, info: &MessageInfo) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("courier_notifications_total").increment(1);
        self.bump_type(info.type_name);
    }

    pub fn record_delivery(&self, success: bool) {
        let (counter, outcome) = if success {
            (&self.deliveries_succeeded, "success")
        } else {
            (&self.deliveries_failed, "failure")
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("courier_deliveries_total", "outcome" => outcome).increment(1);
    }

    pub fn record_publish_outcome(&self, outcome: PublishOutcome) {
        let counter = match outcome {
            PublishOutcome::AllSucceeded => &self.publish_all_succeeded,
            PublishOutcome::PartialFailure { .. } => &self.publish_partial_failure,
            PublishOutcome::TotalFailure { .. } => &self.publish_total_failure,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("courier_publish_total", "outcome" => outcome.as_str()).increment(1);
    }

    /// Counts a publish aborted by a notification middleware failure.
    pub fn record_publish_aborted(&self) {
        self.publish_aborted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("courier_publish_total", "outcome" => "aborted").increment(1);
    }

    #[must_use]
    pub fn queries_executed(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn commands_executed(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn notifications_published(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            queries_executed: self.queries_executed(),
            commands_executed: self.commands_executed(),
            notifications_published: self.notifications_published(),
            deliveries: DeliveryCounts {
                succeeded: self.deliveries_succeeded.load(Ordering::Relaxed),
                failed: self.deliveries_failed.load(Ordering::Relaxed),
            },
            publishes: PublishCounts {
                all_succeeded: self.publish_all_succeeded.load(Ordering::Relaxed),
                partial_failure: self.publish_partial_failure.load(Ordering::Relaxed),
                total_failure: self.publish_total_failure.load(Ordering::Relaxed),
                aborted: self.publish_aborted.load(Ordering::Relaxed),
            },
            per_type: self
                .per_type
                .load()
                .iter()
                .map(|(name, count)| ((*name).to_string(), count.load(Ordering::Relaxed)))
                .collect(),
        }
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for counter in [
            &self.queries,
            &self.commands,
            &self.notifications,
            &self.deliveries_succeeded,
            &self.deliveries_failed,
            &self.publish_all_succeeded,
            &self.publish_partial_failure,
            &self.publish_total_failure,
            &self.publish_aborted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.per_type.store(Arc::default());
    }

    fn bump_type(&self, type_name: &'static str) {
        if let Some(count) = self.per_type.load().get(type_name) {
            count.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let mut inserted = None;
        self.per_type.rcu(|current| {
            let mut table = HashMap::clone(current);
            inserted = Some(Arc::clone(table.entry(type_name).or_default()));
            table
        });
        if let Some(count) = inserted {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of [`ExecutionStatistics`] for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub queries_executed: u64,
    pub commands_executed: u64,
    pub notifications_published: u64,
    pub deliveries: DeliveryCounts,
    pub publishes: PublishCounts,
    /// Dispatch or publish attempts per message type.
    pub per_type: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCounts {
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishCounts {
    pub all_succeeded: u64,
    pub partial_failure: u64,
    pub total_failure: u64,
    pub aborted: u64,
}
