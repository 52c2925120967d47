//! Courier core: message contracts, middleware ordering, delivery outcomes and lifecycle events.
//!
//! This crate holds the runtime-free vocabulary shared by the dispatch engine
//! and by anything that observes it: request and notification traits, type
//! constraints and order resolution for middleware, per-target delivery
//! outcomes with their publish-level classification, and the shape of the
//! lifecycle events instrumentation sees.

pub mod constraint;
pub mod event;
pub mod message;
pub mod names;
pub mod order;
pub mod outcome;

pub use constraint::Constraint;
pub use event::LifecycleEvent;
pub use message::{MessageInfo, MessageKind, Notification, Request, RequestKind};
pub use order::{FixedOrder, OrderKey, OrderSource};
pub use outcome::{DeliveryFailure, DeliveryOutcome, PublishOutcome, PublishReport, TargetKind};

