//! Middleware order resolution.
//!
//! Every middleware registration resolves, once, to a single comparable
//! integer. Priority: a compile-time [`FixedOrder::ORDER`], then the order the
//! instance declares, then its discovery position. Lower values wrap outer.
//! Equal values keep discovery order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Compile-time order for a middleware type. Wins over any instance order.
pub trait FixedOrder {
    const ORDER: i32;
}

/// Where a middleware's resolved order came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum OrderSource {
    Fixed(i32),
    Declared(i32),
    Positional(usize),
}

impl OrderSource {
    #[must_use]
    pub fn resolve(fixed: Option<i32>, declared: Option<i32>, position: usize) -> Self {
        fixed
            .map(OrderSource::Fixed)
            .or_else(|| declared.map(OrderSource::Declared))
            .unwrap_or(OrderSource::Positional(position))
    }

    /// The comparable order value.
    #[must_use]
    pub fn value(self) -> i64 {
        match self {
            OrderSource::Fixed(order) | OrderSource::Declared(order) => i64::from(order),
            OrderSource::Positional(position) => i64::try_from(position).unwrap_or(i64::MAX),
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            OrderSource::Fixed(_) => "fixed",
            OrderSource::Declared(_) => "declared",
            OrderSource::Positional(_) => "positional",
        }
    }
}

impl fmt::Display for OrderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.value(), self.label())
    }
}

/// Sort key of a registered middleware: resolved order, then discovery sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    pub order: i64,
    pub sequence: usize,
}

impl OrderKey {
    #[must_use]
    pub fn new(source: OrderSource, sequence: usize) -> Self {
        Self {
            order: source.value(),
            sequence,
        }
    }
}
