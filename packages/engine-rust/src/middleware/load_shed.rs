//! Concurrency limit for requests.
//!
//! Rejects requests while the limit is reached with
//! `DispatchError::Overloaded` rather than queueing them.

use async_trait::async_trait;
use courier_core::FixedOrder;
use tokio::sync::Semaphore;
use tracing::warn;

use super::RequestMiddleware;
use crate::config::MediatorConfig;
use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::pipeline::{ErasedResponse, Next};

/// Limits in-flight requests through a semaphore.
///
/// A permit is held until the rest of the chain returns.
#[derive(Debug)]
pub struct ConcurrencyLimitMiddleware {
    semaphore: Semaphore,
    limit: u32,
}

impl ConcurrencyLimitMiddleware {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            semaphore: Semaphore::new(limit as usize),
            limit,
        }
    }

    #[must_use]
    pub fn from_config(config: &MediatorConfig) -> Self {
        Self::new(config.max_concurrent_requests)
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        (self.limit as usize).saturating_sub(self.semaphore.available_permits())
    }
}

impl FixedOrder for ConcurrencyLimitMiddleware {
    const ORDER: i32 = -250;
}

#[async_trait]
impl RequestMiddleware for ConcurrencyLimitMiddleware {
    fn configuration(&self) -> Option<String> {
        Some(format!("max_concurrent={}", self.limit))
    }

    async fn handle(
        &self,
        envelope: &Envelope<'_>,
        next: Next<'_>,
    ) -> Result<ErasedResponse, DispatchError> {
        let Ok(_permit) = self.semaphore.try_acquire() else {
            warn!(
                request = envelope.type_name(),
                limit = self.limit,
                "request rejected, concurrency limit reached"
            );
            return Err(DispatchError::Overloaded);
        };
        next.run(envelope).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
