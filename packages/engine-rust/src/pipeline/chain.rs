//! Continuations through the middleware onion.
//!
//! Middleware *i* receives a continuation that runs middleware *i+1*, or the
//! terminal step when *i* is last. Errors travel back up the same call frames
//! untouched unless a middleware handles them itself.

use std::sync::Arc;

use async_trait::async_trait;

use super::store::MiddlewareDescriptor;
use super::ErasedResponse;
use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::handler::ErasedRequestHandler;
use crate::middleware::{NotificationMiddleware, RequestMiddleware};

/// Terminal step of a notification chain: delivery to every target.
#[async_trait]
pub(crate) trait FanOut: Send + Sync {
    async fn fan_out(&self, envelope: &Envelope<'_>);
}

// ---------------------------------------------------------------------------
// Next
// ---------------------------------------------------------------------------

/// The rest of a request pipeline, ending in the handler.
pub struct Next<'a> {
    stages: &'a [Arc<MiddlewareDescriptor<dyn RequestMiddleware>>],
    handler: &'a dyn ErasedRequestHandler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        stages: &'a [Arc<MiddlewareDescriptor<dyn RequestMiddleware>>],
        handler: &'a dyn ErasedRequestHandler,
    ) -> Self {
        Self { stages, handler }
    }

    /// Runs the remaining middleware and the handler.
    ///
    /// # Errors
    ///
    /// Returns whatever the next middleware or the handler returned.
    pub async fn run(self, envelope: &Envelope<'_>) -> Result<ErasedResponse, DispatchError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    handler: self.handler,
                };
                stage.middleware().handle(envelope, next).await
            }
            None => self.handler.call(envelope).await,
        }
    }

    /// Middleware still to run before the handler.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}

// ---------------------------------------------------------------------------
// NotificationNext
// ---------------------------------------------------------------------------

/// The rest of a notification pipeline, ending in the fan-out.
pub struct NotificationNext<'a> {
    stages: &'a [Arc<MiddlewareDescriptor<dyn NotificationMiddleware>>],
    fan_out: &'a dyn FanOut,
}

impl<'a> NotificationNext<'a> {
    pub(crate) fn new(
        stages: &'a [Arc<MiddlewareDescriptor<dyn NotificationMiddleware>>],
        fan_out: &'a dyn FanOut,
    ) -> Self {
        Self { stages, fan_out }
    }

    /// Runs the remaining middleware and then delivers to every target.
    ///
    /// # Errors
    ///
    /// Returns an error only if a later notification middleware failed.
    /// Delivery failures are never returned here.
    pub async fn run(self, envelope: &Envelope<'_>) -> anyhow::Result<()> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = NotificationNext {
                    stages: rest,
                    fan_out: self.fan_out,
                };
                stage.middleware().handle(envelope, next).await
            }
            None => {
                self.fan_out.fan_out(envelope).await;
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}
