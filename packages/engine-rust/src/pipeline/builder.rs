//! Pipeline builder: orders and filters descriptors for one message instance.

use std::fmt;
use std::sync::Arc;

use super::chain::{FanOut, Next, NotificationNext};
use super::store::{MiddlewareDescriptor, MiddlewareStore};
use super::ErasedResponse;
use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::handler::ErasedRequestHandler;
use crate::middleware::{NotificationMiddleware, PipelineStage, RequestMiddleware};

/// Builds pipelines without touching registration state.
///
/// The inspector calls the same functions, so what it reports is the order
/// the chain executes in.
pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Every registered descriptor, ascending by resolved order, ties in
    /// discovery order.
    #[must_use]
    pub fn ordered<M: ?Sized + PipelineStage>(
        store: &MiddlewareStore<M>,
    ) -> Vec<Arc<MiddlewareDescriptor<M>>> {
        let mut stages = Vec::clone(&store.snapshot());
        stages.sort_by_key(|d| d.key());
        stages
    }

    /// The ordered descriptors whose constraint accepts this message kind
    /// and whose conditions hold for this instance.
    #[must_use]
    pub fn build<M: ?Sized + PipelineStage>(
        store: &MiddlewareStore<M>,
        envelope: &Envelope<'_>,
    ) -> Pipeline<M> {
        let stages = Self::ordered(store)
            .into_iter()
            .filter(|d| d.applies_to(envelope))
            .collect();
        Pipeline { stages }
    }
}

/// An ordered, immutable chain of middleware for one message instance.
pub struct Pipeline<M: ?Sized> {
    stages: Vec<Arc<MiddlewareDescriptor<M>>>,
}

impl<M: ?Sized> Pipeline<M> {
    /// Outermost first.
    #[must_use]
    pub fn stages(&self) -> &[Arc<MiddlewareDescriptor<M>>] {
        &self.stages
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|d| d.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<M: ?Sized> fmt::Debug for Pipeline<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Pipeline<dyn RequestMiddleware> {
    pub(crate) async fn execute(
        &self,
        envelope: &Envelope<'_>,
        handler: &dyn ErasedRequestHandler,
    ) -> Result<ErasedResponse, DispatchError> {
        Next::new(&self.stages, handler).run(envelope).await
    }
}

impl Pipeline<dyn NotificationMiddleware> {
    pub(crate) async fn execute(
        &self,
        envelope: &Envelope<'_>,
        fan_out: &dyn FanOut,
    ) -> anyhow::Result<()> {
        NotificationNext::new(&self.stages, fan_out)
            .run(envelope)
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
