//! Handler contracts and their type-erased adapters.
//!
//! Hosts implement [`RequestHandler`] once per request type and
//! [`NotificationHandler`] for any number of notification types, then
//! register them with the [`HandlerRegistry`].

pub mod registry;

use std::any::type_name;
use std::marker::PhantomData;

use async_trait::async_trait;
use courier_core::names::short_type_name;
use courier_core::{Notification, Request, TargetKind};
use tokio_util::sync::CancellationToken;

use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::pipeline::ErasedResponse;
use crate::subscribers::DeliveryTarget;

pub use registry::{HandlerBinding, HandlerEntry, HandlerRegistry, HandlerStatus};

/// Handles one request type. Exactly one may be registered per type for
/// `send` to route.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    async fn handle(&self, request: &R, cancel: &CancellationToken) -> anyhow::Result<R::Response>;
}

/// Receives every published notification of type `N`. Any number may be
/// registered; each is a delivery target of the fan-out.
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync + 'static {
    async fn handle(&self, notification: &N, cancel: &CancellationToken) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Erased request handler
// ---------------------------------------------------------------------------

/// Terminal step of a request chain.
#[async_trait]
pub(crate) trait ErasedRequestHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, envelope: &Envelope<'_>) -> Result<ErasedResponse, DispatchError>;
}

pub(crate) struct RequestHandlerAdapter<R, H> {
    name: String,
    handler: H,
    _request: PhantomData<fn(&R)>,
}

impl<R: Request, H: RequestHandler<R>> RequestHandlerAdapter<R, H> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            name: short_type_name(type_name::<H>()),
            handler,
            _request: PhantomData,
        }
    }
}

#[async_trait]
impl<R: Request, H: RequestHandler<R>> ErasedRequestHandler for RequestHandlerAdapter<R, H> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, envelope: &Envelope<'_>) -> Result<ErasedResponse, DispatchError> {
        let request = envelope
            .downcast_ref::<R>()
            .ok_or(DispatchError::TypeMismatch {
                request_type: envelope.type_name(),
                expected: type_name::<R>(),
            })?;
        let response = self.handler.handle(request, envelope.cancel()).await?;
        Ok(Box::new(response))
    }
}

// ---------------------------------------------------------------------------
// Erased notification handler
// ---------------------------------------------------------------------------

pub(crate) struct NotificationHandlerAdapter<N, H> {
    name: String,
    handler: H,
    _notification: PhantomData<fn(&N)>,
}

impl<N: Notification, H: NotificationHandler<N>> NotificationHandlerAdapter<N, H> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            name: short_type_name(type_name::<H>()),
            handler,
            _notification: PhantomData,
        }
    }
}

#[async_trait]
impl<N: Notification, H: NotificationHandler<N>> DeliveryTarget
    for NotificationHandlerAdapter<N, H>
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Handler
    }

    async fn deliver(&self, envelope: &Envelope<'_>) -> anyhow::Result<()> {
        let notification = envelope.downcast_ref::<N>().ok_or_else(|| {
            anyhow::anyhow!(
                "{} delivered to handler of {}",
                envelope.type_name(),
                type_name::<N>()
            )
        })?;
        self.handler.handle(notification, envelope.cancel()).await
    }
}
