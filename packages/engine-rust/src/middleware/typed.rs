//! Middleware written against one concrete request type.
//!
//! A [`TypedMiddleware<R>`] sees `&R` and returns `R::Response` instead of
//! working on the erased envelope. Wrap it in [`Typed`] to register it; the
//! adapter constrains it to `R` so it never runs for other requests.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use courier_core::names::short_type_name;
use courier_core::{Constraint, FixedOrder, Request};
use tokio_util::sync::CancellationToken;

use super::RequestMiddleware;
use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::pipeline::{ErasedResponse, Next};

#[async_trait]
pub trait TypedMiddleware<R: Request>: Send + Sync + 'static {
    fn name(&self) -> String {
        short_type_name(type_name::<Self>())
    }

    fn order(&self) -> Option<i32> {
        None
    }

    /// Override together with `should_run`, as for
    /// [`RequestMiddleware::is_conditional`].
    fn is_conditional(&self) -> bool {
        false
    }

    fn should_run(&self, _request: &R) -> bool {
        true
    }

    fn configuration(&self) -> Option<String> {
        None
    }

    async fn handle(
        &self,
        request: &R,
        cancel: &CancellationToken,
        next: TypedNext<'_, R>,
    ) -> Result<R::Response, DispatchError>;
}

/// The rest of the pipeline, returning `R::Response`.
pub struct TypedNext<'a, R> {
    next: Next<'a>,
    envelope: &'a Envelope<'a>,
    _request: PhantomData<fn() -> R>,
}

impl<'a, R: Request> TypedNext<'a, R> {
    /// Runs the remaining middleware and the handler.
    ///
    /// # Errors
    ///
    /// Returns whatever the rest of the chain returned, or
    /// [`DispatchError::TypeMismatch`] if an inner middleware short-circuited
    /// with a value that is not an `R::Response`.
    pub async fn run(self) -> Result<R::Response, DispatchError> {
        let response = self.next.run(self.envelope).await?;
        response
            .downcast::<R::Response>()
            .map(|response| *response)
            .map_err(|_| DispatchError::TypeMismatch {
                request_type: type_name::<R>(),
                expected: type_name::<R::Response>(),
            })
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.next.remaining()
    }
}

/// Registers a [`TypedMiddleware`] as request middleware.
///
/// A fixed order on `M` carries over, so `Registration::request_fixed` works
/// on the wrapper.
pub struct Typed<R, M> {
    middleware: M,
    _request: PhantomData<fn(&R)>,
}

impl<R: Request, M: TypedMiddleware<R>> Typed<R, M> {
    #[must_use]
    pub fn new(middleware: M) -> Self {
        Self {
            middleware,
            _request: PhantomData,
        }
    }

    #[must_use]
    pub fn inner(&self) -> &M {
        &self.middleware
    }
}

impl<R, M: FixedOrder> FixedOrder for Typed<R, M> {
    const ORDER: i32 = M::ORDER;
}

impl<R, M> fmt::Debug for Typed<R, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typed")
            .field("request", &type_name::<R>())
            .field("middleware", &type_name::<M>())
            .finish()
    }
}

#[async_trait]
impl<R: Request, M: TypedMiddleware<R>> RequestMiddleware for Typed<R, M> {
    fn name(&self) -> String {
        self.middleware.name()
    }

    fn order(&self) -> Option<i32> {
        self.middleware.order()
    }

    fn constraint(&self) -> Constraint {
        Constraint::exact::<R>()
    }

    fn is_conditional(&self) -> bool {
        self.middleware.is_conditional()
    }

    fn should_run(&self, envelope: &Envelope<'_>) -> bool {
        envelope
            .downcast_ref::<R>()
            .is_some_and(|request| self.middleware.should_run(request))
    }

    fn configuration(&self) -> Option<String> {
        self.middleware.configuration()
    }

    async fn handle(
        &self,
        envelope: &Envelope<'_>,
        next: Next<'_>,
    ) -> Result<ErasedResponse, DispatchError> {
        let Some(request) = envelope.downcast_ref::<R>() else {
            return next.run(envelope).await;
        };
        let next = TypedNext {
            next,
            envelope,
            _request: PhantomData,
        };
        let response = self
            .middleware
            .handle(request, envelope.cancel(), next)
            .await?;
        Ok(Box::new(response))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
