//! Middleware contracts and the built-in middleware.
//!
//! Request middleware wrap the handler call and see its response; notification
//! middleware wrap the whole fan-out step and see no response. Both follow the
//! same registration, ordering and filtering rules.
//!
//! - [`timeout`]: per-request deadline
//! - [`load_shed`]: semaphore-based concurrency limit
//! - [`cancellation`]: stop before the handler once the caller cancelled
//! - [`instrumentation`]: tracing spans and lifecycle events
//! - [`typed`]: middleware written against one concrete request type

pub mod cancellation;
pub mod instrumentation;
pub mod load_shed;
pub mod timeout;
pub mod typed;

use async_trait::async_trait;
use courier_core::names::short_type_name;
use courier_core::Constraint;

use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::pipeline::{ErasedResponse, Next, NotificationNext};

pub use cancellation::CancellationMiddleware;
pub use instrumentation::{InstrumentationMiddleware, NotificationInstrumentationMiddleware};
pub use load_shed::ConcurrencyLimitMiddleware;
pub use timeout::TimeoutMiddleware;
pub use typed::{Typed, TypedMiddleware, TypedNext};

// ---------------------------------------------------------------------------
// RequestMiddleware
// ---------------------------------------------------------------------------

/// Middleware around request handling.
///
/// `handle` may run logic before calling `next.run(envelope)`, after it
/// returns, or both. Not calling `next` short-circuits the rest of the chain,
/// in which case the middleware must return a value of the request's
/// response type.
#[async_trait]
pub trait RequestMiddleware: Send + Sync + 'static {
    /// Name shown by the inspector. Defaults to the short type name.
    fn name(&self) -> String {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Order declared by this instance. Ignored when the type has a
    /// [`FixedOrder`](courier_core::FixedOrder) registration.
    fn order(&self) -> Option<i32> {
        None
    }

    fn constraint(&self) -> Constraint {
        Constraint::Any
    }

    /// Whether `should_run` inspects the request instance.
    ///
    /// Override together with `should_run`. The inspector reads only this
    /// flag, so a middleware that filters in `should_run` but leaves this
    /// `false` is listed as unconditional.
    fn is_conditional(&self) -> bool {
        false
    }

    /// Evaluated per request instance while the pipeline is built. Pair an
    /// override with `is_conditional`.
    fn should_run(&self, _envelope: &Envelope<'_>) -> bool {
        true
    }

    /// Human-readable settings for the inspector.
    fn configuration(&self) -> Option<String> {
        None
    }

    async fn handle(
        &self,
        envelope: &Envelope<'_>,
        next: Next<'_>,
    ) -> Result<ErasedResponse, DispatchError>;
}

// ---------------------------------------------------------------------------
// NotificationMiddleware
// ---------------------------------------------------------------------------

/// Middleware around the notification fan-out step.
///
/// One execution spans delivery to every target. An error returned from
/// `handle` aborts the publish.
#[async_trait]
pub trait NotificationMiddleware: Send + Sync + 'static {
    fn name(&self) -> String {
        short_type_name(std::any::type_name::<Self>())
    }

    fn order(&self) -> Option<i32> {
        None
    }

    fn constraint(&self) -> Constraint {
        Constraint::Any
    }

    /// Same contract as [`RequestMiddleware::is_conditional`].
    fn is_conditional(&self) -> bool {
        false
    }

    fn should_run(&self, _envelope: &Envelope<'_>) -> bool {
        true
    }

    fn configuration(&self) -> Option<String> {
        None
    }

    async fn handle(&self, envelope: &Envelope<'_>, next: NotificationNext<'_>)
        -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// PipelineStage
// ---------------------------------------------------------------------------

/// Registration metadata shared by both middleware kinds.
///
/// Lets the descriptor store, builder and inspector treat request and
/// notification middleware alike.
pub trait PipelineStage: Send + Sync {
    fn stage_name(&self) -> String;
    fn stage_order(&self) -> Option<i32>;
    fn stage_constraint(&self) -> Constraint;
    fn stage_conditional(&self) -> bool;
    fn stage_applies(&self, envelope: &Envelope<'_>) -> bool;
    fn stage_configuration(&self) -> Option<String>;
}

macro_rules! pipeline_stage {
    ($trait_object:ty) => {
        impl PipelineStage for $trait_object {
            fn stage_name(&self) -> String {
                self.name()
            }

            fn stage_order(&self) -> Option<i32> {
                self.order()
            }

            fn stage_constraint(&self) -> Constraint {
                self.constraint()
            }

            fn stage_conditional(&self) -> bool {
                self.is_conditional()
            }

            fn stage_applies(&self, envelope: &Envelope<'_>) -> bool {
                self.should_run(envelope)
            }

            fn stage_configuration(&self) -> Option<String> {
                self.configuration()
            }
        }
    };
}

pipeline_stage!(dyn RequestMiddleware);
pipeline_stage!(dyn NotificationMiddleware);
