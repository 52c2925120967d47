//! Type-erased view of the message travelling through a pipeline.

use std::any::Any;

use courier_core::{MessageInfo, MessageKind};
use tokio_util::sync::CancellationToken;

/// A borrowed message together with its static description and the caller's
/// cancellation token.
///
/// Middleware see every message through an envelope; they recover the
/// concrete type with [`Envelope::downcast_ref`].
#[derive(Clone, Copy)]
pub struct Envelope<'a> {
    info: MessageInfo,
    message: &'a (dyn Any + Send + Sync),
    cancel: &'a CancellationToken,
}

impl<'a> Envelope<'a> {
    pub fn new<T: Any + Send + Sync>(
        info: MessageInfo,
        message: &'a T,
        cancel: &'a CancellationToken,
    ) -> Self {
        debug_assert_eq!(info.type_id, std::any::TypeId::of::<T>());
        Self {
            info,
            message,
            cancel,
        }
    }

    #[must_use]
    pub fn info(&self) -> &MessageInfo {
        &self.info
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.info.type_name
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.info.kind
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&'a T> {
        self.message.downcast_ref::<T>()
    }

    #[must_use]
    pub fn cancel(&self) -> &'a CancellationToken {
        self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for Envelope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("type_name", &self.info.type_name)
            .field("kind", &self.info.kind)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
