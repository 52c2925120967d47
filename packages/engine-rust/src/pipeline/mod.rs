//! Pipeline construction and execution.
//!
//! 1. **Store** (`store`): registered middleware descriptors with resolved order
//! 2. **Builder** (`builder`): order and filter descriptors for one message instance
//! 3. **Chain** (`chain`): continuations that run the onion around the terminal step

pub mod builder;
pub mod chain;
pub mod store;

use std::any::Any;
use std::sync::Arc;

pub use builder::{Pipeline, PipelineBuilder};
pub use chain::{Next, NotificationNext};
pub use store::{MiddlewareDescriptor, MiddlewareStore, Predicate, Registration};

use crate::middleware::{NotificationMiddleware, RequestMiddleware};

/// Response travelling back through the request chain before it is
/// downcast to the request's `Response` type.
pub type ErasedResponse = Box<dyn Any + Send>;

pub type RequestMiddlewareStore = MiddlewareStore<dyn RequestMiddleware>;
pub type NotificationMiddlewareStore = MiddlewareStore<dyn NotificationMiddleware>;
pub type RequestPipeline = Pipeline<dyn RequestMiddleware>;
pub type NotificationPipeline = Pipeline<dyn NotificationMiddleware>;
pub type RequestDescriptor = Arc<MiddlewareDescriptor<dyn RequestMiddleware>>;
pub type NotificationDescriptor = Arc<MiddlewareDescriptor<dyn NotificationMiddleware>>;
