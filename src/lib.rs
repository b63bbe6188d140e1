//! A thread-safe, priority-ordered, typed in-process event bus.
//!
//! A single process-wide [`dispatcher::Dispatcher`] receives published
//! events on one global FIFO queue and fans each one out to every
//! currently-registered subscriber. Publishers and subscribers come in
//! several flavors — synchronous, asynchronous, batched, conditional,
//! delayed, periodic, and timeout-bounded — all built on top of the same
//! dispatcher and the same [`event::Event`]/[`event::ListEvent`] envelope
//! types.
//!
//! Handler failures (an `Err` return or a panic) are captured per-subscriber
//! as a [`error::HandlerError`] and never propagate back through
//! [`dispatcher::Dispatcher::publish`]; API-boundary misuse (publishing
//! while not running, a non-positive batch size, an unknown task id) is
//! reported as [`error::EventBusError`].

mod dispatcher;
mod error;
mod event;
mod handler;
mod pool;
mod priority;
mod publisher;
mod queue;
mod scheduler;
mod status;
mod subscriber;

pub use dispatcher::{Dispatcher, EventSink, SubscriberId};
pub use error::{EventBusError, HandlerError};
pub use event::{Event, EventPayload, ListEvent, TypeKey};
pub use handler::{ErrorHandler, ListErrorHandler, ListHandler, SingleHandler};
pub use priority::Priority;
pub use publisher::{
    AsyncPublisher, BatchPublisher, ConditionalAsyncPublisher, ConditionalSyncPublisher,
    DelayedPublisher, ExceptionTimeoutPublisher, PeriodicPublisher, Publisher,
    SilentTimeoutPublisher, SyncPublisher,
};
pub use scheduler::TaskHandle;
pub use status::{Lifecycle, Status};
pub use subscriber::{AsyncSingleSubscriber, BatchListSubscriber, BufferedSubscriber, SyncSingleSubscriber};
