//! Publisher family: producers hand events to one of these, which validate
//! the call and forward it to the dispatcher, optionally after delay,
//! batching, filtering, or timed execution.

mod asynchronous;
mod batch;
mod conditional;
mod delayed;
mod periodic;
mod sync;
mod timeout;

pub use asynchronous::AsyncPublisher;
pub use batch::BatchPublisher;
pub use conditional::{ConditionalAsyncPublisher, ConditionalSyncPublisher};
pub use delayed::DelayedPublisher;
pub use periodic::PeriodicPublisher;
pub use sync::SyncPublisher;
pub use timeout::{ExceptionTimeoutPublisher, SilentTimeoutPublisher};

use crate::error::EventBusError;
use crate::status::{LifecycleState, Status};

/// Shared by every publisher variant: validates that the publisher has not
/// been shut down, and owns the one-way `CREATED -> RUNNING -> SHUTDOWN`
/// lifecycle publishers expose (there is no `PAUSED`/`STOPPED` leg for
/// publishers — only the dispatcher and subscribers pause/stop).
pub(crate) struct PublisherCore {
    status: LifecycleState,
}

impl PublisherCore {
    pub(crate) fn new() -> Self {
        let status = LifecycleState::new();
        status
            .transition(Status::Running)
            .expect("CREATED -> RUNNING is always legal");
        Self { status }
    }

    pub(crate) fn require_not_shutdown(&self) -> Result<(), EventBusError> {
        self.status.require_not_shutdown()
    }

    pub(crate) fn shutdown(&self) -> Result<(), EventBusError> {
        self.status.transition(Status::Shutdown)
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.status.status() == Status::Shutdown
    }
}

/// Common contract implemented by every publisher variant.
pub trait Publisher {
    fn shutdown(&self) -> Result<(), EventBusError>;
    fn is_shutdown(&self) -> bool;
}
