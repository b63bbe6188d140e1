//! Asynchronous publisher: owns a small worker pool and forwards events off
//! the caller's thread. Worker-thread failures are logged, never surfaced
//! to the publishing caller.

use tracing::error;

use crate::dispatcher::Dispatcher;
use crate::error::EventBusError;
use crate::event::{Event, EventPayload};
use crate::pool::WorkerPool;

use super::{Publisher, PublisherCore};

const DEFAULT_WORKERS: usize = 1;

pub struct AsyncPublisher {
    core: PublisherCore,
    pool: WorkerPool,
}

impl AsyncPublisher {
    pub fn new() -> Self {
        Self::with_workers(DEFAULT_WORKERS)
    }

    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            core: PublisherCore::new(),
            pool: WorkerPool::new(worker_count, "event-core-async-publisher"),
        }
    }

    pub fn publish<T: EventPayload>(&self, event: Event<T>) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        self.pool.submit(Box::new(move || {
            if let Err(err) = Dispatcher::instance().publish(event) {
                error!(error = %err, "async publisher failed to forward event");
            }
        }));
        Ok(())
    }
}

impl Default for AsyncPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for AsyncPublisher {
    fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.shutdown()?;
        self.pool.shutdown();
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.core.is_shutdown()
    }
}
