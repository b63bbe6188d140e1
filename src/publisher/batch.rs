//! Batch publisher: appends to a growing list and swaps it out once it
//! reaches a configured size, dispatching the batch on a worker. The
//! source this behavior is derived from left its batch list unsynchronized
//! under concurrent publishers; here the pending list is protected by a
//! mutex so `publish` can be called from any number of threads safely.

use tracing::error;

use crate::dispatcher::Dispatcher;
use crate::error::EventBusError;
use crate::event::{Event, EventPayload};
use crate::pool::WorkerPool;

use parking_lot::Mutex;

use super::{Publisher, PublisherCore};

pub struct BatchPublisher<T: EventPayload> {
    core: PublisherCore,
    batch_size: usize,
    pending: Mutex<Vec<Event<T>>>,
    pool: WorkerPool,
}

impl<T: EventPayload> BatchPublisher<T> {
    pub fn new(batch_size: usize) -> Result<Self, EventBusError> {
        if batch_size == 0 {
            return Err(EventBusError::InvalidArgument(
                "batch_size must be positive".to_string(),
            ));
        }
        Ok(Self {
            core: PublisherCore::new(),
            batch_size,
            pending: Mutex::new(Vec::with_capacity(batch_size)),
            pool: WorkerPool::new(1, "event-core-batch-publisher"),
        })
    }

    pub fn publish(&self, event: Event<T>) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        let ready = {
            let mut pending = self.pending.lock();
            pending.push(event);
            if pending.len() >= self.batch_size {
                Some(std::mem::take(&mut *pending))
            } else {
                None
            }
        };
        if let Some(batch) = ready {
            self.dispatch_batch(batch);
        }
        Ok(())
    }

    /// Forces the current partial batch out, regardless of size.
    pub fn flush(&self) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        let batch = std::mem::take(&mut *self.pending.lock());
        if !batch.is_empty() {
            self.dispatch_batch(batch);
        }
        Ok(())
    }

    fn dispatch_batch(&self, batch: Vec<Event<T>>) {
        self.pool.submit(Box::new(move || {
            for event in batch {
                if let Err(err) = Dispatcher::instance().publish(event) {
                    error!(error = %err, "batch publisher failed to forward event");
                }
            }
        }));
    }
}

impl<T: EventPayload> Publisher for BatchPublisher<T> {
    fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.shutdown()?;
        self.pool.shutdown();
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.core.is_shutdown()
    }
}
