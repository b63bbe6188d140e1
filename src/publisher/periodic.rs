//! Periodic publisher: schedules a fixed-rate forward keyed by a
//! caller-supplied id; re-publishing under the same id cancels the prior
//! task first.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::error;

use crate::dispatcher::Dispatcher;
use crate::error::EventBusError;
use crate::event::{Event, EventPayload};
use crate::scheduler::{ScheduledTaskRegistry, TaskHandle};

use super::{Publisher, PublisherCore};

pub struct PeriodicPublisher<T: EventPayload> {
    core: PublisherCore,
    registry: ScheduledTaskRegistry,
    tasks: RwLock<HashMap<String, TaskHandle>>,
    _marker: PhantomData<T>,
}

impl<T: EventPayload> PeriodicPublisher<T> {
    pub fn new() -> Self {
        Self {
            core: PublisherCore::new(),
            registry: ScheduledTaskRegistry::new(),
            tasks: RwLock::new(HashMap::new()),
            _marker: PhantomData,
        }
    }

    pub fn publish(
        &self,
        event: Event<T>,
        id: impl Into<String>,
        period: Duration,
    ) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        if period.is_zero() {
            return Err(EventBusError::InvalidArgument(
                "period must be positive".to_string(),
            ));
        }
        let id = id.into();
        if let Some(old) = self.tasks.write().remove(&id) {
            old.cancel();
        }
        let handle = self.registry.scheduler().schedule_periodic(
            period,
            Box::new(move || {
                if let Err(err) = Dispatcher::instance().publish(event.clone()) {
                    error!(error = %err, "periodic publisher failed to forward event");
                }
            }),
        );
        self.registry.add(handle.clone())?;
        self.tasks.write().insert(id, handle);
        Ok(())
    }

    /// Cancels the task scheduled under `id`, if any. Idempotent on an
    /// unknown id.
    pub fn cancel(&self, id: &str) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        if let Some(handle) = self.tasks.write().remove(id) {
            handle.cancel();
        }
        Ok(())
    }
}

impl<T: EventPayload> Default for PeriodicPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EventPayload> Publisher for PeriodicPublisher<T> {
    fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.shutdown()?;
        for (_, handle) in self.tasks.write().drain() {
            handle.cancel();
        }
        self.registry.stop_and_shutdown()
    }

    fn is_shutdown(&self) -> bool {
        self.core.is_shutdown()
    }
}
