//! Buffered subscriber: no dispatch loop, just a local priority queue the
//! caller drains on demand.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::dispatcher::{EventSink, SubscriberId};
use crate::error::EventBusError;
use crate::event::{ErasedEvent, EventPayload, TypeKey};
use crate::status::Status;

use super::{deregister, register, SubscriberCore};

/// A subscriber that only accumulates events; the caller drains them
/// explicitly instead of them being processed through handlers.
pub struct BufferedSubscriber {
    core: SubscriberCore,
    event_filter: RwLock<HashSet<TypeKey>>,
}

impl BufferedSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            core: SubscriberCore::new(),
            event_filter: RwLock::new(HashSet::new()),
        })
    }

    pub fn id(&self) -> SubscriberId {
        self.core.id
    }

    pub fn status(&self) -> Status {
        self.core.status.status()
    }

    /// Adds `T` to the set of types `drain_filtered` accepts.
    pub fn allow_type<T: EventPayload>(&self) {
        self.event_filter.write().insert(TypeKey::of::<T>());
    }

    pub fn remove_allowed_type<T: EventPayload>(&self) {
        self.event_filter.write().remove(&TypeKey::of::<T>());
    }

    /// Drains every buffered event in priority-then-arrival order.
    pub fn drain_all(&self) -> Vec<ErasedEvent> {
        self.core.queue.drain_all()
    }

    /// Drains buffered events in priority-then-arrival order, dropping any
    /// whose type is not in the current filter set.
    pub fn drain_filtered(&self) -> Vec<ErasedEvent> {
        let filter = self.event_filter.read();
        self.core
            .queue
            .drain_all()
            .into_iter()
            .filter(|e| filter.contains(&e.type_key()))
            .collect()
    }

    pub fn run(self: &Arc<Self>) -> Result<(), EventBusError> {
        self.core.status.transition(Status::Running)?;
        register(Arc::clone(self) as Arc<dyn EventSink>)
    }

    pub fn pause(&self) -> Result<(), EventBusError> {
        self.core.status.transition(Status::Paused)?;
        deregister(self.core.id);
        Ok(())
    }

    pub fn stop(&self) -> Result<(), EventBusError> {
        self.core.status.transition(Status::Stopped)?;
        deregister(self.core.id);
        self.core.queue.clear();
        Ok(())
    }

    pub fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.status.transition(Status::Shutdown)?;
        deregister(self.core.id);
        self.core.queue.clear();
        Ok(())
    }
}

impl EventSink for BufferedSubscriber {
    fn subscriber_id(&self) -> SubscriberId {
        self.core.id
    }

    fn on_event(&self, event: ErasedEvent) {
        self.core.queue.push(event);
    }
}
