//! Conditional publisher variants: wrap a parent publisher with a
//! predicate over the event; only events that satisfy it are forwarded.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::EventBusError;
use crate::event::{Event, EventPayload};

use super::{AsyncPublisher, Publisher, PublisherCore, SyncPublisher};

type Condition<T> = Arc<dyn Fn(&Event<T>) -> bool + Send + Sync>;

pub struct ConditionalSyncPublisher<T: EventPayload> {
    core: PublisherCore,
    inner: SyncPublisher,
    condition: RwLock<Condition<T>>,
}

impl<T: EventPayload> ConditionalSyncPublisher<T> {
    pub fn new(condition: Condition<T>) -> Self {
        Self {
            core: PublisherCore::new(),
            inner: SyncPublisher::new(),
            condition: RwLock::new(condition),
        }
    }

    pub fn set_condition(&self, condition: Condition<T>) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        *self.condition.write() = condition;
        Ok(())
    }

    pub fn publish(&self, event: Event<T>) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        if (self.condition.read())(&event) {
            self.inner.publish(event)
        } else {
            Ok(())
        }
    }
}

impl<T: EventPayload> Publisher for ConditionalSyncPublisher<T> {
    fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.shutdown()?;
        self.inner.shutdown()
    }

    fn is_shutdown(&self) -> bool {
        self.core.is_shutdown()
    }
}

pub struct ConditionalAsyncPublisher<T: EventPayload> {
    core: PublisherCore,
    inner: AsyncPublisher,
    condition: RwLock<Condition<T>>,
}

impl<T: EventPayload> ConditionalAsyncPublisher<T> {
    pub fn new(condition: Condition<T>) -> Self {
        Self {
            core: PublisherCore::new(),
            inner: AsyncPublisher::new(),
            condition: RwLock::new(condition),
        }
    }

    pub fn set_condition(&self, condition: Condition<T>) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        *self.condition.write() = condition;
        Ok(())
    }

    pub fn publish(&self, event: Event<T>) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        if (self.condition.read())(&event) {
            self.inner.publish(event)
        } else {
            Ok(())
        }
    }
}

impl<T: EventPayload> Publisher for ConditionalAsyncPublisher<T> {
    fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.shutdown()?;
        self.inner.shutdown()
    }

    fn is_shutdown(&self) -> bool {
        self.core.is_shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::status::Lifecycle;

    #[test]
    fn discards_events_failing_the_predicate() {
        let _ = Dispatcher::instance().run();
        let publisher = ConditionalSyncPublisher::new(Arc::new(|e: &Event<i32>| *e.data() > 0));
        publisher.publish(Event::new(-1)).unwrap();
        publisher.publish(Event::new(1)).unwrap();
    }

    #[test]
    fn set_condition_refused_after_shutdown() {
        let publisher = ConditionalSyncPublisher::new(Arc::new(|_: &Event<i32>| true));
        publisher.shutdown().unwrap();
        assert!(publisher
            .set_condition(Arc::new(|_: &Event<i32>| false))
            .is_err());
    }
}
