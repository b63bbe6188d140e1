//! Synchronous publisher: forwards directly to the dispatcher on the
//! caller's own thread.

use crate::dispatcher::Dispatcher;
use crate::error::EventBusError;
use crate::event::{Event, EventPayload, ListEvent};

use super::{Publisher, PublisherCore};

pub struct SyncPublisher {
    core: PublisherCore,
}

impl SyncPublisher {
    pub fn new() -> Self {
        Self {
            core: PublisherCore::new(),
        }
    }

    pub fn publish<T: EventPayload>(&self, event: Event<T>) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        Dispatcher::instance().publish(event)
    }

    pub fn publish_list<T: EventPayload>(&self, event: ListEvent<T>) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        Dispatcher::instance().publish_list(event)
    }
}

impl Default for SyncPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for SyncPublisher {
    fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.shutdown()
    }

    fn is_shutdown(&self) -> bool {
        self.core.is_shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Lifecycle;

    #[test]
    fn publish_forwards_to_dispatcher() {
        let dispatcher = Dispatcher::instance();
        let _ = dispatcher.run();
        let publisher = SyncPublisher::new();
        publisher.publish(Event::new(1i32)).unwrap();
    }

    #[test]
    fn refuses_after_shutdown() {
        let publisher = SyncPublisher::new();
        publisher.shutdown().unwrap();
        assert!(publisher.publish(Event::new(1i32)).is_err());
        assert!(publisher.shutdown().is_err());
    }
}
