//! Delayed publisher: schedules a one-shot forward of an event after a
//! fixed delay, tracked through a private `ScheduledTaskRegistry`.

use std::marker::PhantomData;
use std::time::Duration;

use tracing::error;

use crate::dispatcher::Dispatcher;
use crate::error::EventBusError;
use crate::event::{Event, EventPayload};
use crate::scheduler::{ScheduledTaskRegistry, TaskHandle};

use super::{Publisher, PublisherCore};

pub struct DelayedPublisher<T: EventPayload> {
    core: PublisherCore,
    registry: ScheduledTaskRegistry,
    _marker: PhantomData<T>,
}

impl<T: EventPayload> DelayedPublisher<T> {
    pub fn new() -> Self {
        Self {
            core: PublisherCore::new(),
            registry: ScheduledTaskRegistry::new(),
            _marker: PhantomData,
        }
    }

    /// Schedules `event` to be forwarded to the dispatcher after `delay`.
    /// `Duration` is unsigned, so the source's "negative delay fails" edge
    /// case cannot arise here.
    pub fn publish(&self, event: Event<T>, delay: Duration) -> Result<TaskHandle, EventBusError> {
        self.core.require_not_shutdown()?;
        let handle = self.registry.scheduler().schedule_once(
            delay,
            Box::new(move || {
                if let Err(err) = Dispatcher::instance().publish(event.clone()) {
                    error!(error = %err, "delayed publisher failed to forward event");
                }
            }),
        );
        self.registry.add(handle.clone())?;
        Ok(handle)
    }

    pub fn cancel_all_pending(&self) -> Result<(), EventBusError> {
        self.registry.cancel_all()
    }

    pub fn pending_count(&self) -> Result<usize, EventBusError> {
        Ok(self
            .registry
            .get_handles()?
            .iter()
            .filter(|h| !h.is_finished() && !h.is_cancelled())
            .count())
    }
}

impl<T: EventPayload> Default for DelayedPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EventPayload> Publisher for DelayedPublisher<T> {
    fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.shutdown()?;
        self.registry.stop_and_shutdown()
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
    fn schedules_a_one_shot_forward() {
        let _ = Dispatcher::instance().run();
        let publisher = DelayedPublisher::<i32>::new();
        let handle = publisher.publish(Event::new(1), Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(handle.is_finished());
        assert_eq!(publisher.pending_count().unwrap(), 0);
    }

    #[test]
    fn cancel_all_pending_prevents_firing() {
        let publisher = DelayedPublisher::<i32>::new();
        publisher
            .publish(Event::new(1), Duration::from_millis(200))
            .unwrap();
        publisher.cancel_all_pending().unwrap();
        assert_eq!(publisher.pending_count().unwrap(), 0);
    }
}
