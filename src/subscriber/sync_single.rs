//! Synchronous single-event subscriber: the caller drives processing by
//! calling `process_events()`, which drains the local queue non-blockingly
//! on the caller's own thread.

use std::sync::Arc;

use crate::dispatcher::{EventSink, SubscriberId};
use crate::error::{EventBusError, HandlerError};
use crate::event::{ErasedEvent, EventPayload, TypeKey};
use crate::handler::{ErrorHandler, SingleHandler};
use crate::status::Status;

use super::single::SingleEventCore;
use super::{deregister, register, SubscriberCore};

pub struct SyncSingleSubscriber {
    core: SubscriberCore,
    tables: SingleEventCore,
}

impl SyncSingleSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            core: SubscriberCore::new(),
            tables: SingleEventCore::new(),
        })
    }

    pub fn id(&self) -> SubscriberId {
        self.core.id
    }

    pub fn status(&self) -> Status {
        self.core.status.status()
    }

    pub fn subscribe_event<T: EventPayload>(&self, handler: SingleHandler<T>) {
        self.tables.subscribe_event(handler);
    }

    pub fn subscribe_error<T: EventPayload>(&self, handler: ErrorHandler<T>) {
        self.tables.subscribe_error(handler);
    }

    pub fn unsubscribe_event(&self, types: &[TypeKey]) {
        self.tables.unsubscribe_event(types);
    }

    pub fn clear_subscribe_events(&self) {
        self.tables.clear_subscribe_events();
    }

    pub fn total_error_count(&self) -> u64 {
        self.tables.total_error_count()
    }

    pub fn last_exception(&self) -> Option<HandlerError> {
        self.tables.last_exception()
    }

    pub fn last_failed_event(&self) -> Option<ErasedEvent> {
        self.tables.last_failed_event()
    }

    pub fn clear_error_statistics(&self) {
        self.tables.clear_error_statistics();
    }

    /// Drains the local queue non-blockingly, processing each event in
    /// priority-then-arrival order on the caller's thread.
    pub fn process_events(&self) {
        for event in self.core.queue.drain_all() {
            self.tables.process_event(&event);
        }
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
        self.tables.clear_subscribe_events();
        self.tables.clear_error_statistics();
        Ok(())
    }

    pub fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.status.transition(Status::Shutdown)?;
        deregister(self.core.id);
        self.core.queue.clear();
        self.tables.clear_subscribe_events();
        self.tables.clear_error_statistics();
        Ok(())
    }
}

impl EventSink for SyncSingleSubscriber {
    fn subscriber_id(&self) -> SubscriberId {
        self.core.id
    }

    fn on_event(&self, event: ErasedEvent) {
        self.core.queue.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::priority::Priority;
    use std::sync::Mutex;

    #[test]
    fn priority_order_within_one_drain() {
        let sub = SyncSingleSubscriber::new();
        sub.run().unwrap();
        let output = Arc::new(Mutex::new(String::new()));
        let output2 = Arc::clone(&output);
        sub.subscribe_event::<String>(Arc::new(move |e: &Event<String>| {
            output2.lock().unwrap().push_str(e.data());
            Ok(())
        }));
        sub.pause().unwrap();
        sub.on_event(crate::event::ErasedEvent::from_event(
            Event::with_priority("L".to_string(), Priority::Low),
            1,
        ));
        sub.on_event(crate::event::ErasedEvent::from_event(
            Event::with_priority("H".to_string(), Priority::High),
            2,
        ));
        sub.on_event(crate::event::ErasedEvent::from_event(
            Event::with_priority("M".to_string(), Priority::Medium),
            3,
        ));
        sub.run().unwrap();
        sub.process_events();
        assert_eq!(&*output.lock().unwrap(), "HML");
        sub.shutdown().unwrap();
    }

    #[test]
    fn error_isolation_scenario() {
        let sub = SyncSingleSubscriber::new();
        sub.run().unwrap();
        let handled = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let handled2 = Arc::clone(&handled);
        sub.subscribe_event::<String>(Arc::new(move |e: &Event<String>| {
            handled2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if e.data() == "throw" {
                Err(HandlerError::failed("Test exception"))
            } else {
                Ok(())
            }
        }));
        let error_count = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let error_count2 = Arc::clone(&error_count);
        sub.subscribe_error::<String>(Arc::new(move |_e, _err| {
            error_count2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));

        for data in ["ok", "throw", "ok"] {
            sub.on_event(crate::event::ErasedEvent::from_event(
                Event::new(data.to_string()),
                1,
            ));
        }
        sub.process_events();

        assert_eq!(handled.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(error_count.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(sub.total_error_count(), 1);
        assert_eq!(
            sub.last_exception().unwrap().to_string(),
            "Test exception"
        );
        assert_eq!(
            sub.last_failed_event()
                .unwrap()
                .downcast_event::<String>()
                .unwrap()
                .data(),
            "throw"
        );
        sub.shutdown().unwrap();
    }

    #[test]
    fn shutdown_is_absorbing() {
        let sub = SyncSingleSubscriber::new();
        sub.run().unwrap();
        sub.shutdown().unwrap();
        assert!(sub.run().is_err());
        assert!(sub.pause().is_err());
        assert!(sub.stop().is_err());
        assert!(sub.shutdown().is_err());
    }
}
