//! The process-wide singleton dispatcher: a single global FIFO queue, a
//! dedicated background dispatch thread, and a concurrently-updatable
//! subscriber registry.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::error;

use crate::error::EventBusError;
use crate::event::{ErasedEvent, Event, EventPayload, ListEvent};
use crate::status::{Lifecycle, LifecycleState, Status};

/// The default interval at which the dispatch thread re-checks its
/// lifecycle status; this bounds how quickly `pause`/`stop`/`shutdown` are
/// observed.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Unique identity for a registered subscriber, used by the dispatcher's
/// registry and by `unsubscribe` lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriberId {
    pub(crate) fn next() -> Self {
        SubscriberId(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Implemented by every subscriber type so the dispatcher can hold a
/// heterogeneous registry of them behind one trait object.
pub trait EventSink: Send + Sync {
    fn subscriber_id(&self) -> SubscriberId;
    /// Enqueues `event` into this subscriber's local queue. Must never
    /// panic or block for long — the dispatcher calls this once per
    /// registered subscriber on its single dispatch thread.
    fn on_event(&self, event: ErasedEvent);
}

struct DispatcherInner {
    status: LifecycleState,
    sender: Sender<ErasedEvent>,
    receiver: Receiver<ErasedEvent>,
    subscribers: ArcSwap<Vec<Arc<dyn EventSink>>>,
    next_seq: AtomicU64,
    poll_interval: Duration,
}

/// The process-wide singleton event dispatcher.
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

static INSTANCE: OnceLock<Dispatcher> = OnceLock::new();

impl Dispatcher {
    /// Returns the process-wide dispatcher, creating it (and starting its
    /// background dispatch thread) on first access. The dispatcher starts
    /// in `CREATED`; call [`Lifecycle::run`] before publishing.
    pub fn instance() -> &'static Dispatcher {
        INSTANCE.get_or_init(|| Dispatcher::spawn(DEFAULT_POLL_INTERVAL))
    }

    /// Builds a standalone dispatcher with its own background thread.
    /// Only exposed within the crate/tests — library consumers always go
    /// through [`Dispatcher::instance`], matching the "process-wide
    /// singleton" contract.
    fn spawn(poll_interval: Duration) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let inner = Arc::new(DispatcherInner {
            status: LifecycleState::new(),
            sender,
            receiver,
            subscribers: ArcSwap::from_pointee(Vec::new()),
            next_seq: AtomicU64::new(0),
            poll_interval,
        });
        let worker = Arc::clone(&inner);
        std::thread::Builder::new()
            .name("event-core-dispatcher".to_string())
            .spawn(move || Self::dispatch_loop(&worker))
            .expect("failed to spawn dispatcher thread");
        Self { inner }
    }

    fn dispatch_loop(inner: &DispatcherInner) {
        loop {
            match inner.status.status() {
                Status::Shutdown => return,
                Status::Paused => {
                    std::thread::sleep(inner.poll_interval);
                }
                Status::Stopped => {
                    while inner.receiver.try_recv().is_ok() {}
                    std::thread::sleep(inner.poll_interval);
                }
                Status::Created | Status::Running => {
                    match inner.receiver.recv_timeout(inner.poll_interval) {
                        Ok(event) => {
                            // A pause/stop may have landed while we were
                            // blocked in recv_timeout. The event is already
                            // off the queue; put it back rather than drop it,
                            // so pause preserves queued events and stop's own
                            // drain is what eventually clears it.
                            if inner.status.status() != Status::Running {
                                let _ = inner.sender.send(event);
                                continue;
                            }
                            Self::fan_out(inner, event);
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
            }
        }
    }

    fn fan_out(inner: &DispatcherInner, event: ErasedEvent) {
        let snapshot = inner.subscribers.load();
        for subscriber in snapshot.iter() {
            let event = event.clone();
            let subscriber = Arc::clone(subscriber);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event)));
            if outcome.is_err() {
                error!(
                    subscriber_id = ?subscriber.subscriber_id(),
                    "subscriber panicked while receiving an event; isolating failure"
                );
            }
        }
    }

    /// Enqueues `event` onto the global FIFO. Requires `RUNNING`.
    pub fn publish<T: EventPayload>(&self, event: Event<T>) -> Result<(), EventBusError> {
        self.inner.status.require_running()?;
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let erased = ErasedEvent::from_event(event, seq);
        self.inner
            .sender
            .send(erased)
            .map_err(|_| EventBusError::InvalidState("dispatcher queue is closed".into()))
    }

    /// Enqueues a [`ListEvent`] onto the global FIFO. Requires `RUNNING`.
    pub fn publish_list<T: EventPayload>(&self, event: ListEvent<T>) -> Result<(), EventBusError> {
        self.inner.status.require_running()?;
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let erased = ErasedEvent::from_list_event(event, seq);
        self.inner
            .sender
            .send(erased)
            .map_err(|_| EventBusError::InvalidState("dispatcher queue is closed".into()))
    }

    /// Registers a subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSink>) -> Result<(), EventBusError> {
        self.inner.status.require_not_shutdown()?;
        self.inner.subscribers.rcu(|current| {
            let mut next = (**current).clone();
            next.push(Arc::clone(&subscriber));
            next
        });
        Ok(())
    }

    /// Removes a subscriber by identity. Idempotent on unknown
    /// subscribers.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.subscribers.rcu(|current| {
            let mut next = (**current).clone();
            next.retain(|s| s.subscriber_id() != id);
            next
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.load().len()
    }

    pub fn queue_size(&self) -> usize {
        self.inner.receiver.len()
    }
}

impl Lifecycle for Dispatcher {
    fn status(&self) -> Status {
        self.inner.status.status()
    }

    fn run(&self) -> Result<(), EventBusError> {
        self.inner.status.transition(Status::Running)
    }

    fn pause(&self) -> Result<(), EventBusError> {
        self.inner.status.transition(Status::Paused)
    }

    fn stop(&self) -> Result<(), EventBusError> {
        self.inner.status.transition(Status::Stopped)?;
        while self.inner.receiver.try_recv().is_ok() {}
        self.inner.subscribers.store(Arc::new(Vec::new()));
        Ok(())
    }

    fn shutdown(&self) -> Result<(), EventBusError> {
        self.inner.status.transition(Status::Shutdown)?;
        while self.inner.receiver.try_recv().is_ok() {}
        self.inner.subscribers.store(Arc::new(Vec::new()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::Priority;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration as StdDuration;

    struct RecordingSink {
        id: SubscriberId,
        received: Arc<StdMutex<Vec<i32>>>,
    }

    impl EventSink for RecordingSink {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }
        fn on_event(&self, event: ErasedEvent) {
            if let Some(e) = event.downcast_event::<i32>() {
                self.received.lock().unwrap().push(*e.data());
            }
        }
    }

    fn test_dispatcher() -> Dispatcher {
        Dispatcher::spawn(StdDuration::from_millis(5))
    }

    #[test]
    fn publish_requires_running() {
        let dispatcher = test_dispatcher();
        let err = dispatcher.publish(Event::new(1i32)).unwrap_err();
        assert!(matches!(err, EventBusError::InvalidState(_)));
        dispatcher.shutdown().unwrap();
    }

    #[test]
    fn fan_out_to_multiple_subscribers() {
        let dispatcher = test_dispatcher();
        dispatcher.run().unwrap();
        let received_a = Arc::new(StdMutex::new(Vec::new()));
        let received_b = Arc::new(StdMutex::new(Vec::new()));
        let a: Arc<dyn EventSink> = Arc::new(RecordingSink {
            id: SubscriberId::next(),
            received: Arc::clone(&received_a),
        });
        let b: Arc<dyn EventSink> = Arc::new(RecordingSink {
            id: SubscriberId::next(),
            received: Arc::clone(&received_b),
        });
        dispatcher.subscribe(Arc::clone(&a)).unwrap();
        dispatcher.subscribe(Arc::clone(&b)).unwrap();
        assert_eq!(dispatcher.subscriber_count(), 2);

        dispatcher
            .publish(Event::with_priority(7, Priority::Medium))
            .unwrap();
        std::thread::sleep(StdDuration::from_millis(100));

        assert_eq!(*received_a.lock().unwrap(), vec![7]);
        assert_eq!(*received_b.lock().unwrap(), vec![7]);
        dispatcher.shutdown().unwrap();
    }

    #[test]
    fn pause_preserves_queue_then_resumes() {
        let dispatcher = test_dispatcher();
        dispatcher.run().unwrap();
        dispatcher.pause().unwrap();
        dispatcher.publish(Event::new(1i32)).unwrap_err(); // not RUNNING
        dispatcher.run().unwrap();
        dispatcher.publish(Event::new(1i32)).unwrap();
        assert_eq!(dispatcher.queue_size(), 1);
        dispatcher.shutdown().unwrap();
    }

    #[test]
    fn stop_clears_queue_and_registry() {
        let dispatcher = test_dispatcher();
        dispatcher.run().unwrap();
        let sink: Arc<dyn EventSink> = Arc::new(RecordingSink {
            id: SubscriberId::next(),
            received: Arc::new(StdMutex::new(Vec::new())),
        });
        dispatcher.subscribe(sink).unwrap();
        dispatcher.publish(Event::new(1i32)).unwrap();
        dispatcher.stop().unwrap();
        assert_eq!(dispatcher.subscriber_count(), 0);
        assert_eq!(dispatcher.queue_size(), 0);
        dispatcher.run().unwrap();
        dispatcher.publish(Event::new(2i32)).unwrap();
        dispatcher.shutdown().unwrap();
    }

    #[test]
    fn shutdown_is_absorbing() {
        let dispatcher = test_dispatcher();
        dispatcher.run().unwrap();
        dispatcher.shutdown().unwrap();
        assert!(dispatcher.run().is_err());
        assert!(dispatcher.pause().is_err());
        assert!(dispatcher.stop().is_err());
        assert!(dispatcher.shutdown().is_err());
        assert!(dispatcher.subscribe(Arc::new(RecordingSink {
            id: SubscriberId::next(),
            received: Arc::new(StdMutex::new(Vec::new())),
        })).is_err());
    }
}
