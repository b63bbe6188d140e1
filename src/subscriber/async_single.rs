//! Asynchronous single-event subscriber: owns a dedicated dispatch-loop
//! worker thread that blocks on its local queue and processes one event
//! per iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::dispatcher::{EventSink, SubscriberId};
use crate::error::{EventBusError, HandlerError};
use crate::event::{ErasedEvent, EventPayload, TypeKey};
use crate::handler::{ErrorHandler, SingleHandler};
use crate::status::Status;

use super::single::SingleEventCore;
use super::{deregister, register, SubscriberCore};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub struct AsyncSingleSubscriber {
    core: SubscriberCore,
    tables: SingleEventCore,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_running: Arc<AtomicBool>,
}

impl AsyncSingleSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            core: SubscriberCore::new(),
            tables: SingleEventCore::new(),
            worker: Mutex::new(None),
            worker_running: Arc::new(AtomicBool::new(false)),
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

    /// Subscribes to the dispatcher and starts the dispatch-loop worker.
    pub fn run(self: &Arc<Self>) -> Result<(), EventBusError> {
        self.core.status.transition(Status::Running)?;
        register(Arc::clone(self) as Arc<dyn EventSink>)?;
        self.spawn_worker();
        Ok(())
    }

    fn spawn_worker(self: &Arc<Self>) {
        self.worker_running.store(true, Ordering::SeqCst);
        let subscriber = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("event-core-async-single-subscriber".to_string())
            .spawn(move || {
                while subscriber.worker_running.load(Ordering::SeqCst) {
                    if subscriber.core.status.status() != Status::Running {
                        break;
                    }
                    if let Some(event) = subscriber.core.queue.pop_wait(POLL_INTERVAL) {
                        subscriber.tables.process_event(&event);
                    }
                }
            })
            .expect("failed to spawn async single subscriber worker");
        *self.worker.lock() = Some(handle);
    }

    fn stop_worker(&self) {
        self.worker_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn pause(&self) -> Result<(), EventBusError> {
        self.core.status.transition(Status::Paused)?;
        deregister(self.core.id);
        self.stop_worker();
        Ok(())
    }

    pub fn stop(&self) -> Result<(), EventBusError> {
        self.core.status.transition(Status::Stopped)?;
        deregister(self.core.id);
        self.stop_worker();
        self.core.queue.clear();
        self.tables.clear_subscribe_events();
        self.tables.clear_error_statistics();
        Ok(())
    }

    pub fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.status.transition(Status::Shutdown)?;
        deregister(self.core.id);
        self.stop_worker();
        self.core.queue.clear();
        self.tables.clear_subscribe_events();
        self.tables.clear_error_statistics();
        Ok(())
    }
}

impl EventSink for AsyncSingleSubscriber {
    fn subscriber_id(&self) -> SubscriberId {
        self.core.id
    }

    fn on_event(&self, event: ErasedEvent) {
        self.core.queue.push(event);
    }
}

impl Drop for AsyncSingleSubscriber {
    fn drop(&mut self) {
        self.worker_running.store(false, Ordering::SeqCst);
    }
}
