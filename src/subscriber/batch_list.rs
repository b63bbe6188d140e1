//! Batch-list subscriber: accumulates events per concrete type and, once a
//! type's pending list reaches `batch_size`, swaps it out atomically and
//! processes it as one `ListEvent<T>` on a small worker pool.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::dispatcher::{EventSink, SubscriberId};
use crate::error::{EventBusError, HandlerError};
use crate::event::{ErasedEvent, Event, EventPayload, ListEvent, TypeKey};
use crate::handler::{invoke_catching, ListErrorHandler, ListHandler};
use crate::pool::WorkerPool;
use crate::status::Status;

use super::{deregister, register, SubscriberCore};

const DEFAULT_WORKERS: usize = 2;

/// Type-erased per-type batch accumulator. Each concrete `TypedBatchSlot<T>`
/// implements this so the subscriber can hold a single `TypeKey`-keyed map
/// across heterogeneous payload types.
trait ErasedBatchSlot: Send + Sync {
    fn offer(&self, event: &ErasedEvent, batch_size: usize) -> Option<ErasedEvent>;
    fn flush(&self) -> Option<ErasedEvent>;
    fn invoke(&self, list_event: &ErasedEvent) -> Result<(), HandlerError>;
    fn invoke_error(&self, list_event: &ErasedEvent, err: &HandlerError);
    fn as_any(&self) -> &dyn Any;
}

struct TypedBatchSlot<T: EventPayload> {
    pending: Mutex<Vec<Event<T>>>,
    handler: ListHandler<T>,
    error_handler: Mutex<Option<ListErrorHandler<T>>>,
}

impl<T: EventPayload> TypedBatchSlot<T> {
    fn new(handler: ListHandler<T>) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            handler,
            error_handler: Mutex::new(None),
        }
    }

    fn set_error_handler(&self, handler: ListErrorHandler<T>) {
        *self.error_handler.lock() = Some(handler);
    }
}

impl<T: EventPayload> ErasedBatchSlot for TypedBatchSlot<T> {
    fn offer(&self, event: &ErasedEvent, batch_size: usize) -> Option<ErasedEvent> {
        let Some(typed) = event.downcast_event::<T>() else {
            return None;
        };
        let mut pending = self.pending.lock();
        pending.push(typed);
        if pending.len() >= batch_size {
            let batch = std::mem::take(&mut *pending);
            Some(ErasedEvent::from_list_event(ListEvent::new(batch), 0))
        } else {
            None
        }
    }

    fn flush(&self) -> Option<ErasedEvent> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return None;
        }
        let batch = std::mem::take(&mut *pending);
        Some(ErasedEvent::from_list_event(ListEvent::new(batch), 0))
    }

    fn invoke(&self, list_event: &ErasedEvent) -> Result<(), HandlerError> {
        match list_event.downcast_list_event::<T>() {
            Some(list) => {
                let handler = self.handler.clone();
                invoke_catching(move || handler(&list))
            }
            None => Ok(()),
        }
    }

    fn invoke_error(&self, list_event: &ErasedEvent, err: &HandlerError) {
        let Some(list) = list_event.downcast_list_event::<T>() else {
            return;
        };
        if let Some(error_handler) = self.error_handler.lock().clone() {
            let err = err.clone();
            let _ = invoke_catching(move || {
                error_handler(&list, &err);
                Ok(())
            });
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct BatchListSubscriber {
    core: SubscriberCore,
    batch_size: usize,
    slots: RwLock<HashMap<TypeKey, Arc<dyn ErasedBatchSlot>>>,
    pool: WorkerPool,
    error_count: Arc<AtomicU64>,
    last_exception: Arc<Mutex<Option<HandlerError>>>,
    last_failed_event: Arc<Mutex<Option<ErasedEvent>>>,
}

impl BatchListSubscriber {
    pub fn new(batch_size: usize) -> Result<Arc<Self>, EventBusError> {
        if batch_size == 0 {
            return Err(EventBusError::InvalidArgument(
                "batch_size must be positive".to_string(),
            ));
        }
        Ok(Arc::new(Self {
            core: SubscriberCore::new(),
            batch_size,
            slots: RwLock::new(HashMap::new()),
            pool: WorkerPool::new(DEFAULT_WORKERS, "event-core-batch-list-subscriber"),
            error_count: Arc::new(AtomicU64::new(0)),
            last_exception: Arc::new(Mutex::new(None)),
            last_failed_event: Arc::new(Mutex::new(None)),
        }))
    }

    pub fn id(&self) -> SubscriberId {
        self.core.id
    }

    pub fn status(&self) -> Status {
        self.core.status.status()
    }

    pub fn subscribe_list_event<T: EventPayload>(&self, handler: ListHandler<T>) {
        self.slots
            .write()
            .insert(TypeKey::of::<T>(), Arc::new(TypedBatchSlot::new(handler)));
    }

    pub fn subscribe_list_error<T: EventPayload>(
        &self,
        handler: ListErrorHandler<T>,
    ) -> Result<(), EventBusError> {
        let slots = self.slots.read();
        let slot = slots.get(&TypeKey::of::<T>()).ok_or_else(|| {
            EventBusError::InvalidArgument(
                "no list handler registered for this type yet".to_string(),
            )
        })?;
        let typed = slot
            .as_any()
            .downcast_ref::<TypedBatchSlot<T>>()
            .expect("TypeKey lookup guarantees matching concrete type");
        typed.set_error_handler(handler);
        Ok(())
    }

    pub fn total_error_count(&self) -> u64 {
        self.error_count.load(Ordering::SeqCst)
    }

    pub fn last_exception(&self) -> Option<HandlerError> {
        self.last_exception.lock().clone()
    }

    pub fn last_failed_event(&self) -> Option<ErasedEvent> {
        self.last_failed_event.lock().clone()
    }

    /// Forces every type's partial list out for processing, regardless of
    /// whether it has reached `batch_size`.
    pub fn flush(&self) -> Result<(), EventBusError> {
        self.core.status.require_not_shutdown()?;
        let slots: Vec<Arc<dyn ErasedBatchSlot>> = self.slots.read().values().cloned().collect();
        for slot in slots {
            if let Some(list_event) = slot.flush() {
                self.dispatch_list(slot, list_event);
            }
        }
        Ok(())
    }

    fn dispatch_list(&self, slot: Arc<dyn ErasedBatchSlot>, list_event: ErasedEvent) {
        let error_count = Arc::clone(&self.error_count);
        let last_exception = Arc::clone(&self.last_exception);
        let last_failed_event = Arc::clone(&self.last_failed_event);
        self.pool.submit(Box::new(move || {
            if let Err(err) = slot.invoke(&list_event) {
                error_count.fetch_add(1, Ordering::SeqCst);
                *last_exception.lock() = Some(err.clone());
                *last_failed_event.lock() = Some(list_event.clone());
                slot.invoke_error(&list_event, &err);
            }
        }));
    }

    fn clear_error_statistics(&self) {
        self.error_count.store(0, Ordering::SeqCst);
        *self.last_exception.lock() = None;
        *self.last_failed_event.lock() = None;
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
        self.slots.write().clear();
        self.clear_error_statistics();
        Ok(())
    }

    pub fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.status.transition(Status::Shutdown)?;
        deregister(self.core.id);
        self.pool.shutdown();
        self.slots.write().clear();
        self.clear_error_statistics();
        Ok(())
    }
}

impl EventSink for BatchListSubscriber {
    fn subscriber_id(&self) -> SubscriberId {
        self.core.id
    }

    fn on_event(&self, event: ErasedEvent) {
        let slot = self.slots.read().get(&event.type_key()).cloned();
        let Some(slot) = slot else {
            warn!("batch-list subscriber received an event with no registered handler");
            return;
        };
        if let Some(list_event) = slot.offer(&event, self.batch_size) {
            self.dispatch_list(slot, list_event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::Priority;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[test]
    fn rejects_non_positive_batch_size() {
        assert!(BatchListSubscriber::new(0).is_err());
    }

    #[test]
    fn batch_size_three_holds_remainder_until_flush() {
        let sub = BatchListSubscriber::new(3).unwrap();
        sub.run().unwrap();

        let string_calls = Arc::new(StdMutex::new(Vec::new()));
        let string_calls2 = Arc::clone(&string_calls);
        sub.subscribe_list_event::<String>(Arc::new(move |list: &ListEvent<String>| {
            string_calls2
                .lock()
                .unwrap()
                .push(list.events().iter().map(|e| e.data().clone()).collect::<Vec<_>>());
            Ok(())
        }));

        let int_calls = Arc::new(StdMutex::new(Vec::new()));
        let int_calls2 = Arc::clone(&int_calls);
        sub.subscribe_list_event::<i32>(Arc::new(move |list: &ListEvent<i32>| {
            int_calls2
                .lock()
                .unwrap()
                .push(list.events().iter().map(|e| *e.data()).collect::<Vec<_>>());
            Ok(())
        }));

        for s in ["a", "b", "c"] {
            sub.on_event(ErasedEvent::from_event(
                Event::with_priority(s.to_string(), Priority::Medium),
                1,
            ));
        }
        sub.on_event(ErasedEvent::from_event(Event::new(42i32), 1));

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(string_calls.lock().unwrap().len(), 1);
        assert_eq!(string_calls.lock().unwrap()[0], vec!["a", "b", "c"]);
        assert!(int_calls.lock().unwrap().is_empty());

        sub.flush().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(int_calls.lock().unwrap().len(), 1);
        assert_eq!(int_calls.lock().unwrap()[0], vec![42]);

        sub.shutdown().unwrap();
    }

    #[test]
    fn list_handler_failure_is_isolated() {
        let sub = BatchListSubscriber::new(1).unwrap();
        sub.run().unwrap();
        sub.subscribe_list_event::<i32>(Arc::new(|_list: &ListEvent<i32>| {
            Err(HandlerError::failed("list boom"))
        }));
        let seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen2 = Arc::clone(&seen);
        sub.subscribe_list_error::<i32>(Arc::new(move |_list, _err| {
            seen2.store(true, std::sync::atomic::Ordering::SeqCst);
        }))
        .unwrap();

        sub.on_event(ErasedEvent::from_event(Event::new(1i32), 1));
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(sub.total_error_count(), 1);
        assert!(seen.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(sub.last_exception().unwrap().to_string(), "list boom");
        sub.shutdown().unwrap();
    }
}
