//! Shared handler-table and error-statistics core for the single-event
//! subscriber variants.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::error::HandlerError;
use crate::event::{ErasedEvent, EventPayload, TypeKey};
use crate::handler::{
    erase_error_handler, erase_single_handler, ErasedErrorHandler, ErasedSingleHandler,
    ErrorHandler, SingleHandler,
};

/// `type -> handler` / `type -> error handler` tables plus the error
/// statistics an error-aware single-event subscriber exposes.
pub(crate) struct SingleEventCore {
    handlers: RwLock<HashMap<TypeKey, ErasedSingleHandler>>,
    error_handlers: RwLock<HashMap<TypeKey, ErasedErrorHandler>>,
    error_count: AtomicU64,
    last_exception: Mutex<Option<HandlerError>>,
    last_failed_event: Mutex<Option<ErasedEvent>>,
}

impl SingleEventCore {
    pub(crate) fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            error_handlers: RwLock::new(HashMap::new()),
            error_count: AtomicU64::new(0),
            last_exception: Mutex::new(None),
            last_failed_event: Mutex::new(None),
        }
    }

    pub(crate) fn subscribe_event<T: EventPayload>(&self, handler: SingleHandler<T>) {
        self.handlers
            .write()
            .insert(TypeKey::of::<T>(), erase_single_handler(handler));
    }

    pub(crate) fn subscribe_error<T: EventPayload>(&self, handler: ErrorHandler<T>) {
        self.error_handlers
            .write()
            .insert(TypeKey::of::<T>(), erase_error_handler(handler));
    }

    pub(crate) fn unsubscribe_event(&self, types: &[TypeKey]) {
        let mut handlers = self.handlers.write();
        for t in types {
            handlers.remove(t);
        }
    }

    pub(crate) fn clear_subscribe_events(&self) {
        self.handlers.write().clear();
        self.error_handlers.write().clear();
    }

    /// Looks up the handler for `event`'s runtime type and invokes it. A
    /// missing handler is a silent no-op. On handler failure, records
    /// error statistics and invokes the per-type error handler, if any.
    pub(crate) fn process_event(&self, event: &ErasedEvent) {
        let handler = self.handlers.read().get(&event.type_key()).cloned();
        let Some(handler) = handler else {
            return;
        };
        if let Err(err) = handler(event) {
            self.error_count.fetch_add(1, Ordering::SeqCst);
            *self.last_exception.lock() = Some(err.clone());
            *self.last_failed_event.lock() = Some(event.clone());
            let error_handler = self.error_handlers.read().get(&event.type_key()).cloned();
            if let Some(error_handler) = error_handler {
                error_handler(event, &err);
            } else {
                warn!(error = %err, "unhandled handler failure with no registered error handler");
            }
        }
    }

    pub(crate) fn total_error_count(&self) -> u64 {
        self.error_count.load(Ordering::SeqCst)
    }

    pub(crate) fn last_exception(&self) -> Option<HandlerError> {
        self.last_exception.lock().clone()
    }

    pub(crate) fn last_failed_event(&self) -> Option<ErasedEvent> {
        self.last_failed_event.lock().clone()
    }

    pub(crate) fn clear_error_statistics(&self) {
        self.error_count.store(0, Ordering::SeqCst);
        *self.last_exception.lock() = None;
        *self.last_failed_event.lock() = None;
    }
}
