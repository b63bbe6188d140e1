//! Handler and error-handler function signatures, and the type-erasure
//! glue that lets a subscriber's handler table be keyed by [`TypeKey`]
//! instead of language reflection.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::HandlerError;
use crate::event::{ErasedEvent, Event, EventPayload, ListEvent};

/// A handler for a single typed event. Returning `Err` is the idiomatic
/// Rust realization of "the handler raised an exception": the error is
/// captured by the owning subscriber and never propagated.
pub type SingleHandler<T> = Arc<dyn Fn(&Event<T>) -> Result<(), HandlerError> + Send + Sync>;

/// A handler for a batch of same-typed events delivered as one unit.
pub type ListHandler<T> = Arc<dyn Fn(&ListEvent<T>) -> Result<(), HandlerError> + Send + Sync>;

/// Invoked when a [`SingleHandler`] or [`ListHandler`] fails. A failing
/// error handler is itself caught and logged, never re-raised.
pub type ErrorHandler<T> = Arc<dyn Fn(&Event<T>, &HandlerError) + Send + Sync>;

/// Invoked when a [`ListHandler`] fails.
pub type ListErrorHandler<T> = Arc<dyn Fn(&ListEvent<T>, &HandlerError) + Send + Sync>;

pub(crate) type ErasedSingleHandler =
    Arc<dyn Fn(&ErasedEvent) -> Result<(), HandlerError> + Send + Sync>;
pub(crate) type ErasedErrorHandler = Arc<dyn Fn(&ErasedEvent, &HandlerError) + Send + Sync>;
pub(crate) type ErasedListHandler =
    Arc<dyn Fn(&ErasedEvent) -> Result<(), HandlerError> + Send + Sync>;

pub(crate) fn invoke_catching<F>(f: F) -> Result<(), HandlerError>
where
    F: FnOnce() -> Result<(), HandlerError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::from_panic_payload(payload)),
    }
}

pub(crate) fn erase_single_handler<T: EventPayload>(
    handler: SingleHandler<T>,
) -> ErasedSingleHandler {
    Arc::new(move |erased: &ErasedEvent| match erased.downcast_event::<T>() {
        Some(event) => invoke_catching(|| handler(&event)),
        None => Ok(()),
    })
}

pub(crate) fn erase_error_handler<T: EventPayload>(
    handler: ErrorHandler<T>,
) -> ErasedErrorHandler {
    Arc::new(move |erased: &ErasedEvent, err: &HandlerError| {
        if let Some(event) = erased.downcast_event::<T>() {
            let _ = invoke_catching(|| {
                handler(&event, err);
                Ok(())
            });
        }
    })
}

pub(crate) fn erase_list_handler<T: EventPayload>(handler: ListHandler<T>) -> ErasedListHandler {
    Arc::new(move |erased: &ErasedEvent| match erased.downcast_list_event::<T>() {
        Some(list) => invoke_catching(|| handler(&list)),
        None => Ok(()),
    })
}

pub(crate) fn erase_list_error_handler<T: EventPayload>(
    handler: ListErrorHandler<T>,
) -> ErasedErrorHandler {
    Arc::new(move |erased: &ErasedEvent, err: &HandlerError| {
        if let Some(list) = erased.downcast_list_event::<T>() {
            let _ = invoke_catching(|| {
                handler(&list, err);
                Ok(())
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::Priority;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn erased_single_handler_catches_panic() {
        let handler: SingleHandler<i32> = Arc::new(|_e| panic!("boom"));
        let erased = erase_single_handler(handler);
        let event = ErasedEvent::from_event(Event::with_priority(1, Priority::Medium), 1);
        let result = erased(&event);
        assert!(matches!(result, Err(HandlerError::Panicked(_))));
    }

    #[test]
    fn erased_error_handler_never_propagates_its_own_panic() {
        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        let handler: ErrorHandler<i32> = Arc::new(move |_e, _err| {
            called2.store(true, Ordering::SeqCst);
            panic!("error handler itself fails");
        });
        let erased = erase_error_handler(handler);
        let event = ErasedEvent::from_event(Event::with_priority(1, Priority::Medium), 1);
        // Must not panic out of this call.
        erased(&event, &HandlerError::failed("x"));
        assert!(called.load(Ordering::SeqCst));
    }
}
