//! Timed publisher variants: forward an event on a worker and race it
//! against a deadline. `SilentTimeoutPublisher` never surfaces the race to
//! its caller; `ExceptionTimeoutPublisher` blocks the caller until either
//! the forward completes or the deadline fires.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::dispatcher::Dispatcher;
use crate::error::EventBusError;
use crate::event::{Event, EventPayload};
use crate::pool::WorkerPool;
use crate::scheduler::ScheduledTaskRegistry;

use super::{Publisher, PublisherCore};

pub struct SilentTimeoutPublisher<T: EventPayload> {
    core: PublisherCore,
    pool: WorkerPool,
    registry: ScheduledTaskRegistry,
    _marker: PhantomData<T>,
}

impl<T: EventPayload> SilentTimeoutPublisher<T> {
    pub fn new() -> Self {
        Self {
            core: PublisherCore::new(),
            pool: WorkerPool::new(1, "event-core-silent-timeout"),
            registry: ScheduledTaskRegistry::new(),
            _marker: PhantomData,
        }
    }

    /// Submits `event` to be forwarded on a worker thread; if the forward
    /// has not completed by `timeout`, it is marked cancelled. No error is
    /// ever surfaced to the caller either way.
    pub fn publish(&self, event: Event<T>, timeout: Duration) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        let cancelled = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let worker_cancelled = Arc::clone(&cancelled);
        let worker_finished = Arc::clone(&finished);
        self.pool.submit(Box::new(move || {
            if worker_cancelled.load(Ordering::SeqCst) {
                return;
            }
            if let Err(err) = Dispatcher::instance().publish(event) {
                error!(error = %err, "silent-timeout publisher failed to forward event");
            }
            worker_finished.store(true, Ordering::SeqCst);
        }));
        let timer_finished = Arc::clone(&finished);
        let handle = self.registry.scheduler().schedule_once(
            timeout,
            Box::new(move || {
                if !timer_finished.load(Ordering::SeqCst) {
                    cancelled.store(true, Ordering::SeqCst);
                }
            }),
        );
        self.registry.add(handle)?;
        Ok(())
    }
}

impl<T: EventPayload> Default for SilentTimeoutPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EventPayload> Publisher for SilentTimeoutPublisher<T> {
    fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.shutdown()?;
        self.pool.shutdown();
        self.registry.stop_and_shutdown()
    }

    fn is_shutdown(&self) -> bool {
        self.core.is_shutdown()
    }
}

pub struct ExceptionTimeoutPublisher<T: EventPayload> {
    core: PublisherCore,
    pool: WorkerPool,
    _marker: PhantomData<T>,
}

impl<T: EventPayload> ExceptionTimeoutPublisher<T> {
    pub fn new() -> Self {
        Self {
            core: PublisherCore::new(),
            pool: WorkerPool::new(1, "event-core-exception-timeout"),
            _marker: PhantomData,
        }
    }

    /// Forwards `event` on a worker and blocks the caller until either the
    /// forward completes or `timeout` elapses. On timeout the worker's
    /// result is discarded and [`EventBusError::Timeout`] is raised; if the
    /// worker is lost before reporting (the Rust stand-in for the source's
    /// "caller interrupted" case, since Rust threads have no interrupt
    /// signal) [`EventBusError::Interrupted`] is raised instead.
    pub fn publish(&self, event: Event<T>, timeout: Duration) -> Result<(), EventBusError> {
        self.core.require_not_shutdown()?;
        let (tx, rx) = crossbeam_channel::bounded::<Result<(), EventBusError>>(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker_cancelled = Arc::clone(&cancelled);
        self.pool.submit(Box::new(move || {
            let result = Dispatcher::instance().publish(event);
            if !worker_cancelled.load(Ordering::SeqCst) {
                let _ = tx.send(result);
            }
        }));
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                cancelled.store(true, Ordering::SeqCst);
                Err(EventBusError::Timeout)
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(EventBusError::Interrupted)
            }
        }
    }
}

impl<T: EventPayload> Default for ExceptionTimeoutPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EventPayload> Publisher for ExceptionTimeoutPublisher<T> {
    fn shutdown(&self) -> Result<(), EventBusError> {
        self.core.shutdown()?;
        self.pool.shutdown();
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.core.is_shutdown()
    }
}
