//! Component lifecycle state machine, shared by the dispatcher, every
//! publisher and every subscriber.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::EventBusError;

/// Lifecycle state of a dispatcher, publisher or subscriber.
///
/// `SHUTDOWN` is absorbing: no transition leaves it. Legal transitions are
/// `CREATED -> RUNNING`, `RUNNING <-> PAUSED`, `RUNNING|PAUSED -> STOPPED ->
/// RUNNING`, and any non-`SHUTDOWN` state `-> SHUTDOWN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Created = 0,
    Running = 1,
    Paused = 2,
    Stopped = 3,
    Shutdown = 4,
}

impl Status {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Status::Created,
            1 => Status::Running,
            2 => Status::Paused,
            3 => Status::Stopped,
            4 => Status::Shutdown,
            _ => unreachable!("invalid Status tag"),
        }
    }

    fn is_legal_transition(self, to: Status) -> bool {
        use Status::*;
        match (self, to) {
            (Shutdown, _) => false,
            (_, Shutdown) => true,
            (Created, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running, Stopped) | (Paused, Stopped) => true,
            (Stopped, Running) => true,
            (s, t) if s == t => true,
            _ => false,
        }
    }
}

/// Thread-safe holder for a component's [`Status`], enforcing the legal
/// transition table. Shared via composition by the dispatcher, publishers
/// and subscribers rather than through inheritance.
#[derive(Debug)]
pub struct LifecycleState {
    inner: AtomicU8,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self {
            inner: AtomicU8::new(Status::Created as u8),
        }
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Attempts to move to `to`. Fails with `InvalidState` if `to` is not
    /// reachable from the current state (including when the current state
    /// is already `SHUTDOWN`).
    pub fn transition(&self, to: Status) -> Result<(), EventBusError> {
        loop {
            let current_raw = self.inner.load(Ordering::Acquire);
            let current = Status::from_u8(current_raw);
            if !current.is_legal_transition(to) {
                return Err(EventBusError::InvalidState(format!(
                    "cannot transition from {current:?} to {to:?}"
                )));
            }
            if self
                .inner
                .compare_exchange(
                    current_raw,
                    to as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return Ok(());
            }
            // Lost a race with a concurrent transition; re-read and retry.
        }
    }

    /// Returns `Ok(())` iff the current status is `RUNNING`, else
    /// `InvalidState`. Used by operations (e.g. dispatcher `publish`) that
    /// require the component to be actively running without themselves
    /// driving a transition.
    pub fn require_running(&self) -> Result<(), EventBusError> {
        if self.status() == Status::Running {
            Ok(())
        } else {
            Err(EventBusError::InvalidState(format!(
                "expected RUNNING, found {:?}",
                self.status()
            )))
        }
    }

    /// Returns `Err(InvalidState)` iff the current status is `SHUTDOWN`.
    pub fn require_not_shutdown(&self) -> Result<(), EventBusError> {
        if self.status() == Status::Shutdown {
            Err(EventBusError::InvalidState(
                "component is shut down".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared lifecycle contract implemented by the dispatcher, every publisher
/// and every subscriber.
pub trait Lifecycle {
    fn status(&self) -> Status;
    fn run(&self) -> Result<(), EventBusError>;
    fn pause(&self) -> Result<(), EventBusError>;
    fn stop(&self) -> Result<(), EventBusError>;
    fn shutdown(&self) -> Result<(), EventBusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_created() {
        let s = LifecycleState::new();
        assert_eq!(s.status(), Status::Created);
    }

    #[test]
    fn legal_transitions_succeed() {
        let s = LifecycleState::new();
        s.transition(Status::Running).unwrap();
        s.transition(Status::Paused).unwrap();
        s.transition(Status::Running).unwrap();
        s.transition(Status::Stopped).unwrap();
        s.transition(Status::Running).unwrap();
        s.transition(Status::Shutdown).unwrap();
    }

    #[test]
    fn shutdown_is_absorbing() {
        let s = LifecycleState::new();
        s.transition(Status::Running).unwrap();
        s.transition(Status::Shutdown).unwrap();
        assert!(s.transition(Status::Running).is_err());
        assert!(s.transition(Status::Paused).is_err());
        assert!(s.transition(Status::Stopped).is_err());
        assert!(s.transition(Status::Shutdown).is_err());
    }

    #[test]
    fn illegal_transition_rejected() {
        let s = LifecycleState::new();
        // CREATED -> PAUSED is not legal.
        assert!(s.transition(Status::Paused).is_err());
        // CREATED -> STOPPED is not legal.
        assert!(s.transition(Status::Stopped).is_err());
    }
}
