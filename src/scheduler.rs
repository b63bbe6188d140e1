//! A single process-wide, reference-counted scheduler (one background
//! timer thread) shared by every [`ScheduledTaskRegistry`], plus the
//! per-instance registry that tracks handles and periodically sweeps out
//! finished/cancelled ones.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::error::EventBusError;
use crate::status::{LifecycleState, Status};

const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(1);

type Action = Box<dyn Fn() + Send + Sync + 'static>;

struct Job {
    period: Option<Duration>,
    cancelled: AtomicBool,
    finished: AtomicBool,
    action: Action,
}

struct TimerEntry {
    fire_at: Instant,
    seq: u64,
    job: Arc<Job>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the earliest fire_at on top.
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A handle to a single scheduled (one-shot or periodic) task.
#[derive(Clone)]
pub struct TaskHandle {
    job: Arc<Job>,
}

impl TaskHandle {
    pub fn cancel(&self) {
        self.job.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.job.cancelled.load(AtomicOrdering::SeqCst)
    }

    /// A one-shot task is finished once it has fired (or been cancelled
    /// before firing); a periodic task is finished only once cancelled.
    pub fn is_finished(&self) -> bool {
        self.job.finished.load(AtomicOrdering::SeqCst)
    }
}

struct SchedulerState {
    heap: BinaryHeap<TimerEntry>,
}

pub(crate) struct SharedSchedulerInner {
    state: Mutex<SchedulerState>,
    wake: Condvar,
    stop: AtomicBool,
    next_seq: AtomicU64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SharedSchedulerInner {
    fn spawn() -> Arc<Self> {
        let inner = Arc::new(Self {
            state: Mutex::new(SchedulerState {
                heap: BinaryHeap::new(),
            }),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            thread: Mutex::new(None),
        });
        let worker = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("event-core-scheduler".to_string())
            .spawn(move || worker.run())
            .expect("failed to spawn scheduler thread");
        *inner.thread.lock() = Some(handle);
        inner
    }

    fn run(&self) {
        loop {
            let mut state = self.state.lock();
            if self.stop.load(AtomicOrdering::SeqCst) {
                return;
            }
            match state.heap.peek() {
                None => {
                    self.wake.wait_for(&mut state, Duration::from_millis(200));
                }
                Some(top) => {
                    let now = Instant::now();
                    if top.fire_at > now {
                        let wait = top.fire_at - now;
                        self.wake.wait_for(&mut state, wait);
                        continue;
                    }
                    let entry = state.heap.pop().expect("peeked entry must pop");
                    drop(state);
                    self.fire(entry);
                }
            }
        }
    }

    fn fire(&self, entry: TimerEntry) {
        if entry.job.cancelled.load(AtomicOrdering::SeqCst) {
            entry.job.finished.store(true, AtomicOrdering::SeqCst);
            return;
        }
        trace!(seq = entry.seq, "firing scheduled task");
        (entry.job.action)();
        match entry.job.period {
            Some(period) if !entry.job.cancelled.load(AtomicOrdering::SeqCst) => {
                let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
                let mut state = self.state.lock();
                state.heap.push(TimerEntry {
                    fire_at: Instant::now() + period,
                    seq,
                    job: entry.job,
                });
                self.wake.notify_all();
            }
            _ => entry.job.finished.store(true, AtomicOrdering::SeqCst),
        }
    }

    pub fn schedule_once(&self, delay: Duration, action: Action) -> TaskHandle {
        self.schedule(delay, None, action)
    }

    pub fn schedule_periodic(&self, period: Duration, action: Action) -> TaskHandle {
        self.schedule(period, Some(period), action)
    }

    fn schedule(&self, delay: Duration, period: Option<Duration>, action: Action) -> TaskHandle {
        let job = Arc::new(Job {
            period,
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            action,
        });
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        {
            let mut state = self.state.lock();
            state.heap.push(TimerEntry {
                fire_at: Instant::now() + delay,
                seq,
                job: Arc::clone(&job),
            });
        }
        self.wake.notify_all();
        TaskHandle { job }
    }

    fn shutdown(&self) {
        self.stop.store(true, AtomicOrdering::SeqCst);
        self.wake.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

struct SharedSlot {
    inner: Option<Arc<SharedSchedulerInner>>,
    count: usize,
}

static SHARED: OnceLock<Mutex<SharedSlot>> = OnceLock::new();

fn slot() -> &'static Mutex<SharedSlot> {
    SHARED.get_or_init(|| {
        Mutex::new(SharedSlot {
            inner: None,
            count: 0,
        })
    })
}

/// Acquires a reference to the single process-wide scheduler, creating it
/// if this is the first active user. Each call must be paired with exactly
/// one [`release_shared`].
fn acquire_shared() -> Arc<SharedSchedulerInner> {
    let mut guard = slot().lock();
    guard.count += 1;
    if let Some(inner) = &guard.inner {
        Arc::clone(inner)
    } else {
        let inner = SharedSchedulerInner::spawn();
        guard.inner = Some(Arc::clone(&inner));
        inner
    }
}

/// Releases one user's hold on the shared scheduler. When the last user
/// releases, the scheduler thread is torn down.
fn release_shared() {
    let mut guard = slot().lock();
    if guard.count == 0 {
        return;
    }
    guard.count -= 1;
    if guard.count == 0 {
        if let Some(inner) = guard.inner.take() {
            debug!("last ScheduledTaskRegistry user released; shutting down shared scheduler");
            inner.shutdown();
        }
    }
}

/// Number of `ScheduledTaskRegistry` instances currently holding the
/// shared scheduler alive. Exposed for the reference-counting invariant:
/// the shared scheduler is non-null iff this is positive.
pub fn active_user_count() -> usize {
    slot().lock().count
}

/// Process-wide scheduler with reference-counted lifetime, a pending-task
/// list, and a periodic sweep that removes finished/cancelled handles.
pub struct ScheduledTaskRegistry {
    shared: Arc<SharedSchedulerInner>,
    handles: Arc<Mutex<Vec<TaskHandle>>>,
    sweep_handle: Mutex<Option<TaskHandle>>,
    status: LifecycleState,
    released: AtomicBool,
}

impl ScheduledTaskRegistry {
    /// Creates a registry with the default sweep period (1 second).
    pub fn new() -> Self {
        Self::with_period(DEFAULT_SWEEP_PERIOD)
    }

    /// Creates a registry with an explicit sweep period.
    pub fn with_period(period: Duration) -> Self {
        let shared = acquire_shared();
        let status = LifecycleState::new();
        status
            .transition(Status::Running)
            .expect("CREATED -> RUNNING is always legal");
        let registry = Self {
            shared,
            handles: Arc::new(Mutex::new(Vec::new())),
            sweep_handle: Mutex::new(None),
            status,
            released: AtomicBool::new(false),
        };
        registry.start_sweeper(period);
        registry
    }

    fn start_sweeper(&self, period: Duration) {
        let sweep_target = Arc::clone(&self.handles);
        let sweep_handle = self.shared.schedule_periodic(
            period,
            Box::new(move || {
                let mut list = sweep_target.lock();
                let before = list.len();
                list.retain(|h| !h.is_finished() && !h.is_cancelled());
                let removed = before - list.len();
                if removed > 0 {
                    trace!(removed, "scheduled task registry swept stale handles");
                }
            }),
        );
        *self.sweep_handle.lock() = Some(sweep_handle);
    }

    /// The underlying process-wide scheduler, used by publishers to
    /// actually create timers; the resulting handle should be passed to
    /// [`ScheduledTaskRegistry::add`] for tracking.
    pub(crate) fn scheduler(&self) -> &SharedSchedulerInner {
        &self.shared
    }

    /// Records a handle created via [`ScheduledTaskRegistry::scheduler`].
    pub fn add(&self, handle: TaskHandle) -> Result<(), EventBusError> {
        self.status.require_running()?;
        self.handles.lock().push(handle);
        Ok(())
    }

    /// Returns a snapshot of the currently tracked handles.
    pub fn get_handles(&self) -> Result<Vec<TaskHandle>, EventBusError> {
        self.status.require_running()?;
        Ok(self.handles.lock().clone())
    }

    /// Cancels every tracked handle.
    pub fn cancel_all(&self) -> Result<(), EventBusError> {
        self.status.require_running()?;
        for handle in self.handles.lock().iter() {
            handle.cancel();
        }
        Ok(())
    }

    /// Reschedules the sweep at a new period, preserving tracked handles.
    pub fn set_sweep_period(&self, period: Duration) -> Result<(), EventBusError> {
        self.status.require_running()?;
        if let Some(old) = self.sweep_handle.lock().take() {
            old.cancel();
        }
        self.start_sweeper(period);
        Ok(())
    }

    fn release_shared_once(&self) {
        if self
            .released
            .compare_exchange(false, true, AtomicOrdering::SeqCst, AtomicOrdering::SeqCst)
            .is_ok()
        {
            release_shared();
        }
    }

    /// Cancels all handles, cancels the sweeper, and releases this
    /// registry's hold on the shared scheduler. Absorbing: terminal.
    pub fn stop_and_shutdown(&self) -> Result<(), EventBusError> {
        self.status.require_not_shutdown()?;
        let _ = self.cancel_all_unchecked();
        if let Some(sweep) = self.sweep_handle.lock().take() {
            sweep.cancel();
        }
        self.status.transition(Status::Shutdown)?;
        self.release_shared_once();
        Ok(())
    }

    /// Returns the current handle list without cancelling the handles,
    /// still releasing this registry's hold on the shared scheduler.
    pub fn stop(&self) -> Result<Vec<TaskHandle>, EventBusError> {
        self.status.require_not_shutdown()?;
        let handles = self.handles.lock().clone();
        if let Some(sweep) = self.sweep_handle.lock().take() {
            sweep.cancel();
        }
        self.status.transition(Status::Stopped)?;
        self.release_shared_once();
        Ok(handles)
    }

    fn cancel_all_unchecked(&self) -> Result<(), EventBusError> {
        for handle in self.handles.lock().iter() {
            handle.cancel();
        }
        Ok(())
    }

    pub fn status(&self) -> Status {
        self.status.status()
    }
}

impl Default for ScheduledTaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScheduledTaskRegistry {
    fn drop(&mut self) {
        self.release_shared_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn refcount_tracks_active_registries() {
        let before = active_user_count();
        let r1 = ScheduledTaskRegistry::with_period(Duration::from_secs(60));
        assert_eq!(active_user_count(), before + 1);
        let r2 = ScheduledTaskRegistry::with_period(Duration::from_secs(60));
        assert_eq!(active_user_count(), before + 2);
        drop(r1);
        assert_eq!(active_user_count(), before + 1);
        drop(r2);
        assert_eq!(active_user_count(), before);
    }

    #[test]
    fn schedule_once_fires_and_finishes() {
        let registry = ScheduledTaskRegistry::with_period(Duration::from_secs(60));
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        let handle = registry
            .scheduler()
            .schedule_once(Duration::from_millis(20), Box::new(move || {
                fired2.store(true, AtomicOrdering::SeqCst);
            }));
        registry.add(handle.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(fired.load(AtomicOrdering::SeqCst));
        assert!(handle.is_finished());
    }

    #[test]
    fn cancel_prevents_periodic_firing() {
        let registry = ScheduledTaskRegistry::with_period(Duration::from_secs(60));
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let handle = registry
            .scheduler()
            .schedule_periodic(Duration::from_millis(15), Box::new(move || {
                count2.fetch_add(1, AtomicOrdering::SeqCst);
            }));
        registry.add(handle.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        handle.cancel();
        let after_cancel = count.load(AtomicOrdering::SeqCst);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(count.load(AtomicOrdering::SeqCst), after_cancel);
    }

    #[test]
    fn sweep_removes_finished_handles() {
        let registry = ScheduledTaskRegistry::with_period(Duration::from_millis(30));
        let handle = registry
            .scheduler()
            .schedule_once(Duration::from_millis(10), Box::new(|| {}));
        registry.add(handle).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert!(registry.get_handles().unwrap().is_empty());
    }

    #[test]
    fn stop_and_shutdown_is_absorbing_and_single_decrement() {
        let before = active_user_count();
        let registry = ScheduledTaskRegistry::with_period(Duration::from_secs(60));
        assert_eq!(active_user_count(), before + 1);
        registry.stop_and_shutdown().unwrap();
        assert_eq!(active_user_count(), before);
        assert!(registry.stop_and_shutdown().is_err());
        assert!(registry.add(TaskHandle {
            job: Arc::new(Job {
                period: None,
                cancelled: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                action: Box::new(|| {}),
            })
        }).is_err());
        // Dropping after explicit shutdown must not double-decrement.
        drop(registry);
        assert_eq!(active_user_count(), before);
    }
}
