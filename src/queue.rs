//! Subscriber-local priority queue: unbounded, multi-producer
//! single-consumer, ordered by priority then arrival (stable FIFO
//! tie-break).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::event::ErasedEvent;

/// Wraps an [`ErasedEvent`] with the `Ord` implementation the binary heap
/// needs: higher priority compares greater (so `BinaryHeap`, a max-heap,
/// pops it first); within equal priority, the *smaller* sequence number
/// compares greater, so earlier-arrived events pop first (FIFO tie-break).
struct HeapEntry(ErasedEvent);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority && self.0.seq == other.0.seq
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

/// A thread-safe, unbounded priority queue of [`ErasedEvent`]s.
pub struct PriorityQueue {
    heap: Mutex<BinaryHeap<HeapEntry>>,
    not_empty: Condvar,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            not_empty: Condvar::new(),
        }
    }

    pub fn push(&self, event: ErasedEvent) {
        let mut heap = self.heap.lock();
        heap.push(HeapEntry(event));
        self.not_empty.notify_one();
    }

    /// Non-blocking pop of the highest-priority, earliest-arrived event.
    pub fn try_pop(&self) -> Option<ErasedEvent> {
        self.heap.lock().pop().map(|e| e.0)
    }

    /// Blocks for up to `timeout` waiting for an event to become
    /// available, returning `None` on timeout. Callers that need to react
    /// to lifecycle transitions promptly should call this in a loop with a
    /// short `timeout` and check status between calls.
    pub fn pop_wait(&self, timeout: Duration) -> Option<ErasedEvent> {
        let mut heap = self.heap.lock();
        if heap.is_empty() {
            let result = self.not_empty.wait_for(&mut heap, timeout);
            if result.timed_out() && heap.is_empty() {
                return None;
            }
        }
        heap.pop().map(|e| e.0)
    }

    /// Drains every queued event in priority-then-arrival order.
    pub fn drain_all(&self) -> Vec<ErasedEvent> {
        let mut heap = self.heap.lock();
        let mut out = Vec::with_capacity(heap.len());
        while let Some(entry) = heap.pop() {
            out.push(entry.0);
        }
        out
    }

    pub fn clear(&self) {
        self.heap.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}
