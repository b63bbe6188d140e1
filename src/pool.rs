//! A tiny fixed-size worker pool shared by the publisher/subscriber
//! variants that need to run work off their caller's thread. Mirrors the
//! dispatcher's and scheduler's own "channel plus named background
//! threads" pattern rather than pulling in a separate thread-pool crate.

use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn new(worker_count: usize, name: &str) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut handles = Vec::with_capacity(worker_count);
        for i in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })
                .expect("failed to spawn worker pool thread");
            handles.push(handle);
        }
        Self {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
        }
    }

    /// Submits `job` to run on one of the pool's workers. Silently dropped
    /// if the pool has already been shut down.
    pub(crate) fn submit(&self, job: Job) {
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(job);
        }
    }

    /// Closes the job channel and joins every worker thread.
    pub(crate) fn shutdown(&self) {
        self.sender.lock().take();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_submitted_jobs() {
        let pool = WorkerPool::new(2, "test-pool");
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let count = Arc::clone(&count);
            pool.submit(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }
}
