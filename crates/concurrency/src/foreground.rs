//! The coordinating (UI-affinity) thread as an explicit token
//!
//! Thread-affinity dispatch ("behave differently if already on the
//! coordinating thread") is expressed through the `Foreground` trait
//! instead of implicit thread inspection, so the dispatch rules stay
//! testable without a real UI main loop. Embedders with an actual main
//! loop implement the trait over it; everyone else (including every test)
//! uses `ForegroundThread`, which dedicates one serialized thread.

use parking_lot::Mutex;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle, ThreadId};

/// A job posted to the coordinating thread
pub type ForegroundJob = Box<dyn FnOnce() + Send>;

/// Explicit handle to the coordinating thread
///
/// `is_current` answers "is the caller already on the coordinating
/// thread?"; `post` schedules a job to run there asynchronously, in FIFO
/// order with every other posted job.
pub trait Foreground: Send + Sync {
    /// True if the calling thread is the coordinating thread
    fn is_current(&self) -> bool;

    /// Schedule a job on the coordinating thread; never blocks the caller
    fn post(&self, job: ForegroundJob);
}

/// Default `Foreground`: one dedicated serialized thread
///
/// Jobs run in post order. The thread is joined when the handle drops.
pub struct ForegroundThread {
    tx: Mutex<Option<Sender<ForegroundJob>>>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ForegroundThread {
    /// Spawn the coordinating thread
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<ForegroundJob>();
        let handle = thread::Builder::new()
            .name("storeline-foreground".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
            })
            .expect("failed to spawn foreground thread");
        let thread_id = handle.thread().id();
        Self {
            tx: Mutex::new(Some(tx)),
            thread_id,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Block until every job posted before this call has run
    ///
    /// Calling `flush` from the coordinating thread itself would wait on
    /// the job queue it is currently draining; like any other exclusive
    /// wait in this crate, that is a designed deadlock the caller must
    /// avoid.
    pub fn flush(&self) {
        let (done_tx, done_rx) = mpsc::channel();
        self.post(Box::new(move || {
            let _ = done_tx.send(());
        }));
        let _ = done_rx.recv();
    }
}

impl Foreground for ForegroundThread {
    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn post(&self, job: ForegroundJob) {
        let guard = self.tx.lock();
        if let Some(tx) = guard.as_ref() {
            // A send can only fail after shutdown began; jobs posted during
            // teardown are dropped.
            let _ = tx.send(job);
        }
    }
}

impl Default for ForegroundThread {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ForegroundThread {
    fn drop(&mut self) {
        // Close the channel so the worker drains and exits, then join.
        self.tx.lock().take();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}
