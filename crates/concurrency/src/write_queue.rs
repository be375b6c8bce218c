//! The serialized write lane
//!
//! All committing write work funnels through one `WriteQueue`, so at most
//! one write executes at a time and commits acquire a single global order.
//!
//! Dispatch is thread-aware. A caller already on the coordinating thread
//! must not wait on work scheduled back onto that same thread, so its jobs
//! hop to the queue's dedicated worker (blocking for a result when one is
//! requested, returning immediately otherwise). A caller on any other
//! thread has no self-deadlock risk, so its job runs directly in the
//! calling context under the queue's serialization lock — one lock
//! acquisition instead of two thread hops.
//!
//! A panicking job does not corrupt the lane: the panic payload is carried
//! back to a synchronous caller and resumed there; fire-and-forget panics
//! are logged. Subsequent jobs run normally (parking_lot locks do not
//! poison).

use crate::foreground::Foreground;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::warn;

type Job = Box<dyn FnOnce() + Send>;

/// Single serialized execution context for committing writes
///
/// Jobs submitted from the coordinating thread queue FIFO onto the worker;
/// jobs submitted from other threads serialize on the same turn lock the
/// worker holds while running. No two jobs ever overlap.
pub struct WriteQueue {
    foreground: Arc<dyn Foreground>,
    tx: Mutex<Option<Sender<Job>>>,
    turn: Arc<Mutex<()>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WriteQueue {
    /// Create the queue and spawn its worker thread
    ///
    /// `foreground` tags the coordinating thread for the dispatch rule.
    pub fn new(foreground: Arc<dyn Foreground>) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let turn = Arc::new(Mutex::new(()));
        let worker_turn = Arc::clone(&turn);
        let worker = thread::Builder::new()
            .name("storeline-write-queue".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    let _turn = worker_turn.lock();
                    job();
                }
            })
            .expect("failed to spawn write queue worker");
        Self {
            foreground,
            tx: Mutex::new(Some(tx)),
            turn,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Run a job on the queue and return its result
    ///
    /// From the coordinating thread the job executes on the worker while
    /// the caller blocks for the result; from any other thread it executes
    /// directly in the calling context under the serialization lock.
    /// A panic inside the job resurfaces in the caller either way.
    pub fn run<T, F>(&self, job: F) -> T
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.foreground.is_current() {
            let (result_tx, result_rx) = mpsc::channel();
            self.enqueue(Box::new(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(job));
                let _ = result_tx.send(outcome);
            }));
            match result_rx
                .recv()
                .expect("write queue worker exited with a job in flight")
            {
                Ok(value) => value,
                Err(payload) => panic::resume_unwind(payload),
            }
        } else {
            let _turn = self.turn.lock();
            job()
        }
    }

    /// Run a job on the queue without waiting for a result
    ///
    /// Fire-and-forget from the coordinating thread; from any other thread
    /// the job still executes before this returns (directly in the calling
    /// context, serialized on the turn lock), since queue-hopping there
    /// would only add latency.
    pub fn run_async<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.foreground.is_current() {
            self.enqueue(Box::new(move || {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    warn!(target: "storeline::queue", "queued write job panicked");
                }
            }));
        } else {
            let _turn = self.turn.lock();
            job();
        }
    }

    fn enqueue(&self, job: Job) {
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                let _ = tx.send(job);
            }
            None => warn!(target: "storeline::queue", "write submitted after queue shutdown"),
        }
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        // Close the channel so the worker drains remaining jobs and exits.
        self.tx.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreground::ForegroundThread;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    fn queue_with_foreground() -> (Arc<ForegroundThread>, WriteQueue) {
        let fg = Arc::new(ForegroundThread::new());
        let queue = WriteQueue::new(fg.clone() as Arc<dyn Foreground>);
        (fg, queue)
    }

    #[test]
    fn test_run_off_coordinator_executes_inline() {
        let (_fg, queue) = queue_with_foreground();
        let caller = thread::current().id();
        let ran_on = queue.run(move || thread::current().id());
        assert_eq!(ran_on, caller);
    }

    #[test]
    fn test_run_from_coordinator_hops_to_worker() {
        let (fg, queue) = queue_with_foreground();
        let queue = Arc::new(queue);
        let (tx, rx) = mpsc::channel();
        let q = Arc::clone(&queue);
        fg.post(Box::new(move || {
            let fg_thread = thread::current().id();
            let worker_thread = q.run(|| thread::current().id());
            let _ = tx.send((fg_thread, worker_thread));
        }));
        let (fg_thread, worker_thread) = rx.recv().unwrap();
        assert_ne!(fg_thread, worker_thread);
    }

    #[test]
    fn test_run_async_from_coordinator_returns_before_job() {
        let (fg, queue) = queue_with_foreground();
        let queue = Arc::new(queue);
        let gate = Arc::new(Barrier::new(2));
        let ran = Arc::new(AtomicUsize::new(0));

        let (tx, rx) = mpsc::channel();
        let q = Arc::clone(&queue);
        let job_gate = Arc::clone(&gate);
        let job_ran = Arc::clone(&ran);
        let observe_ran = Arc::clone(&ran);
        fg.post(Box::new(move || {
            q.run_async(move || {
                job_gate.wait();
                job_ran.fetch_add(1, Ordering::SeqCst);
            });
            // run_async returned while the job is still parked on the gate.
            let _ = tx.send(observe_ran.load(Ordering::SeqCst));
        }));
        assert_eq!(rx.recv().unwrap(), 0);
        gate.wait();
        queue.run(|| {});
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_jobs_do_not_overlap() {
        let (_fg, queue) = queue_with_foreground();
        let queue = Arc::new(queue);
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let q = Arc::clone(&queue);
                let active = Arc::clone(&active);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let active = Arc::clone(&active);
                        let max_seen = Arc::clone(&max_seen);
                        q.run(move || {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::yield_now();
                            active.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_queued_jobs_fifo() {
        let (fg, queue) = queue_with_foreground();
        let queue = Arc::new(queue);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel();

        let q = Arc::clone(&queue);
        let order_in = Arc::clone(&order);
        fg.post(Box::new(move || {
            for i in 0..20 {
                let order = Arc::clone(&order_in);
                q.run_async(move || order.lock().push(i));
            }
            let _ = tx.send(());
        }));
        rx.recv().unwrap();
        // Dropping the handle drains the channel and joins the worker, so
        // every queued job has run by the time we look.
        drop(queue);
        assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_job_does_not_corrupt_queue() {
        let (fg, queue) = queue_with_foreground();
        let queue = Arc::new(queue);
        let (tx, rx) = mpsc::channel();
        let q = Arc::clone(&queue);
        fg.post(Box::new(move || {
            q.run_async(|| panic!("job failure"));
            let _ = tx.send(());
        }));
        rx.recv().unwrap();
        // The lane still runs subsequent jobs.
        assert_eq!(queue.run(|| 41 + 1), 42);
    }

    #[test]
    fn test_sync_panic_resurfaces_in_caller() {
        let (_fg, queue) = queue_with_foreground();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            queue.run(|| -> u32 { panic!("inline failure") })
        }));
        assert!(result.is_err());
        // And the queue survives.
        assert_eq!(queue.run(|| 7), 7);
    }

    #[test]
    fn test_drop_drains_queued_jobs() {
        let (fg, queue) = queue_with_foreground();
        let queue = Arc::new(queue);
        let ran = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let q = Arc::clone(&queue);
        let r = Arc::clone(&ran);
        fg.post(Box::new(move || {
            q.run_async(move || {
                thread::sleep(Duration::from_millis(10));
                r.fetch_add(1, Ordering::SeqCst);
            });
            let _ = tx.send(());
        }));
        rx.recv().unwrap();
        fg.flush();
        // Dropping the last handle joins the worker only after it drains.
        drop(queue);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
