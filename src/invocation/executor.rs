/*!
 * Callback Executors
 *
 * Bounded thread-pool executor for completion callbacks. Submission is
 * fallible: a saturated queue rejects the task instead of buffering it
 * unboundedly, and rejection is the caller's signal to log and drop.
 *
 * A panicking task is caught and logged; it never takes a worker down
 * with it or affects other tasks.
 */

use crossbeam_queue::ArrayQueue;
use log::error;
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Idle workers re-check the queue at this interval even without a wakeup.
const IDLE_PARK: Duration = Duration::from_millis(100);

/// Unit of work handed to an executor
pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("executor {name} queue is full ({capacity} tasks)")]
    Saturated { name: String, capacity: usize },

    #[error("executor {name} is shut down")]
    ShutDown { name: String },
}

/// Something that runs tasks on threads other than the submitter's.
pub trait Executor: Send + Sync {
    fn submit(&self, task: Task) -> Result<(), ExecutorError>;

    fn name(&self) -> &str;
}

struct PoolInner {
    name: String,
    queue: ArrayQueue<Task>,
    idle: Mutex<()>,
    available: Condvar,
    shutdown: AtomicBool,
}

/// Fixed-size thread pool over a bounded task queue.
pub struct ThreadPoolExecutor {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPoolExecutor {
    pub fn new(name: impl Into<String>, workers: usize, queue_capacity: usize) -> Self {
        let inner = Arc::new(PoolInner {
            name: name.into(),
            queue: ArrayQueue::new(queue_capacity),
            idle: Mutex::new(()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let handles = (0..workers)
            .map(|_| {
                let inner = inner.clone();
                thread::spawn(move || worker_loop(inner))
            })
            .collect();

        Self {
            inner,
            workers: Mutex::new(handles),
        }
    }

    /// Stop accepting tasks and join the workers. Queued tasks that have
    /// not started are dropped.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            let _guard = self.inner.idle.lock();
            self.inner.available.notify_all();
        }
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Executor for ThreadPoolExecutor {
    fn submit(&self, task: Task) -> Result<(), ExecutorError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(ExecutorError::ShutDown {
                name: self.inner.name.clone(),
            });
        }

        self.inner
            .queue
            .push(task)
            .map_err(|_rejected| ExecutorError::Saturated {
                name: self.inner.name.clone(),
                capacity: self.inner.queue.capacity(),
            })?;

        let _guard = self.inner.idle.lock();
        self.inner.available.notify_one();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    loop {
        if let Some(task) = inner.queue.pop() {
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                error!("task panicked on executor {}", inner.name);
            }
            continue;
        }

        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }

        let mut guard = inner.idle.lock();
        // re-check with the lock held so a submit cannot slip between the
        // empty pop above and the wait below
        if inner.queue.is_empty() && !inner.shutdown.load(Ordering::Acquire) {
            inner.available.wait_for(&mut guard, IDLE_PARK);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    #[test]
    fn runs_submitted_tasks() {
        let pool = ThreadPoolExecutor::new("test", 2, 16);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let counter = counter.clone();
            pool.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        let start = Instant::now();
        while counter.load(Ordering::SeqCst) < 8 {
            assert!(start.elapsed() < Duration::from_secs(2), "tasks never ran");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn rejects_when_saturated() {
        let pool = ThreadPoolExecutor::new("tiny", 1, 1);
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // occupy the single worker
        pool.submit(Box::new(move || {
            release_rx.recv().ok();
        }))
        .unwrap();
        thread::sleep(Duration::from_millis(50));

        // fill the single queue slot
        pool.submit(Box::new(|| {})).unwrap();

        let rejected = pool.submit(Box::new(|| {}));
        assert!(matches!(
            rejected,
            Err(ExecutorError::Saturated { capacity: 1, .. })
        ));

        release_tx.send(()).unwrap();
    }

    #[test]
    fn survives_a_panicking_task() {
        let pool = ThreadPoolExecutor::new("panicky", 1, 16);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.submit(Box::new(|| panic!("deliberate"))).unwrap();

        let counter_clone = counter.clone();
        pool.submit(Box::new(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        let start = Instant::now();
        while counter.load(Ordering::SeqCst) < 1 {
            assert!(
                start.elapsed() < Duration::from_secs(2),
                "worker died with the panicking task"
            );
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn rejects_after_shutdown() {
        let pool = ThreadPoolExecutor::new("closed", 1, 16);
        pool.shutdown();

        let rejected = pool.submit(Box::new(|| {}));
        assert!(matches!(rejected, Err(ExecutorError::ShutDown { .. })));
    }
}
