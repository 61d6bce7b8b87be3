/*!
 * Cooperative Thread Interrupts
 *
 * A wait loop that should tolerate interruption needs three things: a
 * per-thread flag another thread can raise, a way to wake the thread out
 * of a condition wait when the flag is raised, and test-and-clear /
 * restore operations so an observed interrupt can be deferred until the
 * wait produces a real outcome.
 *
 * A thread that is about to block registers its park site (the monitor it
 * waits on) with [`park_scope`]; [`InterruptHandle::interrupt`] raises the
 * flag and unparks that site. The unpark takes the site's own lock, so an
 * interrupt landing between the waiter's flag check and its condition wait
 * still wakes it.
 */

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Something a blocked thread can be woken out of.
///
/// Implementations must acquire the lock their waiters hold around the
/// condition wait before notifying, so a wakeup cannot fall into the gap
/// between a waiter's last state check and its wait.
pub trait ParkSite: Send + Sync {
    fn unpark_all(&self);
}

#[derive(Default)]
struct InterruptState {
    flag: AtomicBool,
    park: Mutex<Option<Arc<dyn ParkSite>>>,
}

/// Cloneable, sendable handle to one thread's interrupt status.
#[derive(Clone, Default)]
pub struct InterruptHandle {
    state: Arc<InterruptState>,
}

impl InterruptHandle {
    /// Raise the interrupt status and wake the thread if it is parked.
    pub fn interrupt(&self) {
        self.state.flag.store(true, Ordering::Release);
        let site = self.state.park.lock().clone();
        if let Some(site) = site {
            site.unpark_all();
        }
    }

    /// Non-clearing probe of the interrupt status.
    pub fn is_set(&self) -> bool {
        self.state.flag.load(Ordering::Acquire)
    }

    fn take(&self) -> bool {
        self.state.flag.swap(false, Ordering::AcqRel)
    }

    fn set(&self) {
        self.state.flag.store(true, Ordering::Release);
    }
}

thread_local! {
    static CURRENT: InterruptHandle = InterruptHandle::default();
}

/// Handle to the current thread's interrupt status. Hand it to another
/// thread to let it interrupt this one.
pub fn current() -> InterruptHandle {
    CURRENT.with(|handle| handle.clone())
}

/// Test-and-clear the current thread's interrupt status.
pub fn take_interrupted() -> bool {
    CURRENT.with(|handle| handle.take())
}

/// Restore the current thread's interrupt status without waking anyone.
pub fn set_interrupted() {
    CURRENT.with(|handle| handle.set())
}

/// Non-clearing probe of the current thread's interrupt status.
pub fn is_interrupted() -> bool {
    CURRENT.with(|handle| handle.is_set())
}

/// Scope guard registering the current thread's park site.
pub struct ParkGuard {
    handle: InterruptHandle,
}

impl Drop for ParkGuard {
    fn drop(&mut self) {
        *self.handle.state.park.lock() = None;
    }
}

/// Register `site` as the place the current thread is about to block on.
/// The registration lasts until the returned guard is dropped.
pub fn park_scope(site: Arc<dyn ParkSite>) -> ParkGuard {
    let handle = current();
    *handle.state.park.lock() = Some(site);
    ParkGuard { handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Condvar;
    use std::thread;
    use std::time::{Duration, Instant};

    struct TestSite {
        lock: Mutex<()>,
        cond: Condvar,
    }

    impl ParkSite for TestSite {
        fn unpark_all(&self) {
            let _guard = self.lock.lock();
            self.cond.notify_all();
        }
    }

    #[test]
    fn take_clears_the_flag() {
        let handle = current();
        handle.interrupt();
        assert!(is_interrupted());
        assert!(take_interrupted());
        assert!(!take_interrupted());
    }

    #[test]
    fn set_restores_the_flag() {
        assert!(!is_interrupted());
        set_interrupted();
        assert!(is_interrupted());
        assert!(take_interrupted());
    }

    #[test]
    fn interrupt_wakes_a_parked_thread() {
        let site = Arc::new(TestSite {
            lock: Mutex::new(()),
            cond: Condvar::new(),
        });

        let (tx, rx) = std::sync::mpsc::channel();
        let site_clone = site.clone();
        let worker = thread::spawn(move || {
            let _park = park_scope(site_clone.clone() as Arc<dyn ParkSite>);
            tx.send(current()).unwrap();

            let start = Instant::now();
            let mut guard = site_clone.lock.lock();
            while !take_interrupted() {
                site_clone
                    .cond
                    .wait_for(&mut guard, Duration::from_secs(5));
                if start.elapsed() > Duration::from_secs(5) {
                    panic!("never interrupted");
                }
            }
            start.elapsed()
        });

        let handle = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(50));
        handle.interrupt();

        let waited = worker.join().unwrap();
        assert!(waited < Duration::from_secs(5));
    }
}
