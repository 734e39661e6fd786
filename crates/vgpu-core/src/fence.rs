//! Monotonic completion counter with blocking waits.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

/// A non-decreasing `u64` published by one thread and awaited by others.
///
/// `signal` stores with release ordering, so a waiter that observes a value
/// also observes every write the publisher made before signaling it.
#[derive(Debug, Default)]
pub struct FenceSignal {
    value: AtomicU64,
    closed: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl FenceSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last published value.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Publish `fence` and wake all waiters. Values lower than the current
    /// one are ignored.
    pub fn signal(&self, fence: u64) {
        {
            let _guard = self.lock.lock();
            self.value.fetch_max(fence, Ordering::AcqRel);
        }
        self.cond.notify_all();
    }

    /// Mark the publisher as gone. Pending and future waits return immediately.
    pub fn close(&self) {
        {
            let _guard = self.lock.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Block until the value reaches `target` or the signal is closed.
    /// Returns true if `target` was reached.
    pub fn wait_for(&self, target: u64) -> bool {
        if self.value() >= target {
            return true;
        }
        let mut guard = self.lock.lock();
        loop {
            if self.value() >= target {
                return true;
            }
            if self.is_closed() {
                return false;
            }
            self.cond.wait(&mut guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_returns_immediately_when_reached() {
        let signal = FenceSignal::new();
        signal.signal(5);
        assert!(signal.wait_for(3));
        assert!(signal.wait_for(5));
        assert!(signal.wait_for(0));
    }

    #[test]
    fn value_never_decreases() {
        let signal = FenceSignal::new();
        signal.signal(9);
        signal.signal(4);
        assert_eq!(signal.value(), 9);
    }

    #[test]
    fn waiter_wakes_on_signal() {
        let signal = Arc::new(FenceSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait_for(3))
        };
        thread::sleep(Duration::from_millis(10));
        signal.signal(1);
        signal.signal(2);
        thread::sleep(Duration::from_millis(10));
        assert!(!waiter.is_finished());
        signal.signal(3);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn close_releases_waiters() {
        let signal = Arc::new(FenceSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait_for(100))
        };
        thread::sleep(Duration::from_millis(10));
        signal.close();
        assert!(!waiter.join().unwrap());
        assert!(!signal.wait_for(1));
    }
}
