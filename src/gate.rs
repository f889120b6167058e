//! Counting gate that bounds the number of frames in flight.
//!
//! The orchestrator takes a [`FramePermit`] before writing a frame's
//! parameters and moves it into the frame's completion handler. Dropping the
//! permit returns the slot, so a frame releases exactly once, whether it
//! succeeded or failed.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// A counting semaphore sized to the parameter ring depth.
#[derive(Debug)]
pub struct FrameGate {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl FrameGate {
    /// Create a gate with `capacity` free slots.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        })
    }

    /// Block until a slot is free, then take it.
    pub fn acquire(self: &Arc<Self>) -> FramePermit {
        let mut available = self.lock();
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *available -= 1;
        FramePermit {
            gate: Arc::clone(self),
        }
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(self: &Arc<Self>) -> Option<FramePermit> {
        let mut available = self.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(FramePermit {
            gate: Arc::clone(self),
        })
    }

    /// Wait at most `timeout` for a slot.
    pub fn acquire_timeout(self: &Arc<Self>, timeout: Duration) -> Option<FramePermit> {
        let available = self.lock();
        let (mut available, _) = self
            .released
            .wait_timeout_while(available, timeout, |n| *n == 0)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(FramePermit {
            gate: Arc::clone(self),
        })
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        *self.lock()
    }

    /// Total slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held by frames in flight.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    fn release(&self) {
        let mut available = self.lock();
        debug_assert!(*available < self.capacity, "frame gate released more often than acquired");
        *available += 1;
        self.released.notify_one();
    }

    // A panicking completion handler must not wedge every later frame.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.available.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Proof of one in-flight frame. Releases its slot when dropped.
#[derive(Debug)]
#[must_use = "dropping a permit immediately releases the frame slot"]
pub struct FramePermit {
    gate: Arc<FrameGate>,
}

impl Drop for FramePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_try_acquire_until_exhausted() {
        let gate = FrameGate::new(2);
        let a = gate.try_acquire();
        let b = gate.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.in_flight(), 2);

        drop(a);
        assert_eq!(gate.available(), 1);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn test_acquire_timeout_expires() {
        let gate = FrameGate::new(1);
        let _held = gate.acquire();
        assert!(gate.acquire_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_release_wakes_exactly_one_waiter() {
        let gate = FrameGate::new(1);
        let held = gate.acquire();
        let acquired = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        let mut permits = Vec::new();
        for _ in 0..2 {
            let gate = Arc::clone(&gate);
            let acquired = Arc::clone(&acquired);
            handles.push(thread::spawn(move || {
                let permit = gate.acquire();
                acquired.fetch_add(1, Ordering::SeqCst);
                permit
            }));
        }

        thread::sleep(Duration::from_millis(50));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);

        drop(held);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        assert_eq!(gate.available(), 0);

        // Collect the finished waiter's permit and release it for the other one.
        let finished = handles
            .iter()
            .position(|h| h.is_finished())
            .expect("one waiter should have finished");
        let permit = handles.remove(finished).join().unwrap();
        drop(permit);

        for h in handles {
            permits.push(h.join().unwrap());
        }
        assert_eq!(acquired.load(Ordering::SeqCst), 2);
        drop(permits);
        assert_eq!(gate.available(), 1);
    }
}
