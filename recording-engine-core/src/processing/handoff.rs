use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Single-slot handoff between two pipeline stages.
///
/// Holds at most one value. Producers either replace the pending value
/// (`put`, latest wins) or skip when the consumer has not caught up
/// (`offer`), so a slow consumer bounds memory instead of growing a queue.
pub struct Handoff<T> {
    inner: Arc<HandoffInner<T>>,
}

struct HandoffInner<T> {
    slot: Mutex<Option<T>>,
    filled: Condvar,
}

impl<T> Clone for Handoff<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Handoff<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandoffInner {
                slot: Mutex::new(None),
                filled: Condvar::new(),
            }),
        }
    }

    /// Store `value`, returning the unconsumed value it superseded.
    pub fn put(&self, value: T) -> Option<T> {
        let previous = self.inner.slot.lock().replace(value);
        self.inner.filled.notify_one();
        previous
    }

    pub fn is_occupied(&self) -> bool {
        self.inner.slot.lock().is_some()
    }

    pub fn take(&self) -> Option<T> {
        self.inner.slot.lock().take()
    }

    /// Wait up to `timeout` for a value.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.inner.slot.lock();
        while slot.is_none() {
            if self.inner.filled.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        slot.take()
    }
}

/// The encoder-accepting gate.
///
/// Closed while a session is paused: handoff points stop producing and the
/// encoder stops consuming, while capture sources keep running.
#[derive(Debug)]
pub struct AcceptGate {
    open: AtomicBool,
}

impl AcceptGate {
    pub fn new(open: bool) -> Self {
        Self {
            open: AtomicBool::new(open),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn put_supersedes_unconsumed_value() {
        let slot = Handoff::new();
        assert_eq!(slot.put(1), None);
        assert_eq!(slot.put(2), Some(1));
        assert_eq!(slot.take(), Some(2));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn take_timeout_wakes_on_put() {
        let slot = Handoff::new();
        let producer = slot.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.put(7u32);
        });
        assert_eq!(slot.take_timeout(Duration::from_secs(2)), Some(7));
        handle.join().unwrap();
    }

    #[test]
    fn take_timeout_expires_empty() {
        let slot: Handoff<u8> = Handoff::new();
        let started = Instant::now();
        assert_eq!(slot.take_timeout(Duration::from_millis(30)), None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn gate_toggles() {
        let gate = AcceptGate::new(false);
        assert!(!gate.is_open());
        gate.open();
        assert!(gate.is_open());
        gate.close();
        assert!(!gate.is_open());
    }
}
