use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::error::RecorderError;

/// A named thread that calls `tick` at a fixed period until stopped.
///
/// `tick` receives the time since the thread started and returns `false`
/// to end the loop on its own (e.g. after reporting a fault).
pub(crate) struct Pacer {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Pacer {
    pub(crate) fn spawn<F>(name: String, period: Duration, mut tick: F) -> Result<Self, RecorderError>
    where
        F: FnMut(Duration) -> bool + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let started = Instant::now();
                let mut next = started;
                while flag.load(Ordering::SeqCst) {
                    if !tick(started.elapsed()) {
                        break;
                    }
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
            })
            .map_err(|e| RecorderError::SourceUnavailable(format!("failed to spawn capture thread: {}", e)))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("capture thread panicked");
            }
        }
    }
}

impl Drop for Pacer {
    fn drop(&mut self) {
        self.stop();
    }
}
