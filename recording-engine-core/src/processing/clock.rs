use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Session media clock.
///
/// Reads wall time elapsed since `start`, minus every paused interval, so
/// presentation timestamps stay contiguous across pause/resume. Frozen at
/// stop so late readers all observe the same final duration.
#[derive(Debug, Default)]
pub struct MediaClock {
    inner: Mutex<ClockState>,
}

#[derive(Debug, Default)]
struct ClockState {
    started: Option<Instant>,
    paused_total: Duration,
    paused_at: Option<Instant>,
    frozen: Option<Duration>,
}

impl ClockState {
    fn elapsed_at(&self, at: Instant) -> Duration {
        if let Some(frozen) = self.frozen {
            return frozen;
        }
        let Some(started) = self.started else {
            return Duration::ZERO;
        };
        let reference = self.paused_at.unwrap_or(at);
        reference
            .saturating_duration_since(started)
            .saturating_sub(self.paused_total)
    }
}

impl MediaClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        let mut s = self.inner.lock();
        *s = ClockState {
            started: Some(Instant::now()),
            ..ClockState::default()
        };
    }

    pub fn pause(&self) {
        let mut s = self.inner.lock();
        if s.paused_at.is_none() && s.frozen.is_none() {
            s.paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&self) {
        let mut s = self.inner.lock();
        if let Some(paused_at) = s.paused_at.take() {
            s.paused_total += paused_at.elapsed();
        }
    }

    /// Stop the clock for good and return the final media duration.
    pub fn freeze(&self) -> Duration {
        let mut s = self.inner.lock();
        let now = s.elapsed_at(Instant::now());
        s.frozen = Some(now);
        now
    }

    pub fn now(&self) -> Duration {
        self.inner.lock().elapsed_at(Instant::now())
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.lock().frozen.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn unstarted_clock_reads_zero() {
        assert_eq!(MediaClock::new().now(), Duration::ZERO);
    }

    #[test]
    fn paused_time_is_excluded() {
        let clock = MediaClock::new();
        clock.start();
        thread::sleep(Duration::from_millis(30));
        clock.pause();
        let at_pause = clock.now();
        thread::sleep(Duration::from_millis(60));
        assert_eq!(clock.now(), at_pause);

        clock.resume();
        thread::sleep(Duration::from_millis(10));
        let after = clock.now();
        assert!(after > at_pause);
        assert!(after < at_pause + Duration::from_millis(55));
    }

    #[test]
    fn frozen_clock_stops_advancing() {
        let clock = MediaClock::new();
        clock.start();
        thread::sleep(Duration::from_millis(10));
        let final_time = clock.freeze();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.now(), final_time);
        assert!(clock.is_frozen());
    }

    #[test]
    fn freeze_while_paused_uses_pause_point() {
        let clock = MediaClock::new();
        clock.start();
        thread::sleep(Duration::from_millis(10));
        clock.pause();
        let at_pause = clock.now();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.freeze(), at_pause);
    }
}
