use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crate::models::event::RecorderEvent;
use crate::models::frame::ComposedFrame;
use crate::session::run::{FinishReason, RunShared};
use crate::storage::still::StillWriter;

const POLL: Duration = Duration::from_millis(5);

/// Exports stills of the composed output on the media clock.
///
/// With an interval, fire `k` happens once media time reaches `k * interval`,
/// starting with `k = 0` as soon as the first composed frame exists. Paused
/// time does not advance the schedule. Without an interval (snapshot mode)
/// exactly one still is written, once every source has contributed a frame,
/// and the run is asked to complete.
pub(crate) struct SnapshotScheduler {
    writer: StillWriter,
    interval: Option<Duration>,
    fired: u32,
    saved: Vec<PathBuf>,
}

impl SnapshotScheduler {
    pub(crate) fn periodic(writer: StillWriter, interval: Duration) -> Self {
        Self {
            writer,
            interval: Some(interval),
            fired: 0,
            saved: Vec::new(),
        }
    }

    pub(crate) fn one_shot(writer: StillWriter) -> Self {
        Self {
            writer,
            interval: None,
            fired: 0,
            saved: Vec::new(),
        }
    }

    fn due(&self, interval: Duration) -> Duration {
        interval * self.fired
    }

    pub(crate) fn run(mut self, shared: &RunShared) -> Vec<PathBuf> {
        while shared.is_capturing() && !shared.has_failed() {
            let Some(interval) = self.interval else {
                if self.fired > 0 {
                    break;
                }
                // the single still waits until every source is in the picture
                let ready = shared.gate.is_open() && shared.sources_ready.load(Ordering::SeqCst);
                match shared.latest_composed().filter(|_| ready) {
                    Some(frame) => {
                        if self.fire(&frame, shared) {
                            shared.request_finish(FinishReason::Completed);
                        }
                    }
                    None => thread::sleep(POLL),
                }
                continue;
            };

            let now = shared.clock.now();
            let due = self.due(interval);
            if now < due {
                thread::sleep((due - now).min(POLL));
                continue;
            }
            match shared.latest_composed() {
                Some(frame) => {
                    self.fire(&frame, shared);
                }
                None => thread::sleep(POLL),
            }
        }

        if !shared.has_failed() {
            self.fire_remaining(shared);
        }
        self.saved
    }

    /// Catch up on every fire due at or before the final media time, using
    /// the last composed frame.
    fn fire_remaining(&mut self, shared: &RunShared) {
        let Some(frame) = shared.latest_composed() else {
            return;
        };
        let Some(interval) = self.interval else {
            if self.fired == 0 {
                self.fire(&frame, shared);
            }
            return;
        };
        let end = shared.clock.now();
        while self.due(interval) <= end {
            if !self.fire(&frame, shared) {
                return;
            }
        }
    }

    fn fire(&mut self, frame: &ComposedFrame, shared: &RunShared) -> bool {
        match self.writer.write(&frame.image) {
            Ok(path) => {
                log::debug!(
                    "[{}] snapshot {} at {:?}",
                    shared.session_id,
                    self.fired,
                    shared.clock.now()
                );
                self.fired += 1;
                shared.events.emit(RecorderEvent::SnapshotSaved(path.clone()));
                self.saved.push(path);
                true
            }
            Err(e) => {
                shared.fail(e);
                false
            }
        }
    }
}
