use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::error::RecorderError;
use crate::models::event::{RecorderEvent, RecordingProgress};
use crate::models::frame::ComposedFrame;
use crate::models::source::SourceId;
use crate::processing::audio_mixer::MixerStage;
use crate::processing::compositor::Compositor;
use crate::session::run::RunShared;
use crate::traits::capture_provider::AudioFault;
use crate::traits::capture_source::CaptureSource;

/// Mixing cadence, as in the capture loop of a single-device recorder.
const MIX_INTERVAL: Duration = Duration::from_millis(100);
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
/// Longest uninterrupted sleep, so stop requests are seen promptly.
const POLL_SLICE: Duration = Duration::from_millis(10);

/// Sleep for `total`, waking early once capture stops or the run fails.
fn sleep_while_capturing(shared: &RunShared, total: Duration) {
    let deadline = Instant::now() + total;
    loop {
        if !shared.is_capturing() || shared.has_failed() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(POLL_SLICE));
    }
}

/// The compositing loop: polls sources at the output frame rate and
/// publishes composed canvases.
///
/// Owns the running sources for the duration of the run and hands them
/// back so the supervisor can stop them.
pub(crate) struct CompositorStage {
    compositor: Compositor,
    sources: Vec<Box<dyn CaptureSource>>,
    /// Whether composed frames go to the encoder (video mode).
    feeds_encoder: bool,
    /// Enabled sources that have not delivered a frame yet, watched by the
    /// first-frame timeout.
    awaiting_first: Vec<SourceId>,
    sequence: u64,
    delivered: bool,
}

impl CompositorStage {
    pub(crate) fn new(compositor: Compositor, sources: Vec<Box<dyn CaptureSource>>, feeds_encoder: bool) -> Self {
        let awaiting_first = sources
            .iter()
            .map(|s| s.descriptor().id)
            .filter(|id| compositor.is_enabled(*id))
            .collect();
        Self {
            compositor,
            sources,
            feeds_encoder,
            awaiting_first,
            sequence: 0,
            delivered: false,
        }
    }

    pub(crate) fn run(mut self, shared: &RunShared) -> Vec<Box<dyn CaptureSource>> {
        let period = shared.options.frame_duration();
        let started = Instant::now();
        let mut next = started;
        log::debug!(
            "[{}] compositor started: {} sources, output {}x{}",
            shared.session_id,
            self.sources.len(),
            self.compositor.output_size().width,
            self.compositor.output_size().height
        );

        while shared.is_capturing() && !shared.has_failed() {
            self.check_sources(shared, started.elapsed());
            if shared.gate.is_open() {
                self.tick(shared);
            }

            next += period;
            let now = Instant::now();
            if next > now {
                sleep_while_capturing(shared, next - now);
            } else {
                next = now;
            }
        }

        if !self.delivered && !shared.has_failed() {
            // a run stopped before the first tick still produces one frame
            let frame = self.next_frame(shared);
            shared.publish_composed(frame.clone());
            if self.feeds_encoder {
                shared.video_slot.put(frame);
            }
            shared.diagnostics.lock().frames_composed += 1;
        }
        self.sources
    }

    fn tick(&mut self, shared: &RunShared) {
        if self.feeds_encoder && shared.video_slot.is_occupied() {
            shared.diagnostics.lock().frames_dropped += 1;
            return;
        }
        // layers without a frame yet are left out of the canvas
        let frame = self.next_frame(shared);
        shared.publish_composed(frame.clone());
        if self.awaiting_first.is_empty() {
            shared.sources_ready.store(true, Ordering::SeqCst);
        }
        if self.feeds_encoder && shared.video_slot.put(frame).is_some() {
            shared.diagnostics.lock().frames_dropped += 1;
        }
        shared.diagnostics.lock().frames_composed += 1;
        self.delivered = true;
    }

    fn next_frame(&mut self, shared: &RunShared) -> ComposedFrame {
        let sources = &self.sources;
        let image = self.compositor.compose(|id| {
            sources
                .iter()
                .find(|s| s.descriptor().id == id)
                .and_then(|s| s.latest_frame())
        });
        let frame = ComposedFrame {
            image: Arc::new(image),
            pts: shared.clock.now(),
            sequence: self.sequence,
        };
        self.sequence += 1;
        frame
    }

    /// Collect device faults and first-frame timeouts. Optional sources are
    /// dropped from the composition; anything else fails the run.
    fn check_sources(&mut self, shared: &RunShared, elapsed: Duration) {
        let mut failed: Vec<(SourceId, bool, RecorderError)> = Vec::new();
        for source in &self.sources {
            let descriptor = source.descriptor();
            if !self.compositor.is_enabled(descriptor.id) {
                continue;
            }
            if let Some(fault) = source.take_fault() {
                failed.push((descriptor.id, descriptor.optional, fault));
            }
        }

        let sources = &self.sources;
        self.awaiting_first.retain(|id| {
            sources
                .iter()
                .find(|s| s.descriptor().id == *id)
                .is_some_and(|s| s.latest_frame().is_none())
        });
        if elapsed >= shared.options.first_frame_timeout && !self.awaiting_first.is_empty() {
            for id in std::mem::take(&mut self.awaiting_first) {
                let optional = self
                    .sources
                    .iter()
                    .find(|s| s.descriptor().id == id)
                    .is_some_and(|s| s.descriptor().optional);
                let error = RecorderError::SourceUnavailable(format!(
                    "{} delivered no frame within {:?}",
                    id, shared.options.first_frame_timeout
                ));
                failed.push((id, optional, error));
            }
        }

        for (id, optional, error) in failed {
            if !self.compositor.is_enabled(id) {
                continue;
            }
            if optional {
                log::warn!("[{}] disabling optional {}: {}", shared.session_id, id, error);
                self.compositor.disable(id);
                self.awaiting_first.retain(|other| *other != id);
            } else {
                shared.fail(error);
                return;
            }
        }
    }
}

/// The mixing loop: turns buffered device audio into clock-aligned chunks.
///
/// A device lost mid-run fails the recording, paused or not.
pub(crate) fn run_mixer(mut stage: MixerStage, faults: &[AudioFault], shared: &RunShared) {
    while shared.is_capturing() && !shared.has_failed() {
        sleep_while_capturing(shared, MIX_INTERVAL);
        if let Some(error) = faults.iter().find_map(AudioFault::take) {
            shared.fail(error);
            return;
        }
        if !shared.is_capturing() {
            break;
        }
        if !shared.gate.is_open() {
            stage.discard_pending();
            continue;
        }
        if shared.audio_slot.is_occupied() {
            // the encoder is behind; mix a longer batch next time
            continue;
        }
        if let Some(chunk) = stage.mix_due(shared.clock.now()) {
            deliver_audio(shared, chunk);
        }
    }

    if shared.has_failed() {
        return;
    }
    // the clock is frozen by now; mix out everything up to it
    let end = shared.clock.now();
    while let Some(chunk) = stage.mix_due(end) {
        let chunk = match shared.audio_slot.take() {
            Some(mut pending) => {
                pending.samples.extend_from_slice(&chunk.samples);
                pending
            }
            None => chunk,
        };
        deliver_audio(shared, chunk);
    }
    log::debug!(
        "[{}] mixer finished after {} frames",
        shared.session_id,
        stage.frames_emitted()
    );
}

fn deliver_audio(shared: &RunShared, chunk: crate::models::frame::AudioChunk) {
    {
        let mut diag = shared.diagnostics.lock();
        diag.mix_cycles += 1;
        diag.audio_frames_mixed += chunk.frame_count() as u64;
    }
    shared.audio_slot.put(chunk);
}

/// Posts `Progress` events while the session records.
pub(crate) fn run_progress(shared: &RunShared) {
    while shared.is_capturing() && !shared.has_failed() {
        sleep_while_capturing(shared, PROGRESS_INTERVAL);
        if !shared.is_capturing() || !shared.gate.is_open() {
            continue;
        }
        let diag = shared.diagnostics.lock().clone();
        let levels = *shared.levels.lock();
        shared.events.emit(RecorderEvent::Progress(RecordingProgress {
            duration_secs: shared.clock.now().as_secs_f64(),
            frames_encoded: diag.frames_encoded,
            frames_dropped: diag.frames_dropped,
            bytes_written: diag.bytes_written,
            levels,
        }));
    }
}
