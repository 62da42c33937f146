use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::models::audio_models::{AudioLevels, PipelineDiagnostics};
use crate::models::config::RecorderOptions;
use crate::models::error::RecorderError;
use crate::models::frame::{AudioChunk, ComposedFrame};
use crate::processing::clock::MediaClock;
use crate::processing::handoff::{AcceptGate, Handoff};
use crate::session::events::EventHub;

/// Why a run is being wound down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinishReason {
    /// `stop()` was called.
    Stop,
    /// A pipeline stage or required source failed.
    Failed,
    /// The run ended on its own (snapshot mode after its one still).
    Completed,
}

/// State shared by every worker thread of one `record()` run.
pub(crate) struct RunShared {
    pub session_id: String,
    pub options: RecorderOptions,
    pub clock: MediaClock,
    /// Closed while paused.
    pub gate: AcceptGate,
    /// Tells compositor, mixer, scheduler and progress loops to wind down.
    pub capture_stop: AtomicBool,
    /// Tells the encoder to drain what is left and finalize.
    pub encoder_drain: AtomicBool,
    pub video_slot: Handoff<ComposedFrame>,
    pub audio_slot: Handoff<AudioChunk>,
    /// Most recent composed frame, read by the snapshot scheduler.
    pub latest_composed: Mutex<Option<ComposedFrame>>,
    /// Set after the first composed frame that every enabled source
    /// contributed to, or whose missing sources the watchdog dropped.
    pub sources_ready: AtomicBool,
    pub diagnostics: Mutex<PipelineDiagnostics>,
    pub levels: Arc<Mutex<AudioLevels>>,
    pub events: EventHub,
    failure: Mutex<Option<RecorderError>>,
    finish_tx: Sender<FinishReason>,
}

impl RunShared {
    pub(crate) fn new(
        session_id: String,
        options: RecorderOptions,
        events: EventHub,
        finish_tx: Sender<FinishReason>,
    ) -> Self {
        Self {
            session_id,
            options,
            clock: MediaClock::new(),
            gate: AcceptGate::new(false),
            capture_stop: AtomicBool::new(false),
            encoder_drain: AtomicBool::new(false),
            video_slot: Handoff::new(),
            audio_slot: Handoff::new(),
            latest_composed: Mutex::new(None),
            sources_ready: AtomicBool::new(false),
            diagnostics: Mutex::new(PipelineDiagnostics::default()),
            levels: Arc::new(Mutex::new(AudioLevels::default())),
            events,
            failure: Mutex::new(None),
            finish_tx,
        }
    }

    /// Record a fatal error and ask the supervisor to wind the run down.
    /// The first failure wins; later ones are only logged.
    pub(crate) fn fail(&self, error: RecorderError) {
        {
            let mut failure = self.failure.lock();
            if failure.is_some() {
                log::debug!("[{}] additional failure ignored: {}", self.session_id, error);
                return;
            }
            log::error!("[{}] recording failed: {}", self.session_id, error);
            *failure = Some(error);
        }
        self.request_finish(FinishReason::Failed);
    }

    pub(crate) fn request_finish(&self, reason: FinishReason) {
        // the supervisor acts on the first request; a closed channel means it already has
        let _ = self.finish_tx.send(reason);
    }

    pub(crate) fn failure(&self) -> Option<RecorderError> {
        self.failure.lock().clone()
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.failure.lock().is_some()
    }

    pub(crate) fn is_capturing(&self) -> bool {
        !self.capture_stop.load(Ordering::SeqCst)
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.encoder_drain.load(Ordering::SeqCst)
    }

    pub(crate) fn publish_composed(&self, frame: ComposedFrame) {
        *self.latest_composed.lock() = Some(frame);
    }

    pub(crate) fn latest_composed(&self) -> Option<ComposedFrame> {
        self.latest_composed.lock().clone()
    }
}
