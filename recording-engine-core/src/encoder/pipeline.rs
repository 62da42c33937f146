use std::thread;
use std::time::Duration;

use crate::encoder::container::{ContainerSummary, ContainerWriter};
use crate::models::config::FramerateMode;
use crate::models::error::RecorderError;
use crate::models::frame::ComposedFrame;
use crate::processing::audio_mixer::AudioMixer;
use crate::session::run::RunShared;
use crate::traits::video_encoder::VideoEncoder;

const IDLE_WAIT: Duration = Duration::from_millis(5);
const FRAME_WAIT: Duration = Duration::from_millis(10);

/// What the encoder stage produced.
#[derive(Debug, Clone, Default)]
pub(crate) struct EncodeSummary {
    pub container: ContainerSummary,
    pub frames_encoded: u64,
    pub audio_frames: u64,
}

/// The consuming end of the video and audio handoff slots.
///
/// Fixed frame rate: one sample per tick of the media clock; a tick with
/// no new composed frame repeats the previous coded frame. Variable frame
/// rate: every composed frame is coded with its own timestamp.
pub(crate) struct EncoderStage {
    encoder: Box<dyn VideoEncoder>,
    writer: ContainerWriter,
    video_track: u32,
    audio_track: Option<u32>,
    framerate_mode: FramerateMode,
    frame_rate: u64,
    next_tick: u64,
    last_coded: Option<Vec<u8>>,
    frames_encoded: u64,
    audio_frames: u64,
}

impl EncoderStage {
    pub(crate) fn new(
        encoder: Box<dyn VideoEncoder>,
        writer: ContainerWriter,
        video_track: u32,
        audio_track: Option<u32>,
        framerate_mode: FramerateMode,
        frame_rate: u32,
    ) -> Self {
        Self {
            encoder,
            writer,
            video_track,
            audio_track,
            framerate_mode,
            frame_rate: frame_rate.max(1) as u64,
            next_tick: 0,
            last_coded: None,
            frames_encoded: 0,
            audio_frames: 0,
        }
    }

    /// Encoder loop. Returns once the run asks for a drain or fails.
    pub(crate) fn run(mut self, shared: &RunShared) -> Result<EncodeSummary, RecorderError> {
        log::debug!("[{}] encoder stage started ({})", shared.session_id, self.encoder.name());

        while !shared.is_draining() && !shared.has_failed() {
            if !shared.gate.is_open() {
                thread::sleep(IDLE_WAIT);
                continue;
            }
            self.write_audio(shared)?;
            match self.framerate_mode {
                FramerateMode::Variable => {
                    if let Some(frame) = shared.video_slot.take_timeout(FRAME_WAIT) {
                        self.encode_frame(&frame, frame.pts, shared)?;
                    }
                }
                FramerateMode::Fixed => self.fixed_tick(shared)?,
            }
        }

        if shared.has_failed() {
            // keep whatever was written playable, but the run outcome is already decided
            if let Err(e) = self.writer.finish(shared.clock.now()) {
                log::warn!("[{}] could not finalize partial output: {}", shared.session_id, e);
            }
            return Err(shared
                .failure()
                .unwrap_or_else(|| RecorderError::Encoder("run failed".into())));
        }

        self.drain(shared)?;
        let duration = shared.clock.now();
        let frames_encoded = self.frames_encoded;
        let audio_frames = self.audio_frames;
        let container = self.writer.finish(duration)?;
        shared.diagnostics.lock().bytes_written = container.bytes_written;
        log::info!(
            "[{}] encoder finished: {} video samples, {} audio samples, {} bytes",
            shared.session_id,
            container.video_samples,
            container.audio_samples,
            container.bytes_written
        );
        Ok(EncodeSummary {
            container,
            frames_encoded,
            audio_frames,
        })
    }

    fn tick_time(&self, tick: u64) -> Duration {
        Duration::from_micros(tick * 1_000_000 / self.frame_rate)
    }

    fn fixed_tick(&mut self, shared: &RunShared) -> Result<(), RecorderError> {
        let due = self.tick_time(self.next_tick);
        let now = shared.clock.now();
        if now < due {
            thread::sleep((due - now).min(IDLE_WAIT));
            return Ok(());
        }
        if self.emit_tick(due, shared)? {
            self.next_tick += 1;
        } else {
            // nothing composed yet
            thread::sleep(IDLE_WAIT);
        }
        Ok(())
    }

    /// Write one fixed-rate sample at `pts`. Returns `false` when there is
    /// neither a new frame nor a previous one to repeat.
    fn emit_tick(&mut self, pts: Duration, shared: &RunShared) -> Result<bool, RecorderError> {
        if let Some(frame) = shared.video_slot.take() {
            self.encode_frame(&frame, pts, shared)?;
            return Ok(true);
        }
        let Some(last) = self.last_coded.as_ref() else {
            return Ok(false);
        };
        self.writer.write_sample(self.video_track, last, pts)?;
        let mut diag = shared.diagnostics.lock();
        diag.frames_duplicated += 1;
        diag.bytes_written = self.writer.bytes_written();
        Ok(true)
    }

    fn encode_frame(&mut self, frame: &ComposedFrame, pts: Duration, shared: &RunShared) -> Result<(), RecorderError> {
        let coded = self.encoder.encode(&frame.image)?;
        self.writer.write_sample(self.video_track, &coded.data, pts)?;
        self.frames_encoded += 1;
        if self.framerate_mode == FramerateMode::Fixed {
            self.last_coded = Some(coded.data);
        }
        let mut diag = shared.diagnostics.lock();
        diag.frames_encoded += 1;
        diag.bytes_written = self.writer.bytes_written();
        Ok(())
    }

    fn write_audio(&mut self, shared: &RunShared) -> Result<(), RecorderError> {
        let Some(track) = self.audio_track else {
            return Ok(());
        };
        if let Some(chunk) = shared.audio_slot.take() {
            let pcm = AudioMixer::convert_to_int16_pcm(&chunk.samples);
            self.writer.write_sample(track, &pcm, chunk.pts)?;
            self.audio_frames += chunk.frame_count() as u64;
        }
        Ok(())
    }

    /// Consume what the producers left in the slots once they have stopped.
    fn drain(&mut self, shared: &RunShared) -> Result<(), RecorderError> {
        self.write_audio(shared)?;
        match self.framerate_mode {
            FramerateMode::Variable => {
                if let Some(frame) = shared.video_slot.take() {
                    self.encode_frame(&frame, frame.pts, shared)?;
                }
            }
            FramerateMode::Fixed => {
                let end = shared.clock.now();
                loop {
                    let due = self.tick_time(self.next_tick);
                    if due > end && self.next_tick > 0 {
                        break;
                    }
                    if !self.emit_tick(due, shared)? {
                        break;
                    }
                    self.next_tick += 1;
                }
            }
        }
        Ok(())
    }
}
