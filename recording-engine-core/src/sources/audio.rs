use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::AudioLevels;
use crate::models::error::RecorderError;
use crate::models::frame::AudioSourceClass;
use crate::processing::audio_mixer::{AudioMixer, MixerChannel};
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::capture_provider::{AudioFault, AudioProvider};

/// Seconds of normalized audio buffered per class before the oldest is dropped.
const BUFFER_SECONDS: f64 = 5.0;

/// One audio device class (microphone or system loopback) feeding the mixer.
///
/// ```text
/// [AudioProvider] -> normalize -> levels -> [RingBuffer] -> MixerStage
/// ```
pub struct AudioCapture {
    class: AudioSourceClass,
    provider: Box<dyn AudioProvider>,
    buffer: Arc<Mutex<RingBuffer>>,
    fault: AudioFault,
    running: bool,
}

impl AudioCapture {
    pub fn new(class: AudioSourceClass, provider: Box<dyn AudioProvider>, mixer: &AudioMixer) -> Self {
        let capacity = (mixer.target_sample_rate * BUFFER_SECONDS) as usize;
        Self {
            class,
            provider,
            buffer: Arc::new(Mutex::new(RingBuffer::new(capacity, mixer.target_channels))),
            fault: AudioFault::default(),
            running: false,
        }
    }

    pub fn class(&self) -> AudioSourceClass {
        self.class
    }

    pub fn label(&self) -> String {
        self.provider.device_info().label
    }

    /// Start the device; its buffers are normalized to the mixer's format
    /// on the audio thread and metered into `levels`.
    pub fn start(&mut self, mixer: &AudioMixer, levels: Arc<Mutex<AudioLevels>>) -> Result<(), RecorderError> {
        if self.running {
            return Ok(());
        }
        if !self.provider.is_available() {
            return Err(RecorderError::SourceUnavailable(format!(
                "{:?} audio device {} is unavailable",
                self.class,
                self.provider.device_info().label
            )));
        }

        let buffer = Arc::clone(&self.buffer);
        let mixer = mixer.clone();
        let class = self.class;
        let callback = Arc::new(move |samples: &[f32], sample_rate: f64, channels: u16| {
            let normalized = mixer.normalize(samples, sample_rate, channels);

            let rms = AudioMixer::rms_level(&normalized);
            let peak = AudioMixer::peak_level(&normalized);
            {
                let mut l = levels.lock();
                match class {
                    AudioSourceClass::Microphone => {
                        l.mic_level = rms;
                        l.peak_mic_level = l.peak_mic_level.max(peak);
                    }
                    _ => {
                        l.system_level = rms;
                        l.peak_system_level = l.peak_system_level.max(peak);
                    }
                }
            }

            buffer.lock().write(&normalized);
        });

        self.buffer.lock().reset();
        self.fault.clear();
        self.provider.start(callback, self.fault.clone())?;
        self.running = true;
        log::info!("started {:?} audio capture on {}", self.class, self.provider.device_info().label);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), RecorderError> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        self.provider.stop()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Slot the device reports a mid-run loss into.
    pub fn fault(&self) -> AudioFault {
        self.fault.clone()
    }

    /// The mixer's view of this capture.
    pub fn mixer_channel(&self, gain: f32) -> MixerChannel {
        MixerChannel {
            class: self.class,
            buffer: Arc::clone(&self.buffer),
            gain,
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
