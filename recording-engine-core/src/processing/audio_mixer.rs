use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::frame::{AudioChunk, AudioSourceClass};
use crate::processing::ring_buffer::RingBuffer;

/// Pure-math audio mixer and resampler.
///
/// Every input is normalized to the mixer's channel layout and sample rate
/// before mixing, so the mixing step itself is a gain-weighted sum.
#[derive(Debug, Clone)]
pub struct AudioMixer {
    pub target_sample_rate: f64,
    pub target_channels: u16,
}

/// One input to [`AudioMixer::mix`], already in the mixer's format.
#[derive(Debug, Clone, Copy)]
pub struct MixInput<'a> {
    pub samples: &'a [f32],
    pub gain: f32,
}

impl AudioMixer {
    pub fn new(target_sample_rate: f64, target_channels: u16) -> Self {
        Self {
            target_sample_rate,
            target_channels: target_channels.max(1),
        }
    }

    /// Convert interleaved audio of any layout and rate into the mixer's format.
    pub fn normalize(&self, samples: &[f32], sample_rate: f64, channels: u16) -> Vec<f32> {
        let remixed = Self::remix(samples, channels, self.target_channels);
        self.resample_interleaved(&remixed, sample_rate, self.target_channels)
    }

    /// Change the channel count of interleaved audio.
    ///
    /// Mono is duplicated into every output channel; anything wider is first
    /// averaged down to mono. Stereo to stereo is a passthrough.
    pub fn remix(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
        let from = from.max(1) as usize;
        let to = to.max(1) as usize;
        if from == to {
            return samples.to_vec();
        }

        let mono = if from == 1 {
            samples.to_vec()
        } else {
            Self::downmix_to_mono(samples, from)
        };
        if to == 1 {
            return mono;
        }

        let mut output = Vec::with_capacity(mono.len() * to);
        for sample in mono {
            output.extend(std::iter::repeat(sample).take(to));
        }
        output
    }

    /// Average interleaved multi-channel audio down to mono.
    pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
        let channels = channels.max(1);
        if channels == 1 {
            return samples.to_vec();
        }
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Linear interpolation resampling for interleaved audio.
    ///
    /// Returns input unchanged if rates match.
    pub fn resample_interleaved(&self, samples: &[f32], source_sample_rate: f64, channels: u16) -> Vec<f32> {
        if (source_sample_rate - self.target_sample_rate).abs() < 0.01 || samples.is_empty() {
            return samples.to_vec();
        }
        if source_sample_rate <= 0.0 {
            return Vec::new();
        }

        let channels = channels.max(1) as usize;
        let frame_count = samples.len() / channels;
        let ratio = self.target_sample_rate / source_sample_rate;
        let output_frames = (frame_count as f64 * ratio) as usize;
        if output_frames == 0 {
            return Vec::new();
        }

        let mut output = vec![0.0f32; output_frames * channels];
        for i in 0..output_frames {
            let source_index = i as f64 / ratio;
            let index = source_index as usize;
            let fraction = (source_index - index as f64) as f32;

            for ch in 0..channels {
                if index + 1 < frame_count {
                    output[i * channels + ch] = samples[index * channels + ch] * (1.0 - fraction)
                        + samples[(index + 1) * channels + ch] * fraction;
                } else if index < frame_count {
                    output[i * channels + ch] = samples[index * channels + ch];
                }
            }
        }
        output
    }

    /// Gain-weighted sum of normalized inputs, clamped to `[-1.0, 1.0]`.
    ///
    /// Shorter inputs are zero-padded to the longest one.
    pub fn mix(&self, inputs: &[MixInput<'_>]) -> Vec<f32> {
        let len = inputs.iter().map(|input| input.samples.len()).max().unwrap_or(0);
        let mut output = vec![0.0f32; len];
        for input in inputs {
            for (out, &sample) in output.iter_mut().zip(input.samples) {
                *out += sample * input.gain;
            }
        }
        for sample in &mut output {
            *sample = sample.clamp(-1.0, 1.0);
        }
        output
    }

    /// Convert f32 samples `[-1.0, 1.0]` to 16-bit PCM (little-endian bytes).
    ///
    /// Clamps out-of-range values. Output length = `samples.len() * 2` bytes.
    pub fn convert_to_int16_pcm(samples: &[f32]) -> Vec<u8> {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let int16_value = (clamped * i16::MAX as f32) as i16;
            data.extend_from_slice(&int16_value.to_le_bytes());
        }
        data
    }

    /// RMS level of samples (0.0–1.0 range for normalized audio).
    pub fn rms_level(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }

    pub fn peak_level(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }
}

/// A capture class feeding the mixing stage.
pub struct MixerChannel {
    pub class: AudioSourceClass,
    pub buffer: Arc<Mutex<RingBuffer>>,
    pub gain: f32,
}

/// Clock-driven mixing stage.
///
/// On each call it emits exactly as many frames as the media clock says are
/// due, so the mixed stream stays aligned with video even when a device
/// delivers late or stops delivering. Missing input becomes silence.
pub struct MixerStage {
    mixer: AudioMixer,
    channels: Vec<MixerChannel>,
    frames_emitted: u64,
    max_batch: u64,
}

impl MixerStage {
    pub fn new(mixer: AudioMixer, channels: Vec<MixerChannel>) -> Self {
        let max_batch = mixer.target_sample_rate.max(1.0) as u64;
        Self {
            mixer,
            channels,
            frames_emitted: 0,
            max_batch,
        }
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Mix everything due up to media time `now`.
    ///
    /// Returns `None` when no frame is due. Batches are capped at one second;
    /// the remainder is emitted by the following calls.
    pub fn mix_due(&mut self, now: Duration) -> Option<AudioChunk> {
        let rate = self.mixer.target_sample_rate;
        let due_total = (now.as_secs_f64() * rate) as u64;
        let frames = due_total.saturating_sub(self.frames_emitted).min(self.max_batch);
        if frames == 0 {
            return None;
        }

        let width = self.mixer.target_channels as usize;
        let expected = frames as usize * width;
        let reads: Vec<(Vec<f32>, f32)> = self
            .channels
            .iter()
            .map(|channel| {
                let mut samples = channel.buffer.lock().read_frames(frames as usize);
                samples.resize(expected, 0.0);
                (samples, channel.gain)
            })
            .collect();
        let inputs: Vec<MixInput<'_>> = reads
            .iter()
            .map(|(samples, gain)| MixInput {
                samples,
                gain: *gain,
            })
            .collect();

        let mut samples = self.mixer.mix(&inputs);
        samples.resize(expected, 0.0);

        let pts = Duration::from_secs_f64(self.frames_emitted as f64 / rate);
        self.frames_emitted += frames;
        Some(AudioChunk {
            samples,
            sample_rate: rate as u32,
            channels: self.mixer.target_channels,
            pts,
            source: AudioSourceClass::Mixed,
        })
    }

    /// Drop buffered input, used while paused so stale audio is not mixed on resume.
    pub fn discard_pending(&mut self) {
        for channel in &self.channels {
            channel.buffer.lock().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remix_mono_to_stereo_duplicates() {
        assert_eq!(AudioMixer::remix(&[0.1, 0.2], 1, 2), vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn remix_stereo_to_mono_averages() {
        let mono = AudioMixer::remix(&[0.2, 0.4, -1.0, 1.0], 2, 1);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn remix_surround_to_stereo() {
        let stereo = AudioMixer::remix(&[0.3, 0.3, 0.3, 0.3, 0.3, 0.3], 6, 2);
        assert_eq!(stereo.len(), 2);
        assert!((stereo[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn normalize_resamples_and_remixes() {
        let mixer = AudioMixer::new(48000.0, 2);
        let out = mixer.normalize(&[0.0, 1.0], 24000.0, 1);
        // 2 mono frames at 24k become 4 stereo frames at 48k
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], out[1]);
    }

    #[test]
    fn resample_same_rate_is_passthrough() {
        let mixer = AudioMixer::new(48000.0, 2);
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(mixer.resample_interleaved(&samples, 48000.0, 2), samples);
    }

    #[test]
    fn resample_downsample() {
        let mixer = AudioMixer::new(24000.0, 1);
        let samples: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        assert_eq!(mixer.resample_interleaved(&samples, 48000.0, 1).len(), 50);
    }

    #[test]
    fn mix_applies_gain_and_clamps() {
        let mixer = AudioMixer::new(48000.0, 2);
        let a = [0.5, 0.5, 0.9];
        let b = [0.25, -0.5];
        let out = mixer.mix(&[
            MixInput { samples: &a, gain: 1.0 },
            MixInput { samples: &b, gain: 2.0 },
        ]);
        assert_eq!(out.len(), 3);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[1] + 0.5).abs() < 1e-6);
        assert!((out[2] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn convert_to_int16_pcm() {
        let pcm = AudioMixer::convert_to_int16_pcm(&[0.0, 1.0, -1.0, 2.0]);
        assert_eq!(pcm.len(), 8);
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), 0);
        assert_eq!(i16::from_le_bytes([pcm[2], pcm[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([pcm[4], pcm[5]]), -i16::MAX);
        assert_eq!(i16::from_le_bytes([pcm[6], pcm[7]]), i16::MAX);
    }

    #[test]
    fn levels() {
        assert_eq!(AudioMixer::rms_level(&[]), 0.0);
        assert!((AudioMixer::rms_level(&[1.0, -1.0]) - 1.0).abs() < 1e-6);
        assert!((AudioMixer::peak_level(&[0.1, -0.5, 0.3]) - 0.5).abs() < 1e-6);
    }

    fn channel(class: AudioSourceClass, gain: f32) -> MixerChannel {
        MixerChannel {
            class,
            buffer: Arc::new(Mutex::new(RingBuffer::new(48000, 2))),
            gain,
        }
    }

    #[test]
    fn stage_emits_frames_due_by_clock() {
        let mic = channel(AudioSourceClass::Microphone, 1.0);
        mic.buffer.lock().write(&[0.25; 200]);
        let mut stage = MixerStage::new(AudioMixer::new(1000.0, 2), vec![mic]);

        assert!(stage.mix_due(Duration::ZERO).is_none());

        let chunk = stage.mix_due(Duration::from_millis(50)).unwrap();
        assert_eq!(chunk.frame_count(), 50);
        assert_eq!(chunk.pts, Duration::ZERO);
        assert!(chunk.samples.iter().all(|s| (*s - 0.25).abs() < 1e-6));

        let chunk = stage.mix_due(Duration::from_millis(120)).unwrap();
        assert_eq!(chunk.frame_count(), 70);
        assert_eq!(chunk.pts, Duration::from_millis(50));
        assert_eq!(stage.frames_emitted(), 120);
    }

    #[test]
    fn stage_pads_starved_input_with_silence() {
        let mic = channel(AudioSourceClass::Microphone, 1.0);
        let system = channel(AudioSourceClass::System, 0.5);
        mic.buffer.lock().write(&[0.5, 0.5]);
        system.buffer.lock().write(&[0.4; 8]);
        let mut stage = MixerStage::new(AudioMixer::new(1000.0, 2), vec![mic, system]);

        let chunk = stage.mix_due(Duration::from_millis(10)).unwrap();
        assert_eq!(chunk.samples.len(), 20);
        assert!((chunk.samples[0] - 0.7).abs() < 1e-6);
        assert!((chunk.samples[2] - 0.2).abs() < 1e-6);
        assert_eq!(chunk.samples[19], 0.0);
    }

    #[test]
    fn discard_clears_buffers() {
        let mic = channel(AudioSourceClass::Microphone, 1.0);
        let buffer = Arc::clone(&mic.buffer);
        buffer.lock().write(&[0.5; 10]);
        let mut stage = MixerStage::new(AudioMixer::new(1000.0, 2), vec![mic]);
        stage.discard_pending();
        assert!(buffer.lock().is_empty());
    }
}
