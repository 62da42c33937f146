use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};

use crate::models::device::{DeviceInfo, DeviceKind};
use crate::models::error::RecorderError;
use crate::models::frame::AudioSourceClass;
use crate::models::geometry::Size;
use crate::models::source::SourceKind;
use crate::sources::feed::SourceFeed;
use crate::sources::pacing::Pacer;
use crate::traits::capture_provider::{AudioBufferCallback, AudioFault, AudioProvider};
use crate::traits::device_provider::DeviceProvider;
use crate::traits::video_backend::{CameraDevice, ScreenBackend};

/// A synthetic display, window or camera.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualScreen {
    pub id: String,
    pub label: String,
    pub size: Size,
    pub frame_rate: u32,
    /// Report the device lost this long after it starts.
    pub fail_after: Option<Duration>,
    /// Refuse to open at all.
    pub unavailable: bool,
    /// Open normally but never produce a frame.
    pub stalled: bool,
}

impl VirtualScreen {
    pub fn new(id: impl Into<String>, size: Size) -> Self {
        let id = id.into();
        Self {
            label: format!("Virtual {}", id),
            id,
            size,
            frame_rate: 30,
            fail_after: None,
            unavailable: false,
            stalled: false,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn fail_after(mut self, after: Duration) -> Self {
        self.fail_after = Some(after);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.clamp(1, 240) as f64)
    }

    fn info(&self, kind: DeviceKind, is_default: bool) -> DeviceInfo {
        DeviceInfo {
            id: self.id.clone(),
            label: self.label.clone(),
            kind,
            is_default,
            native_size: Some(self.size),
        }
    }
}

/// A synthetic audio device producing a sine tone.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualAudio {
    pub id: String,
    pub label: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub frequency: f32,
    pub amplitude: f32,
    /// Report the device lost this long after it starts.
    pub fail_after: Option<Duration>,
    pub unavailable: bool,
}

impl VirtualAudio {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: format!("Virtual {}", id),
            id,
            sample_rate: 48000,
            channels: 1,
            frequency: 440.0,
            amplitude: 0.25,
            fail_after: None,
            unavailable: false,
        }
    }

    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    pub fn with_tone(mut self, frequency: f32, amplitude: f32) -> Self {
        self.frequency = frequency;
        self.amplitude = amplitude;
        self
    }

    pub fn fail_after(mut self, after: Duration) -> Self {
        self.fail_after = Some(after);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

/// In-process device set for headless machines and tests.
///
/// Every backend renders `test_pattern` frames or a sine tone in real time.
#[derive(Debug, Clone, Default)]
pub struct VirtualDevices {
    displays: Vec<VirtualScreen>,
    windows: Vec<VirtualScreen>,
    cameras: Vec<VirtualScreen>,
    microphones: Vec<VirtualAudio>,
    system_audio: Vec<VirtualAudio>,
}

impl VirtualDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// One 640x360 display, one camera, a microphone and system audio.
    pub fn standard() -> Self {
        Self::new()
            .with_display(VirtualScreen::new("display-0", Size::new(640, 360)))
            .with_camera(VirtualScreen::new("camera-0", Size::new(320, 240)))
            .with_microphone(VirtualAudio::new("mic-0"))
            .with_system_audio(VirtualAudio::new("speakers-0").with_format(44100, 2).with_tone(220.0, 0.2))
    }

    pub fn with_display(mut self, display: VirtualScreen) -> Self {
        self.displays.push(display);
        self
    }

    pub fn with_window(mut self, window: VirtualScreen) -> Self {
        self.windows.push(window);
        self
    }

    pub fn with_camera(mut self, camera: VirtualScreen) -> Self {
        self.cameras.push(camera);
        self
    }

    pub fn with_microphone(mut self, microphone: VirtualAudio) -> Self {
        self.microphones.push(microphone);
        self
    }

    pub fn with_system_audio(mut self, output: VirtualAudio) -> Self {
        self.system_audio.push(output);
        self
    }

    fn find<'a>(list: &'a [VirtualScreen], what: &str, id: &str) -> Result<&'a VirtualScreen, RecorderError> {
        let screen = list
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| RecorderError::SourceUnavailable(format!("no {} named {}", what, id)))?;
        if screen.unavailable {
            return Err(RecorderError::SourceUnavailable(format!("{} {} is unavailable", what, id)));
        }
        Ok(screen)
    }
}

impl DeviceProvider for VirtualDevices {
    fn devices(&self) -> Vec<DeviceInfo> {
        let mut devices = Vec::new();
        for (list, kind) in [
            (&self.displays, DeviceKind::Display),
            (&self.windows, DeviceKind::Window),
            (&self.cameras, DeviceKind::Camera),
        ] {
            devices.extend(list.iter().enumerate().map(|(i, s)| s.info(kind, i == 0)));
        }
        for (list, kind) in [
            (&self.microphones, DeviceKind::Microphone),
            (&self.system_audio, DeviceKind::SystemAudio),
        ] {
            devices.extend(list.iter().enumerate().map(|(i, a)| DeviceInfo {
                is_default: i == 0,
                ..DeviceInfo::new(a.id.clone(), a.label.clone(), kind)
            }));
        }
        devices
    }

    fn open_screen(&self, kind: SourceKind, device_id: &str) -> Result<Box<dyn ScreenBackend>, RecorderError> {
        let screen = match kind {
            SourceKind::Display => Self::find(&self.displays, "display", device_id)?,
            SourceKind::Window => Self::find(&self.windows, "window", device_id)?,
            other => {
                return Err(RecorderError::Configuration(format!(
                    "{} is not a screen source",
                    other.as_str()
                )))
            }
        };
        Ok(Box::new(PatternScreen {
            spec: screen.clone(),
            pacer: None,
        }))
    }

    fn open_camera(&self, device_id: &str) -> Result<Box<dyn CameraDevice>, RecorderError> {
        let camera = Self::find(&self.cameras, "camera", device_id)?;
        Ok(Box::new(PatternCamera {
            spec: camera.clone(),
            opened_at: None,
            frame_index: 0,
        }))
    }

    fn open_audio(
        &self,
        class: AudioSourceClass,
        device_id: Option<&str>,
    ) -> Result<Box<dyn AudioProvider>, RecorderError> {
        let list = match class {
            AudioSourceClass::Microphone => &self.microphones,
            _ => &self.system_audio,
        };
        let device = match device_id {
            Some(id) => list.iter().find(|a| a.id == id),
            None => list.first(),
        }
        .ok_or_else(|| {
            RecorderError::SourceUnavailable(format!(
                "no {:?} audio device{}",
                class,
                device_id.map(|id| format!(" named {}", id)).unwrap_or_default()
            ))
        })?;
        Ok(Box::new(ToneGenerator {
            spec: device.clone(),
            class,
            pacer: None,
        }))
    }
}

/// Deterministic moving test image: a gradient, a vertical bar that moves
/// one step per frame, and per-pixel noise seeded by `seed`.
pub fn test_pattern(size: Size, frame_index: u64, seed: u32) -> RgbaImage {
    let (w, h) = (size.width.max(1), size.height.max(1));
    let bar_width = (w / 16).max(1);
    let bar_x = ((frame_index * 4) % w as u64) as u32;
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(frame_index as u32);

    RgbaImage::from_fn(w, h, |x, y| {
        // Numerical Recipes LCG
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let noise = (state >> 24) as u8 / 4;

        if x >= bar_x && x < bar_x + bar_width {
            return Rgba([255, 255, 255, 255]);
        }
        let r = (x * 255 / w) as u8;
        let g = (y * 255 / h) as u8;
        let b = (seed % 256) as u8;
        Rgba([r.saturating_add(noise), g.saturating_add(noise), b ^ noise, 255])
    })
}

fn seed_for(id: &str) -> u32 {
    // FNV-1a
    id.bytes()
        .fold(2_166_136_261u32, |h, b| (h ^ b as u32).wrapping_mul(16_777_619))
}

struct PatternScreen {
    spec: VirtualScreen,
    pacer: Option<Pacer>,
}

impl ScreenBackend for PatternScreen {
    fn native_size(&self) -> Option<Size> {
        Some(self.spec.size)
    }

    fn start(&mut self, feed: SourceFeed) -> Result<(), RecorderError> {
        if self.pacer.is_some() {
            return Ok(());
        }
        let size = self.spec.size;
        let fail_after = self.spec.fail_after;
        let stalled = self.spec.stalled;
        let seed = seed_for(&self.spec.id);
        let mut frame_index = 0u64;
        self.pacer = Some(Pacer::spawn(
            format!("virtual-{}", self.spec.id),
            self.spec.period(),
            move |elapsed| {
                if fail_after.is_some_and(|after| elapsed >= after) {
                    feed.report_lost("virtual device disconnected");
                    return false;
                }
                if stalled {
                    return true;
                }
                feed.push_frame(test_pattern(size, frame_index, seed));
                frame_index += 1;
                true
            },
        )?);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        if let Some(mut pacer) = self.pacer.take() {
            pacer.stop();
        }
        Ok(())
    }
}

struct PatternCamera {
    spec: VirtualScreen,
    opened_at: Option<Instant>,
    frame_index: u64,
}

impl CameraDevice for PatternCamera {
    fn open(&mut self) -> Result<Size, RecorderError> {
        self.opened_at = Some(Instant::now());
        self.frame_index = 0;
        Ok(self.spec.size)
    }

    fn native_frame_rate(&self) -> f64 {
        self.spec.frame_rate as f64
    }

    fn poll_frame(&mut self) -> Result<Option<RgbaImage>, RecorderError> {
        let Some(opened_at) = self.opened_at else {
            return Err(RecorderError::SourceUnavailable(format!("camera {} is not open", self.spec.id)));
        };
        if self.spec.fail_after.is_some_and(|after| opened_at.elapsed() >= after) {
            return Err(RecorderError::SourceUnavailable(format!(
                "camera {} disconnected",
                self.spec.id
            )));
        }
        if self.spec.stalled {
            return Ok(None);
        }
        let image = test_pattern(self.spec.size, self.frame_index, seed_for(&self.spec.id));
        self.frame_index += 1;
        Ok(Some(image))
    }

    fn close(&mut self) {
        self.opened_at = None;
    }
}

/// Buffer length the tone generator delivers per callback.
const TONE_BUFFER: Duration = Duration::from_millis(10);

/// Sine generator standing in for a microphone or loopback device.
pub struct ToneGenerator {
    spec: VirtualAudio,
    class: AudioSourceClass,
    pacer: Option<Pacer>,
}

impl AudioProvider for ToneGenerator {
    fn is_available(&self) -> bool {
        !self.spec.unavailable
    }

    fn start(&mut self, callback: AudioBufferCallback, fault: AudioFault) -> Result<(), RecorderError> {
        if self.pacer.is_some() {
            return Ok(());
        }
        if self.spec.unavailable {
            return Err(RecorderError::SourceUnavailable(format!("{} is unavailable", self.spec.label)));
        }
        let rate = self.spec.sample_rate.max(1);
        let channels = self.spec.channels.max(1);
        let step = TAU * self.spec.frequency / rate as f32;
        let amplitude = self.spec.amplitude;
        let fail_after = self.spec.fail_after;
        let label = self.spec.label.clone();
        let mut phase = 0f32;
        let mut emitted = 0u64;

        self.pacer = Some(Pacer::spawn(
            format!("tone-{:?}", self.class).to_lowercase(),
            TONE_BUFFER,
            move |elapsed| {
                if fail_after.is_some_and(|after| elapsed >= after) {
                    fault.report(RecorderError::SourceUnavailable(format!("{} disconnected", label)));
                    return false;
                }
                // deliver whatever real time has elapsed so the stream never drifts
                let due = (elapsed.as_secs_f64() * rate as f64) as u64;
                let frames = due.saturating_sub(emitted) as usize;
                if frames == 0 {
                    return true;
                }
                let mut samples = Vec::with_capacity(frames * channels as usize);
                for _ in 0..frames {
                    let value = phase.sin() * amplitude;
                    phase = (phase + step) % TAU;
                    samples.extend(std::iter::repeat(value).take(channels as usize));
                }
                emitted += frames as u64;
                callback(&samples, rate as f64, channels);
                true
            },
        )?);
        log::debug!("tone generator {} started", self.spec.id);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        if let Some(mut pacer) = self.pacer.take() {
            pacer.stop();
        }
        Ok(())
    }

    fn device_info(&self) -> DeviceInfo {
        let kind = match self.class {
            AudioSourceClass::Microphone => DeviceKind::Microphone,
            _ => DeviceKind::SystemAudio,
        };
        DeviceInfo::new(self.spec.id.clone(), self.spec.label.clone(), kind)
    }
}
