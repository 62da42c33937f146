use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::geometry::{CropRect, Size};

/// What a session produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderMode {
    /// Encoded video container, optionally with periodic snapshots.
    #[default]
    Video,
    /// One numbered still per interval into a directory, no container.
    Slideshow,
    /// A single still per `record()` call.
    Snapshot,
}

/// Video rate-control policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitrateMode {
    /// Fixed target in bits per second.
    Constant { bits_per_second: u32 },
    /// Best quality the encoder offers, no rate constraint.
    UnconstrainedVariable,
    /// Quality target, 0 (smallest) to 100 (best).
    Quality(u8),
}

impl Default for BitrateMode {
    fn default() -> Self {
        Self::Quality(70)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderProfile {
    Baseline,
    #[default]
    Main,
    High,
}

impl EncoderProfile {
    pub fn code(&self) -> u8 {
        match self {
            Self::Baseline => 0,
            Self::Main => 1,
            Self::High => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Baseline),
            1 => Some(Self::Main),
            2 => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramerateMode {
    /// Frames leave the encoder on a strict clock; the last frame is repeated
    /// when nothing new was composed.
    #[default]
    Fixed,
    /// Frames are encoded as composed and keep their true timestamps.
    Variable,
}

/// How the session treats hardware-accelerated encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwarePolicy {
    /// Software encoder only.
    Disabled,
    /// Try hardware, fall back to software when it is unavailable.
    #[default]
    Preferred,
    /// Hardware or fail with an encoder error.
    Required,
}

/// Still image format for snapshots and slideshows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StillFormat {
    #[default]
    Png,
    Jpeg { quality: u8 },
    Bmp,
}

impl StillFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
            Self::Bmp => "bmp",
        }
    }
}

/// Where container metadata lives relative to the sample payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerLayout {
    /// `ftyp mdat moov`, mdat size patched by seeking back.
    Progressive,
    /// `ftyp moov mdat`, payload spooled and copied after the metadata.
    FastStart,
    /// `ftyp moov` followed by self-contained `moof mdat` segments.
    Fragmented,
}

impl ContainerLayout {
    pub fn code(&self) -> u8 {
        match self {
            Self::Progressive => 0,
            Self::FastStart => 1,
            Self::Fragmented => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Progressive),
            1 => Some(Self::FastStart),
            2 => Some(Self::Fragmented),
            _ => None,
        }
    }
}

/// Audio capture and mixing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOptions {
    /// Capture the input (microphone) device class.
    pub capture_microphone: bool,

    /// Capture the output/loopback device class.
    pub capture_system_audio: bool,

    /// Specific microphone device ID, or None for the default device.
    pub microphone_device_id: Option<String>,

    /// Specific output device ID for loopback, or None for the default device.
    pub system_device_id: Option<String>,

    /// Linear gain applied to the microphone before mixing.
    pub microphone_gain: f32,

    /// Linear gain applied to system audio before mixing.
    pub system_gain: f32,

    /// Mixed output sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// Mixed output channel count (default: 2).
    pub channels: u16,
}

impl AudioOptions {
    pub fn any_enabled(&self) -> bool {
        self.capture_microphone || self.capture_system_audio
    }
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            capture_microphone: false,
            capture_system_audio: false,
            microphone_device_id: None,
            system_device_id: None,
            microphone_gain: 1.0,
            system_gain: 1.0,
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// Periodic still export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotOptions {
    /// Export stills while recording video. Slideshow and snapshot modes
    /// always use the scheduler regardless of this flag.
    pub enabled: bool,

    /// Time between two stills, measured on session media time.
    pub interval: Duration,

    pub format: StillFormat,

    /// Destination for video-mode snapshots. Slideshow and snapshot modes
    /// write into the directory sink instead.
    pub directory: Option<PathBuf>,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(5),
            format: StillFormat::Png,
            directory: None,
        }
    }
}

/// Configuration snapshot for one recording session.
///
/// Immutable once handed to `record()`; a new session takes a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderOptions {
    pub mode: RecorderMode,

    pub bitrate: BitrateMode,

    pub profile: EncoderProfile,

    pub framerate_mode: FramerateMode,

    /// Target output frames per second (default: 30).
    pub frame_rate: u32,

    pub hardware: HardwarePolicy,

    /// Flush every encoded frame to the sink as soon as it is written.
    pub low_latency: bool,

    /// Write self-contained segments suitable for non-seekable sinks.
    pub fragmented: bool,

    /// Place container metadata ahead of the sample payload.
    pub fast_start: bool,

    /// Region of the composed canvas that becomes the output canvas.
    pub crop: Option<CropRect>,

    /// Composition canvas size; defaults to the base source's native size.
    pub canvas_size: Option<Size>,

    pub audio: AudioOptions,

    pub snapshot: SnapshotOptions,

    /// How long an enabled source may go without its first frame.
    pub first_frame_timeout: Duration,

    /// Segment length in fragmented mode.
    pub fragment_duration: Duration,

    /// Write a `.metadata.json` sidecar next to file outputs.
    pub write_metadata: bool,
}

impl RecorderOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.frame_rate == 0 || self.frame_rate > 240 {
            return Err(format!("unsupported frame rate: {}", self.frame_rate));
        }
        match self.bitrate {
            BitrateMode::Quality(q) if q > 100 => {
                return Err(format!("quality must be within 0..=100, got {}", q));
            }
            BitrateMode::Constant { bits_per_second: 0 } => {
                return Err("constant bitrate must be positive".into());
            }
            _ => {}
        }
        if self.fragmented && self.fast_start {
            return Err("fragmented and fast-start container layouts are mutually exclusive".into());
        }
        if let Some(crop) = &self.crop {
            crop.validate()?;
        }
        if let Some(size) = &self.canvas_size {
            if size.is_empty() {
                return Err("canvas size must be non-empty".into());
            }
        }
        for (name, gain) in [
            ("microphone", self.audio.microphone_gain),
            ("system", self.audio.system_gain),
        ] {
            if !gain.is_finite() || gain < 0.0 {
                return Err(format!("invalid {} gain: {}", name, gain));
            }
        }
        if self.audio.sample_rate == 0 {
            return Err("audio sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.audio.channels) {
            return Err(format!("unsupported channel count: {}", self.audio.channels));
        }
        let needs_interval = match self.mode {
            RecorderMode::Video => self.snapshot.enabled,
            RecorderMode::Slideshow => true,
            RecorderMode::Snapshot => false,
        };
        if needs_interval && self.snapshot.interval.is_zero() {
            return Err("snapshot interval must be positive".into());
        }
        if self.mode == RecorderMode::Video && self.snapshot.enabled && self.snapshot.directory.is_none() {
            return Err("snapshots in video mode need a snapshot directory".into());
        }
        if let StillFormat::Jpeg { quality } = self.snapshot.format {
            if quality == 0 || quality > 100 {
                return Err(format!("jpeg still quality must be within 1..=100, got {}", quality));
            }
        }
        if self.first_frame_timeout.is_zero() {
            return Err("first frame timeout must be positive".into());
        }
        if self.fragmented && self.fragment_duration.is_zero() {
            return Err("fragment duration must be positive".into());
        }
        Ok(())
    }

    pub fn container_layout(&self) -> ContainerLayout {
        if self.fragmented {
            ContainerLayout::Fragmented
        } else if self.fast_start {
            ContainerLayout::FastStart
        } else {
            ContainerLayout::Progressive
        }
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            mode: RecorderMode::Video,
            bitrate: BitrateMode::default(),
            profile: EncoderProfile::default(),
            framerate_mode: FramerateMode::Fixed,
            frame_rate: 30,
            hardware: HardwarePolicy::Preferred,
            low_latency: false,
            fragmented: false,
            fast_start: false,
            crop: None,
            canvas_size: None,
            audio: AudioOptions::default(),
            snapshot: SnapshotOptions::default(),
            first_frame_timeout: Duration::from_secs(5),
            fragment_duration: Duration::from_secs(1),
            write_metadata: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RecorderOptions::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let options = RecorderOptions {
            bitrate: BitrateMode::Quality(101),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn rejects_contradictory_layouts() {
        let options = RecorderOptions {
            fragmented: true,
            fast_start: true,
            ..Default::default()
        };
        assert!(options.validate().unwrap_err().contains("mutually exclusive"));
    }

    #[test]
    fn video_snapshots_need_a_directory() {
        let mut options = RecorderOptions::default();
        options.snapshot.enabled = true;
        assert!(options.validate().is_err());

        options.snapshot.directory = Some(PathBuf::from("/tmp/shots"));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn rejects_negative_gain() {
        let mut options = RecorderOptions::default();
        options.audio.system_gain = -0.5;
        assert!(options.validate().is_err());
    }

    #[test]
    fn layout_follows_flags() {
        let mut options = RecorderOptions::default();
        assert_eq!(options.container_layout(), ContainerLayout::Progressive);
        options.fast_start = true;
        assert_eq!(options.container_layout(), ContainerLayout::FastStart);
        options.fast_start = false;
        options.fragmented = true;
        assert_eq!(options.container_layout(), ContainerLayout::Fragmented);
    }
}
