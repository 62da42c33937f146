use image::RgbaImage;

use crate::models::config::{BitrateMode, EncoderProfile};
use crate::models::error::RecorderError;
use crate::models::geometry::Size;

/// Parameters an encoder is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub size: Size,
    pub frame_rate: u32,
    pub bitrate: BitrateMode,
    pub profile: EncoderProfile,
    pub low_latency: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub keyframe: bool,
}

/// Turns composed canvases into coded samples.
pub trait VideoEncoder: Send {
    /// Name recorded in metadata and logs.
    fn name(&self) -> &str;

    /// Four-character codec tag written into the track header.
    fn codec(&self) -> [u8; 4];

    fn encode(&mut self, frame: &RgbaImage) -> Result<EncodedFrame, RecorderError>;
}

/// A hardware-accelerated encoder implementation.
///
/// Shared between sessions; concurrent use is bounded by `EncoderResources`.
pub trait HardwareEncoderBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn supports_profile(&self, profile: EncoderProfile) -> bool;

    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>, RecorderError>;
}
