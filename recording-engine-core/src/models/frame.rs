use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::geometry::Size;
use super::source::SourceId;

/// One captured image from a single source.
///
/// The pixel buffer is shared, so handing a frame to the compositor or a
/// snapshot writer never copies pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbaImage>,
    pub captured_at: Instant,
    pub source: SourceId,
    /// Monotonic per source; lets consumers tell a new frame from a re-read.
    pub sequence: u64,
}

impl Frame {
    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

/// A full output canvas ready for encoding.
#[derive(Debug, Clone)]
pub struct ComposedFrame {
    pub image: Arc<RgbaImage>,
    /// Presentation time on the session media clock.
    pub pts: Duration,
    pub sequence: u64,
}

impl ComposedFrame {
    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSourceClass {
    Microphone,
    System,
    Mixed,
}

/// Interleaved f32 PCM with its timing.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub pts: Duration,
    pub source: AudioSourceClass,
}

impl AudioChunk {
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate.max(1) as f64)
    }
}
