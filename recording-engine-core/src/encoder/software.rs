use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage, RgbaImage};

use crate::encoder::container::CODEC_JPEG;
use crate::encoder::rate_control::RateController;
use crate::models::error::RecorderError;
use crate::models::geometry::Size;
use crate::traits::video_encoder::{EncodedFrame, EncoderSettings, VideoEncoder};

pub const SOFTWARE_ENCODER_NAME: &str = "software-jpeg";

/// Intra-only software encoder: every frame is a standalone JPEG.
///
/// Each sample decodes on its own, so fragments and truncated progressive
/// files stay readable up to the last complete sample.
pub struct SoftwareJpegEncoder {
    size: Size,
    rate: RateController,
}

impl SoftwareJpegEncoder {
    pub fn new(settings: &EncoderSettings) -> Self {
        Self {
            size: settings.size,
            rate: RateController::new(settings.bitrate, settings.frame_rate),
        }
    }

    pub fn quality(&self) -> u8 {
        self.rate.quality()
    }
}

impl VideoEncoder for SoftwareJpegEncoder {
    fn name(&self) -> &str {
        SOFTWARE_ENCODER_NAME
    }

    fn codec(&self) -> [u8; 4] {
        CODEC_JPEG
    }

    fn encode(&mut self, frame: &RgbaImage) -> Result<EncodedFrame, RecorderError> {
        if frame.dimensions() != (self.size.width, self.size.height) {
            return Err(RecorderError::Encoder(format!(
                "frame is {}x{}, encoder was opened for {}x{}",
                frame.width(),
                frame.height(),
                self.size.width,
                self.size.height
            )));
        }

        let rgb: RgbImage = frame.convert();
        let mut data = Vec::with_capacity((rgb.width() * rgb.height() / 8) as usize);
        JpegEncoder::new_with_quality(&mut data, self.rate.quality())
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(|e| RecorderError::Encoder(format!("JPEG encoding failed: {}", e)))?;

        self.rate.observe(data.len());
        Ok(EncodedFrame { data, keyframe: true })
    }
}
