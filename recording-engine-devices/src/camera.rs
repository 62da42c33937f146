//! Camera capture through nokhwa.

use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

use recording_engine_core::models::device::{DeviceInfo, DeviceKind};
use recording_engine_core::models::error::RecorderError;
use recording_engine_core::models::geometry::Size;
use recording_engine_core::traits::video_backend::CameraDevice;

fn index_id(index: &CameraIndex) -> String {
    match index {
        CameraIndex::Index(i) => i.to_string(),
        CameraIndex::String(s) => s.clone(),
    }
}

pub fn list_cameras() -> Vec<DeviceInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .enumerate()
            .map(|(position, camera)| {
                let mut info = DeviceInfo::new(index_id(camera.index()), camera.human_name(), DeviceKind::Camera);
                info.is_default = position == 0;
                info
            })
            .collect(),
        Err(e) => {
            log::warn!("failed to enumerate cameras: {}", e);
            Vec::new()
        }
    }
}

fn lost(e: nokhwa::NokhwaError) -> RecorderError {
    RecorderError::SourceUnavailable(format!("camera error: {}", e))
}

/// A nokhwa camera, opened lazily on the capture thread.
pub struct NokhwaCamera {
    index: CameraIndex,
    camera: Option<Camera>,
}

// SAFETY: `camera` is `Some` only between `open` and `close`. The camera
// source runs both, and every poll in between, on its capture thread, so
// the device only crosses threads while it holds no nokhwa handle.
unsafe impl Send for NokhwaCamera {}

impl NokhwaCamera {
    pub fn new(device_id: &str) -> Self {
        let index = match device_id.parse::<u32>() {
            Ok(i) => CameraIndex::Index(i),
            Err(_) => CameraIndex::String(device_id.to_string()),
        };
        Self { index, camera: None }
    }
}

impl CameraDevice for NokhwaCamera {
    fn open(&mut self) -> Result<Size, RecorderError> {
        let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(self.index.clone(), format).map_err(lost)?;
        camera.open_stream().map_err(lost)?;
        let resolution = camera.resolution();
        log::info!(
            "camera {} opened at {}x{} {} fps",
            index_id(&self.index),
            resolution.width(),
            resolution.height(),
            camera.frame_rate()
        );
        self.camera = Some(camera);
        Ok(Size::new(resolution.width(), resolution.height()))
    }

    fn native_frame_rate(&self) -> f64 {
        self.camera.as_ref().map_or(30.0, |c| c.frame_rate() as f64)
    }

    fn poll_frame(&mut self) -> Result<Option<RgbaImage>, RecorderError> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| RecorderError::SourceUnavailable("camera is not open".into()))?;
        let buffer = camera.frame().map_err(lost)?;
        let decoded = buffer.decode_image::<RgbAFormat>().map_err(lost)?;
        let (width, height) = (decoded.width(), decoded.height());
        Ok(RgbaImage::from_raw(width, height, decoded.into_raw()))
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                log::warn!("failed to stop camera {}: {}", index_id(&self.index), e);
            }
        }
    }
}
