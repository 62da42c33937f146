pub mod audio;
pub mod camera;
pub mod display;
pub mod feed;
pub(crate) mod pacing;
pub mod registry;
pub mod static_image;
pub mod video_file;
pub mod virtual_devices;
pub mod window;

use crate::models::error::RecorderError;
use crate::models::source::{CaptureSourceDescriptor, SourceHandle, SourceKind};
use crate::traits::capture_source::CaptureSource;
use crate::traits::device_provider::DeviceProvider;

/// Build the runtime source for a descriptor. Nothing is started yet.
///
/// `frame_rate` paces sources that have no clock of their own (files and
/// still images).
pub fn open_source(
    descriptor: &CaptureSourceDescriptor,
    devices: &dyn DeviceProvider,
    frame_rate: u32,
) -> Result<Box<dyn CaptureSource>, RecorderError> {
    let descriptor = descriptor.clone();
    match (descriptor.kind, &descriptor.handle) {
        (SourceKind::Display, SourceHandle::Device(id)) => {
            let backend = devices.open_screen(SourceKind::Display, id)?;
            Ok(Box::new(display::DisplaySource::new(descriptor, backend)))
        }
        (SourceKind::Window, SourceHandle::Device(id)) => {
            let backend = devices.open_screen(SourceKind::Window, id)?;
            Ok(Box::new(window::WindowSource::new(descriptor, backend)))
        }
        (SourceKind::Camera, SourceHandle::Device(id)) => {
            let device = devices.open_camera(id)?;
            Ok(Box::new(camera::CameraSource::new(descriptor, device)))
        }
        (SourceKind::VideoFile, SourceHandle::Path(path)) => {
            let path = path.clone();
            Ok(Box::new(video_file::VideoFileSource::new(descriptor, path, frame_rate)))
        }
        (SourceKind::StaticImage, SourceHandle::Path(path)) => {
            let path = path.clone();
            Ok(Box::new(static_image::StaticImageSource::new(descriptor, path, frame_rate)))
        }
        (kind, handle) => Err(RecorderError::Configuration(format!(
            "{} source cannot be opened from {:?}",
            kind.as_str(),
            handle
        ))),
    }
}
