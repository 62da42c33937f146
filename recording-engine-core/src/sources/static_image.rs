use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::models::error::RecorderError;
use crate::models::frame::Frame;
use crate::models::geometry::Size;
use crate::models::source::CaptureSourceDescriptor;
use crate::sources::feed::SourceFeed;
use crate::sources::pacing::Pacer;
use crate::traits::capture_source::CaptureSource;

/// A still image re-stamped at the output frame rate.
///
/// The file is decoded once at start; every tick pushes the same shared
/// buffer, so the compositor's scaled copy is reused.
pub struct StaticImageSource {
    descriptor: CaptureSourceDescriptor,
    path: PathBuf,
    period: Duration,
    feed: SourceFeed,
    native: Option<Size>,
    pacer: Option<Pacer>,
}

impl StaticImageSource {
    pub fn new(descriptor: CaptureSourceDescriptor, path: PathBuf, frame_rate: u32) -> Self {
        let feed = SourceFeed::new(descriptor.id);
        Self {
            descriptor,
            path,
            period: Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64),
            feed,
            native: None,
            pacer: None,
        }
    }
}

impl CaptureSource for StaticImageSource {
    fn descriptor(&self) -> &CaptureSourceDescriptor {
        &self.descriptor
    }

    fn native_size(&self) -> Option<Size> {
        self.native
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        if self.pacer.is_some() {
            return Ok(());
        }
        let image = image::open(&self.path)
            .map_err(|e| {
                RecorderError::SourceUnavailable(format!("failed to load image {}: {}", self.path.display(), e))
            })?
            .to_rgba8();
        self.native = Some(Size::new(image.width(), image.height()));
        log::info!(
            "starting static image {} from {} ({}x{})",
            self.descriptor.id,
            self.path.display(),
            image.width(),
            image.height()
        );

        let image = Arc::new(image);
        let feed = self.feed.clone();
        feed.clear();
        self.pacer = Some(Pacer::spawn(
            format!("image-{}", self.descriptor.id.0),
            self.period,
            move |_| {
                feed.push_shared(Arc::clone(&image));
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

    fn latest_frame(&self) -> Option<Frame> {
        self.feed.latest()
    }

    fn take_fault(&self) -> Option<RecorderError> {
        self.feed.take_fault()
    }

    fn is_running(&self) -> bool {
        self.pacer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::SourceKind;
    use image::{Rgba, RgbaImage};
    use std::thread;

    #[test]
    fn pushes_the_decoded_image_repeatedly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        RgbaImage::from_pixel(12, 8, Rgba([10, 20, 30, 255])).save(&path).unwrap();

        let descriptor = CaptureSourceDescriptor::file(SourceKind::StaticImage, &path);
        let mut source = StaticImageSource::new(descriptor, path, 50);
        source.start().unwrap();
        thread::sleep(Duration::from_millis(80));

        let first = source.latest_frame().unwrap();
        thread::sleep(Duration::from_millis(50));
        let later = source.latest_frame().unwrap();
        source.stop().unwrap();

        assert_eq!(source.native_size(), Some(Size::new(12, 8)));
        assert!(later.sequence > first.sequence);
        assert!(Arc::ptr_eq(&first.image, &later.image));
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let descriptor = CaptureSourceDescriptor::file(SourceKind::StaticImage, "/nonexistent/logo.png");
        let mut source = StaticImageSource::new(descriptor, PathBuf::from("/nonexistent/logo.png"), 30);
        assert!(matches!(source.start(), Err(RecorderError::SourceUnavailable(_))));
    }
}
