use crate::models::error::RecorderError;
use crate::models::frame::Frame;
use crate::models::geometry::Size;
use crate::models::source::CaptureSourceDescriptor;
use crate::sources::display::PushedCapture;
use crate::traits::capture_source::CaptureSource;
use crate::traits::video_backend::ScreenBackend;

/// Capture of a single application window.
///
/// Window frames change size when the user resizes the window; auto
/// placements keep filling their slot because the source rect follows the
/// frame. A closed window surfaces as a fault from the backend.
pub struct WindowSource {
    descriptor: CaptureSourceDescriptor,
    capture: PushedCapture,
}

impl WindowSource {
    pub fn new(descriptor: CaptureSourceDescriptor, backend: Box<dyn ScreenBackend>) -> Self {
        let capture = PushedCapture::new(&descriptor, backend);
        Self { descriptor, capture }
    }
}

impl CaptureSource for WindowSource {
    fn descriptor(&self) -> &CaptureSourceDescriptor {
        &self.descriptor
    }

    fn native_size(&self) -> Option<Size> {
        self.capture.native_size()
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        log::info!("starting window capture {} ({})", self.descriptor.id, self.descriptor.label);
        self.capture.start()
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        self.capture.stop()
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.capture.feed().latest()
    }

    fn take_fault(&self) -> Option<RecorderError> {
        self.capture.feed().take_fault()
    }

    fn is_running(&self) -> bool {
        self.capture.is_running()
    }
}
