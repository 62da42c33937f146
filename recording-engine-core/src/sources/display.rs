use crate::models::error::RecorderError;
use crate::models::frame::Frame;
use crate::models::geometry::Size;
use crate::models::source::CaptureSourceDescriptor;
use crate::sources::feed::SourceFeed;
use crate::traits::capture_source::CaptureSource;
use crate::traits::video_backend::ScreenBackend;

/// Glue between a push-driven screen backend and the source surface.
pub(crate) struct PushedCapture {
    backend: Box<dyn ScreenBackend>,
    feed: SourceFeed,
    running: bool,
}

impl PushedCapture {
    pub(crate) fn new(descriptor: &CaptureSourceDescriptor, backend: Box<dyn ScreenBackend>) -> Self {
        Self {
            backend,
            feed: SourceFeed::new(descriptor.id),
            running: false,
        }
    }

    pub(crate) fn start(&mut self) -> Result<(), RecorderError> {
        if self.running {
            return Ok(());
        }
        self.feed.clear();
        self.backend.start(self.feed.clone())?;
        self.running = true;
        Ok(())
    }

    pub(crate) fn stop(&mut self) -> Result<(), RecorderError> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        self.backend.stop()
    }

    pub(crate) fn native_size(&self) -> Option<Size> {
        self.backend
            .native_size()
            .or_else(|| self.feed.latest().map(|frame| frame.size()))
    }

    pub(crate) fn feed(&self) -> &SourceFeed {
        &self.feed
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for PushedCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Full-screen capture of one monitor.
pub struct DisplaySource {
    descriptor: CaptureSourceDescriptor,
    capture: PushedCapture,
}

impl DisplaySource {
    pub fn new(descriptor: CaptureSourceDescriptor, backend: Box<dyn ScreenBackend>) -> Self {
        let capture = PushedCapture::new(&descriptor, backend);
        Self { descriptor, capture }
    }
}

impl CaptureSource for DisplaySource {
    fn descriptor(&self) -> &CaptureSourceDescriptor {
        &self.descriptor
    }

    fn native_size(&self) -> Option<Size> {
        self.capture.native_size()
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        log::info!("starting display capture {} ({})", self.descriptor.id, self.descriptor.label);
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
