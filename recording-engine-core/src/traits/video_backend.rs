use image::RgbaImage;

use crate::models::error::RecorderError;
use crate::models::geometry::Size;
use crate::sources::feed::SourceFeed;

/// Push-driven display or window capture.
///
/// The backend delivers frames from its own thread or OS callback into the
/// feed it was started with, and reports device loss through the same feed.
pub trait ScreenBackend: Send {
    fn native_size(&self) -> Option<Size>;

    fn start(&mut self, feed: SourceFeed) -> Result<(), RecorderError>;

    fn stop(&mut self) -> Result<(), RecorderError>;
}

/// Polled camera device.
///
/// Every call, `open` and `close` included, is made on the camera
/// source's capture thread.
pub trait CameraDevice: Send {
    /// Open the device and return the negotiated frame size.
    fn open(&mut self) -> Result<Size, RecorderError>;

    fn native_frame_rate(&self) -> f64;

    /// `Ok(None)` when no new frame is ready yet; `Err` once the device is gone.
    fn poll_frame(&mut self) -> Result<Option<RgbaImage>, RecorderError>;

    fn close(&mut self);
}
