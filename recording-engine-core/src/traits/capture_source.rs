use crate::models::error::RecorderError;
use crate::models::frame::Frame;
use crate::models::geometry::Size;
use crate::models::source::CaptureSourceDescriptor;

/// A running producer of video frames.
///
/// Every source variant (display, window, camera, video file, static image)
/// exposes the same surface to the compositor: it is started once per
/// session, hands out its most recent frame on demand, and reports device
/// loss instead of panicking or blocking.
pub trait CaptureSource: Send {
    fn descriptor(&self) -> &CaptureSourceDescriptor;

    /// Native frame size, known once the source has started.
    fn native_size(&self) -> Option<Size>;

    fn start(&mut self) -> Result<(), RecorderError>;

    /// Stop producing frames. Stopping a stopped source is a no-op.
    fn stop(&mut self) -> Result<(), RecorderError>;

    /// The most recent frame, or `None` before the first one arrives.
    fn latest_frame(&self) -> Option<Frame>;

    /// A loss reported by the device since the last call.
    fn take_fault(&self) -> Option<RecorderError>;

    fn is_running(&self) -> bool;
}
