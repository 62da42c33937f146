use crate::models::device::DeviceInfo;
use crate::models::error::RecorderError;
use crate::models::frame::AudioSourceClass;
use crate::models::source::SourceKind;
use crate::traits::capture_provider::AudioProvider;
use crate::traits::video_backend::{CameraDevice, ScreenBackend};

/// Enumerates capture devices and opens backends for them.
///
/// Sessions share one provider; every `open_*` call returns an independent
/// backend owned by the session that opened it.
pub trait DeviceProvider: Send + Sync {
    fn devices(&self) -> Vec<DeviceInfo>;

    /// Open a display or window backend. `kind` is `Display` or `Window`.
    fn open_screen(&self, kind: SourceKind, device_id: &str) -> Result<Box<dyn ScreenBackend>, RecorderError>;

    fn open_camera(&self, device_id: &str) -> Result<Box<dyn CameraDevice>, RecorderError>;

    /// Open an audio class; `None` selects the default device.
    fn open_audio(
        &self,
        class: AudioSourceClass,
        device_id: Option<&str>,
    ) -> Result<Box<dyn AudioProvider>, RecorderError>;
}
