use recording_engine_core::models::device::DeviceInfo;
use recording_engine_core::models::error::RecorderError;
use recording_engine_core::models::frame::AudioSourceClass;
use recording_engine_core::models::source::SourceKind;
use recording_engine_core::traits::capture_provider::AudioProvider;
use recording_engine_core::traits::device_provider::DeviceProvider;
use recording_engine_core::traits::video_backend::{CameraDevice, ScreenBackend};

/// The host's real devices, limited to the backends compiled in.
///
/// Each backend sits behind a cargo feature (`screen`, `camera`, `audio`).
/// Without it the device class is never enumerated and opening one fails
/// with `SourceUnavailable`.
#[derive(Debug, Clone)]
pub struct SystemDevices {
    screen_frame_rate: u32,
}

impl Default for SystemDevices {
    fn default() -> Self {
        Self { screen_frame_rate: 30 }
    }
}

impl SystemDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rate at which displays are grabbed.
    pub fn with_screen_frame_rate(mut self, frame_rate: u32) -> Self {
        self.screen_frame_rate = frame_rate.max(1);
        self
    }
}

#[allow(dead_code)]
fn not_built(feature: &str) -> RecorderError {
    RecorderError::SourceUnavailable(format!("built without the `{}` feature", feature))
}

impl DeviceProvider for SystemDevices {
    fn devices(&self) -> Vec<DeviceInfo> {
        #[allow(unused_mut)]
        let mut devices = Vec::new();
        #[cfg(feature = "screen")]
        devices.extend(crate::screen::list_displays());
        #[cfg(feature = "camera")]
        devices.extend(crate::camera::list_cameras());
        #[cfg(feature = "audio")]
        {
            devices.extend(crate::audio::list_devices(AudioSourceClass::Microphone));
            devices.extend(crate::audio::list_devices(AudioSourceClass::System));
        }
        devices
    }

    fn open_screen(&self, kind: SourceKind, device_id: &str) -> Result<Box<dyn ScreenBackend>, RecorderError> {
        if kind == SourceKind::Window {
            return Err(RecorderError::SourceUnavailable(format!(
                "window capture is not available on this host ({})",
                device_id
            )));
        }
        #[cfg(feature = "screen")]
        {
            let capture = crate::screen::ScreenCapture::open(device_id, self.screen_frame_rate)?;
            Ok(Box::new(capture))
        }
        #[cfg(not(feature = "screen"))]
        {
            let _ = (device_id, self.screen_frame_rate);
            Err(not_built("screen"))
        }
    }

    fn open_camera(&self, device_id: &str) -> Result<Box<dyn CameraDevice>, RecorderError> {
        #[cfg(feature = "camera")]
        {
            Ok(Box::new(crate::camera::NokhwaCamera::new(device_id)))
        }
        #[cfg(not(feature = "camera"))]
        {
            let _ = device_id;
            Err(not_built("camera"))
        }
    }

    fn open_audio(
        &self,
        class: AudioSourceClass,
        device_id: Option<&str>,
    ) -> Result<Box<dyn AudioProvider>, RecorderError> {
        #[cfg(feature = "audio")]
        {
            Ok(Box::new(crate::audio::CpalAudioCapture::new(
                class,
                device_id.map(str::to_string),
            )))
        }
        #[cfg(not(feature = "audio"))]
        {
            let _ = (class, device_id);
            Err(not_built("audio"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_are_not_offered() {
        let devices = SystemDevices::new();
        assert!(matches!(
            devices.open_screen(SourceKind::Window, "42"),
            Err(RecorderError::SourceUnavailable(_))
        ));
    }

    #[cfg(not(feature = "audio"))]
    #[test]
    fn missing_backends_report_unavailable() {
        let devices = SystemDevices::new();
        assert!(matches!(
            devices.open_audio(AudioSourceClass::Microphone, None),
            Err(RecorderError::SourceUnavailable(_))
        ));
        assert!(devices
            .devices()
            .iter()
            .all(|d| d.kind != recording_engine_core::DeviceKind::Microphone));
    }
}
