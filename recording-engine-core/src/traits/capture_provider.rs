use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::device::DeviceInfo;
use crate::models::error::RecorderError;

/// Callback invoked when an audio buffer is available.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of interleaved channels.
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], f64, u16) + Send + Sync + 'static>;

/// Where an audio backend reports that its device went away mid-capture.
///
/// Cloning shares the slot. Only the first report is kept.
#[derive(Clone, Default)]
pub struct AudioFault {
    slot: Arc<Mutex<Option<RecorderError>>>,
}

impl AudioFault {
    pub fn report(&self, error: RecorderError) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            log::warn!("audio device reported a fault: {}", error);
            *slot = Some(error);
        }
    }

    pub fn take(&self) -> Option<RecorderError> {
        self.slot.lock().take()
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}

/// Interface for platform audio capture (one device class: input or loopback).
///
/// Implemented by:
/// - `ToneGenerator` (virtual devices, this crate)
/// - `CpalAudioCapture` (recording-engine-devices, `audio` feature)
pub trait AudioProvider: Send {
    /// Whether this capture source is currently available.
    fn is_available(&self) -> bool;

    /// Start capturing audio, delivering buffers via `callback`.
    ///
    /// The callback fires on the backend's audio thread. Keep processing minimal.
    /// A device lost after a successful start is reported through `fault`.
    fn start(&mut self, callback: AudioBufferCallback, fault: AudioFault) -> Result<(), RecorderError>;

    /// Stop capturing and release resources.
    fn stop(&mut self) -> Result<(), RecorderError>;

    /// Information about the audio device backing this provider.
    fn device_info(&self) -> DeviceInfo;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fault_wins() {
        let fault = AudioFault::default();
        let shared = fault.clone();
        shared.report(RecorderError::SourceUnavailable("unplugged".into()));
        shared.report(RecorderError::Configuration("later".into()));
        assert!(matches!(fault.take(), Some(RecorderError::SourceUnavailable(_))));
        assert!(fault.take().is_none());
    }
}
