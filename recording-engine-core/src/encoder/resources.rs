use std::sync::Arc;

use parking_lot::Mutex;

use crate::encoder::software::SoftwareJpegEncoder;
use crate::models::config::HardwarePolicy;
use crate::models::error::RecorderError;
use crate::traits::video_encoder::{EncoderSettings, HardwareEncoderBackend, VideoEncoder};

/// Encoder capacity shared by every session of a manager.
///
/// Hardware encoders are a scarce device resource: at most
/// `max_hardware_sessions` sessions hold one at a time. Software encoding
/// is unbounded.
pub struct EncoderResources {
    hardware: Option<Arc<dyn HardwareEncoderBackend>>,
    max_hardware_sessions: usize,
    in_use: Mutex<usize>,
}

/// Claim on one hardware encoder slot, released on drop.
pub struct HardwareLease {
    resources: Arc<EncoderResources>,
}

impl Drop for HardwareLease {
    fn drop(&mut self) {
        let mut in_use = self.resources.in_use.lock();
        *in_use = in_use.saturating_sub(1);
        log::debug!("released hardware encoder slot ({} in use)", *in_use);
    }
}

/// An encoder ready for a session, plus the slot it occupies if any.
pub struct OpenedEncoder {
    pub encoder: Box<dyn VideoEncoder>,
    pub lease: Option<HardwareLease>,
}

impl EncoderResources {
    pub fn software_only() -> Self {
        Self {
            hardware: None,
            max_hardware_sessions: 0,
            in_use: Mutex::new(0),
        }
    }

    pub fn with_hardware(backend: Arc<dyn HardwareEncoderBackend>, max_hardware_sessions: usize) -> Self {
        Self {
            hardware: Some(backend),
            max_hardware_sessions,
            in_use: Mutex::new(0),
        }
    }

    pub fn hardware_name(&self) -> Option<&str> {
        self.hardware.as_ref().map(|b| b.name())
    }

    pub fn hardware_in_use(&self) -> usize {
        *self.in_use.lock()
    }

    fn try_lease(self: &Arc<Self>) -> Option<HardwareLease> {
        let mut in_use = self.in_use.lock();
        if *in_use >= self.max_hardware_sessions {
            return None;
        }
        *in_use += 1;
        Some(HardwareLease {
            resources: Arc::clone(self),
        })
    }

    fn open_hardware(self: &Arc<Self>, settings: &EncoderSettings) -> Result<OpenedEncoder, String> {
        let backend = self.hardware.as_ref().ok_or("no hardware encoder is installed")?;
        if !backend.is_available() {
            return Err(format!("hardware encoder {} is unavailable", backend.name()));
        }
        if !backend.supports_profile(settings.profile) {
            return Err(format!(
                "hardware encoder {} does not support the {:?} profile",
                backend.name(),
                settings.profile
            ));
        }
        let lease = self
            .try_lease()
            .ok_or_else(|| format!("all {} hardware encoder slots are in use", self.max_hardware_sessions))?;
        let encoder = backend.open(settings).map_err(|e| e.to_string())?;
        Ok(OpenedEncoder {
            encoder,
            lease: Some(lease),
        })
    }

    /// Open an encoder following `policy`.
    pub fn open(self: &Arc<Self>, policy: HardwarePolicy, settings: &EncoderSettings) -> Result<OpenedEncoder, RecorderError> {
        let software = || OpenedEncoder {
            encoder: Box::new(SoftwareJpegEncoder::new(settings)),
            lease: None,
        };

        match policy {
            HardwarePolicy::Disabled => Ok(software()),
            HardwarePolicy::Preferred => match self.open_hardware(settings) {
                Ok(opened) => Ok(opened),
                Err(reason) => {
                    log::info!("falling back to software encoding: {}", reason);
                    Ok(software())
                }
            },
            HardwarePolicy::Required => self.open_hardware(settings).map_err(RecorderError::Encoder),
        }
    }
}

impl Default for EncoderResources {
    fn default() -> Self {
        Self::software_only()
    }
}
