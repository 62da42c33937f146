//! Microphone and system-audio capture through cpal.
//!
//! Input devices are captured directly. System audio opens the default
//! output device with an input stream, which hosts that support loopback
//! (WASAPI) turn into a capture of everything the device plays.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::bounded;
use parking_lot::Mutex;

use recording_engine_core::models::device::{DeviceInfo, DeviceKind};
use recording_engine_core::models::error::RecorderError;
use recording_engine_core::models::frame::AudioSourceClass;
use recording_engine_core::traits::capture_provider::{AudioBufferCallback, AudioFault, AudioProvider};

/// List capture-capable devices for one audio class.
pub fn list_devices(class: AudioSourceClass) -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let (devices, default_name, kind) = match class {
        AudioSourceClass::System => (
            host.output_devices().map(|d| d.collect::<Vec<_>>()),
            host.default_output_device().and_then(|d| d.name().ok()),
            DeviceKind::SystemAudio,
        ),
        _ => (
            host.input_devices().map(|d| d.collect::<Vec<_>>()),
            host.default_input_device().and_then(|d| d.name().ok()),
            DeviceKind::Microphone,
        ),
    };
    let devices = match devices {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!("failed to enumerate {:?} audio devices: {}", class, e);
            return Vec::new();
        }
    };

    devices
        .into_iter()
        .filter_map(|device| device.name().ok())
        .map(|name| {
            let mut info = DeviceInfo::new(name.clone(), name.clone(), kind);
            info.is_default = default_name.as_deref() == Some(name.as_str());
            info
        })
        .collect()
}

fn find_device(class: AudioSourceClass, device_id: Option<&str>) -> Option<cpal::Device> {
    let host = cpal::default_host();
    match (class, device_id) {
        (AudioSourceClass::System, None) => host.default_output_device(),
        (AudioSourceClass::System, Some(id)) => host
            .output_devices()
            .ok()?
            .find(|d| d.name().is_ok_and(|name| name == id)),
        (_, None) => host.default_input_device(),
        (_, Some(id)) => host
            .input_devices()
            .ok()?
            .find(|d| d.name().is_ok_and(|name| name == id)),
    }
}

/// Audio capture for one device of one class.
///
/// cpal streams are not `Send`, so the stream is built and kept alive on a
/// dedicated thread for the duration of the capture.
pub struct CpalAudioCapture {
    class: AudioSourceClass,
    device_id: Option<String>,
    running: Arc<AtomicBool>,
    capture_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalAudioCapture {
    /// `None` selects the host's default device for the class.
    pub fn new(class: AudioSourceClass, device_id: Option<String>) -> Self {
        Self {
            class,
            device_id,
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: Mutex::new(None),
        }
    }
}

impl AudioProvider for CpalAudioCapture {
    fn is_available(&self) -> bool {
        find_device(self.class, self.device_id.as_deref()).is_some()
    }

    fn start(&mut self, callback: AudioBufferCallback, fault: AudioFault) -> Result<(), RecorderError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RecorderError::Configuration("audio capture already running".into()));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let class = self.class;
        let device_id = self.device_id.clone();
        let (ready_tx, ready_rx) = bounded::<Result<(), RecorderError>>(1);

        let handle = thread::Builder::new()
            .name(format!("cpal-{:?}-capture", class).to_lowercase())
            .spawn(move || {
                match open_stream(class, device_id.as_deref(), callback, fault) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        while running.load(Ordering::SeqCst) {
                            thread::sleep(Duration::from_millis(10));
                        }
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| RecorderError::SourceUnavailable(format!("failed to spawn audio thread: {}", e)))?;

        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(RecorderError::SourceUnavailable("audio thread exited during start".into())));
        if let Err(e) = started {
            self.running.store(false, Ordering::SeqCst);
            let _ = handle.join();
            return Err(e);
        }
        *self.capture_handle.lock() = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.lock().take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn device_info(&self) -> DeviceInfo {
        let kind = match self.class {
            AudioSourceClass::System => DeviceKind::SystemAudio,
            _ => DeviceKind::Microphone,
        };
        match &self.device_id {
            Some(id) => DeviceInfo::new(id.clone(), id.clone(), kind),
            None => {
                let mut info = DeviceInfo::new(format!("default-{:?}", self.class).to_lowercase(), "Default device", kind);
                info.is_default = true;
                info
            }
        }
    }
}

impl Drop for CpalAudioCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn open_stream(
    class: AudioSourceClass,
    device_id: Option<&str>,
    callback: AudioBufferCallback,
    fault: AudioFault,
) -> Result<cpal::Stream, RecorderError> {
    let device = find_device(class, device_id)
        .ok_or_else(|| RecorderError::SourceUnavailable(format!("no {:?} audio device {:?}", class, device_id)))?;
    let supported = match class {
        AudioSourceClass::System => device.default_output_config(),
        _ => device.default_input_config(),
    }
    .map_err(|e| RecorderError::SourceUnavailable(format!("no usable audio format: {}", e)))?;

    let sample_rate = supported.sample_rate().0 as f64;
    let channels = supported.channels();
    log::info!(
        "audio device {:?} ({} Hz, {} ch, {:?})",
        device.name().unwrap_or_default(),
        sample_rate,
        channels,
        supported.sample_format()
    );

    let config: cpal::StreamConfig = supported.config();
    let on_error = move |e: cpal::StreamError| match e {
        cpal::StreamError::DeviceNotAvailable => {
            fault.report(RecorderError::SourceUnavailable(format!("{:?} audio device was disconnected", class)))
        }
        other => log::error!("audio stream error: {}", other),
    };
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| callback(data, sample_rate, channels),
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                callback(&samples, sample_rate, channels);
            },
            on_error,
            None,
        ),
        other => {
            return Err(RecorderError::SourceUnavailable(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| RecorderError::SourceUnavailable(format!("failed to open audio stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| RecorderError::SourceUnavailable(format!("failed to start audio stream: {}", e)))?;
    Ok(stream)
}
