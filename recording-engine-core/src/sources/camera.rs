use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use parking_lot::Mutex;

use crate::models::error::RecorderError;
use crate::models::frame::Frame;
use crate::models::geometry::Size;
use crate::models::source::CaptureSourceDescriptor;
use crate::sources::feed::SourceFeed;
use crate::traits::capture_source::CaptureSource;
use crate::traits::video_backend::CameraDevice;

type DeviceSlot = Arc<Mutex<Option<Box<dyn CameraDevice>>>>;

/// Webcam capture.
///
/// The capture thread takes the device out of its slot, opens it, polls it
/// and closes it, then puts it back so a session can restart it. `open` and
/// `close` never run on the caller's thread.
pub struct CameraSource {
    descriptor: CaptureSourceDescriptor,
    device: DeviceSlot,
    feed: SourceFeed,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    native: Option<Size>,
}

impl CameraSource {
    pub fn new(descriptor: CaptureSourceDescriptor, device: Box<dyn CameraDevice>) -> Self {
        let feed = SourceFeed::new(descriptor.id);
        Self {
            descriptor,
            device: Arc::new(Mutex::new(Some(device))),
            feed,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            native: None,
        }
    }
}

fn frame_period(fps: f64) -> (f64, Duration) {
    let fps = if fps.is_finite() { fps.clamp(1.0, 240.0) } else { 30.0 };
    (fps, Duration::from_secs_f64(1.0 / fps))
}

impl CaptureSource for CameraSource {
    fn descriptor(&self) -> &CaptureSourceDescriptor {
        &self.descriptor
    }

    fn native_size(&self) -> Option<Size> {
        self.native
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        if self.handle.is_some() {
            return Ok(());
        }
        if self.device.lock().is_none() {
            return Err(RecorderError::SourceUnavailable(format!(
                "{}: camera device was lost",
                self.descriptor.id
            )));
        }
        self.feed.clear();

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let slot = Arc::clone(&self.device);
        let feed = self.feed.clone();
        let (ready_tx, ready_rx) = bounded::<Result<(Size, f64), RecorderError>>(1);

        let handle = thread::Builder::new()
            .name(format!("camera-{}", self.descriptor.id.0))
            .spawn(move || {
                let Some(mut device) = slot.lock().take() else {
                    let _ = ready_tx.send(Err(RecorderError::SourceUnavailable("camera device was lost".into())));
                    return;
                };
                let size = match device.open() {
                    Ok(size) => size,
                    Err(e) => {
                        *slot.lock() = Some(device);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let (fps, period) = frame_period(device.native_frame_rate());
                let _ = ready_tx.send(Ok((size, fps)));

                let mut next = Instant::now();
                while running.load(Ordering::SeqCst) {
                    match device.poll_frame() {
                        Ok(Some(image)) => feed.push_frame(image),
                        Ok(None) => {}
                        Err(e) => {
                            feed.report(e);
                            break;
                        }
                    }
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                device.close();
                *slot.lock() = Some(device);
            });
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(RecorderError::SourceUnavailable(format!(
                    "failed to spawn camera thread: {}",
                    e
                )));
            }
        };

        let opened = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(RecorderError::SourceUnavailable("camera thread exited during open".into())));
        match opened {
            Ok((size, fps)) => {
                self.native = Some(size);
                log::info!(
                    "starting camera capture {} ({}) at {}x{} {:.1} fps",
                    self.descriptor.id,
                    self.descriptor.label,
                    size.width,
                    size.height,
                    fps
                );
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(RecorderError::SourceUnavailable(format!(
                    "{}: camera thread panicked",
                    self.descriptor.id
                )));
            }
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
        self.handle.is_some()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
