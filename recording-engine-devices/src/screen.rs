//! Display capture through the `screenshots` crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::RgbaImage;
use parking_lot::Mutex;
use screenshots::Screen;

use recording_engine_core::models::device::{DeviceInfo, DeviceKind};
use recording_engine_core::models::error::RecorderError;
use recording_engine_core::models::geometry::Size;
use recording_engine_core::sources::feed::SourceFeed;
use recording_engine_core::traits::video_backend::ScreenBackend;

/// Displays are identified by the platform's display id.
pub fn list_displays() -> Vec<DeviceInfo> {
    match Screen::all() {
        Ok(screens) => screens
            .iter()
            .map(|screen| {
                let display = &screen.display_info;
                let mut info = DeviceInfo::new(
                    display.id.to_string(),
                    format!("Display {} ({}x{})", display.id, display.width, display.height),
                    DeviceKind::Display,
                );
                info.is_default = display.is_primary;
                info.native_size = Some(Size::new(display.width, display.height));
                info
            })
            .collect(),
        Err(e) => {
            log::warn!("failed to enumerate displays: {}", e);
            Vec::new()
        }
    }
}

fn find_screen(device_id: &str) -> Result<Screen, RecorderError> {
    let screens = Screen::all().map_err(|e| RecorderError::SourceUnavailable(format!("display enumeration failed: {}", e)))?;
    screens
        .into_iter()
        .find(|s| s.display_info.id.to_string() == device_id)
        .ok_or_else(|| RecorderError::SourceUnavailable(format!("no display {}", device_id)))
}

/// Grab one frame as an engine image. The crate's own image type may come
/// from a different `image` release, so pixels cross as raw RGBA bytes.
fn grab(screen: &Screen) -> Result<RgbaImage, RecorderError> {
    let shot = screen
        .capture()
        .map_err(|e| RecorderError::SourceUnavailable(format!("display capture failed: {}", e)))?;
    let (width, height) = (shot.width(), shot.height());
    RgbaImage::from_raw(width, height, shot.into_raw())
        .ok_or_else(|| RecorderError::SourceUnavailable("display returned a short frame".into()))
}

/// Polls a display at a fixed rate and pushes each grab into the feed.
pub struct ScreenCapture {
    device_id: String,
    size: Size,
    frame_rate: u32,
    running: Arc<AtomicBool>,
    capture_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ScreenCapture {
    pub fn open(device_id: &str, frame_rate: u32) -> Result<Self, RecorderError> {
        let screen = find_screen(device_id)?;
        let display = &screen.display_info;
        Ok(Self {
            device_id: device_id.to_string(),
            size: Size::new(display.width, display.height),
            frame_rate: frame_rate.max(1),
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: Mutex::new(None),
        })
    }
}

impl ScreenBackend for ScreenCapture {
    fn native_size(&self) -> Option<Size> {
        Some(self.size)
    }

    fn start(&mut self, feed: SourceFeed) -> Result<(), RecorderError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RecorderError::Configuration("display capture already running".into()));
        }
        let screen = find_screen(&self.device_id)?;
        // a first grab surfaces permission problems before the session starts
        feed.push_frame(grab(&screen)?);

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let period = Duration::from_secs_f64(1.0 / self.frame_rate as f64);
        let handle = thread::Builder::new()
            .name(format!("display-{}-capture", self.device_id))
            .spawn(move || {
                let mut next = Instant::now() + period;
                while running.load(Ordering::SeqCst) {
                    match grab(&screen) {
                        Ok(frame) => feed.push_frame(frame),
                        Err(e) => {
                            log::error!("display capture stopped: {}", e);
                            feed.report(e);
                            break;
                        }
                    }
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                        next += period;
                    } else {
                        next = now + period;
                    }
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| RecorderError::SourceUnavailable(format!("failed to spawn display thread: {}", e)))?;

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
}

impl Drop for ScreenCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
