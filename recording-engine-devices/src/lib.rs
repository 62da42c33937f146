//! # recording-engine-devices
//!
//! Native device backends for recording-engine-core.
//!
//! Provides:
//! - `SystemDevices`: a `DeviceProvider` over the host's real devices
//! - `ScreenCapture`: display grabs via `screenshots` (feature `screen`)
//! - `NokhwaCamera`: camera frames via `nokhwa` (feature `camera`)
//! - `CpalAudioCapture`: microphone and loopback audio via `cpal` (feature `audio`)
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use recording_engine_core::SessionManager;
//! use recording_engine_devices::SystemDevices;
//!
//! let manager = SessionManager::new(Arc::new(SystemDevices::new()));
//! let session = manager.create_session();
//! ```

#[cfg(feature = "audio")]
pub mod audio;
#[cfg(feature = "camera")]
pub mod camera;
#[cfg(feature = "screen")]
pub mod screen;
pub mod system;

#[cfg(feature = "audio")]
pub use audio::CpalAudioCapture;
#[cfg(feature = "camera")]
pub use camera::NokhwaCamera;
#[cfg(feature = "screen")]
pub use screen::ScreenCapture;
pub use system::SystemDevices;
