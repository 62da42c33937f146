//! # recording-engine-core
//!
//! Platform-agnostic recording session engine.
//!
//! Captures displays, windows, cameras, video files and still images,
//! composites them onto one canvas, mixes microphone and system audio, and
//! encodes the result into a file, a byte stream, or a directory of stills.
//! Device backends implement the `DeviceProvider` family of traits; the
//! `recording-engine-devices` crate supplies real ones and
//! `sources::virtual_devices` supplies synthetic ones.
//!
//! ## Architecture
//!
//! ```text
//! recording-engine-core (this crate)
//! ├── traits/       ← CaptureSource, DeviceProvider, ScreenBackend, CameraDevice, AudioProvider, VideoEncoder
//! ├── models/       ← RecorderError, SessionState, RecorderOptions, Placement, Frame, events, results
//! ├── sources/      ← display/window/camera/video-file/static-image sources, registry, audio capture, virtual devices
//! ├── processing/   ← Compositor, AudioMixer, RingBuffer, MediaClock, single-slot handoff
//! ├── encoder/      ← software JPEG encoder, rate control, hardware leases, container writer/reader
//! ├── storage/      ← output sinks, still writer, checksum, metadata sidecar
//! └── session/      ← RecordingSession state machine, worker stages, SessionManager
//! ```

pub mod encoder;
pub mod models;
pub mod processing;
pub mod session;
pub mod sources;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use encoder::reader::ContainerReader;
pub use encoder::resources::{EncoderResources, HardwareLease};
pub use models::audio_models::{AudioLevels, PipelineDiagnostics};
pub use models::config::{
    AudioOptions, BitrateMode, ContainerLayout, EncoderProfile, FramerateMode, HardwarePolicy, RecorderMode,
    RecorderOptions, SnapshotOptions, StillFormat,
};
pub use models::device::{DeviceInfo, DeviceKind};
pub use models::error::{RecorderError, RecorderResult};
pub use models::event::{RecorderEvent, RecordingProgress};
pub use models::frame::{AudioChunk, AudioSourceClass, ComposedFrame, Frame};
pub use models::geometry::{CropRect, Point, Rect, Size};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::source::{CaptureSourceDescriptor, Pinned, Placement, SourceHandle, SourceId, SourceKind};
pub use models::state::SessionState;
pub use session::manager::SessionManager;
pub use session::recorder::RecordingSession;
pub use sources::feed::SourceFeed;
pub use sources::registry::SourceRegistry;
pub use sources::virtual_devices::{VirtualAudio, VirtualDevices, VirtualScreen};
pub use storage::sink::{OutputSink, StreamSink};
pub use traits::capture_provider::{AudioBufferCallback, AudioFault, AudioProvider};
pub use traits::capture_source::CaptureSource;
pub use traits::device_provider::DeviceProvider;
pub use traits::video_backend::{CameraDevice, ScreenBackend};
pub use traits::video_encoder::{EncodedFrame, EncoderSettings, HardwareEncoderBackend, VideoEncoder};
