use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::config::RecorderMode;
use super::geometry::Size;

/// Result delivered with `RecordingComplete`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    /// Final file or directory; `None` when the sink was a byte stream.
    pub output_path: Option<PathBuf>,
    pub duration_secs: f64,
    pub frames_encoded: u64,
    pub audio_frames: u64,
    pub bytes_written: u64,
    /// Stills written during the session, in firing order.
    pub snapshots: Vec<PathBuf>,
    /// SHA-256 of the output file, for file sinks only.
    pub checksum: Option<String>,
    pub metadata: RecordingMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// A track stored in the output container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    #[serde(rename = "type")]
    pub kind: TrackKind,
    pub codec: String,
}

/// Metadata stored alongside a recording.
///
/// Serializable for the optional JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub session_id: String,
    pub mode: RecorderMode,
    pub duration_secs: f64,
    pub canvas: Size,
    pub frame_rate: u32,
    pub encoder: String,
    pub created_at: String,
    pub tracks: Vec<TrackInfo>,
}

impl RecordingMetadata {
    pub fn new(session_id: &str, mode: RecorderMode, canvas: Size, frame_rate: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            mode,
            duration_secs: 0.0,
            canvas,
            frame_rate,
            encoder: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
            tracks: Vec::new(),
        }
    }
}
