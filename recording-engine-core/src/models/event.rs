use std::path::PathBuf;

use super::audio_models::AudioLevels;
use super::recording_result::RecordingResult;
use super::state::SessionState;

/// Periodic progress while a session records.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingProgress {
    pub duration_secs: f64,
    pub frames_encoded: u64,
    pub frames_dropped: u64,
    pub bytes_written: u64,
    pub levels: AudioLevels,
}

/// Notifications posted by a session onto its event channels.
///
/// Every `record()` that returns `Ok` is followed by exactly one terminal
/// event: `RecordingComplete` or `RecordingFailed`.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    StatusChanged(SessionState),
    RecordingComplete(Box<RecordingResult>),
    RecordingFailed(String),
    SnapshotSaved(PathBuf),
    Progress(RecordingProgress),
}

impl RecorderEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RecordingComplete(_) | Self::RecordingFailed(_))
    }
}
