use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::RecorderError;
use crate::models::recording_result::RecordingMetadata;

/// Sidecar location for a recording: `out.rec` -> `out.metadata.json`.
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("metadata.json")
}

/// Write recording metadata as a JSON sidecar file.
pub fn write_metadata(metadata: &RecordingMetadata, recording_path: &Path) -> Result<PathBuf, RecorderError> {
    let path = metadata_path(recording_path);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| RecorderError::SinkWrite(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json).map_err(|e| RecorderError::sink_io("failed to write metadata", e))?;
    Ok(path)
}

/// Read recording metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<RecordingMetadata, RecorderError> {
    let json = fs::read_to_string(metadata_path(recording_path))
        .map_err(|e| RecorderError::sink_io("failed to read metadata", e))?;
    serde_json::from_str(&json).map_err(|e| RecorderError::SinkWrite(format!("failed to parse metadata: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::RecorderMode;
    use crate::models::geometry::Size;
    use crate::models::recording_result::{TrackInfo, TrackKind};

    #[test]
    fn sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("demo.rec");

        let mut metadata = RecordingMetadata::new("session-1", RecorderMode::Video, Size::new(640, 480), 30);
        metadata.duration_secs = 2.5;
        metadata.encoder = "software-jpeg".into();
        metadata.tracks.push(TrackInfo {
            kind: TrackKind::Video,
            codec: "jpeg".into(),
        });

        let written = write_metadata(&metadata, &recording).unwrap();
        assert_eq!(written, dir.path().join("demo.metadata.json"));

        let json = fs::read_to_string(&written).unwrap();
        assert!(json.contains("\"type\": \"video\""));
        assert_eq!(read_metadata(&recording).unwrap(), metadata);
    }

    #[test]
    fn missing_sidecar_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_metadata(&dir.path().join("absent.rec")).is_err());
    }
}
