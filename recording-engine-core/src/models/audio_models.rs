use serde::{Deserialize, Serialize};

/// Real-time audio level metering (RMS and peak, 0.0–1.0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioLevels {
    pub mic_level: f32,
    pub system_level: f32,
    pub peak_mic_level: f32,
    pub peak_system_level: f32,
}

/// Counters for debugging a running pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    pub frames_composed: u64,
    /// Compositor ticks skipped because the encoder still held a frame.
    pub frames_dropped: u64,
    pub frames_encoded: u64,
    /// Fixed-rate ticks that repeated the previous frame.
    pub frames_duplicated: u64,
    pub audio_frames_mixed: u64,
    pub mix_cycles: u64,
    pub bytes_written: u64,
}
