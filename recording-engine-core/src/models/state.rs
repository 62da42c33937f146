use std::fmt;

use serde::{Deserialize, Serialize};

/// Session state machine.
///
/// State transitions:
/// ```text
/// idle → recording ↔ paused
///            ↓         ↓
///          finishing → idle
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Paused,
    Finishing,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Recording or paused: the pipeline is alive and can be stopped.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Finishing => "finishing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
