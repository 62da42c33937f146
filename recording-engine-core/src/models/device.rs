use serde::{Deserialize, Serialize};

use super::geometry::Size;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Display,
    Window,
    Camera,
    Microphone,
    SystemAudio,
}

/// A device available for capture, as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable identifier, usable in a `SourceHandle::Device`.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    pub kind: DeviceKind,
    pub is_default: bool,
    pub native_size: Option<Size>,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            is_default: false,
            native_size: None,
        }
    }
}
