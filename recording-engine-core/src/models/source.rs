use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::geometry::{Point, Rect, Size};

/// Stable identity of a source within one registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Display,
    Window,
    Camera,
    VideoFile,
    StaticImage,
}

impl SourceKind {
    /// Compositing layer: base sources (0) are drawn under overlays (1).
    pub fn layer(&self) -> u8 {
        match self {
            Self::Display | Self::VideoFile => 0,
            Self::Window | Self::Camera | Self::StaticImage => 1,
        }
    }

    pub fn is_overlay(&self) -> bool {
        self.layer() > 0
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Display => "display",
            Self::Window => "window",
            Self::Camera => "camera",
            Self::VideoFile => "video-file",
            Self::StaticImage => "static-image",
        }
    }
}

/// What a descriptor points at: a device ID from enumeration, or a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceHandle {
    Device(String),
    Path(PathBuf),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementMode {
    /// Recomputed by the engine whenever canvas geometry changes.
    #[default]
    Auto,
    /// Pinned by the caller; never overwritten by the engine.
    Custom,
}

/// A placement value together with its auto/custom flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pinned<T> {
    pub value: T,
    pub mode: PlacementMode,
}

impl<T: Copy> Pinned<T> {
    pub fn auto(value: T) -> Self {
        Self {
            value,
            mode: PlacementMode::Auto,
        }
    }

    pub fn custom(value: T) -> Self {
        Self {
            value,
            mode: PlacementMode::Custom,
        }
    }

    pub fn is_custom(&self) -> bool {
        self.mode == PlacementMode::Custom
    }

    /// Overwrite the value only when it is still engine-managed.
    pub fn refresh(&mut self, value: T) {
        if !self.is_custom() {
            self.value = value;
        }
    }
}

/// Layout of one source inside the composed canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub position: Pinned<Point>,
    pub output_size: Pinned<Size>,
    pub source_rect: Pinned<Rect>,
}

impl Placement {
    /// Fill-the-canvas placement with every field engine-managed.
    pub fn auto(canvas: Size) -> Self {
        Self {
            position: Pinned::auto(Point::ORIGIN),
            output_size: Pinned::auto(canvas),
            source_rect: Pinned::auto(Rect::default()),
        }
    }

    /// Recompute the auto fields for a new canvas and native source size.
    pub fn relayout(&mut self, canvas: Size, native: Option<Size>) {
        self.position.refresh(Point::ORIGIN);
        self.output_size.refresh(canvas);
        if let Some(native) = native {
            self.source_rect.refresh(Rect::covering(native));
        }
    }

    /// Crop to apply to a frame of `frame` size.
    ///
    /// An auto source rect always covers the whole frame, so sources that
    /// change resolution mid-session keep filling their slot.
    pub fn crop_for(&self, frame: Size) -> Option<Rect> {
        if self.source_rect.is_custom() {
            self.source_rect.value.clamp_to(frame)
        } else {
            Some(Rect::covering(frame)).filter(|r| !r.size().is_empty())
        }
    }

    /// Destination rectangle on the canvas.
    pub fn target(&self) -> Rect {
        Rect::new(
            self.position.value.x,
            self.position.value.y,
            self.output_size.value.width,
            self.output_size.value.height,
        )
    }
}

/// Configuration-time description of a capture source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSourceDescriptor {
    /// Assigned by the registry on insertion.
    pub id: SourceId,
    pub kind: SourceKind,
    pub handle: SourceHandle,
    pub label: String,
    pub enabled: bool,
    pub selected: bool,
    /// Secondary sources are disabled on failure instead of failing the session.
    pub optional: bool,
    pub placement: Placement,
}

impl CaptureSourceDescriptor {
    pub fn new(kind: SourceKind, handle: SourceHandle) -> Self {
        let label = match &handle {
            SourceHandle::Device(id) => format!("{} {}", kind.as_str(), id),
            SourceHandle::Path(path) => path.display().to_string(),
        };
        Self {
            id: SourceId::default(),
            kind,
            handle,
            label,
            enabled: true,
            selected: false,
            optional: false,
            placement: Placement::default(),
        }
    }

    pub fn device(kind: SourceKind, device_id: impl Into<String>) -> Self {
        Self::new(kind, SourceHandle::Device(device_id.into()))
    }

    pub fn file(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self::new(kind, SourceHandle::Path(path.into()))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }
}
