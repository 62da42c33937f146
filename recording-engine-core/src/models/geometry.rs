use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle covering a whole surface of `size`.
    pub const fn covering(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Intersection with a surface of `bounds`, or `None` if they don't overlap.
    pub fn clamp_to(&self, bounds: Size) -> Option<Rect> {
        let left = (self.x as i64).max(0);
        let top = (self.y as i64).max(0);
        let right = self.right().min(bounds.width as i64);
        let bottom = self.bottom().min(bounds.height as i64);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(
            left as i32,
            top as i32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

/// Output crop expressed as edges, the way capture UIs hand it over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.right <= self.left || self.bottom <= self.top {
            return Err(format!(
                "crop rectangle is empty: left={} top={} right={} bottom={}",
                self.left, self.top, self.right, self.bottom
            ));
        }
        Ok(())
    }

    /// Whether the crop lies entirely inside a canvas of `canvas`.
    pub fn fits(&self, canvas: Size) -> bool {
        self.right <= canvas.width && self.bottom <= canvas.height
    }
}
