use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::models::error::RecorderError;
use crate::models::frame::Frame;
use crate::models::geometry::{CropRect, Rect, Size};
use crate::models::source::{CaptureSourceDescriptor, Placement, SourceId, SourceKind};

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Blends the latest frame of every enabled source onto one canvas.
///
/// Layers are drawn base sources first, then overlays; within a layer the
/// registry's declaration order decides. Each source is cropped to its
/// source rect, scaled to its output size (no aspect preservation) and
/// drawn at its position. Sources without a frame yet are skipped.
pub struct Compositor {
    canvas: Size,
    crop: Option<CropRect>,
    layers: Vec<Layer>,
}

struct Layer {
    id: SourceId,
    kind: SourceKind,
    placement: Placement,
    enabled: bool,
    cache: Option<Scaled>,
}

/// The last scaled rendition of a layer, reused while the source keeps
/// handing out the same pixel buffer.
struct Scaled {
    source: Arc<RgbaImage>,
    image: Arc<RgbaImage>,
}

impl Compositor {
    pub fn new(
        canvas: Size,
        crop: Option<CropRect>,
        descriptors: &[CaptureSourceDescriptor],
    ) -> Result<Self, RecorderError> {
        if canvas.is_empty() {
            return Err(RecorderError::Configuration("canvas size must be non-empty".into()));
        }
        if let Some(crop) = &crop {
            crop.validate().map_err(RecorderError::Configuration)?;
            if !crop.fits(canvas) {
                return Err(RecorderError::Configuration(format!(
                    "crop {}x{} at ({}, {}) exceeds canvas {}x{}",
                    crop.width(),
                    crop.height(),
                    crop.left,
                    crop.top,
                    canvas.width,
                    canvas.height
                )));
            }
        }

        let mut layers: Vec<Layer> = descriptors
            .iter()
            .filter(|d| d.enabled)
            .map(|d| Layer {
                id: d.id,
                kind: d.kind,
                placement: d.placement,
                enabled: true,
                cache: None,
            })
            .collect();
        // stable: declaration order survives within a layer
        layers.sort_by_key(|layer| layer.kind.layer());

        Ok(Self {
            canvas,
            crop,
            layers,
        })
    }

    /// Size of every composed frame, after the output crop.
    pub fn output_size(&self) -> Size {
        self.crop.map(|c| c.size()).unwrap_or(self.canvas)
    }

    /// Draw order, bottom first.
    pub fn layer_order(&self) -> Vec<SourceId> {
        self.layers.iter().map(|l| l.id).collect()
    }

    /// Stop drawing a source for the rest of the session.
    pub fn disable(&mut self, id: SourceId) {
        if let Some(layer) = self.layers.iter_mut().find(|l| l.id == id) {
            layer.enabled = false;
            layer.cache = None;
        }
    }

    pub fn is_enabled(&self, id: SourceId) -> bool {
        self.layers.iter().any(|l| l.id == id && l.enabled)
    }

    /// Compose one canvas, asking `latest` for each enabled source's frame.
    pub fn compose<F>(&mut self, mut latest: F) -> RgbaImage
    where
        F: FnMut(SourceId) -> Option<Frame>,
    {
        let mut canvas = RgbaImage::from_pixel(self.canvas.width, self.canvas.height, BACKGROUND);

        for layer in self.layers.iter_mut().filter(|l| l.enabled) {
            let Some(frame) = latest(layer.id) else {
                continue;
            };
            let Some(scaled) = layer.render(&frame) else {
                continue;
            };
            let target = layer.placement.target();
            let (x, y) = (target.x as i64, target.y as i64);
            if layer.kind.is_overlay() {
                imageops::overlay(&mut canvas, scaled.as_ref(), x, y);
            } else {
                imageops::replace(&mut canvas, scaled.as_ref(), x, y);
            }
        }

        match self.crop {
            Some(crop) => imageops::crop_imm(&canvas, crop.left, crop.top, crop.width(), crop.height()).to_image(),
            None => canvas,
        }
    }
}

impl Layer {
    fn render(&mut self, frame: &Frame) -> Option<Arc<RgbaImage>> {
        let target = self.placement.target().size();
        if target.is_empty() {
            return None;
        }
        if let Some(cached) = &self.cache {
            if Arc::ptr_eq(&cached.source, &frame.image) {
                return Some(Arc::clone(&cached.image));
            }
        }

        let frame_size = frame.size();
        let crop = self.placement.crop_for(frame_size)?;
        let image = if crop == Rect::covering(frame_size) && frame_size == target {
            Arc::clone(&frame.image)
        } else {
            let cropped = if crop == Rect::covering(frame_size) {
                None
            } else {
                Some(
                    imageops::crop_imm(frame.image.as_ref(), crop.x as u32, crop.y as u32, crop.width, crop.height)
                        .to_image(),
                )
            };
            let base = cropped.as_ref().unwrap_or(frame.image.as_ref());
            if base.dimensions() == (target.width, target.height) {
                Arc::new(base.clone())
            } else {
                Arc::new(imageops::resize(base, target.width, target.height, FilterType::Triangle))
            }
        };

        self.cache = Some(Scaled {
            source: Arc::clone(&frame.image),
            image: Arc::clone(&image),
        });
        Some(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geometry::Point;
    use crate::models::source::Pinned;
    use std::collections::HashMap;
    use std::time::Instant;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn descriptor(id: u32, kind: SourceKind, placement: Placement) -> CaptureSourceDescriptor {
        let mut d = CaptureSourceDescriptor::device(kind, format!("dev-{}", id)).with_placement(placement);
        d.id = SourceId(id);
        d
    }

    fn solid(id: u32, size: Size, color: Rgba<u8>) -> Frame {
        Frame {
            image: Arc::new(RgbaImage::from_pixel(size.width, size.height, color)),
            captured_at: Instant::now(),
            source: SourceId(id),
            sequence: 0,
        }
    }

    fn overlay_at(x: i32, y: i32, size: Size) -> Placement {
        Placement {
            position: Pinned::custom(Point::new(x, y)),
            output_size: Pinned::custom(size),
            source_rect: Pinned::auto(Rect::default()),
        }
    }

    #[test]
    fn overlays_draw_above_base_regardless_of_declaration_order() {
        let canvas = Size::new(100, 100);
        let descriptors = vec![
            descriptor(1, SourceKind::Camera, overlay_at(10, 10, Size::new(20, 20))),
            descriptor(2, SourceKind::Display, Placement::auto(canvas)),
        ];
        let mut compositor = Compositor::new(canvas, None, &descriptors).unwrap();
        assert_eq!(compositor.layer_order(), vec![SourceId(2), SourceId(1)]);

        let frames: HashMap<SourceId, Frame> = [
            (SourceId(1), solid(1, Size::new(5, 5), GREEN)),
            (SourceId(2), solid(2, canvas, RED)),
        ]
        .into_iter()
        .collect();
        let out = compositor.compose(|id| frames.get(&id).cloned());

        assert_eq!(*out.get_pixel(0, 0), RED);
        assert_eq!(*out.get_pixel(15, 15), GREEN);
        assert_eq!(*out.get_pixel(29, 29), GREEN);
        assert_eq!(*out.get_pixel(30, 30), RED);
    }

    #[test]
    fn declaration_order_breaks_ties_within_a_layer() {
        let canvas = Size::new(50, 50);
        let descriptors = vec![
            descriptor(1, SourceKind::Camera, overlay_at(0, 0, Size::new(30, 30))),
            descriptor(2, SourceKind::StaticImage, overlay_at(10, 10, Size::new(30, 30))),
        ];
        let mut compositor = Compositor::new(canvas, None, &descriptors).unwrap();
        let out = compositor.compose(|id| {
            let color = if id == SourceId(1) { GREEN } else { BLUE };
            Some(solid(id.0, Size::new(30, 30), color))
        });
        assert_eq!(*out.get_pixel(5, 5), GREEN);
        assert_eq!(*out.get_pixel(20, 20), BLUE);
    }

    #[test]
    fn sources_without_frames_are_skipped() {
        let canvas = Size::new(40, 40);
        let descriptors = vec![
            descriptor(1, SourceKind::Display, Placement::auto(canvas)),
            descriptor(2, SourceKind::Camera, overlay_at(0, 0, Size::new(10, 10))),
        ];
        let mut compositor = Compositor::new(canvas, None, &descriptors).unwrap();
        let out = compositor.compose(|id| (id == SourceId(2)).then(|| solid(2, Size::new(10, 10), GREEN)));
        assert_eq!(*out.get_pixel(5, 5), GREEN);
        assert_eq!(*out.get_pixel(20, 20), BACKGROUND);
    }

    #[test]
    fn base_source_is_scaled_to_canvas() {
        let canvas = Size::new(64, 48);
        let descriptors = vec![descriptor(1, SourceKind::Display, Placement::auto(canvas))];
        let mut compositor = Compositor::new(canvas, None, &descriptors).unwrap();
        let out = compositor.compose(|_| Some(solid(1, Size::new(16, 12), RED)));
        assert_eq!(out.dimensions(), (64, 48));
        assert_eq!(*out.get_pixel(63, 47), RED);
    }

    #[test]
    fn custom_source_rect_crops_the_frame() {
        let canvas = Size::new(20, 10);
        let mut placement = Placement::auto(canvas);
        placement.source_rect = Pinned::custom(Rect::new(10, 0, 10, 10));
        let descriptors = vec![descriptor(1, SourceKind::Display, placement)];
        let mut compositor = Compositor::new(canvas, None, &descriptors).unwrap();

        let mut image = RgbaImage::from_pixel(20, 10, RED);
        for y in 0..10 {
            for x in 10..20 {
                image.put_pixel(x, y, BLUE);
            }
        }
        let frame = Frame {
            image: Arc::new(image),
            captured_at: Instant::now(),
            source: SourceId(1),
            sequence: 0,
        };
        let out = compositor.compose(|_| Some(frame.clone()));
        assert!(out.pixels().all(|p| *p == BLUE));
    }

    #[test]
    fn output_crop_sets_frame_size() {
        let canvas = Size::new(640, 520);
        let descriptors = vec![descriptor(1, SourceKind::Display, Placement::auto(canvas))];
        let crop = CropRect::new(100, 100, 500, 500);
        let mut compositor = Compositor::new(canvas, Some(crop), &descriptors).unwrap();
        assert_eq!(compositor.output_size(), Size::new(400, 400));

        let out = compositor.compose(|_| Some(solid(1, canvas, RED)));
        assert_eq!(out.dimensions(), (400, 400));
    }

    #[test]
    fn crop_outside_canvas_is_rejected() {
        let descriptors = vec![descriptor(1, SourceKind::Display, Placement::auto(Size::new(320, 240)))];
        let result = Compositor::new(Size::new(320, 240), Some(CropRect::new(0, 0, 400, 200)), &descriptors);
        assert!(matches!(result, Err(RecorderError::Configuration(_))));
    }

    #[test]
    fn disabled_layer_is_not_drawn() {
        let canvas = Size::new(10, 10);
        let descriptors = vec![descriptor(1, SourceKind::Display, Placement::auto(canvas))];
        let mut compositor = Compositor::new(canvas, None, &descriptors).unwrap();
        compositor.disable(SourceId(1));
        assert!(!compositor.is_enabled(SourceId(1)));
        let out = compositor.compose(|_| Some(solid(1, canvas, RED)));
        assert_eq!(*out.get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn unchanged_frame_reuses_scaled_image() {
        let canvas = Size::new(32, 32);
        let descriptors = vec![descriptor(1, SourceKind::Display, Placement::auto(canvas))];
        let mut compositor = Compositor::new(canvas, None, &descriptors).unwrap();
        let frame = solid(1, Size::new(8, 8), GREEN);

        let first = compositor.layers[0].render(&frame).unwrap();
        let second = compositor.layers[0].render(&frame).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
