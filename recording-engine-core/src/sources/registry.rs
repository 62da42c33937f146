use std::collections::HashMap;

use crate::models::error::RecorderError;
use crate::models::geometry::Size;
use crate::models::source::{CaptureSourceDescriptor, Placement, SourceId};

/// Ordered set of capture source descriptors for one session.
///
/// Declaration order is kept and is the tie-breaker for draw order within
/// a compositing layer.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    entries: Vec<CaptureSourceDescriptor>,
    next_id: u32,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor and return the id assigned to it.
    pub fn add(&mut self, mut descriptor: CaptureSourceDescriptor) -> SourceId {
        self.next_id += 1;
        let id = SourceId(self.next_id);
        descriptor.id = id;
        self.entries.push(descriptor);
        id
    }

    pub fn remove(&mut self, id: SourceId) -> Option<CaptureSourceDescriptor> {
        let index = self.entries.iter().position(|d| d.id == id)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, id: SourceId) -> Option<&CaptureSourceDescriptor> {
        self.entries.iter().find(|d| d.id == id)
    }

    fn get_mut(&mut self, id: SourceId) -> Result<&mut CaptureSourceDescriptor, RecorderError> {
        self.entries
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| RecorderError::Configuration(format!("unknown source {}", id)))
    }

    pub fn set_enabled(&mut self, id: SourceId, enabled: bool) -> Result<(), RecorderError> {
        self.get_mut(id)?.enabled = enabled;
        Ok(())
    }

    pub fn set_optional(&mut self, id: SourceId, optional: bool) -> Result<(), RecorderError> {
        self.get_mut(id)?.optional = optional;
        Ok(())
    }

    pub fn set_placement(&mut self, id: SourceId, placement: Placement) -> Result<(), RecorderError> {
        self.get_mut(id)?.placement = placement;
        Ok(())
    }

    /// Mark one source as the selected one; at most one is selected.
    pub fn select(&mut self, id: SourceId) -> Result<(), RecorderError> {
        self.get_mut(id)?;
        for entry in &mut self.entries {
            entry.selected = entry.id == id;
        }
        Ok(())
    }

    pub fn selected(&self) -> Option<&CaptureSourceDescriptor> {
        self.entries.iter().find(|d| d.selected)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptureSourceDescriptor> {
        self.entries.iter()
    }

    pub fn enabled(&self) -> Vec<CaptureSourceDescriptor> {
        self.entries.iter().filter(|d| d.enabled).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recompute every auto placement field for a new canvas.
    pub fn relayout(&mut self, canvas: Size, native_sizes: &HashMap<SourceId, Size>) {
        for entry in &mut self.entries {
            entry.placement.relayout(canvas, native_sizes.get(&entry.id).copied());
        }
    }
}

/// Canvas used when the options don't pin one: the first enabled base
/// source's native size, else the first known size, else 1280x720.
pub fn default_canvas(descriptors: &[CaptureSourceDescriptor], native_sizes: &HashMap<SourceId, Size>) -> Size {
    let known = |d: &&CaptureSourceDescriptor| native_sizes.get(&d.id).copied().filter(|s| !s.is_empty());
    descriptors
        .iter()
        .filter(|d| d.enabled && !d.kind.is_overlay())
        .find_map(|d| known(&d))
        .or_else(|| descriptors.iter().filter(|d| d.enabled).find_map(|d| known(&d)))
        .unwrap_or(Size::new(1280, 720))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geometry::Point;
    use crate::models::source::{Pinned, SourceKind};

    fn display(id: &str) -> CaptureSourceDescriptor {
        CaptureSourceDescriptor::device(SourceKind::Display, id)
    }

    #[test]
    fn ids_are_unique_and_order_is_kept() {
        let mut registry = SourceRegistry::new();
        let a = registry.add(display("a"));
        let b = registry.add(CaptureSourceDescriptor::device(SourceKind::Camera, "cam"));
        registry.remove(a);
        let c = registry.add(display("c"));

        assert_ne!(a, c);
        let order: Vec<SourceId> = registry.iter().map(|d| d.id).collect();
        assert_eq!(order, vec![b, c]);
    }

    #[test]
    fn select_is_exclusive() {
        let mut registry = SourceRegistry::new();
        let a = registry.add(display("a"));
        let b = registry.add(display("b"));
        registry.select(a).unwrap();
        registry.select(b).unwrap();
        assert_eq!(registry.selected().map(|d| d.id), Some(b));
        assert_eq!(registry.iter().filter(|d| d.selected).count(), 1);
        assert!(registry.select(SourceId(99)).is_err());
    }

    #[test]
    fn relayout_leaves_custom_fields_alone() {
        let mut registry = SourceRegistry::new();
        let id = registry.add(display("a"));
        let mut placement = Placement::auto(Size::new(10, 10));
        placement.position = Pinned::custom(Point::new(5, 5));
        registry.set_placement(id, placement).unwrap();

        let natives = HashMap::from([(id, Size::new(800, 600))]);
        registry.relayout(Size::new(1920, 1080), &natives);

        let placement = registry.get(id).unwrap().placement;
        assert_eq!(placement.position.value, Point::new(5, 5));
        assert_eq!(placement.output_size.value, Size::new(1920, 1080));
    }

    #[test]
    fn default_canvas_prefers_base_sources() {
        let mut registry = SourceRegistry::new();
        let cam = registry.add(CaptureSourceDescriptor::device(SourceKind::Camera, "cam"));
        let screen = registry.add(display("a"));
        let descriptors = registry.enabled();

        let natives = HashMap::from([(cam, Size::new(320, 240)), (screen, Size::new(1440, 900))]);
        assert_eq!(default_canvas(&descriptors, &natives), Size::new(1440, 900));

        let natives = HashMap::from([(cam, Size::new(320, 240))]);
        assert_eq!(default_canvas(&descriptors, &natives), Size::new(320, 240));

        assert_eq!(default_canvas(&descriptors, &HashMap::new()), Size::new(1280, 720));
    }
}
