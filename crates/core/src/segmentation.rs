//! Per-viewport segmentation layers and global brush settings.
//!
//! The rendering engine owns voxel data; this store only tracks layer
//! metadata (label, color, visibility, opacity, lock) and links each layer
//! to the engine's segmentation object through `segmentation_id`. There is
//! no history here: voxel edits are undone at the engine layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{new_id, ExternalId, Timestamp, ViewportId};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Smallest brush radius in pixels.
pub const MIN_BRUSH_SIZE: u32 = 1;

/// Largest brush radius in pixels.
pub const MAX_BRUSH_SIZE: u32 = 100;

/// Brush radius a fresh store starts with.
pub const DEFAULT_BRUSH_SIZE: u32 = 10;

/// Brush overlay opacity a fresh store starts with.
pub const DEFAULT_BRUSH_OPACITY: f64 = 0.5;

/// Opacity a newly created layer starts with.
pub const DEFAULT_LAYER_OPACITY: f64 = 0.5;

/// Clamp to `[0, 1]`; NaN becomes 0.
pub fn clamp_opacity(opacity: f64) -> f64 {
    if opacity.is_nan() {
        0.0
    } else {
        opacity.clamp(0.0, 1.0)
    }
}

/// Clamp to `[MIN_BRUSH_SIZE, MAX_BRUSH_SIZE]`.
pub fn clamp_brush_size(size: i64) -> u32 {
    size.clamp(i64::from(MIN_BRUSH_SIZE), i64::from(MAX_BRUSH_SIZE)) as u32
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One mask layer shown on a viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationLayer {
    pub id: String,
    /// The engine's segmentation object this layer mirrors.
    pub segmentation_id: ExternalId,
    pub label_id: String,
    pub label_name: String,
    pub color: [u8; 3],
    pub visible: bool,
    /// In `[0, 1]`.
    pub opacity: f64,
    pub locked: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SegmentationLayer {
    /// A visible, unlocked layer with a fresh id.
    pub fn new(
        segmentation_id: impl Into<ExternalId>,
        label_id: impl Into<String>,
        label_name: impl Into<String>,
        color: [u8; 3],
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: new_id(),
            segmentation_id: segmentation_id.into(),
            label_id: label_id.into(),
            label_name: label_name.into(),
            color,
            visible: true,
            opacity: DEFAULT_LAYER_OPACITY,
            locked: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

/// Partial update for a [`SegmentationLayer`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerPatch {
    pub label_id: Option<String>,
    pub label_name: Option<String>,
    pub color: Option<[u8; 3]>,
    pub visible: Option<bool>,
    pub opacity: Option<f64>,
    pub locked: Option<bool>,
}

impl LayerPatch {
    fn merge_into(&self, layer: &mut SegmentationLayer) {
        if let Some(label_id) = &self.label_id {
            layer.label_id = label_id.clone();
        }
        if let Some(label_name) = &self.label_name {
            layer.label_name = label_name.clone();
        }
        if let Some(color) = self.color {
            layer.color = color;
        }
        if let Some(visible) = self.visible {
            layer.visible = visible;
        }
        if let Some(opacity) = self.opacity {
            layer.opacity = clamp_opacity(opacity);
        }
        if let Some(locked) = self.locked {
            layer.locked = locked;
        }
    }
}

/// Whether the brush paints or erases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushMode {
    #[default]
    Brush,
    Eraser,
}

/// Global brush/eraser tool parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrushSettings {
    pub size: u32,
    pub opacity: f64,
    #[serde(default)]
    pub mode: BrushMode,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            size: DEFAULT_BRUSH_SIZE,
            opacity: DEFAULT_BRUSH_OPACITY,
            mode: BrushMode::Brush,
        }
    }
}

/// Pointer to the layer currently receiving brush strokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveLayer {
    pub viewport_id: ViewportId,
    pub layer_id: String,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Layer metadata keyed by viewport, plus brush settings.
#[derive(Debug, Clone, Default)]
pub struct SegmentationStore {
    layers: HashMap<ViewportId, Vec<SegmentationLayer>>,
    active: Option<ActiveLayer>,
    brush: BrushSettings,
}

impl SegmentationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- queries ----

    /// Layers of a viewport in insertion order (empty if none).
    pub fn layers(&self, viewport_id: &str) -> &[SegmentationLayer] {
        self.layers.get(viewport_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn layer(&self, viewport_id: &str, layer_id: &str) -> Option<&SegmentationLayer> {
        self.layers(viewport_id).iter().find(|l| l.id == layer_id)
    }

    pub fn active_layer(&self) -> Option<&ActiveLayer> {
        self.active.as_ref()
    }

    pub fn brush(&self) -> BrushSettings {
        self.brush
    }

    // ---- layer CRUD ----

    /// Append a layer to the viewport's list and make it active.
    pub fn add_layer(&mut self, viewport_id: &str, layer: SegmentationLayer) {
        self.active = Some(ActiveLayer {
            viewport_id: viewport_id.to_string(),
            layer_id: layer.id.clone(),
        });
        self.layers
            .entry(viewport_id.to_string())
            .or_default()
            .push(layer);
    }

    /// Remove a layer, returning it. Clears the active pointer if it
    /// referenced the removed layer.
    pub fn remove_layer(&mut self, viewport_id: &str, layer_id: &str) -> Option<SegmentationLayer> {
        let list = self.layers.get_mut(viewport_id)?;
        let index = list.iter().position(|l| l.id == layer_id)?;
        let removed = list.remove(index);
        if self.is_active(viewport_id, layer_id) {
            self.active = None;
        }
        Some(removed)
    }

    /// Insert a layer at `index` (clamped) without touching the active
    /// pointer. Used to roll back a removal.
    pub fn restore_layer(&mut self, viewport_id: &str, index: usize, layer: SegmentationLayer) {
        let list = self.layers.entry(viewport_id.to_string()).or_default();
        let index = index.min(list.len());
        list.insert(index, layer);
    }

    /// Position of a layer inside its viewport list.
    pub fn layer_index(&self, viewport_id: &str, layer_id: &str) -> Option<usize> {
        self.layers(viewport_id).iter().position(|l| l.id == layer_id)
    }

    /// Merge `patch` into a layer and bump its timestamp. Returns `false`
    /// for an unknown layer.
    pub fn update_layer(&mut self, viewport_id: &str, layer_id: &str, patch: &LayerPatch) -> bool {
        self.with_layer_mut(viewport_id, layer_id, |layer| patch.merge_into(layer))
            .is_some()
    }

    /// Flip visibility, returning the new value.
    pub fn toggle_layer_visibility(&mut self, viewport_id: &str, layer_id: &str) -> Option<bool> {
        self.with_layer_mut(viewport_id, layer_id, |layer| {
            layer.visible = !layer.visible;
            layer.visible
        })
    }

    /// Set opacity clamped to `[0, 1]`, returning the stored value.
    pub fn set_layer_opacity(
        &mut self,
        viewport_id: &str,
        layer_id: &str,
        opacity: f64,
    ) -> Option<f64> {
        self.with_layer_mut(viewport_id, layer_id, |layer| {
            layer.opacity = clamp_opacity(opacity);
            layer.opacity
        })
    }

    pub fn set_layer_locked(&mut self, viewport_id: &str, layer_id: &str, locked: bool) -> bool {
        self.with_layer_mut(viewport_id, layer_id, |layer| layer.locked = locked)
            .is_some()
    }

    /// Point brush strokes at a layer, or clear the pointer. Returns
    /// `false` for an unknown layer.
    pub fn set_active_layer(&mut self, target: Option<(&str, &str)>) -> bool {
        match target {
            None => {
                self.active = None;
                true
            }
            Some((viewport_id, layer_id)) if self.layer(viewport_id, layer_id).is_some() => {
                self.active = Some(ActiveLayer {
                    viewport_id: viewport_id.to_string(),
                    layer_id: layer_id.to_string(),
                });
                true
            }
            Some(_) => false,
        }
    }

    /// Drop every layer of a viewport. Other viewports are untouched.
    pub fn clear_viewport(&mut self, viewport_id: &str) -> Vec<SegmentationLayer> {
        let removed = self.layers.remove(viewport_id).unwrap_or_default();
        if self
            .active
            .as_ref()
            .is_some_and(|a| a.viewport_id == viewport_id)
        {
            self.active = None;
        }
        removed
    }

    // ---- brush ----

    /// Set the brush radius clamped to `[1, 100]`, returning the stored value.
    pub fn set_brush_size(&mut self, size: i64) -> u32 {
        self.brush.size = clamp_brush_size(size);
        self.brush.size
    }

    /// Set the brush opacity clamped to `[0, 1]`, returning the stored value.
    pub fn set_brush_opacity(&mut self, opacity: f64) -> f64 {
        self.brush.opacity = clamp_opacity(opacity);
        self.brush.opacity
    }

    pub fn set_brush_mode(&mut self, mode: BrushMode) {
        self.brush.mode = mode;
    }

    /// Replace all brush settings, clamping each field.
    pub fn set_brush(&mut self, brush: BrushSettings) {
        self.set_brush_size(i64::from(brush.size));
        self.set_brush_opacity(brush.opacity);
        self.set_brush_mode(brush.mode);
    }

    // ---- private helpers ----

    fn is_active(&self, viewport_id: &str, layer_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.viewport_id == viewport_id && a.layer_id == layer_id)
    }

    fn with_layer_mut<T>(
        &mut self,
        viewport_id: &str,
        layer_id: &str,
        f: impl FnOnce(&mut SegmentationLayer) -> T,
    ) -> Option<T> {
        let layer = self
            .layers
            .get_mut(viewport_id)?
            .iter_mut()
            .find(|l| l.id == layer_id)?;
        let out = f(layer);
        layer.touch();
        Some(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(id: &str) -> SegmentationLayer {
        SegmentationLayer::new(format!("seg-{id}"), "tumor", "Tumor", [255, 68, 68]).with_id(id)
    }

    #[test]
    fn add_layer_sets_active() {
        let mut store = SegmentationStore::new();
        store.add_layer("vp1", layer("a"));
        store.add_layer("vp1", layer("b"));
        assert_eq!(store.layers("vp1").len(), 2);
        assert_eq!(
            store.active_layer(),
            Some(&ActiveLayer {
                viewport_id: "vp1".into(),
                layer_id: "b".into()
            })
        );
    }

    #[test]
    fn unknown_viewport_has_no_layers() {
        let store = SegmentationStore::new();
        assert!(store.layers("nope").is_empty());
        assert!(store.layer("nope", "a").is_none());
    }

    #[test]
    fn remove_layer_clears_active_pointer() {
        let mut store = SegmentationStore::new();
        store.add_layer("vp1", layer("a"));
        assert!(store.remove_layer("vp1", "a").is_some());
        assert!(store.active_layer().is_none());
        assert!(store.remove_layer("vp1", "a").is_none());
    }

    #[test]
    fn remove_other_layer_keeps_active_pointer() {
        let mut store = SegmentationStore::new();
        store.add_layer("vp1", layer("a"));
        store.add_layer("vp1", layer("b"));
        store.remove_layer("vp1", "a");
        assert_eq!(store.active_layer().unwrap().layer_id, "b");
    }

    #[test]
    fn same_layer_id_in_two_viewports() {
        let mut store = SegmentationStore::new();
        store.add_layer("vp1", layer("a"));
        store.add_layer("vp2", layer("a"));
        store.remove_layer("vp1", "a");
        assert!(store.layer("vp2", "a").is_some());
    }

    #[test]
    fn toggle_visibility_twice_restores_value() {
        let mut store = SegmentationStore::new();
        store.add_layer("vp1", layer("a"));
        let created = store.layer("vp1", "a").unwrap().updated_at;
        assert_eq!(store.toggle_layer_visibility("vp1", "a"), Some(false));
        assert_eq!(store.toggle_layer_visibility("vp1", "a"), Some(true));
        assert!(store.layer("vp1", "a").unwrap().updated_at >= created);
        assert_eq!(store.toggle_layer_visibility("vp1", "zzz"), None);
    }

    #[test]
    fn layer_opacity_is_clamped() {
        let mut store = SegmentationStore::new();
        store.add_layer("vp1", layer("a"));
        assert_eq!(store.set_layer_opacity("vp1", "a", -0.5), Some(0.0));
        assert_eq!(store.set_layer_opacity("vp1", "a", 1.5), Some(1.0));
        assert_eq!(store.set_layer_opacity("vp1", "a", 0.25), Some(0.25));
        assert_eq!(store.set_layer_opacity("vp1", "a", f64::NAN), Some(0.0));
    }

    #[test]
    fn brush_settings_are_clamped() {
        let mut store = SegmentationStore::new();
        assert_eq!(store.set_brush_size(0), 1);
        assert_eq!(store.set_brush_size(500), 100);
        assert_eq!(store.set_brush_size(-3), 1);
        assert_eq!(store.set_brush_size(42), 42);
        assert_eq!(store.set_brush_opacity(-0.5), 0.0);
        assert_eq!(store.set_brush_opacity(1.5), 1.0);
        assert_eq!(store.brush().size, 42);
    }

    #[test]
    fn brush_mode_switch() {
        let mut store = SegmentationStore::new();
        assert_eq!(store.brush().mode, BrushMode::Brush);
        store.set_brush_mode(BrushMode::Eraser);
        assert_eq!(store.brush().mode, BrushMode::Eraser);
    }

    #[test]
    fn update_layer_merges_patch() {
        let mut store = SegmentationStore::new();
        store.add_layer("vp1", layer("a"));
        let patch = LayerPatch {
            label_name: Some("Lesion".into()),
            opacity: Some(3.0),
            locked: Some(true),
            ..Default::default()
        };
        assert!(store.update_layer("vp1", "a", &patch));
        let updated = store.layer("vp1", "a").unwrap();
        assert_eq!(updated.label_name, "Lesion");
        assert_eq!(updated.opacity, 1.0);
        assert!(updated.locked);
        assert!(!store.update_layer("vp1", "missing", &patch));
    }

    #[test]
    fn clear_viewport_only_touches_that_viewport() {
        let mut store = SegmentationStore::new();
        store.add_layer("vp1", layer("a"));
        store.add_layer("vp2", layer("b"));
        let removed = store.clear_viewport("vp2");
        assert_eq!(removed.len(), 1);
        assert!(store.layers("vp2").is_empty());
        assert_eq!(store.layers("vp1").len(), 1);
        assert!(store.active_layer().is_none(), "active layer was in vp2");
    }

    #[test]
    fn clear_viewport_keeps_foreign_active_pointer() {
        let mut store = SegmentationStore::new();
        store.add_layer("vp2", layer("b"));
        store.add_layer("vp1", layer("a"));
        store.clear_viewport("vp2");
        assert_eq!(store.active_layer().unwrap().viewport_id, "vp1");
    }

    #[test]
    fn restore_layer_reinserts_at_index() {
        let mut store = SegmentationStore::new();
        store.add_layer("vp1", layer("a"));
        store.add_layer("vp1", layer("b"));
        store.add_layer("vp1", layer("c"));
        let index = store.layer_index("vp1", "b").unwrap();
        let removed = store.remove_layer("vp1", "b").unwrap();
        store.restore_layer("vp1", index, removed);
        let ids: Vec<&str> = store.layers("vp1").iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn set_active_layer_validates_target() {
        let mut store = SegmentationStore::new();
        store.add_layer("vp1", layer("a"));
        assert!(!store.set_active_layer(Some(("vp1", "zzz"))));
        assert!(store.set_active_layer(None));
        assert!(store.active_layer().is_none());
        assert!(store.set_active_layer(Some(("vp1", "a"))));
    }
}
