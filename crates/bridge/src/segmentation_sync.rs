//! Mirrors segmentation layer changes into the engine.
//!
//! The store stays the UI's source of truth; the engine owns the voxels.
//! Every operation touches both sides. When the engine call fails the store
//! change is rolled back and the failure is logged, so the two never drift.

use std::sync::Arc;

use tokio::sync::RwLock;

use dicomark_core::label::Label;
use dicomark_core::segmentation::{BrushMode, SegmentationLayer, SegmentationStore};
use dicomark_engine::{SegmentationEngine, SegmentationRequest};

use crate::error::BridgeError;

/// Segmentation store shared between the UI and the bridge.
pub type SharedSegmentationStore = Arc<RwLock<SegmentationStore>>;

/// Fallback mask color for labels whose color cannot be parsed.
const FALLBACK_COLOR: [u8; 3] = [255, 0, 0];

pub struct SegmentationSync<E> {
    engine: Arc<E>,
    store: SharedSegmentationStore,
}

impl<E: SegmentationEngine> SegmentationSync<E> {
    pub fn new(engine: Arc<E>, store: SharedSegmentationStore) -> Self {
        Self { engine, store }
    }

    pub fn store(&self) -> &SharedSegmentationStore {
        &self.store
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Create the engine segmentation, then the store layer (made active).
    ///
    /// Returns `None` without touching the store if the engine refuses.
    pub async fn create_layer(&self, viewport_id: &str, label: &Label) -> Option<SegmentationLayer> {
        let color = label.rgb().unwrap_or(FALLBACK_COLOR);
        let request = SegmentationRequest {
            viewport_id: viewport_id.to_string(),
            label_id: label.id.clone(),
            label_name: label.name.clone(),
            color,
        };

        let segmentation_id = match self.engine.create_segmentation(&request).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(viewport_id, label_id = %label.id, error = %e, "Failed to create segmentation");
                return None;
            }
        };

        let layer = SegmentationLayer::new(segmentation_id, &label.id, &label.name, color);
        self.store.write().await.add_layer(viewport_id, layer.clone());
        tracing::info!(
            viewport_id,
            layer_id = %layer.id,
            segmentation_id = %layer.segmentation_id,
            "Segmentation layer created",
        );
        Some(layer)
    }

    /// Remove a layer from the store and its segmentation from the engine.
    /// Returns `false` for an unknown layer or when the engine call failed
    /// (the layer is restored at its original position).
    pub async fn delete_layer(&self, viewport_id: &str, layer_id: &str) -> bool {
        let mut store = self.store.write().await;
        let Some(index) = store.layer_index(viewport_id, layer_id) else {
            return false;
        };
        let was_active = store
            .active_layer()
            .is_some_and(|a| a.viewport_id == viewport_id && a.layer_id == layer_id);
        let Some(layer) = store.remove_layer(viewport_id, layer_id) else {
            return false;
        };

        if let Err(e) = self
            .engine
            .remove_segmentation(viewport_id, &layer.segmentation_id)
            .await
        {
            tracing::error!(viewport_id, layer_id, error = %e, "Failed to remove segmentation, restoring layer");
            store.restore_layer(viewport_id, index, layer);
            if was_active {
                store.set_active_layer(Some((viewport_id, layer_id)));
            }
            return false;
        }

        tracing::info!(viewport_id, layer_id, "Segmentation layer deleted");
        true
    }

    /// Flip a layer's visibility on both sides, returning the new value.
    pub async fn toggle_visibility(&self, viewport_id: &str, layer_id: &str) -> Option<bool> {
        let mut store = self.store.write().await;
        let visible = store.toggle_layer_visibility(viewport_id, layer_id)?;
        let segmentation_id = store.layer(viewport_id, layer_id)?.segmentation_id.clone();

        if let Err(e) = self
            .engine
            .set_visibility(viewport_id, &segmentation_id, visible)
            .await
        {
            tracing::error!(viewport_id, layer_id, error = %e, "Failed to set segmentation visibility, reverting");
            store.toggle_layer_visibility(viewport_id, layer_id);
            return None;
        }

        tracing::debug!(viewport_id, layer_id, visible, "Segmentation visibility changed");
        Some(visible)
    }

    /// Set a layer's opacity (clamped to `[0, 1]`) on both sides, returning
    /// the stored value.
    pub async fn set_opacity(&self, viewport_id: &str, layer_id: &str, opacity: f64) -> Option<f64> {
        let mut store = self.store.write().await;
        let previous = store.layer(viewport_id, layer_id)?.opacity;
        let opacity = store.set_layer_opacity(viewport_id, layer_id, opacity)?;
        let segmentation_id = store.layer(viewport_id, layer_id)?.segmentation_id.clone();

        if let Err(e) = self
            .engine
            .set_opacity(viewport_id, &segmentation_id, opacity)
            .await
        {
            tracing::error!(viewport_id, layer_id, error = %e, "Failed to set segmentation opacity, reverting");
            store.set_layer_opacity(viewport_id, layer_id, previous);
            return None;
        }

        tracing::debug!(viewport_id, layer_id, opacity, "Segmentation opacity changed");
        Some(opacity)
    }

    /// Remove every layer of a viewport from the engine and the store.
    ///
    /// Layers whose engine removal fails stay in the store in their original
    /// order, and keep the active pointer if they held it. Returns how many
    /// layers were removed.
    pub async fn clear_viewport(&self, viewport_id: &str) -> usize {
        let mut store = self.store.write().await;
        let active_layer_id = store
            .active_layer()
            .filter(|active| active.viewport_id == viewport_id)
            .map(|active| active.layer_id.clone());
        let layers = store.clear_viewport(viewport_id);

        let mut removed = 0;
        let mut kept = 0;
        for layer in layers {
            match self
                .engine
                .remove_segmentation(viewport_id, &layer.segmentation_id)
                .await
            {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::error!(viewport_id, layer_id = %layer.id, error = %e, "Failed to remove segmentation, keeping layer");
                    store.restore_layer(viewport_id, kept, layer);
                    kept += 1;
                }
            }
        }

        if let Some(layer_id) = active_layer_id {
            store.set_active_layer(Some((viewport_id, &layer_id)));
        }
        removed
    }

    // ---- brush ----

    /// Store the clamped brush size and push it to the engine's brush tool.
    /// Engine failures are logged; the stored size is kept because the next
    /// [`sync_brush_to_engine`](Self::sync_brush_to_engine) re-applies it.
    pub async fn set_brush_size(&self, size: i64) -> u32 {
        let settings = {
            let mut store = self.store.write().await;
            store.set_brush_size(size);
            store.brush()
        };
        if let Err(e) = self.engine.configure_brush(&settings).await {
            tracing::warn!(size = settings.size, error = %e, "Failed to configure brush size");
        }
        settings.size
    }

    /// Store the clamped brush opacity and push it to the engine.
    pub async fn set_brush_opacity(&self, opacity: f64) -> f64 {
        let settings = {
            let mut store = self.store.write().await;
            store.set_brush_opacity(opacity);
            store.brush()
        };
        if let Err(e) = self.engine.configure_brush(&settings).await {
            tracing::warn!(opacity = settings.opacity, error = %e, "Failed to configure brush opacity");
        }
        settings.opacity
    }

    /// Switch between brush and eraser. The store keeps its previous mode if
    /// the engine cannot activate the tool.
    pub async fn activate_brush(&self, mode: BrushMode) -> Result<(), BridgeError> {
        let mut store = self.store.write().await;
        self.engine.activate_brush(mode).await?;
        store.set_brush_mode(mode);
        let settings = store.brush();
        drop(store);

        self.engine.configure_brush(&settings).await?;
        tracing::debug!(?mode, "Brush tool activated");
        Ok(())
    }

    /// Re-apply the stored brush settings, e.g. after switching viewports.
    pub async fn sync_brush_to_engine(&self) -> Result<(), BridgeError> {
        let settings = self.store.read().await.brush();
        self.engine.configure_brush(&settings).await?;
        Ok(())
    }

    /// Raw voxel data of a layer's segmentation.
    pub async fn export_layer_data(&self, viewport_id: &str, layer_id: &str) -> Result<Vec<u8>, BridgeError> {
        let segmentation_id = self
            .store
            .read()
            .await
            .layer(viewport_id, layer_id)
            .map(|layer| layer.segmentation_id.clone())
            .ok_or_else(|| BridgeError::NotFound {
                entity: "Segmentation layer",
                id: layer_id.to_string(),
            })?;
        Ok(self.engine.raw_data(&segmentation_id).await?)
    }
}
