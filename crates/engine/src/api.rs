//! Capabilities the bridges need from the rendering engine.
//!
//! The engine owns the voxel data and the on-screen annotation objects; the
//! application stores own everything else. These traits are the only way
//! the bridges reach into the engine, so tests can substitute fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use dicomark_core::segmentation::{BrushMode, BrushSettings};
use dicomark_core::types::ExternalId;

use crate::error::EngineError;
use crate::messages::{EngineAnnotation, EngineEvent};

/// The engine's annotation state module.
#[async_trait]
pub trait AnnotationEngine: Send + Sync {
    /// UIDs of every annotation the engine currently holds.
    async fn annotation_uids(&self) -> Result<Vec<ExternalId>, EngineError>;

    /// Create an annotation from a snapshot and return the UID the engine
    /// assigned. The snapshot's own `annotation_uid` is only a hint.
    async fn add_annotation(&self, annotation: &EngineAnnotation) -> Result<ExternalId, EngineError>;

    /// Replace handles, label and flags of the annotation with
    /// `annotation.annotation_uid`.
    async fn update_annotation(&self, annotation: &EngineAnnotation) -> Result<(), EngineError>;

    async fn remove_annotation(&self, annotation_uid: &str) -> Result<(), EngineError>;
}

/// What to create when adding a segmentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationRequest {
    pub viewport_id: String,
    pub label_id: String,
    pub label_name: String,
    pub color: [u8; 3],
}

/// The engine's segmentation module and brush tools.
#[async_trait]
pub trait SegmentationEngine: Send + Sync {
    /// Create a labelmap for the viewport and return its engine id.
    async fn create_segmentation(
        &self,
        request: &SegmentationRequest,
    ) -> Result<ExternalId, EngineError>;

    async fn remove_segmentation(
        &self,
        viewport_id: &str,
        segmentation_id: &str,
    ) -> Result<(), EngineError>;

    async fn set_visibility(
        &self,
        viewport_id: &str,
        segmentation_id: &str,
        visible: bool,
    ) -> Result<(), EngineError>;

    async fn set_opacity(
        &self,
        viewport_id: &str,
        segmentation_id: &str,
        opacity: f64,
    ) -> Result<(), EngineError>;

    /// Raw labelmap voxels for export.
    async fn raw_data(&self, segmentation_id: &str) -> Result<Vec<u8>, EngineError>;

    async fn activate_brush(&self, mode: BrushMode) -> Result<(), EngineError>;

    /// Push size and opacity to the brush tool configuration.
    async fn configure_brush(&self, settings: &BrushSettings) -> Result<(), EngineError>;
}

/// A mounted viewport element that emits annotation lifecycle events.
pub trait ViewportSurface: Send + Sync {
    fn element_id(&self) -> &str;

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}

/// Lazily loads the engine's tools module. Listeners may only be attached
/// once loading has completed.
#[async_trait]
pub trait ToolsLoader: Send + Sync {
    async fn load(&self) -> Result<(), EngineError>;
}
