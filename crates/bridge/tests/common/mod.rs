#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::RwLock;

use dicomark_core::annotation_store::AnnotationStore;
use dicomark_core::segmentation::{BrushMode, BrushSettings, SegmentationStore};
use dicomark_engine::messages::{
    AnnotationEventData, EngineAnnotation, EngineAnnotationData, EngineAnnotationMetadata,
    EngineEvent, Handles, SelectionChangedData,
};
use dicomark_engine::{
    AnnotationEngine, EngineError, SegmentationEngine, SegmentationRequest, ToolsLoader,
};

pub const SERIES_UID: &str = "1.2.840.113619.2.1";
pub const STUDY_UID: &str = "1.2.840.113619.2";

// ---------------------------------------------------------------------------
// Annotation engine
// ---------------------------------------------------------------------------

/// Tracks which annotation UIDs exist on the fake surface; can be switched
/// into a failing mode.
#[derive(Default)]
pub struct FakeAnnotationEngine {
    pub known: Mutex<HashSet<String>>,
    pub removed: Mutex<Vec<String>>,
    pub added: Mutex<Vec<EngineAnnotation>>,
    pub updated: Mutex<Vec<EngineAnnotation>>,
    pub fail: AtomicBool,
    pub refused: Mutex<HashSet<String>>,
    next_uid: AtomicUsize,
}

impl FakeAnnotationEngine {
    pub fn with_known(uids: &[&str]) -> Self {
        let engine = Self::default();
        engine
            .known
            .lock()
            .unwrap()
            .extend(uids.iter().map(|s| s.to_string()));
        engine
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn has(&self, uid: &str) -> bool {
        self.known.lock().unwrap().contains(uid)
    }

    pub fn known_count(&self) -> usize {
        self.known.lock().unwrap().len()
    }

    pub fn last_added(&self) -> Option<EngineAnnotation> {
        self.added.lock().unwrap().last().cloned()
    }

    pub fn last_updated(&self) -> Option<EngineAnnotation> {
        self.updated.lock().unwrap().last().cloned()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make removal of one UID fail while everything else succeeds.
    pub fn refuse_removal(&self, uid: &str) {
        self.refused.lock().unwrap().insert(uid.to_string());
    }

    fn check(&self, operation: &'static str) -> Result<(), EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::rejected(operation, "engine busy"));
        }
        Ok(())
    }
}

#[async_trait]
impl AnnotationEngine for FakeAnnotationEngine {
    async fn annotation_uids(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.known.lock().unwrap().iter().cloned().collect())
    }

    async fn add_annotation(&self, annotation: &EngineAnnotation) -> Result<String, EngineError> {
        self.check("add_annotation")?;
        let uid = format!("ext-r{}", self.next_uid.fetch_add(1, Ordering::SeqCst) + 1);
        self.known.lock().unwrap().insert(uid.clone());
        self.added.lock().unwrap().push(annotation.clone());
        Ok(uid)
    }

    async fn update_annotation(&self, annotation: &EngineAnnotation) -> Result<(), EngineError> {
        self.check("update_annotation")?;
        if !self.has(&annotation.annotation_uid) {
            return Err(EngineError::NotFound {
                kind: "Annotation",
                id: annotation.annotation_uid.clone(),
            });
        }
        self.updated.lock().unwrap().push(annotation.clone());
        Ok(())
    }

    async fn remove_annotation(&self, annotation_uid: &str) -> Result<(), EngineError> {
        self.check("remove_annotation")?;
        if self.refused.lock().unwrap().contains(annotation_uid) {
            return Err(EngineError::rejected("remove_annotation", "annotation locked"));
        }
        if !self.known.lock().unwrap().remove(annotation_uid) {
            return Err(EngineError::NotFound {
                kind: "Annotation",
                id: annotation_uid.to_string(),
            });
        }
        self.removed.lock().unwrap().push(annotation_uid.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Segmentation engine
// ---------------------------------------------------------------------------

/// Counts every call by name and fails on demand.
#[derive(Default)]
pub struct FakeSegmentationEngine {
    pub calls: Mutex<HashMap<&'static str, usize>>,
    pub visibility: Mutex<HashMap<String, bool>>,
    pub brush: Mutex<Option<BrushSettings>>,
    pub mode: Mutex<Option<BrushMode>>,
    pub fail: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeSegmentationEngine {
    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn last_brush(&self) -> Option<BrushSettings> {
        *self.brush.lock().unwrap()
    }

    fn record(&self, name: &'static str) -> Result<(), EngineError> {
        *self.calls.lock().unwrap().entry(name).or_default() += 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::rejected(name, "engine busy"));
        }
        Ok(())
    }
}

#[async_trait]
impl SegmentationEngine for FakeSegmentationEngine {
    async fn create_segmentation(&self, request: &SegmentationRequest) -> Result<String, EngineError> {
        self.record("create_segmentation")?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("seg-{}-{n}", request.label_id))
    }

    async fn remove_segmentation(&self, _viewport_id: &str, _segmentation_id: &str) -> Result<(), EngineError> {
        self.record("remove_segmentation")
    }

    async fn set_visibility(
        &self,
        _viewport_id: &str,
        segmentation_id: &str,
        visible: bool,
    ) -> Result<(), EngineError> {
        self.record("set_visibility")?;
        self.visibility
            .lock()
            .unwrap()
            .insert(segmentation_id.to_string(), visible);
        Ok(())
    }

    async fn set_opacity(&self, _viewport_id: &str, _segmentation_id: &str, _opacity: f64) -> Result<(), EngineError> {
        self.record("set_opacity")
    }

    async fn raw_data(&self, segmentation_id: &str) -> Result<Vec<u8>, EngineError> {
        self.record("raw_data")?;
        Ok(segmentation_id.as_bytes().to_vec())
    }

    async fn activate_brush(&self, mode: BrushMode) -> Result<(), EngineError> {
        self.record("activate_brush")?;
        *self.mode.lock().unwrap() = Some(mode);
        Ok(())
    }

    async fn configure_brush(&self, settings: &BrushSettings) -> Result<(), EngineError> {
        self.record("configure_brush")?;
        *self.brush.lock().unwrap() = Some(*settings);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tools loader
// ---------------------------------------------------------------------------

pub struct FakeToolsLoader {
    pub result: Result<(), EngineError>,
    pub loads: AtomicUsize,
}

impl FakeToolsLoader {
    pub fn ok() -> Self {
        Self {
            result: Ok(()),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(EngineError::Unavailable(reason.to_string())),
            loads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ToolsLoader for FakeToolsLoader {
    async fn load(&self) -> Result<(), EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

// ---------------------------------------------------------------------------
// Stores and events
// ---------------------------------------------------------------------------

pub fn shared_annotations() -> Arc<RwLock<AnnotationStore>> {
    Arc::new(RwLock::new(AnnotationStore::new()))
}

pub fn shared_segmentation() -> Arc<RwLock<SegmentationStore>> {
    Arc::new(RwLock::new(SegmentationStore::new()))
}

/// An engine annotation drawn on `image_id` of instance `sop_uid`.
pub fn engine_annotation(uid: &str, tool_name: &str, sop_uid: &str, image_id: &str) -> EngineAnnotation {
    EngineAnnotation {
        annotation_uid: uid.to_string(),
        metadata: EngineAnnotationMetadata {
            tool_name: tool_name.to_string(),
            referenced_image_id: Some(image_id.to_string()),
            sop_instance_uid: Some(sop_uid.to_string()),
            series_instance_uid: Some(SERIES_UID.to_string()),
            study_instance_uid: Some(STUDY_UID.to_string()),
        },
        data: EngineAnnotationData {
            handles: Handles {
                points: vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0]],
                text_box: None,
            },
            ..EngineAnnotationData::default()
        },
        is_visible: true,
        is_locked: false,
    }
}

pub fn added(annotation: EngineAnnotation) -> EngineEvent {
    EngineEvent::AnnotationAdded(AnnotationEventData {
        viewport_id: Some("viewport-1".to_string()),
        annotation,
    })
}

pub fn modified(annotation: EngineAnnotation) -> EngineEvent {
    EngineEvent::AnnotationModified(AnnotationEventData {
        viewport_id: Some("viewport-1".to_string()),
        annotation,
    })
}

pub fn removed(annotation: EngineAnnotation) -> EngineEvent {
    EngineEvent::AnnotationRemoved(AnnotationEventData {
        viewport_id: Some("viewport-1".to_string()),
        annotation,
    })
}

pub fn selection(uids: &[&str]) -> EngineEvent {
    EngineEvent::AnnotationSelectionChanged(SelectionChangedData {
        viewport_id: Some("viewport-1".to_string()),
        selection: uids.iter().map(|s| s.to_string()).collect(),
    })
}
