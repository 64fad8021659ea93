//! Keeps the annotation store and the engine's annotation state in step.
//!
//! Engine → store: the four lifecycle events become store mutations. Events
//! for annotations the bridge cannot correlate are ignored, and so are
//! modifications that change nothing, which is what the engine echoes back
//! after the bridge itself pushed a snapshot.
//!
//! Store → engine: deletions, clears, undo and redo change the engine first
//! and only then touch the store, so a failed engine call leaves the store
//! unchanged. The store write lock is held across the engine call; echoed
//! engine events queue behind it and find the correlation already updated.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::RwLock;

use dicomark_core::annotation::{
    Annotation, AnnotationPatch, ImageReference, LabelRef, ToolType,
};
use dicomark_core::annotation_store::AnnotationStore;
use dicomark_core::history::HistoryEntry;
use dicomark_core::types::{AnnotationId, ExternalId};
use dicomark_engine::messages::{
    AnnotationEventData, EngineAnnotation, EngineEvent, SelectionChangedData,
};
use dicomark_engine::{tools, AnnotationEngine, EngineError};
use dicomark_frames::parse_image_id;

use crate::correlation::CorrelationTable;
use crate::error::BridgeError;

/// Annotation store shared between the UI and the bridge.
pub type SharedAnnotationStore = Arc<RwLock<AnnotationStore>>;

/// What handling an engine event did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Added(AnnotationId),
    Updated(AnnotationId),
    Removed(AnnotationId),
    /// Active annotation set (or cleared with `None`).
    Selected(Option<AnnotationId>),
    /// Nothing to do: unknown annotation, already correlated, or no change.
    Ignored,
}

pub struct AnnotationSync<E> {
    engine: Arc<E>,
    store: SharedAnnotationStore,
    correlation: Mutex<CorrelationTable>,
}

impl<E: AnnotationEngine> AnnotationSync<E> {
    pub fn new(engine: Arc<E>, store: SharedAnnotationStore) -> Self {
        Self {
            engine,
            store,
            correlation: Mutex::new(CorrelationTable::new()),
        }
    }

    pub fn store(&self) -> &SharedAnnotationStore {
        &self.store
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Engine UID currently linked to a store annotation.
    pub fn external_id_for(&self, store_id: &str) -> Option<String> {
        self.correlation().external_id(store_id).map(str::to_owned)
    }

    pub fn correlated_count(&self) -> usize {
        self.correlation().len()
    }

    // ---- engine → store ----

    pub async fn handle_event(&self, event: &EngineEvent) -> SyncAction {
        match event {
            EngineEvent::AnnotationAdded(data) => self.on_added(data).await,
            EngineEvent::AnnotationModified(data) => self.on_modified(data).await,
            EngineEvent::AnnotationRemoved(data) => self.on_removed(data).await,
            EngineEvent::AnnotationSelectionChanged(data) => self.on_selection_changed(data).await,
        }
    }

    async fn on_added(&self, data: &AnnotationEventData) -> SyncAction {
        let engine_annotation = &data.annotation;
        let uid = engine_annotation.annotation_uid.as_str();
        let mut store = self.store.write().await;

        if let Some(existing) = self.resolve(&store, uid) {
            tracing::trace!(annotation_uid = uid, annotation_id = %existing, "Annotation already correlated, ignoring add");
            return SyncAction::Ignored;
        }

        let tool_name = engine_annotation.metadata.tool_name.as_str();
        let tool_type = tools::tool_type_for(tool_name).unwrap_or_else(|| {
            tracing::warn!(tool_name, "Unknown engine tool, recording annotation as length");
            ToolType::Length
        });

        let mut annotation = Annotation::new(tool_type, image_reference(engine_annotation))
            .with_data(engine_annotation.annotation_data())
            .with_external_id(uid);
        annotation.visible = engine_annotation.is_visible;
        annotation.locked = engine_annotation.is_locked;
        if let Some(label) = store.selected_label() {
            annotation = annotation.with_label(label);
        }

        let id = annotation.id.clone();
        store.add_annotation(annotation);
        self.correlation().insert(id.clone(), uid);

        tracing::debug!(
            annotation_id = %id,
            annotation_uid = uid,
            tool = %tool_type,
            "Annotation added from engine",
        );
        SyncAction::Added(id)
    }

    async fn on_modified(&self, data: &AnnotationEventData) -> SyncAction {
        let engine_annotation = &data.annotation;
        let uid = engine_annotation.annotation_uid.as_str();
        let mut store = self.store.write().await;

        let Some(id) = self.resolve(&store, uid) else {
            tracing::trace!(annotation_uid = uid, "Modified annotation not in store, ignoring");
            return SyncAction::Ignored;
        };

        let mut patch = AnnotationPatch::default()
            .with_data(engine_annotation.annotation_data())
            .with_visible(engine_annotation.is_visible)
            .with_locked(engine_annotation.is_locked);
        if let Some(text) = engine_annotation.data.label.as_deref() {
            if let Some(label) = store
                .labels()
                .iter()
                .find(|label| label.id == text || label.name == text)
            {
                patch = patch.with_label(Some(LabelRef::from(label)));
            }
        }

        if store.get(&id).is_some_and(|current| !changes(&patch, current)) {
            tracing::trace!(annotation_id = %id, annotation_uid = uid, "Modification changes nothing, ignoring");
            return SyncAction::Ignored;
        }

        store.update_annotation(&id, &patch);
        tracing::debug!(annotation_id = %id, annotation_uid = uid, "Annotation modified from engine");
        SyncAction::Updated(id)
    }

    async fn on_removed(&self, data: &AnnotationEventData) -> SyncAction {
        let uid = data.annotation.annotation_uid.as_str();
        let mut store = self.store.write().await;

        let Some(id) = self.resolve(&store, uid) else {
            tracing::trace!(annotation_uid = uid, "Removed annotation not in store, ignoring");
            return SyncAction::Ignored;
        };

        store.delete_annotation(&id);
        self.correlation().remove_by_store(&id);
        tracing::debug!(annotation_id = %id, annotation_uid = uid, "Annotation removed from engine");
        SyncAction::Removed(id)
    }

    async fn on_selection_changed(&self, data: &SelectionChangedData) -> SyncAction {
        let mut store = self.store.write().await;

        let Some(uid) = data.selection.last() else {
            store.set_active_annotation(None);
            return SyncAction::Selected(None);
        };

        match self.resolve(&store, uid) {
            Some(id) => {
                store.set_active_annotation(Some(&id));
                SyncAction::Selected(Some(id))
            }
            None => {
                tracing::trace!(annotation_uid = %uid, "Selected annotation not in store, ignoring");
                SyncAction::Ignored
            }
        }
    }

    // ---- store → engine ----

    /// Delete an annotation from the engine and then from the store.
    ///
    /// Returns `Ok(None)` for an unknown id. An engine failure aborts the
    /// delete and leaves the store untouched; an engine that no longer knows
    /// the annotation counts as already removed.
    pub async fn delete_annotation(&self, id: &str) -> Result<Option<Annotation>, BridgeError> {
        let mut store = self.store.write().await;
        if store.get(id).is_none() {
            return Ok(None);
        }

        if let Some(uid) = self.linked_uid(&store, id) {
            self.remove_from_engine(id, &uid).await?;
        }

        let removed = store.delete_annotation(id);
        self.correlation().remove_by_store(id);
        tracing::debug!(annotation_id = %id, "Annotation deleted");
        Ok(removed)
    }

    /// Remove every correlated annotation from the engine, then clear the
    /// store.
    ///
    /// If the engine fails partway, the annotations it already removed are
    /// deleted from the store individually before the error is returned, so
    /// neither side keeps an object the other has lost.
    pub async fn clear_annotations(&self) -> Result<usize, BridgeError> {
        let mut store = self.store.write().await;
        let targets: Vec<(AnnotationId, Option<ExternalId>)> = store
            .annotations()
            .iter()
            .map(|a| (a.id.clone(), self.linked_uid(&store, &a.id)))
            .collect();

        let mut removed_from_engine: Vec<AnnotationId> = Vec::new();
        for (id, uid) in &targets {
            if let Some(uid) = uid {
                if let Err(e) = self.remove_from_engine(id, uid).await {
                    for done in &removed_from_engine {
                        store.delete_annotation(done);
                        self.correlation().remove_by_store(done);
                    }
                    return Err(e);
                }
                removed_from_engine.push(id.clone());
            }
        }

        store.clear_annotations();
        self.correlation().clear();
        tracing::info!(count = targets.len(), "Annotations cleared");
        Ok(targets.len())
    }

    /// Undo the last store mutation on both sides.
    ///
    /// Only annotations that live on the rendering surface (they carry an
    /// engine id) are mirrored. If the engine refuses, the history cursor
    /// does not move and the error is returned. `Ok(false)` means there was
    /// nothing to undo.
    pub async fn undo(&self) -> Result<bool, BridgeError> {
        let mut store = self.store.write().await;
        let Some(entry) = store.undo_entry().cloned() else {
            return Ok(false);
        };

        match &entry {
            HistoryEntry::Add { annotation } => {
                if let Some(uid) = self.linked_uid(&store, &annotation.id) {
                    self.remove_from_engine(&annotation.id, &uid).await?;
                }
                store.undo();
                self.correlation().remove_by_store(&annotation.id);
            }
            HistoryEntry::Update { previous, .. } => {
                self.push_snapshot(&store, previous).await?;
                store.undo();
            }
            HistoryEntry::Delete { previous, .. } => {
                let uid = match previous.external_id {
                    Some(_) => Some(self.add_to_engine(previous).await?),
                    None => None,
                };
                store.undo();
                if let Some(uid) = uid {
                    self.link(&mut store, &previous.id, &uid);
                }
            }
            // Nothing was snapshotted, so both sides stay empty.
            HistoryEntry::Clear => {
                store.undo();
            }
        }

        tracing::debug!(entry = entry.kind(), "Undo applied to engine and store");
        Ok(true)
    }

    /// Redo the next store mutation on both sides. Same failure rules as
    /// [`undo`](Self::undo).
    pub async fn redo(&self) -> Result<bool, BridgeError> {
        let mut store = self.store.write().await;
        let Some(entry) = store.redo_entry().cloned() else {
            return Ok(false);
        };

        match &entry {
            HistoryEntry::Add { annotation } => {
                let uid = match annotation.external_id {
                    Some(_) => Some(self.add_to_engine(annotation).await?),
                    None => None,
                };
                store.redo();
                if let Some(uid) = uid {
                    self.link(&mut store, &annotation.id, &uid);
                }
            }
            HistoryEntry::Update { next, .. } => {
                self.push_snapshot(&store, next).await?;
                store.redo();
            }
            HistoryEntry::Delete { previous, .. } => {
                if let Some(uid) = self.linked_uid(&store, &previous.id) {
                    self.remove_from_engine(&previous.id, &uid).await?;
                }
                store.redo();
                self.correlation().remove_by_store(&previous.id);
            }
            HistoryEntry::Clear => {
                self.remove_all_from_engine(&mut store).await?;
                store.redo();
                self.correlation().clear();
            }
        }

        tracing::debug!(entry = entry.kind(), "Redo applied to engine and store");
        Ok(true)
    }

    /// Bring the engine in line with the store: every store annotation the
    /// engine does not hold (lost engine objects, imported records) is
    /// created there and relinked. Runs when a listener attaches. Returns
    /// the number of annotations created.
    pub async fn reconcile(&self) -> Result<usize, BridgeError> {
        let mut store = self.store.write().await;
        let engine_uids: HashSet<ExternalId> =
            self.engine.annotation_uids().await?.into_iter().collect();

        let missing: Vec<Annotation> = store
            .annotations()
            .iter()
            .filter(|a| match self.linked_uid(&store, &a.id) {
                Some(uid) => !engine_uids.contains(&uid),
                None => true,
            })
            .cloned()
            .collect();

        for snapshot in &missing {
            let uid = self.add_to_engine(snapshot).await?;
            self.link(&mut store, &snapshot.id, &uid);
        }

        if !missing.is_empty() {
            tracing::info!(count = missing.len(), "Re-created annotations missing from engine");
        }
        Ok(missing.len())
    }

    // ---- private helpers ----

    async fn remove_from_engine(&self, id: &str, uid: &str) -> Result<(), BridgeError> {
        match self.engine.remove_annotation(uid).await {
            Ok(()) => Ok(()),
            Err(EngineError::NotFound { .. }) => {
                tracing::debug!(annotation_id = %id, annotation_uid = uid, "Annotation already gone from engine");
                Ok(())
            }
            Err(e) => {
                tracing::error!(annotation_id = %id, annotation_uid = uid, error = %e, "Failed to remove annotation from engine");
                Err(e.into())
            }
        }
    }

    async fn add_to_engine(&self, snapshot: &Annotation) -> Result<ExternalId, BridgeError> {
        let hint = snapshot.external_id.clone().unwrap_or_default();
        let engine_annotation = EngineAnnotation::from_annotation(snapshot, hint);
        self.engine
            .add_annotation(&engine_annotation)
            .await
            .map_err(|e| {
                tracing::error!(annotation_id = %snapshot.id, error = %e, "Failed to add annotation to engine");
                e.into()
            })
    }

    /// Push a snapshot's handles, label and flags to the engine object the
    /// annotation is linked to. Unlinked annotations have nothing to push.
    async fn push_snapshot(&self, store: &AnnotationStore, snapshot: &Annotation) -> Result<(), BridgeError> {
        let Some(uid) = self.linked_uid(store, &snapshot.id) else {
            return Ok(());
        };
        let engine_annotation = EngineAnnotation::from_annotation(snapshot, uid.as_str());
        self.engine
            .update_annotation(&engine_annotation)
            .await
            .map_err(|e| {
                tracing::error!(annotation_id = %snapshot.id, annotation_uid = %uid, error = %e, "Failed to update annotation in engine");
                e.into()
            })
    }

    /// Remove every linked annotation from the engine. On failure the ones
    /// already removed are re-created so the store can stay as it is.
    async fn remove_all_from_engine(&self, store: &mut AnnotationStore) -> Result<(), BridgeError> {
        let view: &AnnotationStore = store;
        let targets: Vec<(AnnotationId, ExternalId)> = view
            .annotations()
            .iter()
            .filter_map(|a| self.linked_uid(view, &a.id).map(|uid| (a.id.clone(), uid)))
            .collect();

        for (n, (id, uid)) in targets.iter().enumerate() {
            let Err(e) = self.remove_from_engine(id, uid).await else {
                continue;
            };
            for (done, _) in &targets[..n] {
                let Some(snapshot) = store.get(done).cloned() else {
                    continue;
                };
                match self.add_to_engine(&snapshot).await {
                    Ok(uid) => self.link(store, done, &uid),
                    Err(restore) => {
                        tracing::error!(annotation_id = %done, error = %restore, "Failed to restore annotation in engine");
                    }
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Engine UID for a store id: the correlation table first, then the
    /// record's own `external_id`.
    fn linked_uid(&self, store: &AnnotationStore, id: &str) -> Option<ExternalId> {
        if let Some(uid) = self.correlation().external_id(id) {
            return Some(uid.to_owned());
        }
        store.get(id).and_then(|a| a.external_id.clone())
    }

    fn link(&self, store: &mut AnnotationStore, id: &str, uid: &str) {
        store.relink_external_id(id, Some(uid));
        self.correlation().insert(id.to_owned(), uid);
    }

    /// Store id for an engine UID. Falls back to the store's own
    /// `external_id` field (annotations restored by undo or import) and
    /// relinks on a hit.
    fn resolve(&self, store: &AnnotationStore, uid: &str) -> Option<AnnotationId> {
        let mut table = self.correlation();
        if let Some(id) = table.store_id(uid).map(str::to_owned) {
            if store.get(&id).is_some() {
                return Some(id);
            }
            table.remove_by_external(uid);
        }

        let id = store.find_by_external_id(uid)?.id.clone();
        table.insert(id.clone(), uid);
        Some(id)
    }

    fn correlation(&self) -> MutexGuard<'_, CorrelationTable> {
        self.correlation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Whether applying `patch` would change anything the user can see.
fn changes(patch: &AnnotationPatch, current: &Annotation) -> bool {
    let mut next = current.clone();
    patch.merge_into(&mut next);
    next != *current
}

/// Build the store reference from engine metadata. The frame number comes
/// from the `?frame=` suffix of the referenced image id.
fn image_reference(annotation: &EngineAnnotation) -> ImageReference {
    let metadata = &annotation.metadata;
    let frame_number = metadata
        .referenced_image_id
        .as_deref()
        .and_then(parse_image_id)
        .and_then(|parsed| parsed.frame);

    ImageReference {
        sop_instance_uid: metadata.sop_instance_uid.clone().unwrap_or_default(),
        series_instance_uid: metadata.series_instance_uid.clone().unwrap_or_default(),
        study_instance_uid: metadata.study_instance_uid.clone().unwrap_or_default(),
        image_id: metadata.referenced_image_id.clone(),
        frame_number,
    }
}
