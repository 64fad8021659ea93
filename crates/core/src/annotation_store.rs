//! The canonical, session-scoped annotation store.
//!
//! Every mutating call appends a reversible [`HistoryEntry`] and advances the
//! history cursor; [`AnnotationStore::undo`] and [`AnnotationStore::redo`]
//! replay entries without re-deriving state. Label edits, selection and tool
//! choice live alongside the annotations but are not recorded in history.
//!
//! Mutations that target an unknown id are silent no-ops. They return
//! `false` (or `None`) so callers that care can tell, but nothing is logged.

use validator::Validate;

use crate::annotation::{Annotation, AnnotationPatch, ToolType};
use crate::error::CoreError;
use crate::history::{AnnotationHistory, HistoryEntry};
use crate::label::{default_labels, Label, LabelPatch};

/// Owns the annotation list, the undo/redo log, labels and selection.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    history: AnnotationHistory,
    labels: Vec<Label>,
    selected_label_id: Option<String>,
    active_annotation_id: Option<String>,
    active_tool: Option<ToolType>,
    dirty: bool,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationStore {
    /// Create an empty store seeded with the default label set.
    pub fn new() -> Self {
        Self::with_history(AnnotationHistory::new())
    }

    /// Create an empty store using a custom history log (e.g. a different
    /// capacity).
    pub fn with_history(history: AnnotationHistory) -> Self {
        Self {
            annotations: Vec::new(),
            history,
            labels: default_labels(),
            selected_label_id: None,
            active_annotation_id: None,
            active_tool: None,
            dirty: false,
        }
    }

    // ---- annotation queries ----

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    /// Find the annotation correlated with the engine's `external_id`.
    pub fn find_by_external_id(&self, external_id: &str) -> Option<&Annotation> {
        self.annotations
            .iter()
            .find(|a| a.external_id.as_deref() == Some(external_id))
    }

    /// Annotations pinned to the image with the given SOP instance UID.
    pub fn annotations_for_image(&self, sop_instance_uid: &str) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|a| a.reference.sop_instance_uid == sop_instance_uid)
            .collect()
    }

    /// Annotations belonging to the series with the given UID.
    pub fn annotations_for_series(&self, series_instance_uid: &str) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|a| a.reference.series_instance_uid == series_instance_uid)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    // ---- annotation mutations ----

    /// Append an annotation. Duplicate ids are not rejected here.
    pub fn add_annotation(&mut self, annotation: Annotation) {
        self.history.push(HistoryEntry::Add {
            annotation: annotation.clone(),
        });
        self.annotations.push(annotation);
        self.dirty = true;
    }

    /// Merge `patch` into the annotation with `id` and refresh its update
    /// timestamp. Returns `false` if no such annotation exists.
    pub fn update_annotation(&mut self, id: &str, patch: &AnnotationPatch) -> bool {
        let Some(current) = self.annotations.iter_mut().find(|a| a.id == id) else {
            return false;
        };

        let previous = current.clone();
        patch.merge_into(current);
        current.updated_at = chrono::Utc::now();
        let next = current.clone();

        self.history.push(HistoryEntry::Update { previous, next });
        self.dirty = true;
        true
    }

    /// Remove the annotation with `id`, returning it. Clears the active
    /// annotation if it was the removed record.
    pub fn delete_annotation(&mut self, id: &str) -> Option<Annotation> {
        let index = self.annotations.iter().position(|a| a.id == id)?;
        let removed = self.annotations.remove(index);

        if self.active_annotation_id.as_deref() == Some(id) {
            self.active_annotation_id = None;
        }

        self.history.push(HistoryEntry::Delete {
            previous: removed.clone(),
            index,
        });
        self.dirty = true;
        Some(removed)
    }

    /// Remove every annotation. The history entry carries no snapshot, so
    /// this cannot be undone.
    pub fn clear_annotations(&mut self) -> bool {
        if self.annotations.is_empty() {
            return false;
        }
        self.annotations.clear();
        self.active_annotation_id = None;
        self.history.push(HistoryEntry::Clear);
        self.dirty = true;
        true
    }

    /// Reverse the entry at the history cursor. Returns `false` when there is
    /// nothing to undo. Undoing a clear moves the cursor but restores nothing.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.history.step_back() else {
            return false;
        };

        match entry {
            HistoryEntry::Add { annotation } => {
                self.remove_without_history(&annotation.id);
            }
            HistoryEntry::Update { previous, .. } => {
                self.replace_without_history(previous);
            }
            HistoryEntry::Delete { previous, index } => {
                let index = index.min(self.annotations.len());
                self.annotations.insert(index, previous);
            }
            HistoryEntry::Clear => {}
        }
        self.dirty = true;
        true
    }

    /// Re-apply the entry after the history cursor. Returns `false` when
    /// there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.history.step_forward() else {
            return false;
        };

        match entry {
            HistoryEntry::Add { annotation } => {
                self.annotations.push(annotation);
            }
            HistoryEntry::Update { next, .. } => {
                self.replace_without_history(next);
            }
            HistoryEntry::Delete { previous, .. } => {
                self.remove_without_history(&previous.id);
            }
            HistoryEntry::Clear => {
                self.annotations.clear();
                self.active_annotation_id = None;
            }
        }
        self.dirty = true;
        true
    }

    /// The entry [`undo`](Self::undo) would reverse.
    pub fn undo_entry(&self) -> Option<&HistoryEntry> {
        self.history.current()
    }

    /// The entry [`redo`](Self::redo) would re-apply.
    pub fn redo_entry(&self) -> Option<&HistoryEntry> {
        self.history.upcoming()
    }

    /// Point annotation `id` at a new engine id, in the live record and in
    /// every history snapshot. Not a history entry and not a user change, so
    /// the dirty flag is left alone. Returns whether the live record exists.
    pub fn relink_external_id(&mut self, id: &str, external_id: Option<&str>) -> bool {
        self.history.relink(id, external_id);
        match self.annotations.iter_mut().find(|a| a.id == id) {
            Some(current) => {
                current.external_id = external_id.map(str::to_owned);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Index of the last applied history entry, `None` when empty or fully
    /// undone.
    pub fn history_index(&self) -> Option<usize> {
        self.history.index()
    }

    pub fn history(&self) -> &AnnotationHistory {
        &self.history
    }

    /// Drop annotations, history and selection. Labels are kept.
    pub fn reset(&mut self) {
        self.annotations.clear();
        self.history.clear();
        self.active_annotation_id = None;
        self.dirty = false;
    }

    fn remove_without_history(&mut self, id: &str) {
        if let Some(index) = self.annotations.iter().position(|a| a.id == id) {
            self.annotations.remove(index);
        }
        if self.active_annotation_id.as_deref() == Some(id) {
            self.active_annotation_id = None;
        }
    }

    fn replace_without_history(&mut self, snapshot: Annotation) {
        if let Some(current) = self.annotations.iter_mut().find(|a| a.id == snapshot.id) {
            *current = snapshot;
        }
    }

    // ---- dirty tracking ----

    /// Whether there are changes since the last [`mark_saved`](Self::mark_saved).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    // ---- selection ----

    pub fn active_annotation_id(&self) -> Option<&str> {
        self.active_annotation_id.as_deref()
    }

    /// Set or clear the active annotation. Returns `false` (and leaves the
    /// selection untouched) if `id` names an unknown annotation.
    pub fn set_active_annotation(&mut self, id: Option<&str>) -> bool {
        match id {
            None => {
                self.active_annotation_id = None;
                true
            }
            Some(id) if self.get(id).is_some() => {
                self.active_annotation_id = Some(id.to_string());
                true
            }
            Some(_) => false,
        }
    }

    pub fn active_tool(&self) -> Option<ToolType> {
        self.active_tool
    }

    pub fn select_tool(&mut self, tool: Option<ToolType>) {
        self.active_tool = tool;
    }

    // ---- labels ----

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn label(&self, id: &str) -> Option<&Label> {
        self.labels.iter().find(|l| l.id == id)
    }

    /// Add a label. Fails on invalid fields or a duplicate id.
    pub fn add_label(&mut self, label: Label) -> Result<(), CoreError> {
        label.validate()?;
        if self.label(&label.id).is_some() {
            return Err(CoreError::Conflict(format!(
                "Label '{}' already exists",
                label.id
            )));
        }
        self.labels.push(label);
        Ok(())
    }

    /// Apply `patch` to the label with `id`.
    pub fn update_label(&mut self, id: &str, patch: &LabelPatch) -> Result<(), CoreError> {
        let current = self
            .labels
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "label",
                id: id.to_string(),
            })?;
        let next = patch.applied_to(current);
        next.validate()?;
        *current = next;
        Ok(())
    }

    /// Remove the label with `id`, clearing the selection if it pointed at
    /// it. Annotations keep their denormalized copy. Returns `false` for an
    /// unknown id.
    pub fn delete_label(&mut self, id: &str) -> bool {
        let before = self.labels.len();
        self.labels.retain(|l| l.id != id);
        if self.selected_label_id.as_deref() == Some(id) {
            self.selected_label_id = None;
        }
        self.labels.len() != before
    }

    /// Select a label for subsequent drawing, or clear the selection.
    /// Selecting an unknown id returns `false` and changes nothing.
    pub fn select_label(&mut self, id: Option<&str>) -> bool {
        match id {
            None => {
                self.selected_label_id = None;
                true
            }
            Some(id) if self.label(id).is_some() => {
                self.selected_label_id = Some(id.to_string());
                true
            }
            Some(_) => false,
        }
    }

    pub fn selected_label(&self) -> Option<&Label> {
        self.selected_label_id.as_deref().and_then(|id| self.label(id))
    }

    /// Replace the whole label set (used when restoring preferences).
    /// Later duplicates of an id are dropped; invalid labels are skipped.
    /// An empty result falls back to the default set.
    pub fn replace_labels(&mut self, labels: Vec<Label>) {
        let mut next: Vec<Label> = Vec::with_capacity(labels.len());
        for label in labels {
            if label.validate().is_ok() && !next.iter().any(|l| l.id == label.id) {
                next.push(label);
            }
        }
        if next.is_empty() {
            tracing::warn!("No usable labels to restore, keeping the default set");
            next = default_labels();
        }
        self.labels = next;
        if self.selected_label().is_none() {
            self.selected_label_id = None;
        }
    }

    /// Restore the default label set.
    pub fn reset_labels(&mut self) {
        self.replace_labels(default_labels());
    }

    // ---- explicit save/load ----

    /// Serialize the current annotations as a JSON array for saving to a
    /// backend session.
    pub fn export_annotations(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(&self.annotations)?)
    }

    /// Import annotations from a JSON array previously produced by
    /// [`export_annotations`](Self::export_annotations). Each record is
    /// added through [`add_annotation`](Self::add_annotation). Returns the
    /// number imported.
    pub fn import_annotations(&mut self, json: &serde_json::Value) -> Result<usize, CoreError> {
        if !json.is_array() {
            return Err(CoreError::Validation(
                "annotations payload must be a JSON array".to_string(),
            ));
        }
        let records: Vec<Annotation> = serde_json::from_value(json.clone())
            .map_err(|e| CoreError::Validation(format!("invalid annotation record: {e}")))?;
        let count = records.len();
        for record in records {
            self.add_annotation(record);
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
