//! Bounded, linear undo/redo log for annotation mutations.
//!
//! The log is a sequence of [`HistoryEntry`] values plus a cursor pointing
//! at the last applied entry. Pushing after an undo discards everything
//! after the cursor. When the log grows past [`MAX_HISTORY_ENTRIES`] the
//! oldest entries are dropped, which silently limits undo depth.

use std::collections::VecDeque;

use crate::annotation::Annotation;

/// Maximum number of entries retained in the history log.
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// One reversible annotation mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    Add {
        annotation: Annotation,
    },
    Update {
        previous: Annotation,
        next: Annotation,
    },
    Delete {
        previous: Annotation,
        /// Position the record occupied before removal.
        index: usize,
    },
    /// Bulk clear. Carries no snapshot, so undoing it restores nothing.
    Clear,
}

impl HistoryEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Clear => "clear",
        }
    }

    fn snapshots_mut(&mut self) -> Vec<&mut Annotation> {
        match self {
            Self::Add { annotation } => vec![annotation],
            Self::Update { previous, next } => vec![previous, next],
            Self::Delete { previous, .. } => vec![previous],
            Self::Clear => Vec::new(),
        }
    }
}

/// Linear history with a cursor.
#[derive(Debug, Clone)]
pub struct AnnotationHistory {
    entries: VecDeque<HistoryEntry>,
    /// Index of the last applied entry; `None` when nothing is applied.
    cursor: Option<usize>,
    capacity: usize,
}

impl Default for AnnotationHistory {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY_ENTRIES)
    }
}

impl AnnotationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log retaining at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            capacity: capacity.max(1),
        }
    }

    /// Append an entry after the cursor, discarding any redo branch.
    pub fn push(&mut self, entry: HistoryEntry) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.entries.truncate(keep);
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Return the entry at the cursor and move the cursor back one step.
    pub fn step_back(&mut self) -> Option<HistoryEntry> {
        let cursor = self.cursor?;
        let entry = self.entries.get(cursor).cloned();
        self.cursor = cursor.checked_sub(1);
        entry
    }

    /// Move the cursor forward one step and return the entry it lands on.
    pub fn step_forward(&mut self) -> Option<HistoryEntry> {
        let next = self.cursor.map_or(0, |c| c + 1);
        let entry = self.entries.get(next).cloned()?;
        self.cursor = Some(next);
        Some(entry)
    }

    /// The entry the next [`step_back`](Self::step_back) returns.
    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor?)
    }

    /// The entry the next [`step_forward`](Self::step_forward) returns.
    pub fn upcoming(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor.map_or(0, |c| c + 1))
    }

    /// Point every snapshot of annotation `id` at a new engine id.
    pub fn relink(&mut self, id: &str, external_id: Option<&str>) {
        for entry in self.entries.iter_mut() {
            for snapshot in entry.snapshots_mut() {
                if snapshot.id == id {
                    snapshot.external_id = external_id.map(str::to_owned);
                }
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.map_or(0, |c| c + 1) < self.entries.len()
    }

    /// Cursor position: the index of the last applied entry, `None` if empty
    /// or fully undone.
    pub fn index(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{ImageReference, ToolType};

    fn add_entry(id: &str) -> HistoryEntry {
        HistoryEntry::Add {
            annotation: Annotation::new(ToolType::Length, ImageReference::default()).with_id(id),
        }
    }

    fn entry_id(entry: &HistoryEntry) -> &str {
        match entry {
            HistoryEntry::Add { annotation } => &annotation.id,
            other => panic!("Expected Add, got {other:?}"),
        }
    }

    #[test]
    fn empty_history_has_no_cursor() {
        let mut history = AnnotationHistory::new();
        assert_eq!(history.index(), None);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert!(history.step_back().is_none());
        assert!(history.step_forward().is_none());
    }

    #[test]
    fn push_advances_cursor() {
        let mut history = AnnotationHistory::new();
        history.push(add_entry("a"));
        history.push(add_entry("b"));
        assert_eq!(history.index(), Some(1));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn step_back_then_forward() {
        let mut history = AnnotationHistory::new();
        history.push(add_entry("a"));
        history.push(add_entry("b"));

        assert_eq!(entry_id(&history.step_back().unwrap()), "b");
        assert_eq!(entry_id(&history.step_back().unwrap()), "a");
        assert_eq!(history.index(), None);
        assert!(history.step_back().is_none());

        assert_eq!(entry_id(&history.step_forward().unwrap()), "a");
        assert_eq!(entry_id(&history.step_forward().unwrap()), "b");
        assert!(history.step_forward().is_none());
        assert_eq!(history.index(), Some(1));
    }

    #[test]
    fn current_and_upcoming_follow_cursor() {
        let mut history = AnnotationHistory::new();
        assert!(history.current().is_none());
        history.push(add_entry("a"));
        history.push(add_entry("b"));

        assert_eq!(entry_id(history.current().unwrap()), "b");
        assert!(history.upcoming().is_none());

        history.step_back();
        assert_eq!(entry_id(history.current().unwrap()), "a");
        assert_eq!(entry_id(history.upcoming().unwrap()), "b");

        history.step_back();
        assert!(history.current().is_none());
        assert_eq!(entry_id(history.upcoming().unwrap()), "a");
    }

    #[test]
    fn relink_rewrites_matching_snapshots_only() {
        let mut history = AnnotationHistory::new();
        history.push(add_entry("a"));
        history.push(add_entry("b"));
        history.relink("a", Some("engine-7"));

        let external: Vec<Option<&str>> = history
            .entries()
            .map(|entry| match entry {
                HistoryEntry::Add { annotation } => annotation.external_id.as_deref(),
                other => panic!("Expected Add, got {other:?}"),
            })
            .collect();
        assert_eq!(external, vec![Some("engine-7"), None]);
    }

    #[test]
    fn push_after_undo_discards_redo_branch() {
        let mut history = AnnotationHistory::new();
        history.push(add_entry("a"));
        history.push(add_entry("b"));
        history.step_back();
        history.push(add_entry("c"));

        let ids: Vec<&str> = history.entries().map(entry_id).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(!history.can_redo());
    }

    #[test]
    fn push_after_full_undo_starts_over() {
        let mut history = AnnotationHistory::new();
        history.push(add_entry("a"));
        history.step_back();
        history.push(add_entry("b"));
        let ids: Vec<&str> = history.entries().map(entry_id).collect();
        assert_eq!(ids, vec!["b"]);
        assert_eq!(history.index(), Some(0));
    }

    #[test]
    fn capacity_drops_oldest_entries() {
        let mut history = AnnotationHistory::new();
        for i in 0..60 {
            history.push(add_entry(&format!("a{i}")));
        }
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history.index(), Some(MAX_HISTORY_ENTRIES - 1));
        assert_eq!(entry_id(history.entries().next().unwrap()), "a10");
    }

    #[test]
    fn entry_kinds() {
        assert_eq!(HistoryEntry::Clear.kind(), "clear");
        assert_eq!(add_entry("x").kind(), "add");
    }
}
