//! Two-way index between store annotation ids and engine annotation UIDs.

use std::collections::HashMap;

use dicomark_core::types::{AnnotationId, ExternalId};

/// Store id ↔ engine UID. Each side maps to at most one entry on the other.
#[derive(Debug, Clone, Default)]
pub struct CorrelationTable {
    by_store: HashMap<AnnotationId, ExternalId>,
    by_external: HashMap<ExternalId, AnnotationId>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `store_id` with `external_id`, dropping any previous link of
    /// either id.
    pub fn insert(&mut self, store_id: impl Into<AnnotationId>, external_id: impl Into<ExternalId>) {
        let store_id = store_id.into();
        let external_id = external_id.into();
        self.remove_by_store(&store_id);
        self.remove_by_external(&external_id);
        self.by_store.insert(store_id.clone(), external_id.clone());
        self.by_external.insert(external_id, store_id);
    }

    pub fn store_id(&self, external_id: &str) -> Option<&str> {
        self.by_external.get(external_id).map(String::as_str)
    }

    pub fn external_id(&self, store_id: &str) -> Option<&str> {
        self.by_store.get(store_id).map(String::as_str)
    }

    pub fn remove_by_store(&mut self, store_id: &str) -> Option<ExternalId> {
        let external_id = self.by_store.remove(store_id)?;
        self.by_external.remove(&external_id);
        Some(external_id)
    }

    pub fn remove_by_external(&mut self, external_id: &str) -> Option<AnnotationId> {
        let store_id = self.by_external.remove(external_id)?;
        self.by_store.remove(&store_id);
        Some(store_id)
    }

    pub fn len(&self) -> usize {
        self.by_store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_store.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_store.clear();
        self.by_external.clear();
    }
}
