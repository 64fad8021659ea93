//! Persistence of user preferences across sessions.
//!
//! Only the label set and brush settings persist. Annotations are session
//! scoped and must be saved explicitly to a backend session.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::annotation_store::AnnotationStore;
use crate::error::CoreError;
use crate::label::Label;
use crate::segmentation::{BrushSettings, SegmentationStore};

/// The persisted preference document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub labels: Vec<Label>,
    #[serde(default)]
    pub brush: BrushSettings,
}

impl Preferences {
    /// Snapshot the persistable parts of both stores.
    pub fn capture(annotations: &AnnotationStore, segmentation: &SegmentationStore) -> Self {
        Self {
            labels: annotations.labels().to_vec(),
            brush: segmentation.brush(),
        }
    }

    /// Restore labels and brush settings into the stores. Invalid or
    /// duplicate labels are dropped and brush values are clamped.
    pub fn apply_to(self, annotations: &mut AnnotationStore, segmentation: &mut SegmentationStore) {
        annotations.replace_labels(self.labels);
        segmentation.set_brush(self.brush);
    }
}

/// Key-value backing for [`Preferences`].
pub trait PreferenceStore: Send + Sync {
    /// Load stored preferences, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Preferences>, CoreError>;

    fn save(&self, preferences: &Preferences) -> Result<(), CoreError>;
}

/// Load preferences and apply them, falling back to the stores' defaults
/// when nothing is stored or the stored document is unreadable.
pub fn restore_preferences(
    backend: &dyn PreferenceStore,
    annotations: &mut AnnotationStore,
    segmentation: &mut SegmentationStore,
) {
    match backend.load() {
        Ok(Some(preferences)) => preferences.apply_to(annotations, segmentation),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load preferences, keeping defaults");
        }
    }
}

// ---------------------------------------------------------------------------
// JSON file backend
// ---------------------------------------------------------------------------

/// Stores preferences as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn load(&self) -> Result<Option<Preferences>, CoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save(&self, preferences: &Preferences) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(preferences)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Keeps the serialized document in memory. Useful for tests and for
/// sessions without a writable profile.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    document: Mutex<Option<String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Option<Preferences>, CoreError> {
        let guard = self
            .document
            .lock()
            .map_err(|_| CoreError::Internal("preference lock poisoned".to_string()))?;
        guard
            .as_deref()
            .map(serde_json::from_str::<Preferences>)
            .transpose()
            .map_err(CoreError::from)
    }

    fn save(&self, preferences: &Preferences) -> Result<(), CoreError> {
        let text = serde_json::to_string(preferences)?;
        let mut guard = self
            .document
            .lock()
            .map_err(|_| CoreError::Internal("preference lock poisoned".to_string()))?;
        *guard = Some(text);
        Ok(())
    }
}
