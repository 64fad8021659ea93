//! Annotation labels: definitions, the default set and color helpers.
//!
//! Every store instance is seeded with [`default_labels`]; users may add,
//! update and remove further labels. Label edits are not part of the
//! annotation undo history.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Coarse grouping used by label pickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelCategory {
    Anatomy,
    Pathology,
    Measurement,
    #[default]
    Other,
}

/// A user-visible label that annotations and segmentation layers refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Label {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    /// `#RRGGBB` hex color.
    #[validate(custom(function = "validate_label_color"))]
    pub color: String,
    /// Optional single-key shortcut shown in the label picker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    #[serde(default)]
    pub category: LabelCategory,
}

impl Label {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        color: impl Into<String>,
        category: LabelCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            shortcut: None,
            category,
        }
    }

    pub fn with_shortcut(mut self, shortcut: impl Into<String>) -> Self {
        self.shortcut = Some(shortcut.into());
        self
    }

    /// The label's color as an RGB triple, if the stored hex is valid.
    pub fn rgb(&self) -> Option<[u8; 3]> {
        parse_hex_color(&self.color)
    }
}

/// Partial update for a [`Label`]. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub shortcut: Option<Option<String>>,
    pub category: Option<LabelCategory>,
}

impl LabelPatch {
    /// Apply the patch to a copy of `label` and return it.
    pub fn applied_to(&self, label: &Label) -> Label {
        let mut next = label.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(color) = &self.color {
            next.color = color.clone();
        }
        if let Some(shortcut) = &self.shortcut {
            next.shortcut = shortcut.clone();
        }
        if let Some(category) = self.category {
            next.category = category;
        }
        next
    }
}

/// The label set every store starts with.
pub fn default_labels() -> Vec<Label> {
    vec![
        Label::new("tumor", "Tumor", "#FF4444", LabelCategory::Pathology).with_shortcut("1"),
        Label::new("lesion", "Lesion", "#FF9900", LabelCategory::Pathology).with_shortcut("2"),
        Label::new("organ", "Organ", "#44AAFF", LabelCategory::Anatomy).with_shortcut("3"),
        Label::new("vessel", "Vessel", "#CC44FF", LabelCategory::Anatomy).with_shortcut("4"),
        Label::new("bone", "Bone", "#EEEEDD", LabelCategory::Anatomy).with_shortcut("5"),
        Label::new("measurement", "Measurement", "#44DD66", LabelCategory::Measurement)
            .with_shortcut("6"),
    ]
}

// ---------------------------------------------------------------------------
// Validation and color helpers
// ---------------------------------------------------------------------------

/// Validate that a color string matches `#RRGGBB` hex format.
pub fn validate_color_hex(color: &str) -> Result<(), CoreError> {
    if color.len() != 7 {
        return Err(CoreError::Validation(format!(
            "Invalid color '{color}'. Must be in #RRGGBB hex format"
        )));
    }

    if !color.starts_with('#') {
        return Err(CoreError::Validation(format!(
            "Invalid color '{color}'. Must start with '#'"
        )));
    }

    if !color[1..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::Validation(format!(
            "Invalid color '{color}'. Must contain only hex digits after '#'"
        )));
    }

    Ok(())
}

fn validate_label_color(color: &str) -> Result<(), ValidationError> {
    validate_color_hex(color).map_err(|_| ValidationError::new("hex_color"))
}

/// Parse `#RRGGBB` into an RGB triple.
pub fn parse_hex_color(color: &str) -> Option<[u8; 3]> {
    validate_color_hex(color).ok()?;
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&color[range], 16).ok();
    Some([channel(1..3)?, channel(3..5)?, channel(5..7)?])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
