//! Geometric annotation records and their tool types.
//!
//! An [`Annotation`] is pinned to exactly one image through its
//! [`ImageReference`] and optionally correlated with the rendering engine's
//! own object through [`Annotation::external_id`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::label::Label;
use crate::types::{new_id, AnnotationId, ExternalId, Timestamp};

// ---------------------------------------------------------------------------
// Tool types
// ---------------------------------------------------------------------------

/// The closed set of measurement/ROI tools an annotation can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    Length,
    Rectangle,
    Ellipse,
    Polygon,
    Freehand,
    Angle,
    Probe,
    Bidirectional,
    CircleRoi,
    Arrow,
}

impl ToolType {
    pub const ALL: [ToolType; 10] = [
        Self::Length,
        Self::Rectangle,
        Self::Ellipse,
        Self::Polygon,
        Self::Freehand,
        Self::Angle,
        Self::Probe,
        Self::Bidirectional,
        Self::CircleRoi,
        Self::Arrow,
    ];

    /// Return the tool type as a lowercase string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Rectangle => "rectangle",
            Self::Ellipse => "ellipse",
            Self::Polygon => "polygon",
            Self::Freehand => "freehand",
            Self::Angle => "angle",
            Self::Probe => "probe",
            Self::Bidirectional => "bidirectional",
            Self::CircleRoi => "circle_roi",
            Self::Arrow => "arrow",
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(ToolType::as_str).collect();
                CoreError::Validation(format!(
                    "Invalid tool type '{s}'. Must be one of: {}",
                    valid.join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A control point in world (patient) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<[f64; 3]> for Point3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Statistics the rendering engine computes for a measurement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_unit: Option<String>,
}

/// Handle data: the control points plus optional computed statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnotationData {
    pub points: Vec<Point3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_box: Option<Point3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_stats: Option<CachedStats>,
}

/// Pins an annotation to exactly one image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageReference {
    pub sop_instance_uid: String,
    pub series_instance_uid: String,
    pub study_instance_uid: String,
    /// Viewer image id the annotation was drawn on, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    /// 1-based frame number inside a multi-frame source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_number: Option<u32>,
}

/// The label an annotation carries, denormalized so the record survives
/// label edits and deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRef {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl From<&Label> for LabelRef {
    fn from(label: &Label) -> Self {
        Self {
            id: label.id.clone(),
            name: label.name.clone(),
            color: label.color.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Annotation
// ---------------------------------------------------------------------------

/// A geometric measurement or region drawn on one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub tool_type: ToolType,
    pub data: AnnotationData,
    pub reference: ImageReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<LabelRef>,
    pub visible: bool,
    pub locked: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// The rendering engine's id for this annotation, valid for the current
    /// render session only. Never serialized.
    #[serde(skip)]
    pub external_id: Option<ExternalId>,
}

impl Annotation {
    /// Create a visible, unlocked annotation with a fresh id.
    pub fn new(tool_type: ToolType, reference: ImageReference) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: new_id(),
            tool_type,
            data: AnnotationData::default(),
            reference,
            label: None,
            visible: true,
            locked: false,
            created_at: now,
            updated_at: now,
            external_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<AnnotationId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_data(mut self, data: AnnotationData) -> Self {
        self.data = data;
        self
    }

    pub fn with_points(mut self, points: Vec<Point3>) -> Self {
        self.data.points = points;
        self
    }

    pub fn with_label(mut self, label: impl Into<LabelRef>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<ExternalId>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

/// Partial update for an [`Annotation`]. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationPatch {
    pub data: Option<AnnotationData>,
    /// `Some(None)` removes the label.
    pub label: Option<Option<LabelRef>>,
    pub visible: Option<bool>,
    pub locked: Option<bool>,
    pub reference: Option<ImageReference>,
    pub external_id: Option<Option<ExternalId>>,
}

impl AnnotationPatch {
    pub fn with_data(mut self, data: AnnotationData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_label(mut self, label: Option<LabelRef>) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = Some(locked);
        self
    }

    /// Merge the patch into `annotation` in place. Does not touch
    /// `updated_at`; the store owns timestamps.
    pub fn merge_into(&self, annotation: &mut Annotation) {
        if let Some(data) = &self.data {
            annotation.data = data.clone();
        }
        if let Some(label) = &self.label {
            annotation.label = label.clone();
        }
        if let Some(visible) = self.visible {
            annotation.visible = visible;
        }
        if let Some(locked) = self.locked {
            annotation.locked = locked;
        }
        if let Some(reference) = &self.reference {
            annotation.reference = reference.clone();
        }
        if let Some(external_id) = &self.external_id {
            annotation.external_id = external_id.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
