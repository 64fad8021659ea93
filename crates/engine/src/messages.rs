//! Annotation lifecycle events emitted by the rendering engine.
//!
//! Events arrive as JSON with the shape `{"type": "<EVENT>", "data": {...}}`
//! and are deserialized into the strongly-typed [`EngineEvent`] enum.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dicomark_core::annotation::{Annotation, AnnotationData, CachedStats, Point3};

use crate::tools::engine_tool_name;

/// The four annotation lifecycle events the bridge listens to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    /// The user finished drawing a new annotation.
    #[serde(rename = "ANNOTATION_ADDED")]
    AnnotationAdded(AnnotationEventData),

    /// Handles, statistics or flags of an annotation changed.
    #[serde(rename = "ANNOTATION_MODIFIED")]
    AnnotationModified(AnnotationEventData),

    #[serde(rename = "ANNOTATION_REMOVED")]
    AnnotationRemoved(AnnotationEventData),

    /// The set of selected annotations changed. An empty selection means
    /// nothing is selected.
    #[serde(rename = "ANNOTATION_SELECTION_CHANGE")]
    AnnotationSelectionChanged(SelectionChangedData),
}

impl EngineEvent {
    /// Event name as emitted by the engine.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AnnotationAdded(_) => "ANNOTATION_ADDED",
            Self::AnnotationModified(_) => "ANNOTATION_MODIFIED",
            Self::AnnotationRemoved(_) => "ANNOTATION_REMOVED",
            Self::AnnotationSelectionChanged(_) => "ANNOTATION_SELECTION_CHANGE",
        }
    }
}

/// Payload shared by added/modified/removed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationEventData {
    /// Element id of the viewport the event fired on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_id: Option<String>,
    pub annotation: EngineAnnotation,
}

/// The engine's view of an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineAnnotation {
    #[serde(rename = "annotationUID")]
    pub annotation_uid: String,
    pub metadata: EngineAnnotationMetadata,
    #[serde(default)]
    pub data: EngineAnnotationData,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default)]
    pub is_locked: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineAnnotationMetadata {
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_image_id: Option<String>,
    #[serde(
        default,
        rename = "sopInstanceUID",
        skip_serializing_if = "Option::is_none"
    )]
    pub sop_instance_uid: Option<String>,
    #[serde(
        default,
        rename = "seriesInstanceUID",
        skip_serializing_if = "Option::is_none"
    )]
    pub series_instance_uid: Option<String>,
    #[serde(
        default,
        rename = "studyInstanceUID",
        skip_serializing_if = "Option::is_none"
    )]
    pub study_instance_uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineAnnotationData {
    #[serde(default)]
    pub handles: Handles,
    /// Statistics keyed by render target id.
    #[serde(default)]
    pub cached_stats: BTreeMap<String, CachedStats>,
    /// Free-text label the user typed on the annotation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handles {
    #[serde(default)]
    pub points: Vec<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_box: Option<TextBox>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBox {
    pub world_position: [f64; 3],
}

impl EngineAnnotation {
    /// Convert the engine handles into store handle data. Statistics are
    /// taken from the first render target that reported any.
    pub fn annotation_data(&self) -> AnnotationData {
        let handles = &self.data.handles;
        AnnotationData {
            points: handles.points.iter().copied().map(Point3::from).collect(),
            text_box: handles.text_box.map(|tb| Point3::from(tb.world_position)),
            cached_stats: self
                .data
                .cached_stats
                .values()
                .find(|stats| **stats != CachedStats::default())
                .cloned(),
        }
    }

    /// Engine form of a store annotation, used to re-create it on the
    /// rendering surface. Statistics are keyed by the referenced image id.
    pub fn from_annotation(annotation: &Annotation, annotation_uid: impl Into<String>) -> Self {
        let reference = &annotation.reference;
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        let point = |p: &Point3| [p.x, p.y, p.z];

        let mut cached_stats = BTreeMap::new();
        if let Some(stats) = &annotation.data.cached_stats {
            let key = match &reference.image_id {
                Some(image_id) => format!("imageId:{image_id}"),
                None => "imageId:".to_string(),
            };
            cached_stats.insert(key, stats.clone());
        }

        Self {
            annotation_uid: annotation_uid.into(),
            metadata: EngineAnnotationMetadata {
                tool_name: engine_tool_name(annotation.tool_type).to_string(),
                referenced_image_id: reference.image_id.clone(),
                sop_instance_uid: non_empty(&reference.sop_instance_uid),
                series_instance_uid: non_empty(&reference.series_instance_uid),
                study_instance_uid: non_empty(&reference.study_instance_uid),
            },
            data: EngineAnnotationData {
                handles: Handles {
                    points: annotation.data.points.iter().map(point).collect(),
                    text_box: annotation.data.text_box.as_ref().map(|p| TextBox {
                        world_position: point(p),
                    }),
                },
                cached_stats,
                label: annotation.label.as_ref().map(|label| label.name.clone()),
            },
            is_visible: annotation.visible,
            is_locked: annotation.locked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionChangedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_id: Option<String>,
    /// Currently selected annotation UIDs, most recent last.
    #[serde(default)]
    pub selection: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Parse an engine event from its JSON text form.
///
/// Returns `Err` for malformed JSON or unknown event types; callers should
/// log and continue.
pub fn parse_event(text: &str) -> Result<EngineEvent, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDED: &str = r#"{
        "type": "ANNOTATION_ADDED",
        "data": {
            "viewportId": "CT_AXIAL",
            "annotation": {
                "annotationUID": "ext-1",
                "metadata": {
                    "toolName": "Length",
                    "referencedImageId": "wadouri:http://pacs/cine.dcm?frame=12",
                    "sopInstanceUID": "1.2.3.4",
                    "seriesInstanceUID": "1.2.3",
                    "studyInstanceUID": "1.2"
                },
                "data": {
                    "handles": {
                        "points": [[0, 0, 0], [10, 0, 0]],
                        "textBox": {"worldPosition": [5, 5, 0]}
                    },
                    "cachedStats": {
                        "imageId:wadouri:http://pacs/cine.dcm?frame=12": {"length": 10.0, "unit": "mm"}
                    }
                }
            }
        }
    }"#;

    #[test]
    fn parse_added_event() {
        let event = parse_event(ADDED).unwrap();
        assert_eq!(event.name(), "ANNOTATION_ADDED");
        match event {
            EngineEvent::AnnotationAdded(data) => {
                assert_eq!(data.viewport_id.as_deref(), Some("CT_AXIAL"));
                let annotation = data.annotation;
                assert_eq!(annotation.annotation_uid, "ext-1");
                assert_eq!(annotation.metadata.tool_name, "Length");
                assert_eq!(annotation.metadata.sop_instance_uid.as_deref(), Some("1.2.3.4"));
                assert!(annotation.is_visible);
                assert!(!annotation.is_locked);

                let handle_data = annotation.annotation_data();
                assert_eq!(handle_data.points.len(), 2);
                assert_eq!(handle_data.points[1], Point3::new(10.0, 0.0, 0.0));
                assert_eq!(handle_data.text_box, Some(Point3::new(5.0, 5.0, 0.0)));
                let stats = handle_data.cached_stats.unwrap();
                assert_eq!(stats.length, Some(10.0));
                assert_eq!(stats.unit.as_deref(), Some("mm"));
            }
            other => panic!("Expected AnnotationAdded, got {other:?}"),
        }
    }

    #[test]
    fn parse_minimal_modified_event() {
        let json = r#"{"type":"ANNOTATION_MODIFIED","data":{"annotation":{"annotationUID":"x","metadata":{"toolName":"Probe"},"isLocked":true}}}"#;
        match parse_event(json).unwrap() {
            EngineEvent::AnnotationModified(data) => {
                assert!(data.annotation.is_locked);
                let handle_data = data.annotation.annotation_data();
                assert!(handle_data.points.is_empty());
                assert!(handle_data.cached_stats.is_none());
            }
            other => panic!("Expected AnnotationModified, got {other:?}"),
        }
    }

    #[test]
    fn parse_empty_selection() {
        let json = r#"{"type":"ANNOTATION_SELECTION_CHANGE","data":{}}"#;
        match parse_event(json).unwrap() {
            EngineEvent::AnnotationSelectionChanged(data) => assert!(data.selection.is_empty()),
            other => panic!("Expected AnnotationSelectionChanged, got {other:?}"),
        }
    }

    #[test]
    fn store_annotation_converts_back_to_engine_shape() {
        use dicomark_core::annotation::{ImageReference, ToolType};

        let reference = ImageReference {
            sop_instance_uid: "1.2.3.4".to_string(),
            series_instance_uid: "1.2.3".to_string(),
            study_instance_uid: String::new(),
            image_id: Some("wadouri:http://pacs/cine.dcm?frame=12".to_string()),
            frame_number: Some(12),
        };
        let mut annotation = Annotation::new(ToolType::Ellipse, reference)
            .with_points(vec![Point3::new(1.0, 2.0, 3.0)]);
        annotation.locked = true;
        annotation.data.cached_stats = Some(CachedStats {
            area: Some(4.0),
            ..CachedStats::default()
        });

        let engine = EngineAnnotation::from_annotation(&annotation, "ext-9");
        assert_eq!(engine.annotation_uid, "ext-9");
        assert_eq!(engine.metadata.tool_name, "EllipticalROI");
        assert_eq!(engine.metadata.sop_instance_uid.as_deref(), Some("1.2.3.4"));
        assert!(engine.metadata.study_instance_uid.is_none());
        assert_eq!(engine.data.handles.points, vec![[1.0, 2.0, 3.0]]);
        assert!(engine.is_locked);

        let back = engine.annotation_data();
        assert_eq!(back.points, annotation.data.points);
        assert_eq!(back.cached_stats.and_then(|s| s.area), Some(4.0));
    }

    #[test]
    fn unknown_event_type_is_error() {
        let json = r#"{"type":"CAMERA_MODIFIED","data":{}}"#;
        assert!(parse_event(json).is_err());
    }

    #[test]
    fn events_serialize_back_to_engine_shape() {
        let event = parse_event(ADDED).unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "ANNOTATION_ADDED");
        assert_eq!(value["data"]["annotation"]["annotationUID"], "ext-1");
    }
}
