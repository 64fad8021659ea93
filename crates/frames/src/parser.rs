//! DICOM Part-10 header reading.
//!
//! The dataset is decoded with `dicom-object` up to Pixel Data, then the
//! handful of top-level attributes the viewer needs to lay out frames are
//! copied into a [`FrameInfo`]. Attributes inside functional-group or
//! referenced-image sequences never shadow top-level ones.

use dicom_dictionary_std::tags;
use dicom_object::file::ReadPreamble;
use dicom_object::{DefaultDicomObject, OpenFileOptions};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

pub use dicom_core::Tag;

pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";

/// Offset of the `DICM` magic after the preamble.
const PREAMBLE_LENGTH: usize = 128;

// ---------------------------------------------------------------------------
// FrameInfo
// ---------------------------------------------------------------------------

/// Per-file metadata needed to address and display its frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    /// Always at least 1; a missing or unparseable tag means one frame.
    pub number_of_frames: u32,
    pub rows: Option<u16>,
    pub columns: Option<u16>,
    pub modality: Option<String>,
    pub series_instance_uid: Option<String>,
    pub study_instance_uid: Option<String>,
    pub sop_instance_uid: Option<String>,
    pub sop_class_uid: Option<String>,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
    pub bits_allocated: Option<u16>,
    pub bits_stored: Option<u16>,
    pub photometric_interpretation: Option<String>,
    pub transfer_syntax_uid: Option<String>,
}

impl Default for FrameInfo {
    fn default() -> Self {
        Self {
            number_of_frames: 1,
            rows: None,
            columns: None,
            modality: None,
            series_instance_uid: None,
            study_instance_uid: None,
            sop_instance_uid: None,
            sop_class_uid: None,
            window_center: None,
            window_width: None,
            bits_allocated: None,
            bits_stored: None,
            photometric_interpretation: None,
            transfer_syntax_uid: None,
        }
    }
}

impl FrameInfo {
    pub fn is_multi_frame(&self) -> bool {
        self.number_of_frames > 1
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Extract [`FrameInfo`] from a DICOM file buffer.
///
/// Accepts files with the standard 128-byte preamble followed by `DICM`, and
/// files that start directly with `DICM`. Anything else is a
/// [`ParseError::MissingPrefix`]; a file meta group or dataset that cannot be
/// decoded is a [`ParseError::Invalid`].
pub fn parse_frame_info(bytes: &[u8]) -> Result<FrameInfo, ParseError> {
    let start = locate_magic(bytes)?;
    let obj = OpenFileOptions::new()
        .read_preamble(ReadPreamble::Never)
        .read_until(tags::PIXEL_DATA)
        .from_reader(&bytes[start..])
        .map_err(|e| ParseError::Invalid(e.to_string()))?;

    Ok(FrameInfo {
        number_of_frames: read_u32(&obj, tags::NUMBER_OF_FRAMES)
            .filter(|n| *n >= 1)
            .unwrap_or(1),
        rows: read_u16(&obj, tags::ROWS),
        columns: read_u16(&obj, tags::COLUMNS),
        modality: read_string(&obj, tags::MODALITY),
        series_instance_uid: read_string(&obj, tags::SERIES_INSTANCE_UID),
        study_instance_uid: read_string(&obj, tags::STUDY_INSTANCE_UID),
        sop_instance_uid: read_string(&obj, tags::SOP_INSTANCE_UID),
        sop_class_uid: read_string(&obj, tags::SOP_CLASS_UID),
        window_center: read_first_decimal(&obj, tags::WINDOW_CENTER),
        window_width: read_first_decimal(&obj, tags::WINDOW_WIDTH),
        bits_allocated: read_u16(&obj, tags::BITS_ALLOCATED),
        bits_stored: read_u16(&obj, tags::BITS_STORED),
        photometric_interpretation: read_string(&obj, tags::PHOTOMETRIC_INTERPRETATION),
        transfer_syntax_uid: non_empty(obj.meta().transfer_syntax()),
    })
}

/// Offset of the `DICM` magic code.
fn locate_magic(bytes: &[u8]) -> Result<usize, ParseError> {
    if bytes.get(PREAMBLE_LENGTH..PREAMBLE_LENGTH + 4) == Some(b"DICM".as_slice()) {
        Ok(PREAMBLE_LENGTH)
    } else if bytes.starts_with(b"DICM") {
        Ok(0)
    } else {
        Err(ParseError::MissingPrefix)
    }
}

// ---- private helpers ----

fn read_u16(obj: &DefaultDicomObject, tag: Tag) -> Option<u16> {
    obj.element(tag).ok()?.to_int::<u16>().ok()
}

fn read_u32(obj: &DefaultDicomObject, tag: Tag) -> Option<u32> {
    obj.element(tag).ok()?.to_int::<u32>().ok()
}

fn read_string(obj: &DefaultDicomObject, tag: Tag) -> Option<String> {
    non_empty(&obj.element(tag).ok()?.to_str().ok()?)
}

/// First value of a possibly multi-valued decimal string (`"40\\400"`).
fn read_first_decimal(obj: &DefaultDicomObject, tag: Tag) -> Option<f64> {
    read_string(obj, tag)?
        .split('\\')
        .next()
        .and_then(|s| s.trim().parse::<f64>().ok())
}

/// Text with DICOM padding (spaces, NULs) removed. Empty → `None`.
fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim_matches(|c: char| c == '\0' || c == ' ');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
