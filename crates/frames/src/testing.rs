//! Builders for synthetic DICOM buffers used by tests in this crate and in
//! downstream crates (enable the `testing` feature).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{FrameError, ParseError};
use crate::fetch::FrameSource;
use dicom_dictionary_std::tags;

use crate::parser::{
    parse_frame_info, FrameInfo, Tag, EXPLICIT_VR_BIG_ENDIAN, EXPLICIT_VR_LITTLE_ENDIAN,
    IMPLICIT_VR_LITTLE_ENDIAN,
};

const SECONDARY_CAPTURE_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.7";
const TEST_INSTANCE_UID: &str = "1.2.826.0.1.3680043.2.1125.1";
const TEST_IMPLEMENTATION_UID: &str = "1.2.826.0.1.3680043.2.1125.99";

const ITEM: Tag = Tag(0xFFFE, 0xE000);
const ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);

/// How dataset elements are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    ImplicitLittle,
    ExplicitLittle,
    ExplicitBig,
}

/// Assembles a Part-10 file element by element.
///
/// Elements are written in insertion order after a complete file meta group.
#[derive(Debug, Clone)]
pub struct DicomBuilder {
    encoding: Encoding,
    transfer_syntax: Option<String>,
    preamble: bool,
    dataset: Vec<u8>,
}

impl DicomBuilder {
    fn new(encoding: Encoding, transfer_syntax: &str) -> Self {
        Self {
            encoding,
            transfer_syntax: Some(transfer_syntax.to_string()),
            preamble: true,
            dataset: Vec::new(),
        }
    }

    pub fn explicit_little() -> Self {
        Self::new(Encoding::ExplicitLittle, EXPLICIT_VR_LITTLE_ENDIAN)
    }

    pub fn implicit_little() -> Self {
        Self::new(Encoding::ImplicitLittle, IMPLICIT_VR_LITTLE_ENDIAN)
    }

    pub fn explicit_big() -> Self {
        Self::new(Encoding::ExplicitBig, EXPLICIT_VR_BIG_ENDIAN)
    }

    /// Override the transfer syntax UID written to the meta group without
    /// changing how dataset elements are encoded.
    pub fn transfer_syntax(mut self, uid: &str) -> Self {
        self.transfer_syntax = Some(uid.to_string());
        self
    }

    pub fn without_transfer_syntax(mut self) -> Self {
        self.transfer_syntax = None;
        self
    }

    /// Start the file with `DICM` instead of the 128-byte preamble.
    pub fn without_preamble(mut self) -> Self {
        self.preamble = false;
        self
    }

    pub fn string(mut self, tag: Tag, vr: &str, value: &str) -> Self {
        let pad = if vr == "UI" { 0u8 } else { b' ' };
        let mut bytes = value.as_bytes().to_vec();
        if bytes.len() % 2 == 1 {
            bytes.push(pad);
        }
        self.push_element(tag, vr, &bytes);
        self
    }

    pub fn number_of_frames(self, frames: u32) -> Self {
        self.string(tags::NUMBER_OF_FRAMES, "IS", &frames.to_string())
    }

    pub fn us(mut self, tag: Tag, value: u16) -> Self {
        let bytes = if self.is_big_endian() {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        self.push_element(tag, "US", &bytes);
        self
    }

    /// Append a sequence whose items hold the datasets of `items`. With
    /// `undefined_length` both the sequence and its items use delimiters.
    pub fn sequence(mut self, tag: Tag, items: Vec<DicomBuilder>, undefined_length: bool) -> Self {
        let mut body = Vec::new();
        for item in &items {
            self.write_tag(&mut body, ITEM);
            if undefined_length {
                self.write_u32(&mut body, u32::MAX);
                body.extend_from_slice(&item.dataset);
                self.write_tag(&mut body, ITEM_DELIMITATION);
                self.write_u32(&mut body, 0);
            } else {
                self.write_u32(&mut body, item.dataset.len() as u32);
                body.extend_from_slice(&item.dataset);
            }
        }

        if undefined_length {
            self.write_long_header(tag, "SQ", u32::MAX);
            self.dataset.extend_from_slice(&body);
            let mut trailer = Vec::new();
            self.write_tag(&mut trailer, SEQUENCE_DELIMITATION);
            self.write_u32(&mut trailer, 0);
            self.dataset.extend_from_slice(&trailer);
        } else {
            self.write_long_header(tag, "SQ", body.len() as u32);
            self.dataset.extend_from_slice(&body);
        }
        self
    }

    /// Append a Pixel Data element of `len` zero bytes.
    pub fn pixel_data(mut self, len: usize) -> Self {
        self.push_element(tags::PIXEL_DATA, "OW", &vec![0u8; len]);
        self
    }

    /// Append raw bytes to the dataset.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.dataset.extend_from_slice(bytes);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut meta = Vec::new();
        write_meta_element(&mut meta, tags::FILE_META_INFORMATION_VERSION, "OB", &[0, 1]);
        write_meta_string(&mut meta, tags::MEDIA_STORAGE_SOP_CLASS_UID, SECONDARY_CAPTURE_SOP_CLASS);
        write_meta_string(&mut meta, tags::MEDIA_STORAGE_SOP_INSTANCE_UID, TEST_INSTANCE_UID);
        if let Some(uid) = &self.transfer_syntax {
            write_meta_string(&mut meta, tags::TRANSFER_SYNTAX_UID, uid);
        }
        write_meta_string(&mut meta, tags::IMPLEMENTATION_CLASS_UID, TEST_IMPLEMENTATION_UID);

        let mut out = Vec::new();
        if self.preamble {
            out.extend_from_slice(&[0u8; 128]);
        }
        out.extend_from_slice(b"DICM");
        write_meta_element(
            &mut out,
            tags::FILE_META_INFORMATION_GROUP_LENGTH,
            "UL",
            &(meta.len() as u32).to_le_bytes(),
        );
        out.extend_from_slice(&meta);
        out.extend_from_slice(&self.dataset);
        out
    }

    // -- encoding helpers ---------------------------------------------------

    fn is_big_endian(&self) -> bool {
        self.encoding == Encoding::ExplicitBig
    }

    fn is_explicit(&self) -> bool {
        self.encoding != Encoding::ImplicitLittle
    }

    fn write_u16(&self, out: &mut Vec<u8>, value: u16) {
        if self.is_big_endian() {
            out.extend_from_slice(&value.to_be_bytes());
        } else {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn write_u32(&self, out: &mut Vec<u8>, value: u32) {
        if self.is_big_endian() {
            out.extend_from_slice(&value.to_be_bytes());
        } else {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn write_tag(&self, out: &mut Vec<u8>, tag: Tag) {
        self.write_u16(out, tag.0);
        self.write_u16(out, tag.1);
    }

    fn write_long_header(&mut self, tag: Tag, vr: &str, length: u32) {
        let mut header = Vec::new();
        self.write_tag(&mut header, tag);
        if self.is_explicit() {
            header.extend_from_slice(vr.as_bytes());
            header.extend_from_slice(&[0, 0]);
        }
        self.write_u32(&mut header, length);
        self.dataset.extend_from_slice(&header);
    }

    fn push_element(&mut self, tag: Tag, vr: &str, value: &[u8]) {
        let long = matches!(vr, "OB" | "OW" | "SQ" | "UN" | "UT");
        if !self.is_explicit() || long {
            self.write_long_header(tag, vr, value.len() as u32);
        } else {
            let mut header = Vec::new();
            self.write_tag(&mut header, tag);
            header.extend_from_slice(vr.as_bytes());
            self.write_u16(&mut header, value.len() as u16);
            self.dataset.extend_from_slice(&header);
        }
        self.dataset.extend_from_slice(value);
    }
}

/// Meta group elements are always explicit VR little endian.
fn write_meta_element(out: &mut Vec<u8>, tag: Tag, vr: &str, value: &[u8]) {
    out.extend_from_slice(&tag.0.to_le_bytes());
    out.extend_from_slice(&tag.1.to_le_bytes());
    out.extend_from_slice(vr.as_bytes());
    if vr == "OB" {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    } else {
        out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    }
    out.extend_from_slice(value);
}

fn write_meta_string(out: &mut Vec<u8>, tag: Tag, value: &str) {
    let mut bytes = value.as_bytes().to_vec();
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    write_meta_element(out, tag, "UI", &bytes);
}

/// A complete explicit-LE file declaring `frames` frames.
pub fn multiframe_file(frames: u32) -> Vec<u8> {
    DicomBuilder::explicit_little()
        .string(tags::SOP_INSTANCE_UID, "UI", TEST_INSTANCE_UID)
        .string(tags::MODALITY, "CS", "US")
        .number_of_frames(frames)
        .us(tags::ROWS, 64)
        .us(tags::COLUMNS, 64)
        .pixel_data(32)
        .build()
}

// ---------------------------------------------------------------------------
// Fake source
// ---------------------------------------------------------------------------

/// In-memory [`FrameSource`] keyed by URL that counts how often each URL is
/// requested. Unknown URLs fail with [`ParseError::MissingPrefix`].
#[derive(Debug, Default)]
pub struct FakeFrameSource {
    files: HashMap<String, Vec<u8>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `url` as a file declaring `frames` frames.
    pub fn with_frames(mut self, url: &str, frames: u32) -> Self {
        self.files.insert(url.to_string(), multiframe_file(frames));
        self
    }

    /// Register `url` with arbitrary bytes.
    pub fn with_bytes(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), bytes);
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl FrameSource for FakeFrameSource {
    async fn frame_info(&self, url: &str) -> Result<FrameInfo, FrameError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(url.to_string()).or_default() += 1;
        }
        let bytes = self
            .files
            .get(url)
            .ok_or(ParseError::MissingPrefix)?;
        Ok(parse_frame_info(bytes)?)
    }
}
