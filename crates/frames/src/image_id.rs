//! Image identifiers handed to the rendering engine.
//!
//! An identifier is `<scheme>:<url>` for a single-frame file and
//! `<scheme>:<url>?frame=<n>` (1-based) for each frame of a multi-frame file.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEME: &str = "wadouri";

const FRAME_QUERY: &str = "?frame=";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn single(scheme: &str, url: &str) -> Self {
        Self(format!("{scheme}:{url}"))
    }

    pub fn frame(scheme: &str, url: &str, frame: u32) -> Self {
        Self(format!("{scheme}:{url}{FRAME_QUERY}{frame}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn parse(&self) -> Option<ParsedImageId> {
        parse_image_id(&self.0)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ImageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ImageId> for String {
    fn from(id: ImageId) -> Self {
        id.0
    }
}

/// Expand a file URL into one identifier per frame.
///
/// `frame_count` of 0 or 1 yields the bare single-frame identifier.
pub fn generate_frame_image_ids(scheme: &str, url: &str, frame_count: u32) -> Vec<ImageId> {
    if frame_count <= 1 {
        return vec![ImageId::single(scheme, url)];
    }
    (1..=frame_count)
        .map(|n| ImageId::frame(scheme, url, n))
        .collect()
}

/// Components of an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedImageId {
    pub scheme: String,
    pub url: String,
    /// 1-based frame, `None` for single-frame identifiers.
    pub frame: Option<u32>,
}

/// Split an identifier back into scheme, file URL and frame.
///
/// A trailing `?frame=` with a non-numeric value is left as part of the URL.
pub fn parse_image_id(id: &str) -> Option<ParsedImageId> {
    let (scheme, rest) = id.split_once(':')?;
    if scheme.is_empty() || rest.is_empty() {
        return None;
    }

    let (url, frame) = match rest.rsplit_once(FRAME_QUERY) {
        Some((url, n)) => match n.parse::<u32>() {
            Ok(n) => (url, Some(n)),
            Err(_) => (rest, None),
        },
        None => (rest, None),
    };

    Some(ParsedImageId {
        scheme: scheme.to_string(),
        url: url.to_string(),
        frame,
    })
}
