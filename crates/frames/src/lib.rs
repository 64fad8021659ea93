//! Multi-frame DICOM metadata extraction and image-id generation.
//!
//! - [`parser`]: reads the handful of header tags the viewer needs from a
//!   Part-10 byte buffer.
//! - [`image_id`]: expands a source URL into one image id per frame and
//!   parses ids back.
//! - [`fetch`]: the [`FrameSource`] abstraction and its HTTP implementation.
//! - [`cache`]: per-URL memoization with single-frame fallback on failure.
//! - [`loader`]: request tracking that discards stale results.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod image_id;
pub mod loader;
pub mod parser;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::FrameInfoCache;
pub use config::FramesConfig;
pub use error::{FetchError, FrameError, ParseError};
pub use fetch::{FrameSource, HttpFrameSource};
pub use image_id::{
    generate_frame_image_ids, parse_image_id, ImageId, ParsedImageId, DEFAULT_SCHEME,
};
pub use loader::{ImageIdLoader, LoadOutcome, LoaderSnapshot};
pub use parser::{parse_frame_info, FrameInfo};
