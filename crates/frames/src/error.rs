//! Error types for DICOM fetching and parsing.
//!
//! Both kinds are recovered by [`FrameInfoCache`](crate::cache::FrameInfoCache),
//! which degrades to a single image id instead of surfacing them.

/// The buffer does not contain a DICOM file that can be decoded.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("DICM prefix not found")]
    MissingPrefix,

    /// Message from the decoder; the meta group or dataset was rejected.
    #[error("Invalid DICOM data: {0}")]
    Invalid(String),
}

/// Retrieving the DICOM bytes failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
