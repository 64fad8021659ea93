//! Retrieval of DICOM bytes and header metadata.
//!
//! [`FrameSource`] is the seam the cache depends on, so tests and embedders
//! can supply metadata without going through HTTP.

use async_trait::async_trait;

use crate::config::FramesConfig;
use crate::error::{FetchError, FrameError};
use crate::parser::{parse_frame_info, FrameInfo};

/// Anything that can produce [`FrameInfo`] for a file URL.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn frame_info(&self, url: &str) -> Result<FrameInfo, FrameError>;
}

/// Fetches the whole file over HTTP(S) and parses its header.
#[derive(Debug, Clone)]
pub struct HttpFrameSource {
    client: reqwest::Client,
}

impl HttpFrameSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client honoring the configured request timeout.
    pub fn from_config(config: &FramesConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.fetch_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Download the raw bytes of `url`.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(url, response)?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    fn ensure_success(
        url: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, FetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl Default for HttpFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn frame_info(&self, url: &str) -> Result<FrameInfo, FrameError> {
        let bytes = self.fetch_bytes(url).await?;
        tracing::debug!(url, bytes = bytes.len(), "Fetched DICOM file");
        Ok(parse_frame_info(&bytes)?)
    }
}
