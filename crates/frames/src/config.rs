use std::time::Duration;

use crate::image_id::DEFAULT_SCHEME;

/// Frame loading configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct FramesConfig {
    /// Scheme prefixed to every image id (default: `wadouri`).
    pub image_id_scheme: String,
    /// Per-request timeout for DICOM downloads. `None` leaves the client
    /// default (no timeout).
    pub fetch_timeout: Option<Duration>,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            image_id_scheme: DEFAULT_SCHEME.to_string(),
            fetch_timeout: None,
        }
    }
}

impl FramesConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default   |
    /// |----------------------------|-----------|
    /// | `DICOM_IMAGE_ID_SCHEME`    | `wadouri` |
    /// | `DICOM_FETCH_TIMEOUT_SECS` | unset     |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let image_id_scheme = lookup("DICOM_IMAGE_ID_SCHEME")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.image_id_scheme);

        let fetch_timeout = match lookup("DICOM_FETCH_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    tracing::warn!(value = %raw, "Invalid DICOM_FETCH_TIMEOUT_SECS, ignoring");
                    None
                }
            },
            None => defaults.fetch_timeout,
        };

        Self {
            image_id_scheme,
            fetch_timeout,
        }
    }
}
