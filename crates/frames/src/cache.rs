//! Per-URL memoization of parsed frame metadata.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::FrameError;
use crate::fetch::FrameSource;
use crate::image_id::{generate_frame_image_ids, ImageId};
use crate::parser::FrameInfo;

/// Caches [`FrameInfo`] by exact source URL and expands URLs into image ids.
///
/// Entries live until [`clear_frame_info_cache`](Self::clear_frame_info_cache);
/// failed lookups are never cached, so a later call retries the source.
pub struct FrameInfoCache<S> {
    source: S,
    scheme: String,
    entries: RwLock<HashMap<String, FrameInfo>>,
}

impl<S: FrameSource> FrameInfoCache<S> {
    pub fn new(source: S, scheme: impl Into<String>) -> Self {
        Self {
            source,
            scheme: scheme.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Return cached metadata for `url`, fetching and parsing it on a miss.
    pub async fn get_cached_frame_info(&self, url: &str) -> Result<FrameInfo, FrameError> {
        if let Some(info) = self.entries.read().await.get(url) {
            return Ok(info.clone());
        }

        let info = self.source.frame_info(url).await?;
        tracing::debug!(
            url,
            number_of_frames = info.number_of_frames,
            "Cached DICOM frame info"
        );
        self.entries
            .write()
            .await
            .insert(url.to_string(), info.clone());
        Ok(info)
    }

    /// Image ids for every frame of `url`.
    ///
    /// Any fetch or parse failure degrades to the single-frame id so the
    /// viewer can still attempt to display the file.
    pub async fn generate_image_ids_from_dicom(&self, url: &str) -> Vec<ImageId> {
        match self.get_cached_frame_info(url).await {
            Ok(info) => generate_frame_image_ids(&self.scheme, url, info.number_of_frames),
            Err(e) => {
                tracing::warn!(url, error = %e, "Failed to read DICOM frame info, using single image id");
                vec![ImageId::single(&self.scheme, url)]
            }
        }
    }

    /// Expand each URL in order and concatenate the results.
    pub async fn generate_image_ids_from_multiple_dicoms<I, U>(&self, urls: I) -> Vec<ImageId>
    where
        I: IntoIterator<Item = U>,
        U: AsRef<str>,
    {
        let mut ids = Vec::new();
        for url in urls {
            ids.extend(self.generate_image_ids_from_dicom(url.as_ref()).await);
        }
        ids
    }

    pub async fn clear_frame_info_cache(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.entries.read().await.contains_key(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::image_id::DEFAULT_SCHEME;
    use crate::testing::FakeFrameSource;
    use assert_matches::assert_matches;

    const CINE: &str = "http://pacs/cine.dcm";
    const CT: &str = "http://pacs/ct-001.dcm";
    const BROKEN: &str = "http://pacs/broken.dcm";

    fn cache() -> FrameInfoCache<FakeFrameSource> {
        let source = FakeFrameSource::new()
            .with_frames(CINE, 34)
            .with_frames(CT, 1)
            .with_bytes(BROKEN, b"not a dicom file".to_vec());
        FrameInfoCache::new(source, DEFAULT_SCHEME)
    }

    #[tokio::test]
    async fn parses_each_url_once() {
        let cache = cache();
        let first = cache.get_cached_frame_info(CINE).await.unwrap();
        let second = cache.get_cached_frame_info(CINE).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.number_of_frames, 34);
        assert_eq!(cache.source().calls(CINE), 1);
        assert!(cache.contains(CINE).await);
    }

    #[tokio::test]
    async fn errors_propagate_and_are_not_cached() {
        let cache = cache();
        assert_matches!(
            cache.get_cached_frame_info(BROKEN).await,
            Err(FrameError::Parse(ParseError::MissingPrefix))
        );
        assert!(!cache.contains(BROKEN).await);

        let _ = cache.get_cached_frame_info(BROKEN).await;
        assert_eq!(cache.source().calls(BROKEN), 2);
    }

    #[tokio::test]
    async fn multi_frame_expands_to_frame_ids() {
        let cache = cache();
        let ids = cache.generate_image_ids_from_dicom(CINE).await;
        assert_eq!(ids.len(), 34);
        assert_eq!(ids[11].as_str(), "wadouri:http://pacs/cine.dcm?frame=12");
    }

    #[tokio::test]
    async fn failure_falls_back_to_single_id() {
        let cache = cache();
        let ids = cache.generate_image_ids_from_dicom(BROKEN).await;
        assert_eq!(ids, vec![ImageId::single(DEFAULT_SCHEME, BROKEN)]);

        let unknown = cache.generate_image_ids_from_dicom("http://pacs/missing.dcm").await;
        assert_eq!(unknown.len(), 1);
    }

    #[tokio::test]
    async fn multiple_urls_keep_input_order() {
        let cache = cache();
        let ids = cache
            .generate_image_ids_from_multiple_dicoms([CT, CINE, BROKEN])
            .await;
        assert_eq!(ids.len(), 1 + 34 + 1);
        assert_eq!(ids[0].as_str(), "wadouri:http://pacs/ct-001.dcm");
        assert_eq!(ids[1].as_str(), "wadouri:http://pacs/cine.dcm?frame=1");
        assert_eq!(ids[34].as_str(), "wadouri:http://pacs/cine.dcm?frame=34");
        assert_eq!(ids[35].as_str(), "wadouri:http://pacs/broken.dcm");
    }

    #[tokio::test]
    async fn clear_forces_refetch() {
        let cache = cache();
        cache.get_cached_frame_info(CT).await.unwrap();
        assert_eq!(cache.len().await, 1);

        cache.clear_frame_info_cache().await;
        assert!(cache.is_empty().await);

        cache.get_cached_frame_info(CT).await.unwrap();
        assert_eq!(cache.source().calls(CT), 2);
    }

    #[tokio::test]
    async fn custom_scheme_is_used() {
        let cache = FrameInfoCache::new(FakeFrameSource::new().with_frames(CT, 1), "dicomweb");
        let ids = cache.generate_image_ids_from_dicom(CT).await;
        assert_eq!(ids[0].as_str(), "dicomweb:http://pacs/ct-001.dcm");
    }
}
