//! Image-id loading for the current study view.
//!
//! A new URL list supersedes any load still in flight. The superseded load
//! runs to completion but its result is discarded, so the visible image ids
//! always belong to the most recent request.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::cache::FrameInfoCache;
use crate::fetch::FrameSource;
use crate::image_id::ImageId;

/// Result of a [`ImageIdLoader::load`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The ids now shown for this URL list.
    Loaded(Vec<ImageId>),
    /// The URL list matches the last completed load; nothing was fetched.
    Unchanged,
    /// A newer request replaced this one before it finished.
    Stale,
}

/// Observable loader state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoaderSnapshot {
    pub image_ids: Vec<ImageId>,
    pub loading: bool,
    /// URL list of the latest request.
    pub urls: Vec<String>,
}

#[derive(Debug, Default)]
struct LoaderState {
    requested: Vec<String>,
    completed: Option<Vec<String>>,
    image_ids: Vec<ImageId>,
    loading: bool,
}

pub struct ImageIdLoader<S> {
    cache: Arc<FrameInfoCache<S>>,
    state: Mutex<LoaderState>,
}

impl<S: FrameSource> ImageIdLoader<S> {
    pub fn new(cache: Arc<FrameInfoCache<S>>) -> Self {
        Self {
            cache,
            state: Mutex::new(LoaderState::default()),
        }
    }

    pub fn cache(&self) -> &Arc<FrameInfoCache<S>> {
        &self.cache
    }

    /// Load image ids for `urls`, replacing whatever was requested before.
    pub async fn load(&self, urls: Vec<String>) -> LoadOutcome {
        {
            let mut state = self.lock_state();
            if state.completed.as_ref() == Some(&urls) {
                state.requested = urls;
                state.loading = false;
                return LoadOutcome::Unchanged;
            }
            state.requested = urls.clone();
            state.loading = true;
        }

        let ids = self
            .cache
            .generate_image_ids_from_multiple_dicoms(&urls)
            .await;

        let mut state = self.lock_state();
        if state.requested != urls {
            tracing::debug!(urls = urls.len(), "Discarding stale image id load");
            return LoadOutcome::Stale;
        }
        state.image_ids = ids.clone();
        state.completed = Some(urls);
        state.loading = false;
        LoadOutcome::Loaded(ids)
    }

    pub fn snapshot(&self) -> LoaderSnapshot {
        let state = self.lock_state();
        LoaderSnapshot {
            image_ids: state.image_ids.clone(),
            loading: state.loading,
            urls: state.requested.clone(),
        }
    }

    /// The state is plain data, so a poisoned lock is still usable.
    fn lock_state(&self) -> MutexGuard<'_, LoaderState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
