//! Attaching the annotation bridge to a viewport.
//!
//! The engine's tools module loads asynchronously and the viewport element
//! can mount or unmount at any time. The event listener runs only while both
//! are present: it starts as soon as the second one arrives and stops when
//! the viewport unmounts. Each new listener first reconciles the engine with
//! the store, so annotations the engine lost while detached reappear.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use dicomark_engine::{AnnotationEngine, ToolsLoader, ViewportSurface};

use crate::annotation_sync::AnnotationSync;
use crate::processor::process_events;

/// How long [`AnnotationBridge::unmount`] waits for the listener to exit.
const DETACH_TIMEOUT: Duration = Duration::from_secs(5);

/// Tools module state. A failed load disables the bridge; it is reported
/// here rather than returned as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Loading,
    Ready,
    Failed(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

struct BridgeState {
    readiness: Readiness,
    surface: Option<Arc<dyn ViewportSurface>>,
    listener: Option<Listener>,
}

/// A running event listener task.
struct Listener {
    element_id: String,
    task_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

/// Owns the listener task that feeds viewport events into an
/// [`AnnotationSync`].
pub struct AnnotationBridge<E> {
    sync: Arc<AnnotationSync<E>>,
    state: Mutex<BridgeState>,
    /// Parent of every listener token; cancelled on shutdown.
    cancel: CancellationToken,
}

impl<E: AnnotationEngine + 'static> AnnotationBridge<E> {
    pub fn new(sync: Arc<AnnotationSync<E>>) -> Self {
        Self {
            sync,
            state: Mutex::new(BridgeState {
                readiness: Readiness::Loading,
                surface: None,
                listener: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn sync(&self) -> &Arc<AnnotationSync<E>> {
        &self.sync
    }

    pub async fn readiness(&self) -> Readiness {
        self.state.lock().await.readiness.clone()
    }

    /// Load the tools module. On success the listener starts if a viewport
    /// is already mounted. Loading again after success is a no-op.
    pub async fn load_tools(&self, loader: &dyn ToolsLoader) -> Readiness {
        {
            let mut state = self.state.lock().await;
            if state.readiness.is_ready() {
                return Readiness::Ready;
            }
            state.readiness = Readiness::Loading;
        }

        let result = loader.load().await;

        let mut state = self.state.lock().await;
        state.readiness = match result {
            Ok(()) => {
                tracing::info!("Engine tools module loaded");
                Readiness::Ready
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load engine tools module, annotation sync disabled");
                Readiness::Failed(e.to_string())
            }
        };
        self.try_attach(&mut state);
        state.readiness.clone()
    }

    /// Mount a viewport element, replacing any previous one. Returns whether
    /// the listener is running afterwards.
    pub async fn mount(&self, surface: Arc<dyn ViewportSurface>) -> bool {
        let mut state = self.state.lock().await;
        let previous = state.listener.take();
        state.surface = Some(surface);
        let attached = self.try_attach(&mut state);
        drop(state);

        if let Some(listener) = previous {
            Self::stop(listener).await;
        }
        attached
    }

    /// Unmount the viewport and stop its listener.
    pub async fn unmount(&self) {
        let listener = {
            let mut state = self.state.lock().await;
            state.surface = None;
            state.listener.take()
        };
        if let Some(listener) = listener {
            Self::stop(listener).await;
        }
    }

    pub async fn is_listening(&self) -> bool {
        self.state.lock().await.listener.is_some()
    }

    /// Element id of the viewport currently being listened to.
    pub async fn listening_element(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .listener
            .as_ref()
            .map(|l| l.element_id.clone())
    }

    /// Stop listening for good. Later mounts do not restart the listener.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.unmount().await;
    }

    // ---- private helpers ----

    fn try_attach(&self, state: &mut BridgeState) -> bool {
        if state.listener.is_some() {
            return true;
        }
        if !state.readiness.is_ready() || self.cancel.is_cancelled() {
            return false;
        }
        let Some(surface) = state.surface.as_ref() else {
            return false;
        };

        // Subscribe before spawning so no event between mount and task start
        // is missed.
        let events = surface.subscribe();
        let element_id = surface.element_id().to_string();
        let cancel = self.cancel.child_token();
        let sync = Arc::clone(&self.sync);
        let task_cancel = cancel.clone();
        let task_element = element_id.clone();

        let task_handle = tokio::spawn(async move {
            if let Err(e) = sync.reconcile().await {
                tracing::warn!(element_id = %task_element, error = %e, "Failed to reconcile annotations with engine");
            }
            process_events(&sync, events, &task_element, &task_cancel).await;
        });

        state.listener = Some(Listener {
            element_id,
            task_handle,
            cancel,
        });
        true
    }

    async fn stop(listener: Listener) {
        listener.cancel.cancel();
        if tokio::time::timeout(DETACH_TIMEOUT, listener.task_handle)
            .await
            .is_err()
        {
            tracing::warn!(element_id = %listener.element_id, "Event listener did not stop in time");
        }
    }
}
