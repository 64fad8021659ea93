//! Engine event processing loop.
//!
//! Receives [`EngineEvent`]s from a viewport's broadcast channel and hands
//! each one to [`AnnotationSync::handle_event`] in arrival order.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use dicomark_engine::messages::{parse_event, EngineEvent};
use dicomark_engine::AnnotationEngine;

use crate::annotation_sync::{AnnotationSync, SyncAction};

/// Process events until the channel closes or `cancel` fires.
///
/// A lagged receiver has lost events; the loop logs how many and keeps
/// going with the next available one.
pub async fn process_events<E: AnnotationEngine>(
    sync: &AnnotationSync<E>,
    mut events: broadcast::Receiver<EngineEvent>,
    element_id: &str,
    cancel: &CancellationToken,
) {
    tracing::info!(element_id, "Engine event listener attached");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(element_id, "Engine event listener detached");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    let action = sync.handle_event(&event).await;
                    tracing::debug!(element_id, event = event.name(), ?action, "Engine event handled");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(element_id, skipped, "Engine event listener lagged, events dropped");
                }
                Err(RecvError::Closed) => {
                    tracing::info!(element_id, "Engine event channel closed");
                    break;
                }
            },
        }
    }
}

/// Parse a JSON event as emitted by the engine and dispatch it.
///
/// Unparseable or unknown events are logged and yield `None`.
pub async fn handle_raw_event<E: AnnotationEngine>(
    sync: &AnnotationSync<E>,
    text: &str,
) -> Option<SyncAction> {
    match parse_event(text) {
        Ok(event) => Some(sync.handle_event(&event).await),
        Err(e) => {
            tracing::warn!(error = %e, raw_event = %text, "Failed to parse engine event");
            None
        }
    }
}
