//! In-process fan-out of engine events backed by a `tokio::sync::broadcast`
//! channel.
//!
//! The embedding viewer publishes every lifecycle event the engine emits on
//! a viewport element; bridges subscribe through [`ViewportSurface`].

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::api::ViewportSurface;
use crate::messages::EngineEvent;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Publish/subscribe hub for [`EngineEvent`]s of one viewport element.
///
/// When the buffer is full the oldest unconsumed events are dropped and slow
/// receivers observe `RecvError::Lagged`.
#[derive(Debug)]
pub struct EngineEventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EngineEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Returns the number of
    /// receivers it reached; with no subscribers the event is dropped.
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EngineEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Viewport element
// ---------------------------------------------------------------------------

/// A viewport element whose events flow through an [`EngineEventBus`].
#[derive(Debug, Clone)]
pub struct BusViewport {
    element_id: String,
    bus: Arc<EngineEventBus>,
}

impl BusViewport {
    pub fn new(element_id: impl Into<String>, bus: Arc<EngineEventBus>) -> Self {
        Self {
            element_id: element_id.into(),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<EngineEventBus> {
        &self.bus
    }
}

impl ViewportSurface for BusViewport {
    fn element_id(&self) -> &str {
        &self.element_id
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
