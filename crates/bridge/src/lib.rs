//! Keeps the application stores and the rendering engine consistent.
//!
//! [`AnnotationSync`] turns engine lifecycle events into annotation store
//! mutations and pushes store-initiated deletions back into the engine.
//! [`AnnotationBridge`] runs it against a mounted viewport once the tools
//! module is loaded. [`SegmentationSync`] mirrors layer and brush changes.

pub mod annotation_sync;
pub mod correlation;
pub mod error;
pub mod lifecycle;
pub mod processor;
pub mod segmentation_sync;

pub use annotation_sync::{AnnotationSync, SharedAnnotationStore, SyncAction};
pub use correlation::CorrelationTable;
pub use error::BridgeError;
pub use lifecycle::{AnnotationBridge, Readiness};
pub use processor::{handle_raw_event, process_events};
pub use segmentation_sync::{SegmentationSync, SharedSegmentationStore};
