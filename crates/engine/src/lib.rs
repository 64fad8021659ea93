//! Abstract rendering-engine surface.
//!
//! The engine itself lives outside this workspace. This crate describes
//! what the bridges need from it: capability traits ([`api`]), the typed
//! lifecycle events it emits ([`messages`]), an in-process event bus
//! ([`bus`]) and the tool-name table ([`tools`]).

pub mod api;
pub mod bus;
pub mod error;
pub mod messages;
pub mod tools;

pub use api::{AnnotationEngine, SegmentationEngine, SegmentationRequest, ToolsLoader, ViewportSurface};
pub use bus::{BusViewport, EngineEventBus};
pub use error::EngineError;
pub use messages::{parse_event, EngineEvent};
