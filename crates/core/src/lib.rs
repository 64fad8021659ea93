//! Application-owned state for the DICOM annotation viewer.
//!
//! - [`annotation_store`]: canonical annotation list with bounded,
//!   command-sourced undo/redo.
//! - [`segmentation`]: per-viewport segmentation layers and brush settings.
//! - [`label`]: label definitions shared by annotations and layers.
//! - [`preferences`]: persistence of labels and brush settings across
//!   sessions.
//!
//! Nothing in this crate talks to the rendering engine; the
//! `dicomark-bridge` crate keeps the two sides in sync.

pub mod annotation;
pub mod annotation_store;
pub mod error;
pub mod history;
pub mod label;
pub mod preferences;
pub mod segmentation;
pub mod types;
