use dicomark_engine::EngineError;

/// Failures surfaced by store-initiated operations that reach the engine.
///
/// Engine-initiated events never produce errors: lookup misses are ignored.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Entity not found in the application store.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}
