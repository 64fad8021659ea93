/// Failures reported by the rendering engine or its tools module.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    /// The tools module is not loaded (or failed to load).
    #[error("Rendering engine unavailable: {0}")]
    Unavailable(String),

    /// The engine has no object with this id.
    #[error("{kind} not found in engine: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The engine refused or failed the operation.
    #[error("Engine rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
}

impl EngineError {
    pub fn rejected(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            reason: reason.into(),
        }
    }
}
