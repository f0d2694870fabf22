//! Error types for the flow engine.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by engine collaborators (storage, locks, definitions).
///
/// These never cross the public boundary of [`FlowExecutor`](crate::FlowExecutor)
/// or [`FlowService`](crate::FlowService); both convert them into a
/// [`ServiceResult`](crate::ServiceResult) before returning.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Persistence backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A uniqueness constraint was violated on insert.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A row addressed by id does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Flow meta or job definitions are inconsistent.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// Registry lookup or registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// `save` was called on a context that is not bound to an action record.
    #[error("context is not bound to an action record")]
    NoActionScope,

    /// Named lock could not be acquired.
    #[error("Lock error: {0}")]
    Lock(String),

    /// A flow lifecycle hook failed.
    #[error("Hook failed: {0}")]
    Hook(String),

    /// A job action handler failed.
    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from the definition registries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },
}
