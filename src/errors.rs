// /src/errors.rs
//! Error taxonomy for reconciliation passes and host adapters
use thiserror::Error;

/// Failure reported by a [`Host`](crate::host::Host) implementation.
///
/// The engine never inspects or rewrites it; it travels to the caller of
/// `render`/`set_state` exactly as the host produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("host operation '{operation}' failed: {details}")]
pub struct HostError {
    pub operation: &'static str,
    pub details: String,
}

impl HostError {
    pub fn new(operation: &'static str, details: impl Into<String>) -> Self {
        HostError {
            operation,
            details: details.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Invalid element kind '{kind}': {details}")]
    InvalidElementKind { kind: String, details: String },

    #[error("Component '{component}' rendered no element")]
    MissingRenderResult { component: String },

    #[error(transparent)]
    HostOperationFailure(#[from] HostError),

    #[error("Update of '{component}' requested while a reconciliation pass is running")]
    ReentrantUpdate { component: String },

    #[error("Type conversion error: expected {expected}, got {actual}")]
    TypeConversionError { expected: String, actual: String },

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
