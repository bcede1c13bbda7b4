//! Error types for the store.
//!
//! Only local calls surface errors to the caller. Remote operations are
//! absorbed by the merge engine: malformed or unauthorized ones are logged
//! and audited without interrupting the rest of a batch, and concurrent
//! edits are never an error at all - they resolve deterministically.

use thiserror::Error;

/// Errors returned synchronously from local store calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Permission denied: {principal} may not write entity {entity}")]
    PermissionDenied { principal: String, entity: String },

    #[error("Malformed operation: {0}")]
    MalformedOperation(String),

    #[error("Index out of bounds: {index} (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },
}

pub type Result<T> = std::result::Result<T, StoreError>;
