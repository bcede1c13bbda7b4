//! Error types for access management.

use thiserror::Error;

/// Errors from group management calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Principal not found in group: {0}")]
    PrincipalNotFound(String),

    #[error("Permission denied: {principal} may not {action} in group {group}")]
    PermissionDenied {
        principal: String,
        action: String,
        group: String,
    },
}

pub type Result<T> = std::result::Result<T, AccessError>;
