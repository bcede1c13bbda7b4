//! Ownership and access group management.
//!
//! Every replicated entity is owned by exactly one access group: a set of
//! principals each holding a role. The write path consults [`GroupManager::authorize`]
//! before applying any operation, local or remote; unauthorized remote
//! operations are dropped with an audit record rather than treated as errors.

pub mod audit;
pub mod error;
pub mod group;
pub mod manager;

pub use audit::{AuditOutcome, AuditRecord};
pub use error::{AccessError, Result};
pub use group::{AccessGroup, Action, GroupId, PrincipalId, Role};
pub use manager::GroupManager;
