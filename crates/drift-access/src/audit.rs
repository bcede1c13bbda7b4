//! Audit trail for remote-operation authorization.
//!
//! Unauthorized remotely-originated writes are never surfaced as errors or
//! allowed to abort a batch; they are silently dropped and recorded here so
//! the embedding application can inspect what was refused. Operations that
//! name a group this replica does not know are applied without a check and
//! recorded too, for visibility.

use crate::group::{Action, GroupId, PrincipalId};
use drift_clock::{EntityId, ReplicaId};
use serde::{Deserialize, Serialize};

/// How authorization went for one remote operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    /// The author lacks the required role in the owning group.
    Denied,
    /// The owning group is not known here; the operation was applied
    /// without an authorization check.
    UnknownGroup,
}

/// One audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub group: GroupId,
    pub principal: PrincipalId,
    pub action: Action,
    pub entity: EntityId,
    pub origin: ReplicaId,
    /// Wall-clock millis at which the drop was recorded (local).
    pub recorded_at: u64,
    pub outcome: AuditOutcome,
}
