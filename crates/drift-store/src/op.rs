//! Operations - the unit of replication.
//!
//! Every local mutation produces exactly one immutable `Operation`, applied
//! locally before being broadcast. Operations carry both a Lamport
//! timestamp (for merge decisions) and a per-origin sequence coordinate
//! (for deduplication and acknowledgement tracking); together they form an
//! append-only causal log per entity.

use crate::entity::EntityKind;
use crate::value::Value;
use drift_access::{GroupId, PrincipalId};
use drift_clock::{EntityId, ReplicaId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Globally unique operation coordinate: origin replica plus its local
/// sequence number. What version vectors track.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpCoord {
    pub origin: ReplicaId,
    pub seq: u64,
}

impl OpCoord {
    pub fn new(origin: impl Into<ReplicaId>, seq: u64) -> Self {
        Self {
            origin: origin.into(),
            seq,
        }
    }
}

impl std::fmt::Display for OpCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.origin, self.seq)
    }
}

/// What an operation does to its entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OpPayload {
    /// Materialize the entity. Carries the initial map fields (empty for
    /// lists).
    Create {
        kind: EntityKind,
        fields: BTreeMap<String, Value>,
    },
    /// Last-writer-wins set of one map field.
    SetField { field: String, value: Value },
    /// Field tombstone: the value-or-tombstone shape for maps.
    RemoveField { field: String },
    /// Insert a list element after `origin` (`None` = head).
    ListInsert {
        elem: crate::list::ElemId,
        origin: Option<crate::list::ElemId>,
        value: Value,
    },
    /// Tombstone a list element.
    ListDelete { elem: crate::list::ElemId },
    /// Tombstone the whole entity.
    Tombstone,
}

impl OpPayload {
    /// Short name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            OpPayload::Create { .. } => "create",
            OpPayload::SetField { .. } => "set_field",
            OpPayload::RemoveField { .. } => "remove_field",
            OpPayload::ListInsert { .. } => "list_insert",
            OpPayload::ListDelete { .. } => "list_delete",
            OpPayload::Tombstone => "tombstone",
        }
    }
}

/// One replicated mutation. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// The entity this operation targets.
    pub entity: EntityId,
    /// The entity's owning group, for authorization at the receiving side.
    pub group: GroupId,
    /// The principal that made the mutation.
    pub author: PrincipalId,
    /// Origin replica and per-origin sequence number.
    pub coord: OpCoord,
    /// Lamport timestamp; all merge tie-breaks use this.
    pub ts: Timestamp,
    /// Origin wall-clock millis; metadata only, never used for merging.
    pub wall_ms: u64,
    pub payload: OpPayload,
}
