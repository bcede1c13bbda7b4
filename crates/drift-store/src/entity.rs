//! Entities: metadata, lifecycle, and the two document bodies.

use crate::list::ReplicatedList;
use crate::map::ReplicatedMap;
use crate::op::OpCoord;
use drift_access::GroupId;
use drift_clock::EntityId;
use serde::{Deserialize, Serialize};

/// The shape of an entity's body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Map,
    List,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Map => write!(f, "map"),
            EntityKind::List => write!(f, "list"),
        }
    }
}

/// Lifecycle of an entity on one replica.
///
/// `Pending` entities exist only as buffered operations (creation not yet
/// delivered); `Tombstoned` entities are invisible to readers but retained
/// for convergence; `Collected` is terminal, after all known replicas
/// acknowledged the tombstone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Pending,
    Active,
    Tombstoned,
    Collected,
}

/// Per-entity metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub id: EntityId,
    /// Owning access group. Immutable after creation.
    pub group: GroupId,
    /// Wall millis of the creating operation.
    pub created_at: u64,
    /// Max wall millis over all accepted operations; metadata only.
    pub updated_at: u64,
    /// Count of accepted operations; converges because it counts the
    /// distinct operation set, not merge outcomes.
    pub version: u64,
    pub state: LifecycleState,
    /// Coordinate of the tombstoning operation, once tombstoned.
    pub tombstoned_by: Option<OpCoord>,
}

/// Body of an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntityBody {
    Map(ReplicatedMap),
    List(ReplicatedList),
}

impl EntityBody {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityBody::Map(_) => EntityKind::Map,
            EntityBody::List(_) => EntityKind::List,
        }
    }

    pub fn as_map(&self) -> Option<&ReplicatedMap> {
        match self {
            EntityBody::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut ReplicatedMap> {
        match self {
            EntityBody::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ReplicatedList> {
        match self {
            EntityBody::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut ReplicatedList> {
        match self {
            EntityBody::List(l) => Some(l),
            _ => None,
        }
    }
}

/// A materialized entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub meta: EntityMeta,
    pub body: EntityBody,
}

impl Entity {
    pub fn new(id: EntityId, group: GroupId, kind: EntityKind, wall_ms: u64) -> Self {
        let body = match kind {
            EntityKind::Map => EntityBody::Map(ReplicatedMap::new()),
            EntityKind::List => EntityBody::List(ReplicatedList::new()),
        };
        Self {
            meta: EntityMeta {
                id,
                group,
                created_at: wall_ms,
                updated_at: wall_ms,
                version: 0,
                state: LifecycleState::Active,
                tombstoned_by: None,
            },
            body,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.body.kind()
    }

    pub fn is_active(&self) -> bool {
        self.meta.state == LifecycleState::Active
    }

    /// Record one accepted operation's effect on metadata.
    pub fn touch(&mut self, wall_ms: u64) {
        self.meta.version += 1;
        if wall_ms > self.meta.updated_at {
            self.meta.updated_at = wall_ms;
        }
    }

    /// Export the visible body as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match &self.body {
            EntityBody::Map(m) => m.to_json(),
            EntityBody::List(l) => l.to_json(),
        }
    }
}
