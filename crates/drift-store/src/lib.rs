//! Replicated value store with CRDT merge semantics.
//!
//! Documents are typed entities: maps with per-field last-writer-wins
//! registers, or ordered lists with RGA positioning. Every mutation is
//! captured as an immutable [`op::Operation`], applied locally first and
//! shipped to other replicas asynchronously; the merge path is commutative
//! and idempotent, so delivery order, duplication and delay never affect
//! the converged state.
//!
//! Module map:
//! - [`value`] - scalar values and the JSON export bridge
//! - [`op`] - operations, the unit of replication
//! - [`map`] / [`list`] - the two replicated document bodies
//! - [`entity`] - entity metadata and lifecycle
//! - [`store`] - the application-facing [`store::ValueStore`] API
//! - [`merge`] - remote-operation application (the merge engine)
//! - [`persist`] - load-at-startup/save-on-mutation boundary

pub mod entity;
pub mod error;
pub mod list;
pub mod map;
pub mod merge;
pub mod op;
pub mod persist;
pub mod store;
pub mod value;

pub use entity::{Entity, EntityBody, EntityKind, EntityMeta, LifecycleState};
pub use error::{Result, StoreError};
pub use list::{ElemId, ListNode, ReplicatedList};
pub use map::{LwwSlot, ReplicatedMap};
pub use merge::ApplyReport;
pub use op::{OpCoord, OpPayload, Operation};
pub use persist::{MemoryPersistence, PersistenceError, StorePersistence, StoreSnapshot};
pub use store::ValueStore;
pub use value::Value;
