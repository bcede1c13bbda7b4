//! Persistence boundary: load at startup, save after mutation batches.
//!
//! The store itself never does I/O. The embedding application takes a
//! [`StoreSnapshot`] whenever it wants durability and hands it to whatever
//! [`StorePersistence`] implementation it runs on. [`MemoryPersistence`]
//! backs tests and ephemeral replicas.

use crate::entity::Entity;
use crate::op::{OpCoord, Operation};
use drift_clock::{EntityId, ReplicaId};
use drift_compaction::VersionVector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage i/o failed: {0}")]
    Io(String),
    #[error("snapshot serialization failed: {0}")]
    Serialization(String),
}

/// Everything a replica needs to resume where it left off: materialized
/// entities, the operation log, replication bookkeeping and clock positions.
/// Access groups are provisioned by the application and not included.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub replica: ReplicaId,
    pub clock_counter: u64,
    pub next_seq: u64,
    pub entities: BTreeMap<EntityId, Entity>,
    pub collected: HashSet<EntityId>,
    pub pending: HashMap<EntityId, Vec<Operation>>,
    pub seen: HashSet<OpCoord>,
    pub frontier: VersionVector,
    /// Sequences received out of order, waiting for the frontier prefix
    /// to reach them.
    pub gaps: BTreeMap<ReplicaId, BTreeSet<u64>>,
    pub log: Vec<Operation>,
    pub outbound: Vec<Operation>,
}

/// Where snapshots go. One snapshot per replica id; saving overwrites.
pub trait StorePersistence {
    fn save(&mut self, snapshot: &StoreSnapshot) -> Result<(), PersistenceError>;
    fn load(&self, replica: &ReplicaId) -> Result<Option<StoreSnapshot>, PersistenceError>;
}

/// In-memory persistence. Snapshots are held serialized so save/load
/// exercises the same path a durable backend would.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    snapshots: HashMap<ReplicaId, Vec<u8>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorePersistence for MemoryPersistence {
    fn save(&mut self, snapshot: &StoreSnapshot) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        self.snapshots.insert(snapshot.replica.clone(), bytes);
        Ok(())
    }

    fn load(&self, replica: &ReplicaId) -> Result<Option<StoreSnapshot>, PersistenceError> {
        match self.snapshots.get(replica) {
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| PersistenceError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }
}
