//! The wire unit of replication.

use crate::error::{Result, SyncError};
use drift_clock::ReplicaId;
use drift_compaction::VersionVector;
use drift_store::Operation;
use serde::{Deserialize, Serialize};

/// A batch of operations from one replica, tagged with the sender's
/// frontier. The frontier is meaningful even when `ops` is empty: an empty
/// batch is a pure acknowledgement, which is what lets tombstone collection
/// finish on replicas that have nothing left to say.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpBatch {
    pub from: ReplicaId,
    pub ops: Vec<Operation>,
    pub frontier: VersionVector,
}

impl OpBatch {
    pub fn new(from: ReplicaId, ops: Vec<Operation>, frontier: VersionVector) -> Self {
        Self {
            from,
            ops,
            frontier,
        }
    }

    /// A frontier-only acknowledgement.
    pub fn heartbeat(from: ReplicaId, frontier: VersionVector) -> Self {
        Self::new(from, Vec::new(), frontier)
    }

    pub fn is_heartbeat(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SyncError::Codec(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| SyncError::Codec(e.to_string()))
    }
}
