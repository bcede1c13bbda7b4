//! Lamport clock and timestamps.
//!
//! A timestamp is a `(counter, replica)` pair. Counters establish causal
//! order per replica; the replica id breaks ties between concurrent events,
//! giving a deterministic total order that does not depend on wall clocks.

use crate::id::ReplicaId;
use serde::{Deserialize, Serialize};

/// A Lamport timestamp: logical counter plus originating replica.
///
/// The derived ordering compares the counter first and the replica id on
/// ties, so any two distinct events are totally ordered the same way on
/// every replica.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Logical counter value.
    pub counter: u64,
    /// The replica that produced this timestamp.
    pub replica: ReplicaId,
}

impl Timestamp {
    pub fn new(counter: u64, replica: impl Into<ReplicaId>) -> Self {
        Self {
            counter,
            replica: replica.into(),
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.counter, self.replica)
    }
}

/// Per-replica Lamport clock.
///
/// `tick` is purely local and non-blocking; `observe` folds in a remote
/// timestamp so subsequent local events are ordered after everything this
/// replica has seen.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LamportClock {
    replica: ReplicaId,
    counter: u64,
}

impl LamportClock {
    pub fn new(replica: impl Into<ReplicaId>) -> Self {
        Self {
            replica: replica.into(),
            counter: 0,
        }
    }

    /// Restore a clock from a persisted counter value.
    pub fn resume(replica: impl Into<ReplicaId>, counter: u64) -> Self {
        Self {
            replica: replica.into(),
            counter,
        }
    }

    pub fn replica(&self) -> &ReplicaId {
        &self.replica
    }

    /// Current counter value (last issued).
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Advance the clock and return a fresh timestamp.
    pub fn tick(&mut self) -> Timestamp {
        self.counter += 1;
        Timestamp {
            counter: self.counter,
            replica: self.replica.clone(),
        }
    }

    /// Merge a remote timestamp into the clock.
    pub fn observe(&mut self, remote: &Timestamp) {
        if remote.counter > self.counter {
            self.counter = remote.counter;
        }
    }
}
