//! Stable-frontier computation from peer acknowledgements.
//!
//! A deletion is stable once the configured set of replicas has seen its
//! tombstone operation. The tracker holds the most recent frontier reported
//! by each known peer plus the local one, and computes the per-origin
//! sequence up to which purging is safe.

use crate::version_vector::VersionVector;
use drift_clock::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// When a tombstone counts as acknowledged cluster-wide.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcPolicy {
    /// Require every known replica to have acknowledged (default).
    pub require_all: bool,
    /// If not requiring all, the fraction of participants (including the
    /// local replica) that must have acknowledged. Clamped to (0, 1].
    pub quorum_fraction: f64,
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self {
            require_all: true,
            quorum_fraction: 1.0,
        }
    }
}

impl GcPolicy {
    pub fn quorum(fraction: f64) -> Self {
        Self {
            require_all: false,
            quorum_fraction: fraction.clamp(f64::MIN_POSITIVE, 1.0),
        }
    }
}

/// Tracks per-peer acknowledgement frontiers for GC decisions.
#[derive(Clone, Debug, Default)]
pub struct AckTracker {
    /// Last frontier reported by each peer.
    peer_frontiers: HashMap<ReplicaId, VersionVector>,
    policy: GcPolicy,
}

impl AckTracker {
    pub fn new(policy: GcPolicy) -> Self {
        Self {
            peer_frontiers: HashMap::new(),
            policy,
        }
    }

    /// Register a peer before it has reported anything. Until it reports,
    /// nothing is stable under `require_all`.
    pub fn register_peer(&mut self, peer: ReplicaId) {
        self.peer_frontiers.entry(peer).or_default();
    }

    /// Record the frontier a peer has reported (piggybacked on sync
    /// batches). Merged, never regressed.
    pub fn record_frontier(&mut self, peer: &ReplicaId, frontier: &VersionVector) {
        self.peer_frontiers
            .entry(peer.clone())
            .or_default()
            .merge(frontier);
    }

    pub fn peer_count(&self) -> usize {
        self.peer_frontiers.len()
    }

    pub fn peers(&self) -> impl Iterator<Item = &ReplicaId> {
        self.peer_frontiers.keys()
    }

    /// Component-wise maximum over every peer's reported frontier:
    /// everything any peer claims to have received.
    pub fn reported_union(&self) -> VersionVector {
        let mut union = VersionVector::new();
        for frontier in self.peer_frontiers.values() {
            union.merge(frontier);
        }
        union
    }

    /// Compute the stable frontier given the local frontier.
    ///
    /// Under `require_all` this is the component-wise min over the local
    /// frontier and every peer's. Under quorum, each origin's stable
    /// sequence is the largest value acknowledged by at least
    /// `ceil(quorum_fraction * participants)` participants.
    pub fn stable_frontier(&self, local: &VersionVector) -> VersionVector {
        if self.policy.require_all {
            let mut stable = local.clone();
            for frontier in self.peer_frontiers.values() {
                stable = stable.min_with(frontier);
            }
            return stable;
        }

        let participants = self.peer_frontiers.len() + 1;
        let needed = ((participants as f64) * self.policy.quorum_fraction).ceil() as usize;
        let needed = needed.max(1);

        let mut stable = VersionVector::new();
        for (origin, local_seq) in local.iter() {
            let mut seen: Vec<u64> = self
                .peer_frontiers
                .values()
                .map(|f| f.get(origin))
                .collect();
            seen.push(local_seq);
            seen.sort_unstable_by(|a, b| b.cmp(a));
            // needed-th highest value is acknowledged by >= needed participants
            let seq = seen[needed - 1];
            if seq > 0 {
                stable.observe(origin, seq);
            }
        }
        stable
    }
}
