//! Version vector over operation coordinates.
//!
//! Each operation a replica produces carries a per-origin sequence number;
//! a version vector records the highest sequence seen from every origin and
//! so summarizes a replica's causal history compactly.

use drift_clock::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Map from origin replica to highest sequence number seen.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    entries: BTreeMap<ReplicaId, u64>,
}

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence seen from `origin` (0 if none).
    pub fn get(&self, origin: &ReplicaId) -> u64 {
        self.entries.get(origin).copied().unwrap_or(0)
    }

    /// Record that `seq` from `origin` has been seen. Keeps the max.
    pub fn observe(&mut self, origin: &ReplicaId, seq: u64) {
        let entry = self.entries.entry(origin.clone()).or_insert(0);
        if seq > *entry {
            *entry = seq;
        }
    }

    /// Whether this vector has seen at least `(origin, seq)`.
    pub fn covers(&self, origin: &ReplicaId, seq: u64) -> bool {
        self.get(origin) >= seq
    }

    /// Whether for every origin, `self[o] >= other[o]`.
    pub fn dominates(&self, other: &VersionVector) -> bool {
        other
            .entries
            .iter()
            .all(|(origin, &seq)| self.get(origin) >= seq)
    }

    /// Component-wise max merge.
    pub fn merge(&mut self, other: &VersionVector) {
        for (origin, &seq) in &other.entries {
            self.observe(origin, seq);
        }
    }

    /// Component-wise min across both vectors' origins. Origins missing on
    /// either side count as 0 and drop out.
    pub fn min_with(&self, other: &VersionVector) -> VersionVector {
        let mut result = VersionVector::new();
        for (origin, &seq) in &self.entries {
            let min = seq.min(other.get(origin));
            if min > 0 {
                result.entries.insert(origin.clone(), min);
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, u64)> {
        self.entries.iter().map(|(o, &s)| (o, s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> ReplicaId {
        ReplicaId::new(s)
    }

    #[test]
    fn test_observe_keeps_max() {
        let mut vv = VersionVector::new();
        vv.observe(&r("a"), 3);
        vv.observe(&r("a"), 1);
        assert_eq!(vv.get(&r("a")), 3);
        assert_eq!(vv.get(&r("b")), 0);
    }

    #[test]
    fn test_dominates() {
        let mut a = VersionVector::new();
        a.observe(&r("x"), 5);
        a.observe(&r("y"), 2);

        let mut b = VersionVector::new();
        b.observe(&r("x"), 3);

        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
        assert!(a.dominates(&a));
    }

    #[test]
    fn test_merge_is_component_max() {
        let mut a = VersionVector::new();
        a.observe(&r("x"), 5);
        let mut b = VersionVector::new();
        b.observe(&r("x"), 2);
        b.observe(&r("y"), 7);

        a.merge(&b);
        assert_eq!(a.get(&r("x")), 5);
        assert_eq!(a.get(&r("y")), 7);
    }

    #[test]
    fn test_min_with_drops_unseen_origins() {
        let mut a = VersionVector::new();
        a.observe(&r("x"), 5);
        a.observe(&r("y"), 3);
        let mut b = VersionVector::new();
        b.observe(&r("x"), 2);

        let min = a.min_with(&b);
        assert_eq!(min.get(&r("x")), 2);
        // y missing on b: nothing stable from y yet
        assert_eq!(min.get(&r("y")), 0);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut vv = VersionVector::new();
        vv.observe(&r("a"), 4);
        vv.observe(&r("b"), 9);

        let json = serde_json::to_string(&vv).unwrap();
        let back: VersionVector = serde_json::from_str(&json).unwrap();
        assert_eq!(vv, back);
    }

    #[test]
    fn test_covers() {
        let mut vv = VersionVector::new();
        vv.observe(&r("a"), 4);
        assert!(vv.covers(&r("a"), 4));
        assert!(vv.covers(&r("a"), 1));
        assert!(!vv.covers(&r("a"), 5));
        assert!(!vv.covers(&r("b"), 1));
    }
}
