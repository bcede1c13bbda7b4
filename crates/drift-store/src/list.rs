//! Replicated list: an ordered sequence CRDT.
//!
//! Each element carries a stable id derived from the inserting operation's
//! Lamport timestamp and sequence number, plus the id of its left neighbor
//! at insertion time. Concurrent inserts after the same neighbor are
//! ordered by descending element id, so every replica linearizes the tree
//! identically regardless of delivery order. Deletions tombstone the
//! element; tombstones are excluded from the visible sequence but retained
//! until acknowledged by all replicas and collected.

use crate::op::OpCoord;
use crate::value::Value;
use drift_clock::Timestamp;
use drift_compaction::VersionVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable position identity for one list element.
///
/// Ordering compares the Lamport timestamp first (counter, then replica)
/// and the per-operation sequence last; distinct operations always compare
/// unequal, so sibling order is a pure function of the operations.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElemId {
    pub ts: Timestamp,
    pub seq: u64,
}

impl ElemId {
    pub fn new(ts: Timestamp, seq: u64) -> Self {
        Self { ts, seq }
    }
}

/// One element, live or tombstoned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListNode {
    pub id: ElemId,
    /// Left neighbor at insertion time (`None` = head of list).
    pub origin: Option<ElemId>,
    /// The stored value; taken when tombstoned.
    pub value: Option<Value>,
    /// Coordinate of the deleting operation, if any.
    pub deleted_by: Option<OpCoord>,
}

/// Ordered sequence CRDT for one entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedList {
    /// All elements by id, tombstones included.
    nodes: HashMap<ElemId, ListNode>,
    /// Origin -> children inserted after it, descending by id.
    children: HashMap<Option<ElemId>, Vec<ElemId>>,
    /// Deletes that arrived before their element's insert.
    pending_deletes: HashMap<ElemId, OpCoord>,
}

impl ReplicatedList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Integrate an insert. Returns false if the element is already known
    /// (duplicate delivery).
    pub fn insert(&mut self, id: ElemId, origin: Option<ElemId>, value: Value) -> bool {
        if self.nodes.contains_key(&id) {
            return false;
        }

        let mut node = ListNode {
            id: id.clone(),
            origin: origin.clone(),
            value: Some(value),
            deleted_by: None,
        };

        // A delete for this element may have raced ahead of the insert.
        if let Some(coord) = self.pending_deletes.remove(&id) {
            node.value = None;
            node.deleted_by = Some(coord);
        }

        self.nodes.insert(id.clone(), node);

        let siblings = self.children.entry(origin).or_default();
        let pos = siblings.iter().position(|s| s < &id).unwrap_or(siblings.len());
        siblings.insert(pos, id);
        true
    }

    /// Tombstone an element. A delete for a not-yet-seen element is parked
    /// and applied when the insert arrives. Returns whether the visible
    /// sequence changed.
    pub fn tombstone(&mut self, id: &ElemId, coord: OpCoord) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                if node.deleted_by.is_some() {
                    false
                } else {
                    node.value = None;
                    node.deleted_by = Some(coord);
                    true
                }
            }
            None => {
                self.pending_deletes.entry(id.clone()).or_insert(coord);
                false
            }
        }
    }

    /// Visible values in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.iter_nodes()
            .filter(|n| n.deleted_by.is_none())
            .filter_map(|n| n.value.as_ref())
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().cloned().collect()
    }

    /// Export visible values as a JSON array.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.iter().map(Value::to_json).collect())
    }

    /// Number of visible elements.
    pub fn len(&self) -> usize {
        self.iter_nodes().filter(|n| n.deleted_by.is_none()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at a visible index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.iter().nth(index)
    }

    /// Element id at a visible index.
    pub fn id_at(&self, index: usize) -> Option<ElemId> {
        self.iter_nodes()
            .filter(|n| n.deleted_by.is_none())
            .nth(index)
            .map(|n| n.id.clone())
    }

    /// Whether an element id is known (live or tombstoned).
    pub fn contains(&self, id: &ElemId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Physically remove tombstoned elements whose delete is covered by the
    /// stable frontier. Only elements with no children are removed, so the
    /// position tree stays reachable; interior tombstones fall out once
    /// their subtree has been purged. Returns the number removed.
    pub fn purge(&mut self, stable: &VersionVector) -> usize {
        let mut removed = 0;
        loop {
            let candidates: Vec<ElemId> = self
                .nodes
                .values()
                .filter(|n| {
                    n.deleted_by
                        .as_ref()
                        .map(|c| stable.covers(&c.origin, c.seq))
                        .unwrap_or(false)
                })
                .filter(|n| {
                    self.children
                        .get(&Some(n.id.clone()))
                        .map(|c| c.is_empty())
                        .unwrap_or(true)
                })
                .map(|n| n.id.clone())
                .collect();

            if candidates.is_empty() {
                break;
            }

            for id in candidates {
                if let Some(node) = self.nodes.remove(&id) {
                    if let Some(siblings) = self.children.get_mut(&node.origin) {
                        siblings.retain(|s| s != &id);
                    }
                    self.children.remove(&Some(id));
                    removed += 1;
                }
            }
        }
        removed
    }

    /// All nodes in sequence order, tombstones included.
    fn iter_nodes(&self) -> ListIter<'_> {
        let mut stack = Vec::new();
        if let Some(roots) = self.children.get(&None) {
            for id in roots.iter().rev() {
                stack.push(id.clone());
            }
        }
        ListIter { list: self, stack }
    }
}

/// Depth-first walk of the position tree: each element is followed by its
/// children (newest sibling first), which yields the converged sequence.
struct ListIter<'a> {
    list: &'a ReplicatedList,
    stack: Vec<ElemId>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a ListNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            // Children whose origin insert has not arrived yet are skipped
            // until it does.
            let Some(node) = self.list.nodes.get(&id) else {
                continue;
            };
            if let Some(children) = self.list.children.get(&Some(id)) {
                for child in children.iter().rev() {
                    self.stack.push(child.clone());
                }
            }
            return Some(node);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem(counter: u64, replica: &str, seq: u64) -> ElemId {
        ElemId::new(Timestamp::new(counter, replica), seq)
    }

    fn coord(replica: &str, seq: u64) -> OpCoord {
        OpCoord::new(replica, seq)
    }

    #[test]
    fn test_sequential_inserts() {
        let mut list = ReplicatedList::new();
        let a = elem(1, "r1", 1);
        let b = elem(2, "r1", 2);
        list.insert(a.clone(), None, Value::from("a"));
        list.insert(b, Some(a), Value::from("b"));

        assert_eq!(list.to_vec(), vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_concurrent_head_inserts_order_deterministically() {
        // Both replicas insert at the head; the higher element id lands
        // first in the converged sequence, in either delivery order.
        let x = elem(1, "a", 1);
        let y = elem(1, "b", 1);

        let mut l1 = ReplicatedList::new();
        l1.insert(x.clone(), None, Value::from("X"));
        l1.insert(y.clone(), None, Value::from("Y"));

        let mut l2 = ReplicatedList::new();
        l2.insert(y, None, Value::from("Y"));
        l2.insert(x, None, Value::from("X"));

        assert_eq!(l1.to_vec(), l2.to_vec());
        // b > a at equal counters, so Y precedes X.
        assert_eq!(l1.to_vec(), vec![Value::from("Y"), Value::from("X")]);
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut list = ReplicatedList::new();
        let a = elem(1, "r1", 1);
        assert!(list.insert(a.clone(), None, Value::from("a")));
        assert!(!list.insert(a, None, Value::from("a")));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_tombstone_hides_element() {
        let mut list = ReplicatedList::new();
        let a = elem(1, "r1", 1);
        let b = elem(2, "r1", 2);
        list.insert(a.clone(), None, Value::from("a"));
        list.insert(b, Some(a.clone()), Value::from("b"));

        assert!(list.tombstone(&a, coord("r1", 3)));
        assert_eq!(list.to_vec(), vec![Value::from("b")]);
        assert!(list.contains(&a)); // retained as a tombstone
    }

    #[test]
    fn test_delete_before_insert_is_parked() {
        let mut list = ReplicatedList::new();
        let a = elem(1, "r1", 1);

        list.tombstone(&a, coord("r2", 5));
        assert!(list.insert(a.clone(), None, Value::from("a")));

        // The parked delete applied on arrival.
        assert_eq!(list.len(), 0);
        assert!(list.contains(&a));
    }

    #[test]
    fn test_insert_after_unseen_origin_materializes_later() {
        let mut list = ReplicatedList::new();
        let a = elem(1, "r1", 1);
        let b = elem(2, "r2", 1);

        // b (inserted after a) arrives before a.
        list.insert(b.clone(), Some(a.clone()), Value::from("b"));
        assert_eq!(list.to_vec(), Vec::<Value>::new());

        list.insert(a, None, Value::from("a"));
        assert_eq!(list.to_vec(), vec![Value::from("a"), Value::from("b")]);
        let _ = b;
    }

    #[test]
    fn test_purge_removes_covered_leaf_tombstones() {
        let mut list = ReplicatedList::new();
        let a = elem(1, "r1", 1);
        let b = elem(2, "r1", 2);
        list.insert(a.clone(), None, Value::from("a"));
        list.insert(b.clone(), Some(a.clone()), Value::from("b"));
        list.tombstone(&b, coord("r1", 3));

        let mut stable = VersionVector::new();
        stable.observe(&drift_clock::ReplicaId::new("r1"), 3);

        assert_eq!(list.purge(&stable), 1);
        assert!(!list.contains(&b));
        assert_eq!(list.to_vec(), vec![Value::from("a")]);
    }

    #[test]
    fn test_purge_keeps_uncovered_tombstones() {
        let mut list = ReplicatedList::new();
        let a = elem(1, "r1", 1);
        list.insert(a.clone(), None, Value::from("a"));
        list.tombstone(&a, coord("r1", 2));

        // Frontier has not seen the delete yet.
        let stable = VersionVector::new();
        assert_eq!(list.purge(&stable), 0);
        assert!(list.contains(&a));
    }

    #[test]
    fn test_purge_interior_tombstone_after_subtree() {
        let mut list = ReplicatedList::new();
        let a = elem(1, "r1", 1);
        let b = elem(2, "r1", 2);
        list.insert(a.clone(), None, Value::from("a"));
        list.insert(b.clone(), Some(a.clone()), Value::from("b"));
        list.tombstone(&a, coord("r1", 3));
        list.tombstone(&b, coord("r1", 4));

        let mut stable = VersionVector::new();
        stable.observe(&drift_clock::ReplicaId::new("r1"), 4);

        // b (leaf) unblocks a (interior) within one purge pass.
        assert_eq!(list.purge(&stable), 2);
        assert!(list.is_empty());
        assert!(!list.contains(&a));
    }
}
