//! Replicated map: named fields with last-writer-wins semantics.
//!
//! Each field carries an independent LWW register keyed by Lamport
//! timestamp. An incoming write is accepted iff its timestamp strictly
//! exceeds the stored one; re-applying an already-applied or older write is
//! a no-op, which makes field merge commutative and idempotent. Removed
//! fields keep a tombstone slot so a late older write cannot reinstate
//! them.

use crate::value::Value;
use drift_clock::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One field's register: current value (None = tombstoned) and the
/// timestamp of the winning write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LwwSlot {
    pub value: Option<Value>,
    pub ts: Timestamp,
}

/// Field map for one entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedMap {
    fields: BTreeMap<String, LwwSlot>,
}

impl ReplicatedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a write. Returns whether it won (strictly newer than the
    /// stored slot, or the field was unset).
    pub fn set(&mut self, field: impl Into<String>, value: Option<Value>, ts: Timestamp) -> bool {
        let field = field.into();
        match self.fields.get_mut(&field) {
            Some(slot) => {
                if ts > slot.ts {
                    slot.value = value;
                    slot.ts = ts;
                    true
                } else {
                    false
                }
            }
            None => {
                self.fields.insert(field, LwwSlot { value, ts });
                true
            }
        }
    }

    /// Current value of a field, if set and not tombstoned.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).and_then(|slot| slot.value.as_ref())
    }

    /// The winning slot, tombstones included.
    pub fn slot(&self, field: &str) -> Option<&LwwSlot> {
        self.fields.get(field)
    }

    /// Visible (non-tombstoned) fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .filter_map(|(name, slot)| slot.value.as_ref().map(|v| (name.as_str(), v)))
    }

    /// Number of visible fields.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of visible fields.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    /// Export visible fields as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(name, value)| (name.to_string(), value.to_json()))
                .collect(),
        )
    }
}
