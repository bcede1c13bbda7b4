//! Replica context.
//!
//! Replaces ambient "current device id" state: the embedding application
//! constructs one `ReplicaContext` at startup and threads it into the store
//! explicitly. How the id is generated or persisted is the application's
//! concern.

use crate::id::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity and session metadata for one replica.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaContext {
    /// Stable per-installation identifier.
    replica_id: ReplicaId,
    /// Free-form session metadata (device name, app version, ...).
    session: BTreeMap<String, String>,
}

impl ReplicaContext {
    pub fn new(replica_id: impl Into<ReplicaId>) -> Self {
        Self {
            replica_id: replica_id.into(),
            session: BTreeMap::new(),
        }
    }

    /// Attach a session metadata entry.
    pub fn with_session(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session.insert(key.into(), value.into());
        self
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    pub fn session(&self, key: &str) -> Option<&str> {
        self.session.get(key).map(String::as_str)
    }
}
