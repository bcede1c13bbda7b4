//! Transport adapter and replicator.
//!
//! The store itself is transport-agnostic; this crate moves its operation
//! batches. Delivery may be delayed, duplicated or reordered - the merge
//! engine absorbs all of that - so the transport contract is deliberately
//! weak: at-least-once, no ordering. Each batch piggybacks the sender's
//! frontier, which doubles as the acknowledgement signal that drives
//! tombstone collection.

pub mod batch;
pub mod error;
pub mod replicator;
pub mod transport;

pub use batch::OpBatch;
pub use error::{Result, SyncError};
pub use replicator::{Replicator, SyncConfig, SyncConfigBuilder, SyncEvent};
pub use transport::{full_mesh, MemoryTransport, Peer, PeerState, SyncTransport};
