//! Identifier and logical clock service.
//!
//! Everything a replica needs to mint identity without coordination:
//! globally unique entity ids, a per-replica Lamport clock for causality
//! tracking, and the `ReplicaContext` that carries the replica's own
//! identity through the rest of the system.

pub mod context;
pub mod id;
pub mod lamport;

pub use context::ReplicaContext;
pub use id::{EntityId, ReplicaId};
pub use lamport::{LamportClock, Timestamp};
