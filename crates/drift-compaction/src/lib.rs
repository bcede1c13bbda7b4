//! Acknowledgement tracking and tombstone collection policy.
//!
//! Tombstones may only be physically purged once every known replica (or a
//! configured quorum) has acknowledged the deletion; otherwise a lagging
//! replica could resurrect deleted state. This crate provides the version
//! vector that summarizes what each replica has seen and the tracker that
//! computes the stable frontier from peer acknowledgements.

pub mod stability;
pub mod version_vector;

pub use stability::{AckTracker, GcPolicy};
pub use version_vector::VersionVector;
