//! # koe-policy — Policy Snapshot Store
//!
//! Holds the current capability permission map, its version label, and an
//! append-only history of every snapshot applied.
//!
//! - **Snapshot** (`snapshot.rs`): the versioned capability map and the
//!   `{version, capabilities}` input shape with its validation rules.
//!
//! - **Store** (`store.rs`): wholesale replacement on update, bounded
//!   history, and copy-out reads so callers can never alias internal state.
//!
//! The store is the only writer of snapshot state. The escrow reads it but
//! never mutates it.

pub mod snapshot;
pub mod store;

pub use snapshot::{PolicySnapshot, SnapshotInput};
pub use store::{CapabilityCheck, PolicySnapshotStore, SnapshotStoreConfig, DEFAULT_MAX_HISTORY};
