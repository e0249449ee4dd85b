#![deny(missing_docs)]

//! # koe-core — Foundational Types for the Knowledge-Object Escrow
//!
//! This crate defines the contracts that every other crate in the workspace
//! depends on. It has no internal crate dependencies.
//!
//! ## Design Principles
//!
//! 1. **Newtype identifiers.** Every knowledge object carries an [`ObjectId`];
//!    there is no way to pass a bare string where an id is expected.
//!
//! 2. **One lifecycle enum.** [`ObjectStatus`] is defined once and carries the
//!    legal-transition table, so the escrow and the scheduler cannot disagree
//!    about which moves are allowed.
//!
//! 3. **Injected observation.** Nothing in the workspace writes to a global
//!    sink. Lifecycle events flow through an [`EscrowObserver`] handed in at
//!    construction; [`TracingObserver`] is the default.
//!
//! 4. **Structured errors.** [`ValidationError`] and [`EscrowError`] are
//!    `thiserror` enums; no `Box<dyn Error>`, no `.unwrap()` outside tests.

pub mod audit;
pub mod digest;
pub mod error;
pub mod gate;
pub mod identity;
pub mod observer;
pub mod status;
pub mod temporal;

// Re-export primary types at crate root for ergonomic imports.
pub use audit::{AuditEntry, AuditTrail};
pub use digest::{sha256_digest, CanonicalBytes, ContentDigest};
pub use error::{EscrowError, ValidationError};
pub use gate::{AllOf, AllowAll, Gate, GateContext, GateDecision, KindDenyList};
pub use identity::ObjectId;
pub use observer::{
    EscrowEvent, EscrowEventKind, EscrowObserver, FanoutObserver, NoopObserver, TracingObserver,
};
pub use status::ObjectStatus;
pub use temporal::Timestamp;
