//! # koe-escrow — Knowledge Object Escrow
//!
//! Admits deferred work unconditionally, tags it against the policy snapshot
//! in effect at admission, and tracks it through its lifecycle.
//!
//! ## Architecture
//!
//! - **Object** (`object.rs`): the [`KnowledgeObject`] record handed to
//!   callers and executors.
//!
//! - **Escrow** (`escrow.rs`): admission, reconciliation against the latest
//!   snapshot, status queries, and terminal transitions.
//!
//! ## Admission vs. execution
//!
//! Policy never blocks `create()`. It only decides whether an object starts
//! `Eligible` or waits in `PendingPolicy` until a later reconciliation pass
//! finds its capability allowed. Backlog accumulation is therefore
//! independent of permission evaluation.

pub mod escrow;
pub mod object;

pub use escrow::{KnowledgeObjectEscrow, ReconcileReport, EXECUTED_REASON};
pub use object::KnowledgeObject;
