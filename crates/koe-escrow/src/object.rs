//! # Knowledge Objects

use koe_core::{ObjectId, ObjectStatus, Timestamp};
use serde::{Deserialize, Serialize};

/// A deferred, capability-gated unit of work.
///
/// Instances returned by the escrow are copies; mutating them has no effect
/// on the escrow's own record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeObject {
    /// Process-unique identifier.
    pub id: ObjectId,
    /// Free-form tag describing the work.
    pub kind: String,
    /// Permission class the object depends on.
    pub capability_key: String,
    /// Opaque, caller-defined payload.
    pub payload: serde_json::Value,
    /// Admission time.
    pub created_at: Timestamp,
    /// Current lifecycle status.
    pub status: ObjectStatus,
    /// Why the object is in its current status.
    pub status_reason: String,
    /// Snapshot version observed by `create()`.
    pub policy_version_at_creation: String,
    /// Snapshot version at the terminal transition; `None` until then.
    pub policy_version_at_execution: Option<String>,
    /// Admission order within the escrow.
    pub sequence: u64,
}

impl KnowledgeObject {
    /// Whether the object has reached `Executed` or `Rejected`.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
