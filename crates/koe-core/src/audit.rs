//! # Escrow Audit Trail
//!
//! Records every lifecycle event for later review. Each entry is
//! individually digestable via `CanonicalBytes` + `sha256_digest`, so an
//! exported trail can be checked for tampering entry by entry.
//!
//! The trail is bounded: when it exceeds `max_entries`, the oldest 10% (at
//! least one entry) are dropped. Export entries before they age out if they
//! must be retained.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::digest::{sha256_digest, CanonicalBytes, ContentDigest};
use crate::identity::ObjectId;
use crate::observer::{EscrowEvent, EscrowEventKind, EscrowObserver};
use crate::temporal::Timestamp;

/// Default trail capacity.
pub const DEFAULT_MAX_AUDIT_ENTRIES: usize = 10_000;

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// A single entry in the escrow audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Event discriminant.
    pub kind: EscrowEventKind,
    /// When the event was recorded.
    pub timestamp: Timestamp,
    /// Object the event concerns, if any.
    pub object_id: Option<ObjectId>,
    /// The full event.
    pub event: EscrowEvent,
}

impl AuditEntry {
    /// Create an entry stamped with the current UTC time.
    pub fn new(event: EscrowEvent) -> Self {
        Self {
            kind: event.kind(),
            timestamp: Timestamp::now(),
            object_id: event.object_id().cloned(),
            event,
        }
    }

    /// Content-addressed digest of this entry.
    ///
    /// Returns `None` if canonicalization fails, which well-formed events
    /// never do.
    pub fn digest(&self) -> Option<ContentDigest> {
        match CanonicalBytes::new(self) {
            Ok(canonical) => Some(sha256_digest(&canonical)),
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "audit entry canonicalization failed; digest unavailable");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AuditTrail
// ---------------------------------------------------------------------------

/// Bounded, append-only audit trail. Implements [`EscrowObserver`].
pub struct AuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
    max_entries: usize,
}

impl AuditTrail {
    /// Create a trail holding at most `max_entries` (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Append an entry, trimming the oldest 10% if the trail overflows.
    pub fn append(&self, entry: AuditEntry) {
        let mut entries = self.entries.lock();
        entries.push(entry);
        if entries.len() > self.max_entries {
            let trim_count = (self.max_entries / 10).max(1);
            entries.drain(..trim_count);
        }
    }

    /// Copies of all entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the trail is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Configured capacity.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Entries concerning one object.
    pub fn entries_for_object(&self, id: &ObjectId) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.object_id.as_ref() == Some(id))
            .cloned()
            .collect()
    }

    /// Entries of one event kind.
    pub fn entries_by_kind(&self, kind: EscrowEventKind) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// `(index, digest)` for every entry that canonicalizes.
    pub fn compute_digests(&self) -> Vec<(usize, ContentDigest)> {
        self.entries
            .lock()
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| entry.digest().map(|d| (i, d)))
            .collect()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AUDIT_ENTRIES)
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("entries", &self.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl EscrowObserver for AuditTrail {
    fn observe(&self, event: &EscrowEvent) {
        self.append(AuditEntry::new(event.clone()));
    }
}
