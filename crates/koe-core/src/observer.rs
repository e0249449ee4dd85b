//! # Lifecycle Observation
//!
//! Every state change in the snapshot store, the escrow, and the scheduler
//! is reported as an [`EscrowEvent`] to an [`EscrowObserver`] injected at
//! construction. Components never write to a global output sink directly.
//!
//! Provided observers:
//!
//! - [`TracingObserver`]: structured `tracing` events (the default).
//! - [`NoopObserver`]: discards everything.
//! - [`FanoutObserver`]: broadcasts to several observers in order.
//! - [`crate::AuditTrail`]: bounded, digest-stamped event log.
//!
//! Observers are called while the emitting component may hold its internal
//! lock; implementations must not call back into the emitting component.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::identity::ObjectId;
use crate::status::ObjectStatus;

/// A lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EscrowEvent {
    /// The policy snapshot was replaced.
    SnapshotUpdated {
        /// New version label.
        version: String,
        /// Application sequence of the new snapshot (1-based).
        sequence: u64,
        /// Number of capability keys in the new map.
        capability_count: usize,
    },
    /// A knowledge object was admitted.
    ObjectAdmitted {
        /// Object id.
        id: ObjectId,
        /// Object kind.
        kind: String,
        /// Capability the object depends on.
        capability_key: String,
        /// Initial status (`PendingPolicy` or `Eligible`).
        status: ObjectStatus,
        /// Snapshot version observed at admission.
        policy_version: String,
    },
    /// A pending object became eligible during reconciliation.
    ObjectPromoted {
        /// Object id.
        id: ObjectId,
        /// Snapshot version that allowed the promotion.
        policy_version: String,
    },
    /// A reconciliation pass finished.
    Reconciled {
        /// Number of objects promoted in this pass.
        promoted_count: usize,
        /// Snapshot version the pass evaluated against.
        policy_version: String,
    },
    /// An object reached a terminal status.
    ObjectFinalized {
        /// Object id.
        id: ObjectId,
        /// `Executed` or `Rejected`.
        status: ObjectStatus,
        /// Recorded status reason.
        reason: String,
        /// Snapshot version in effect at the transition.
        policy_version: String,
    },
    /// A tick was dropped because another tick was in flight.
    TickSkipped,
    /// A tick drained a batch.
    TickCompleted {
        /// Objects handed to the executor.
        processed: usize,
        /// Objects that became `Executed`.
        executed: usize,
        /// Objects that became `Rejected`.
        rejected: usize,
        /// Objects whose terminal mark failed (finalized elsewhere).
        skipped: usize,
    },
}

/// Discriminant of an [`EscrowEvent`], for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowEventKind {
    /// See [`EscrowEvent::SnapshotUpdated`].
    SnapshotUpdated,
    /// See [`EscrowEvent::ObjectAdmitted`].
    ObjectAdmitted,
    /// See [`EscrowEvent::ObjectPromoted`].
    ObjectPromoted,
    /// See [`EscrowEvent::Reconciled`].
    Reconciled,
    /// See [`EscrowEvent::ObjectFinalized`].
    ObjectFinalized,
    /// See [`EscrowEvent::TickSkipped`].
    TickSkipped,
    /// See [`EscrowEvent::TickCompleted`].
    TickCompleted,
}

impl EscrowEventKind {
    /// The string value used in serialized events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SnapshotUpdated => "snapshot_updated",
            Self::ObjectAdmitted => "object_admitted",
            Self::ObjectPromoted => "object_promoted",
            Self::Reconciled => "reconciled",
            Self::ObjectFinalized => "object_finalized",
            Self::TickSkipped => "tick_skipped",
            Self::TickCompleted => "tick_completed",
        }
    }
}

impl std::fmt::Display for EscrowEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EscrowEvent {
    /// The event's discriminant.
    pub fn kind(&self) -> EscrowEventKind {
        match self {
            Self::SnapshotUpdated { .. } => EscrowEventKind::SnapshotUpdated,
            Self::ObjectAdmitted { .. } => EscrowEventKind::ObjectAdmitted,
            Self::ObjectPromoted { .. } => EscrowEventKind::ObjectPromoted,
            Self::Reconciled { .. } => EscrowEventKind::Reconciled,
            Self::ObjectFinalized { .. } => EscrowEventKind::ObjectFinalized,
            Self::TickSkipped => EscrowEventKind::TickSkipped,
            Self::TickCompleted { .. } => EscrowEventKind::TickCompleted,
        }
    }

    /// The object this event concerns, if any.
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Self::ObjectAdmitted { id, .. }
            | Self::ObjectPromoted { id, .. }
            | Self::ObjectFinalized { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Sink for lifecycle events.
pub trait EscrowObserver: Send + Sync {
    /// Receive one event.
    fn observe(&self, event: &EscrowEvent);
}

/// Emits every event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl EscrowObserver for TracingObserver {
    fn observe(&self, event: &EscrowEvent) {
        match event {
            EscrowEvent::SnapshotUpdated {
                version,
                sequence,
                capability_count,
            } => tracing::info!(%version, sequence, capability_count, "policy snapshot updated"),
            EscrowEvent::ObjectAdmitted {
                id,
                kind,
                capability_key,
                status,
                policy_version,
            } => tracing::info!(
                %id, %kind, %capability_key, %status, %policy_version,
                "knowledge object admitted"
            ),
            EscrowEvent::ObjectPromoted { id, policy_version } => {
                tracing::info!(%id, %policy_version, "knowledge object promoted to eligible")
            }
            EscrowEvent::Reconciled {
                promoted_count,
                policy_version,
            } => tracing::debug!(promoted_count, %policy_version, "reconciliation pass finished"),
            EscrowEvent::ObjectFinalized {
                id,
                status,
                reason,
                policy_version,
            } => tracing::info!(%id, %status, %reason, %policy_version, "knowledge object finalized"),
            EscrowEvent::TickSkipped => tracing::warn!("tick already in flight; dropping this tick"),
            EscrowEvent::TickCompleted {
                processed,
                executed,
                rejected,
                skipped,
            } => tracing::info!(processed, executed, rejected, skipped, "tick drained batch"),
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl EscrowObserver for NoopObserver {
    fn observe(&self, _event: &EscrowEvent) {}
}

/// Broadcasts each event to every inner observer, in registration order.
#[derive(Clone, Default)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn EscrowObserver>>,
}

impl FanoutObserver {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an observer.
    pub fn with(mut self, observer: Arc<dyn EscrowObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observers are registered.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for FanoutObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutObserver")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl EscrowObserver for FanoutObserver {
    fn observe(&self, event: &EscrowEvent) {
        for observer in &self.observers {
            observer.observe(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EscrowEventKind>>);

    impl EscrowObserver for Recorder {
        fn observe(&self, event: &EscrowEvent) {
            self.0.lock().push(event.kind());
        }
    }

    #[test]
    fn fanout_delivers_to_every_observer() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let fanout = FanoutObserver::new().with(a.clone()).with(b.clone());
        assert_eq!(fanout.len(), 2);

        fanout.observe(&EscrowEvent::TickSkipped);
        assert_eq!(a.0.lock().as_slice(), &[EscrowEventKind::TickSkipped]);
        assert_eq!(b.0.lock().as_slice(), &[EscrowEventKind::TickSkipped]);
    }

    #[test]
    fn object_id_only_for_object_events() {
        let id = ObjectId::new();
        let promoted = EscrowEvent::ObjectPromoted {
            id: id.clone(),
            policy_version: "v2".into(),
        };
        assert_eq!(promoted.object_id(), Some(&id));
        assert!(EscrowEvent::TickSkipped.object_id().is_none());
    }

    #[test]
    fn serialized_tag_matches_kind_name() {
        let event = EscrowEvent::Reconciled {
            promoted_count: 3,
            policy_version: "v7".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.kind().as_str());
        assert_eq!(value["promoted_count"], 3);
    }

    #[test]
    fn noop_and_tracing_observers_accept_all_events() {
        let events = [
            EscrowEvent::TickSkipped,
            EscrowEvent::TickCompleted {
                processed: 1,
                executed: 1,
                rejected: 0,
                skipped: 0,
            },
        ];
        for event in &events {
            NoopObserver.observe(event);
            TracingObserver.observe(event);
        }
    }
}
