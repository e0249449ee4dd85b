//! # Knowledge Object Escrow
//!
//! ## Lifecycle
//!
//! ```text
//! create() ──▶ PendingPolicy ──reconcile()──▶ Eligible ──mark_executed()──▶ Executed
//!     │                                          ▲   └───mark_rejected()──▶ Rejected
//!     └──────────── (capability allowed) ────────┘
//! ```
//!
//! ## Invariants
//!
//! - `create()` never blocks on policy; it only picks the initial status.
//! - Reconciliation is explicit. Callers run it after every snapshot update;
//!   without an intervening update a second pass promotes nothing.
//! - Terminal transitions happen at most once per object. Unknown ids,
//!   terminal objects, and `PendingPolicy -> terminal` are reported as
//!   [`EscrowError`]s and mutate nothing.
//! - `policy_version_at_execution` is stamped at the terminal transition
//!   with the snapshot version in effect at that moment.
//!
//! ## Thread Safety
//!
//! The object collection lives behind one `parking_lot::RwLock`. Every
//! mutation is a single critical section, so two callers racing to finalize
//! the same object cannot both succeed. The escrow only ever takes the
//! snapshot store's read lock while holding its own, never the reverse.
//! Admission reads the snapshot under the escrow lock, so an object created
//! before a snapshot update is either visible to the following reconcile or
//! was admitted against the updated snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use koe_core::{
    EscrowError, EscrowEvent, EscrowObserver, Gate, GateContext, ObjectId, ObjectStatus,
    Timestamp, TracingObserver, ValidationError,
};
use koe_policy::PolicySnapshotStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::object::KnowledgeObject;

/// Status reason recorded by [`KnowledgeObjectEscrow::mark_executed`].
pub const EXECUTED_REASON: &str = "execution completed";

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Objects promoted from `PendingPolicy` to `Eligible`.
    pub promoted_count: usize,
    /// Snapshot version the pass evaluated against.
    pub policy_version: String,
}

struct Eligibility {
    eligible: bool,
    reason: String,
}

#[derive(Default)]
struct EscrowState {
    objects: Vec<KnowledgeObject>,
    index: HashMap<ObjectId, usize>,
}

/// The knowledge object escrow.
pub struct KnowledgeObjectEscrow {
    policy: Arc<PolicySnapshotStore>,
    state: RwLock<EscrowState>,
    gate: Option<Arc<dyn Gate>>,
    observer: Arc<dyn EscrowObserver>,
}

impl KnowledgeObjectEscrow {
    /// Create an empty escrow reading from `policy`.
    pub fn new(policy: Arc<PolicySnapshotStore>) -> Self {
        Self {
            policy,
            state: RwLock::new(EscrowState::default()),
            gate: None,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Builder: require `gate` to allow an object, in addition to its
    /// capability, before it becomes eligible.
    pub fn with_gate(mut self, gate: Arc<dyn Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Builder: set the lifecycle observer.
    pub fn with_observer(mut self, observer: Arc<dyn EscrowObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The snapshot store this escrow reads.
    pub fn policy(&self) -> &Arc<PolicySnapshotStore> {
        &self.policy
    }

    fn assess(
        &self,
        kind: &str,
        capability_key: &str,
        payload: &serde_json::Value,
        capability_allowed: bool,
        policy_version: &str,
    ) -> Eligibility {
        if !capability_allowed {
            return Eligibility {
                eligible: false,
                reason: format!(
                    "capability \"{capability_key}\" not allowed by policy {policy_version}"
                ),
            };
        }

        if let Some(gate) = &self.gate {
            let decision = gate.evaluate(&GateContext {
                kind,
                capability_key,
                payload,
                policy_version,
            });
            if !decision.allowed {
                return Eligibility {
                    eligible: false,
                    reason: format!(
                        "gate {} denied under policy {policy_version}: {}",
                        gate.name(),
                        decision.joined_reasons()
                    ),
                };
            }
        }

        Eligibility {
            eligible: true,
            reason: format!("capability \"{capability_key}\" allowed by policy {policy_version}"),
        }
    }

    /// Admit a knowledge object.
    ///
    /// The object starts `Eligible` if the current snapshot allows
    /// `capability_key` (and the gate, if any, allows the object); otherwise
    /// it starts `PendingPolicy`.
    ///
    /// # Errors
    ///
    /// - `Validation(EmptyKind)` / `Validation(EmptyObjectCapabilityKey)` for
    ///   blank arguments; nothing is admitted.
    /// - `DuplicateId` if the generated id is already in use.
    pub fn create(
        &self,
        kind: impl Into<String>,
        capability_key: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<KnowledgeObject, EscrowError> {
        let kind = kind.into();
        let capability_key = capability_key.into();
        if kind.trim().is_empty() {
            return Err(ValidationError::EmptyKind.into());
        }
        if capability_key.trim().is_empty() {
            return Err(ValidationError::EmptyObjectCapabilityKey.into());
        }

        // Policy is read under the escrow lock so that admission and
        // reconciliation are totally ordered.
        let mut state = self.state.write();
        let check = self.policy.check(&capability_key);
        let eligibility = self.assess(
            &kind,
            &capability_key,
            &payload,
            check.allowed,
            &check.version,
        );
        let status = if eligibility.eligible {
            ObjectStatus::Eligible
        } else {
            ObjectStatus::PendingPolicy
        };

        let id = ObjectId::new();
        if state.index.contains_key(&id) {
            return Err(EscrowError::DuplicateId { id });
        }

        let position = state.objects.len();
        let object = KnowledgeObject {
            id: id.clone(),
            kind,
            capability_key,
            payload,
            created_at: Timestamp::now(),
            status,
            status_reason: eligibility.reason,
            policy_version_at_creation: check.version,
            policy_version_at_execution: None,
            sequence: position as u64 + 1,
        };
        state.index.insert(id, position);
        state.objects.push(object.clone());

        self.observer.observe(&EscrowEvent::ObjectAdmitted {
            id: object.id.clone(),
            kind: object.kind.clone(),
            capability_key: object.capability_key.clone(),
            status,
            policy_version: object.policy_version_at_creation.clone(),
        });

        Ok(object)
    }

    /// Re-evaluate every `PendingPolicy` object against the current snapshot
    /// and promote those now allowed.
    ///
    /// Objects that remain blocked keep their original status reason.
    pub fn reconcile_with_current_policy(&self) -> ReconcileReport {
        let snapshot = self.policy.get_snapshot();
        let mut state = self.state.write();
        let mut promoted_count = 0;

        for object in state
            .objects
            .iter_mut()
            .filter(|o| o.status == ObjectStatus::PendingPolicy)
        {
            let eligibility = self.assess(
                &object.kind,
                &object.capability_key,
                &object.payload,
                snapshot.is_allowed(&object.capability_key),
                &snapshot.version,
            );
            if !eligibility.eligible {
                continue;
            }

            object.status = ObjectStatus::Eligible;
            object.status_reason = eligibility.reason;
            promoted_count += 1;
            self.observer.observe(&EscrowEvent::ObjectPromoted {
                id: object.id.clone(),
                policy_version: snapshot.version.clone(),
            });
        }

        let report = ReconcileReport {
            promoted_count,
            policy_version: snapshot.version,
        };
        self.observer.observe(&EscrowEvent::Reconciled {
            promoted_count: report.promoted_count,
            policy_version: report.policy_version.clone(),
        });
        report
    }

    /// Copies of every object in `status`, in admission order.
    pub fn list_by_status(&self, status: ObjectStatus) -> Vec<KnowledgeObject> {
        self.state
            .read()
            .objects
            .iter()
            .filter(|o| o.status == status)
            .cloned()
            .collect()
    }

    /// Copy of one object.
    pub fn get(&self, id: &ObjectId) -> Option<KnowledgeObject> {
        let state = self.state.read();
        state
            .index
            .get(id)
            .and_then(|&position| state.objects.get(position))
            .cloned()
    }

    /// Number of objects in each status. Every status is present, possibly
    /// with a zero count.
    pub fn status_counts(&self) -> HashMap<ObjectStatus, usize> {
        let mut counts: HashMap<ObjectStatus, usize> =
            ObjectStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for object in &self.state.read().objects {
            *counts.entry(object.status).or_insert(0) += 1;
        }
        counts
    }

    /// Total number of admitted objects.
    pub fn len(&self) -> usize {
        self.state.read().objects.len()
    }

    /// Whether no object has been admitted.
    pub fn is_empty(&self) -> bool {
        self.state.read().objects.is_empty()
    }

    /// Mark an `Eligible` object `Executed`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AlreadyTerminal`, or `InvalidTransition` (for a
    /// `PendingPolicy` object). Nothing is mutated on error.
    pub fn mark_executed(&self, id: &ObjectId) -> Result<KnowledgeObject, EscrowError> {
        self.finalize(id, ObjectStatus::Executed, EXECUTED_REASON.to_string())
    }

    /// Mark an `Eligible` object `Rejected` with `reason`.
    ///
    /// # Errors
    ///
    /// Same as [`KnowledgeObjectEscrow::mark_executed`].
    pub fn mark_rejected(
        &self,
        id: &ObjectId,
        reason: impl Into<String>,
    ) -> Result<KnowledgeObject, EscrowError> {
        self.finalize(id, ObjectStatus::Rejected, reason.into())
    }

    fn finalize(
        &self,
        id: &ObjectId,
        to: ObjectStatus,
        reason: String,
    ) -> Result<KnowledgeObject, EscrowError> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let object = state
            .index
            .get(id)
            .and_then(|&position| state.objects.get_mut(position))
            .ok_or_else(|| EscrowError::NotFound { id: id.clone() })?;

        if object.status.is_terminal() {
            return Err(EscrowError::AlreadyTerminal {
                id: id.clone(),
                status: object.status,
            });
        }
        if !object.status.can_transition_to(to) {
            return Err(EscrowError::InvalidTransition {
                id: id.clone(),
                from: object.status,
                to,
            });
        }

        let policy_version = self.policy.version();
        object.status = to;
        object.status_reason = reason;
        object.policy_version_at_execution = Some(policy_version.clone());
        let finalized = object.clone();

        self.observer.observe(&EscrowEvent::ObjectFinalized {
            id: finalized.id.clone(),
            status: to,
            reason: finalized.status_reason.clone(),
            policy_version,
        });

        Ok(finalized)
    }
}

impl std::fmt::Debug for KnowledgeObjectEscrow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeObjectEscrow")
            .field("objects", &self.len())
            .field("gate", &self.gate.as_ref().map(|g| g.name().to_string()))
            .finish()
    }
}
