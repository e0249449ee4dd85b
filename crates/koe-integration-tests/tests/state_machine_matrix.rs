//! # Lifecycle Transition Matrix
//!
//! Exhaustive checks of which `mark_*` calls succeed from each status and
//! what error each rejected call reports.

use std::sync::Arc;

use koe_core::{EscrowError, NoopObserver, ObjectId, ObjectStatus};
use koe_escrow::{KnowledgeObject, KnowledgeObjectEscrow};
use koe_policy::{PolicySnapshotStore, SnapshotInput};
use serde_json::json;

fn escrow() -> KnowledgeObjectEscrow {
    let store = PolicySnapshotStore::new(SnapshotInput::new("v1", [("open", true), ("closed", false)]))
        .unwrap()
        .with_observer(Arc::new(NoopObserver));
    KnowledgeObjectEscrow::new(Arc::new(store)).with_observer(Arc::new(NoopObserver))
}

/// An object in `status`, reached through the public API only.
fn object_in(escrow: &KnowledgeObjectEscrow, status: ObjectStatus) -> KnowledgeObject {
    match status {
        ObjectStatus::PendingPolicy => escrow.create("k", "closed", json!({})).unwrap(),
        ObjectStatus::Eligible => escrow.create("k", "open", json!({})).unwrap(),
        ObjectStatus::Executed => {
            let o = escrow.create("k", "open", json!({})).unwrap();
            escrow.mark_executed(&o.id).unwrap()
        }
        ObjectStatus::Rejected => {
            let o = escrow.create("k", "open", json!({})).unwrap();
            escrow.mark_rejected(&o.id, "setup").unwrap()
        }
    }
}

#[test]
fn mark_executed_from_every_status() {
    for from in ObjectStatus::ALL {
        let escrow = escrow();
        let object = object_in(&escrow, from);
        let result = escrow.mark_executed(&object.id);
        match from {
            ObjectStatus::Eligible => {
                assert_eq!(result.unwrap().status, ObjectStatus::Executed)
            }
            ObjectStatus::PendingPolicy => assert_eq!(
                result.unwrap_err(),
                EscrowError::InvalidTransition {
                    id: object.id.clone(),
                    from,
                    to: ObjectStatus::Executed
                }
            ),
            ObjectStatus::Executed | ObjectStatus::Rejected => assert_eq!(
                result.unwrap_err(),
                EscrowError::AlreadyTerminal {
                    id: object.id.clone(),
                    status: from
                }
            ),
        }
    }
}

#[test]
fn mark_rejected_from_every_status() {
    for from in ObjectStatus::ALL {
        let escrow = escrow();
        let object = object_in(&escrow, from);
        let before = escrow.get(&object.id).unwrap();
        let result = escrow.mark_rejected(&object.id, "matrix");

        if from == ObjectStatus::Eligible {
            let rejected = result.unwrap();
            assert_eq!(rejected.status, ObjectStatus::Rejected);
            assert_eq!(rejected.status_reason, "matrix");
        } else {
            assert!(result.is_err(), "{from} -> rejected must fail");
            assert_eq!(escrow.get(&object.id).unwrap(), before, "{from} must be unchanged");
        }
    }
}

#[test]
fn unknown_ids_never_touch_state() {
    let escrow = escrow();
    let known = object_in(&escrow, ObjectStatus::Eligible);
    let stranger = ObjectId::new();

    assert_eq!(
        escrow.mark_executed(&stranger).unwrap_err(),
        EscrowError::NotFound { id: stranger.clone() }
    );
    assert!(escrow.get(&stranger).is_none());
    assert_eq!(escrow.len(), 1);
    assert_eq!(escrow.get(&known.id).unwrap().status, ObjectStatus::Eligible);
}

#[test]
fn transition_table_matches_status_helpers() {
    for from in ObjectStatus::ALL {
        for to in ObjectStatus::ALL {
            let expected = matches!(
                (from, to),
                (ObjectStatus::PendingPolicy, ObjectStatus::Eligible)
                    | (ObjectStatus::Eligible, ObjectStatus::Executed)
                    | (ObjectStatus::Eligible, ObjectStatus::Rejected)
            );
            assert_eq!(from.can_transition_to(to), expected, "{from} -> {to}");
        }
        assert_eq!(
            from.is_terminal(),
            matches!(from, ObjectStatus::Executed | ObjectStatus::Rejected)
        );
    }
}

#[test]
fn error_messages_name_the_object() {
    let escrow = escrow();
    let object = object_in(&escrow, ObjectStatus::PendingPolicy);
    let message = escrow.mark_executed(&object.id).unwrap_err().to_string();
    assert!(message.contains(&object.id.to_string()), "{message}");
    assert!(message.contains("pending_policy"), "{message}");
}
