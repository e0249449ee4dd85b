//! # Knowledge Object Lifecycle
//!
//! ```text
//! PendingPolicy ──▶ Eligible ──▶ Executed (terminal)
//!                      │
//!                      └──────▶ Rejected (terminal)
//! ```
//!
//! Objects admitted under a snapshot that already allows their capability
//! start at `Eligible`. Nothing leaves a terminal status.

use serde::{Deserialize, Serialize};

/// The lifecycle status of a knowledge object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    /// Admitted, but the capability is not (yet) allowed.
    PendingPolicy,
    /// Allowed to execute; waiting for a scheduler tick.
    Eligible,
    /// The executor reported success. Terminal.
    Executed,
    /// Rejected by the executor, by an executor failure, or by the caller. Terminal.
    Rejected,
}

impl ObjectStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [ObjectStatus; 4] = [
        Self::PendingPolicy,
        Self::Eligible,
        Self::Executed,
        Self::Rejected,
    ];

    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Rejected)
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    pub fn can_transition_to(&self, next: ObjectStatus) -> bool {
        matches!(
            (self, next),
            (Self::PendingPolicy, Self::Eligible)
                | (Self::Eligible, Self::Executed)
                | (Self::Eligible, Self::Rejected)
        )
    }

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPolicy => "pending_policy",
            Self::Eligible => "eligible",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown object status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!ObjectStatus::PendingPolicy.is_terminal());
        assert!(!ObjectStatus::Eligible.is_terminal());
        assert!(ObjectStatus::Executed.is_terminal());
        assert!(ObjectStatus::Rejected.is_terminal());
    }

    #[test]
    fn transition_table_is_exactly_the_lifecycle() {
        let legal = [
            (ObjectStatus::PendingPolicy, ObjectStatus::Eligible),
            (ObjectStatus::Eligible, ObjectStatus::Executed),
            (ObjectStatus::Eligible, ObjectStatus::Rejected),
        ];
        for from in ObjectStatus::ALL {
            for to in ObjectStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        for from in ObjectStatus::ALL.into_iter().filter(ObjectStatus::is_terminal) {
            assert!(ObjectStatus::ALL.iter().all(|to| !from.can_transition_to(*to)));
        }
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ObjectStatus::PendingPolicy).unwrap();
        assert_eq!(json, "\"pending_policy\"");
    }

    #[test]
    fn parse_from_display_name() {
        for status in ObjectStatus::ALL {
            assert_eq!(status.to_string().parse::<ObjectStatus>().unwrap(), status);
        }
        assert!("done".parse::<ObjectStatus>().is_err());
    }
}
