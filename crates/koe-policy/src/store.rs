//! # Policy Snapshot Store
//!
//! Owns the current [`PolicySnapshot`] and its history.
//!
//! ## Invariants
//!
//! - `update_snapshot` replaces the capability map wholesale. There is no
//!   merge with the previous map, and no rollback or remove operation.
//! - Every applied snapshot (including the initial one) is appended to the
//!   history, in application order, and is never mutated afterwards.
//! - History is bounded by [`SnapshotStoreConfig::max_history`]. On overflow
//!   the oldest 10% (at least one) are evicted; `sequence` numbers keep
//!   counting, so a gap at the front of the history marks the eviction.
//! - All reads return owned copies.
//!
//! ## Thread Safety
//!
//! State lives behind a single `parking_lot::RwLock`. Updates hold the write
//! lock for the whole replace-and-append, so a concurrent reader (e.g. the
//! escrow's reconciliation pass) only ever sees a fully applied snapshot.

use std::collections::VecDeque;
use std::sync::Arc;

use koe_core::{EscrowEvent, EscrowObserver, TracingObserver, ValidationError};
use parking_lot::RwLock;

use crate::snapshot::{PolicySnapshot, SnapshotInput};

/// Default number of snapshots kept in history.
pub const DEFAULT_MAX_HISTORY: usize = 1024;

// ---------------------------------------------------------------------------
// SnapshotStoreConfig
// ---------------------------------------------------------------------------

/// Snapshot store tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotStoreConfig {
    /// Maximum number of snapshots retained in history (≥ 1).
    pub max_history: usize,
}

impl SnapshotStoreConfig {
    /// Create a validated configuration.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `max_history` is zero.
    pub fn new(max_history: usize) -> Result<Self, ValidationError> {
        if max_history == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "max_history",
                reason: "must be at least 1".into(),
            });
        }
        Ok(Self { max_history })
    }

    /// Load from the environment.
    ///
    /// Variables:
    /// - `KOE_MAX_SNAPSHOT_HISTORY` (default: 1024)
    pub fn from_env() -> Result<Self, ValidationError> {
        match std::env::var("KOE_MAX_SNAPSHOT_HISTORY") {
            Ok(raw) => {
                let max_history = raw.trim().parse::<usize>().map_err(|e| {
                    ValidationError::InvalidConfig {
                        field: "max_history",
                        reason: format!("KOE_MAX_SNAPSHOT_HISTORY={raw:?}: {e}"),
                    }
                })?;
                Self::new(max_history)
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

impl Default for SnapshotStoreConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

// ---------------------------------------------------------------------------
// PolicySnapshotStore
// ---------------------------------------------------------------------------

/// A capability decision paired with the snapshot version that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityCheck {
    /// Whether the capability is allowed.
    pub allowed: bool,
    /// Version of the snapshot consulted.
    pub version: String,
}

struct StoreState {
    current: PolicySnapshot,
    history: VecDeque<PolicySnapshot>,
    last_sequence: u64,
}

/// The policy snapshot store.
pub struct PolicySnapshotStore {
    state: RwLock<StoreState>,
    config: SnapshotStoreConfig,
    observer: Arc<dyn EscrowObserver>,
}

impl PolicySnapshotStore {
    /// Create a store from an initial snapshot.
    ///
    /// # Errors
    ///
    /// Any [`ValidationError`] from [`SnapshotInput::validate`].
    pub fn new(initial: SnapshotInput) -> Result<Self, ValidationError> {
        initial.validate()?;
        let current = PolicySnapshot::from_input(initial, 1);
        let mut history = VecDeque::new();
        history.push_back(current.clone());
        Ok(Self {
            state: RwLock::new(StoreState {
                current,
                history,
                last_sequence: 1,
            }),
            config: SnapshotStoreConfig::default(),
            observer: Arc::new(TracingObserver),
        })
    }

    /// Create a store from loosely-typed JSON input.
    pub fn from_json(initial: &serde_json::Value) -> Result<Self, ValidationError> {
        Self::new(SnapshotInput::from_json(initial)?)
    }

    /// Builder: set the history bound.
    pub fn with_config(mut self, config: SnapshotStoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder: set the observer that receives `SnapshotUpdated` events.
    pub fn with_observer(mut self, observer: Arc<dyn EscrowObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the current snapshot and append it to history.
    ///
    /// # Errors
    ///
    /// Any [`ValidationError`] from [`SnapshotInput::validate`]; nothing is
    /// applied on error.
    pub fn update_snapshot(&self, next: SnapshotInput) -> Result<PolicySnapshot, ValidationError> {
        next.validate()?;

        let mut state = self.state.write();
        let sequence = state.last_sequence + 1;
        let snapshot = PolicySnapshot::from_input(next, sequence);

        state.last_sequence = sequence;
        state.current = snapshot.clone();
        state.history.push_back(snapshot.clone());
        if state.history.len() > self.config.max_history {
            let evict = (self.config.max_history / 10).max(1);
            state.history.drain(..evict);
            tracing::debug!(
                evicted = evict,
                retained = state.history.len(),
                "snapshot history trimmed"
            );
        }

        self.observer.observe(&EscrowEvent::SnapshotUpdated {
            version: snapshot.version.clone(),
            sequence,
            capability_count: snapshot.capabilities.len(),
        });

        Ok(snapshot)
    }

    /// Update from loosely-typed JSON input.
    pub fn update_snapshot_json(
        &self,
        next: &serde_json::Value,
    ) -> Result<PolicySnapshot, ValidationError> {
        self.update_snapshot(SnapshotInput::from_json(next)?)
    }

    /// Whether `key` is allowed by the current snapshot. Absent keys are denied.
    pub fn is_capability_allowed(&self, key: &str) -> bool {
        self.state.read().current.is_allowed(key)
    }

    /// Check `key` and read the version under one lock, so the decision and
    /// the version it was made under always belong to the same snapshot.
    pub fn check(&self, key: &str) -> CapabilityCheck {
        let state = self.state.read();
        CapabilityCheck {
            allowed: state.current.is_allowed(key),
            version: state.current.version.clone(),
        }
    }

    /// Current version label.
    pub fn version(&self) -> String {
        self.state.read().current.version.clone()
    }

    /// Copy of the current snapshot.
    pub fn get_snapshot(&self) -> PolicySnapshot {
        self.state.read().current.clone()
    }

    /// Copies of the retained history, oldest first.
    pub fn get_history(&self) -> Vec<PolicySnapshot> {
        self.state.read().history.iter().cloned().collect()
    }

    /// Number of retained history entries.
    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }

    /// Configured history bound.
    pub fn config(&self) -> SnapshotStoreConfig {
        self.config
    }
}

impl std::fmt::Debug for PolicySnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("PolicySnapshotStore")
            .field("version", &state.current.version)
            .field("sequence", &state.last_sequence)
            .field("history", &state.history.len())
            .field("max_history", &self.config.max_history)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koe_core::NoopObserver;
    use serde_json::json;

    fn store(version: &str, caps: &[(&str, bool)]) -> PolicySnapshotStore {
        PolicySnapshotStore::new(SnapshotInput::new(version, caps.iter().copied()))
            .unwrap()
            .with_observer(Arc::new(NoopObserver))
    }

    #[test]
    fn construction_rejects_empty_version() {
        let err = PolicySnapshotStore::new(SnapshotInput::new("", [("chat", true)])).unwrap_err();
        assert_eq!(err, ValidationError::EmptyVersion);
    }

    #[test]
    fn construction_from_json_validates_shape() {
        assert!(PolicySnapshotStore::from_json(&json!({"version": "v1", "capabilities": {}})).is_ok());
        assert!(PolicySnapshotStore::from_json(&json!({"version": "v1"})).is_err());
    }

    #[test]
    fn initial_snapshot_is_first_history_entry() {
        let s = store("v1", &[("chat", true)]);
        let history = s.get_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, "v1");
        assert_eq!(history[0].sequence, 1);
    }

    #[test]
    fn absent_capability_is_denied() {
        let s = store("v1", &[("chat", true), ("tool", false)]);
        assert!(s.is_capability_allowed("chat"));
        assert!(!s.is_capability_allowed("tool"));
        assert!(!s.is_capability_allowed("never-configured"));
    }

    #[test]
    fn check_pairs_decision_with_version() {
        let s = store("v1", &[("chat", true)]);
        assert_eq!(
            s.check("chat"),
            CapabilityCheck {
                allowed: true,
                version: "v1".into()
            }
        );
        s.update_snapshot(SnapshotInput::new("v2", [("chat", false)])).unwrap();
        let check = s.check("chat");
        assert!(!check.allowed);
        assert_eq!(check.version, "v2");
    }

    #[test]
    fn update_replaces_without_merging() {
        let s = store("v1", &[("chat", true), ("tool", false)]);
        s.update_snapshot(SnapshotInput::new("v2", [("tool", true)])).unwrap();

        assert_eq!(s.version(), "v2");
        assert!(s.is_capability_allowed("tool"));
        // "chat" was only in v1; wholesale replacement drops it.
        assert!(!s.is_capability_allowed("chat"));
        assert_eq!(s.get_snapshot().capabilities.len(), 1);
    }

    #[test]
    fn invalid_update_leaves_state_untouched() {
        let s = store("v1", &[("chat", true)]);
        assert!(s.update_snapshot(SnapshotInput::new(" ", [("chat", false)])).is_err());
        assert!(s
            .update_snapshot_json(&json!({"version": "v2", "capabilities": {"chat": 1}}))
            .is_err());
        assert_eq!(s.version(), "v1");
        assert!(s.is_capability_allowed("chat"));
        assert_eq!(s.history_len(), 1);
    }

    #[test]
    fn history_is_ordered_and_immutable() {
        let s = store("v1", &[]);
        s.update_snapshot(SnapshotInput::new("v2", [("a", true)])).unwrap();
        s.update_snapshot(SnapshotInput::new("v3", [("a", false)])).unwrap();

        let history = s.get_history();
        let versions: Vec<&str> = history.iter().map(|h| h.version.as_str()).collect();
        assert_eq!(versions, ["v1", "v2", "v3"]);
        let sequences: Vec<u64> = history.iter().map(|h| h.sequence).collect();
        assert_eq!(sequences, [1, 2, 3]);
        // v2's entry still records its own map, not v3's.
        assert_eq!(history[1].capabilities.get("a"), Some(&true));
    }

    #[test]
    fn snapshot_copies_are_not_aliased() {
        let s = store("v1", &[("chat", true)]);
        let mut copy = s.get_snapshot();
        assert_eq!(copy, s.get_snapshot());

        copy.capabilities.insert("chat".into(), false);
        copy.version = "tampered".into();
        assert!(s.is_capability_allowed("chat"));
        assert_eq!(s.version(), "v1");

        let mut history = s.get_history();
        history.clear();
        assert_eq!(s.history_len(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let s = store("v0", &[]).with_config(SnapshotStoreConfig::new(10).unwrap());
        for i in 1..=25 {
            s.update_snapshot(SnapshotInput::new(format!("v{i}"), [("a", i % 2 == 0)]))
                .unwrap();
        }
        let history = s.get_history();
        assert!(history.len() <= 10);
        assert_eq!(history.last().unwrap().version, "v25");
        assert_eq!(history.last().unwrap().sequence, 26);
        assert!(history.windows(2).all(|w| w[0].sequence + 1 == w[1].sequence));
    }

    #[test]
    fn config_rejects_zero_history() {
        assert!(SnapshotStoreConfig::new(0).is_err());
        assert_eq!(SnapshotStoreConfig::default().max_history, DEFAULT_MAX_HISTORY);
    }

    #[test]
    fn update_reports_to_observer() {
        let trail = Arc::new(koe_core::AuditTrail::new(16));
        let s = store("v1", &[]).with_observer(trail.clone());
        s.update_snapshot(SnapshotInput::new("v2", [("chat", true)])).unwrap();

        let entries = trail.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].event,
            EscrowEvent::SnapshotUpdated {
                version: "v2".into(),
                sequence: 2,
                capability_count: 1,
            }
        );
    }
}
