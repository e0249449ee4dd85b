//! # Policy Snapshots
//!
//! A snapshot is an immutable, versioned map from capability key to
//! allowed/denied. Absent keys are denied.
//!
//! Input arrives either typed ([`SnapshotInput::new`]) or as loosely-typed
//! JSON from a transport bridge ([`SnapshotInput::from_json`]); both paths
//! end in [`SnapshotInput::validate`].

use std::collections::BTreeMap;

use koe_core::{Timestamp, ValidationError};
use serde::{Deserialize, Serialize};

/// The `{version, capabilities}` shape accepted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInput {
    /// Opaque, non-empty version label.
    pub version: String,
    /// Capability key → allowed.
    pub capabilities: BTreeMap<String, bool>,
}

impl SnapshotInput {
    /// Build typed input.
    pub fn new<I, K>(version: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        Self {
            version: version.into(),
            capabilities: capabilities
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        }
    }

    /// Parse and validate loosely-typed JSON input.
    ///
    /// # Errors
    ///
    /// - `MalformedSnapshot` if the value is not an object, `version` is not
    ///   a string, or `capabilities` is missing or not an object.
    /// - `NonBooleanCapability` if any capability value is not a boolean.
    /// - Anything [`SnapshotInput::validate`] rejects.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let input = Self::deserialize(value).map_err(|e| {
            diagnose(value).unwrap_or_else(|| ValidationError::MalformedSnapshot(e.to_string()))
        })?;
        input.validate()?;
        Ok(input)
    }

    /// Check the version label and capability keys.
    ///
    /// # Errors
    ///
    /// `EmptyVersion` for an empty or whitespace-only version;
    /// `EmptyCapabilityKey` for an empty capability key.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.trim().is_empty() {
            return Err(ValidationError::EmptyVersion);
        }
        if self.capabilities.keys().any(String::is_empty) {
            return Err(ValidationError::EmptyCapabilityKey);
        }
        Ok(())
    }
}

/// Missing version or a non-boolean capability, if that is what broke
/// deserialization.
fn diagnose(value: &serde_json::Value) -> Option<ValidationError> {
    let obj = value.as_object()?;
    if !obj.contains_key("version") {
        return Some(ValidationError::EmptyVersion);
    }
    obj.get("capabilities")?
        .as_object()?
        .iter()
        .find(|(_, allowed)| !allowed.is_boolean())
        .map(|(key, _)| ValidationError::NonBooleanCapability { key: key.clone() })
}

/// A snapshot as stored and handed out by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Version label.
    pub version: String,
    /// Capability key → allowed.
    pub capabilities: BTreeMap<String, bool>,
    /// When this snapshot was applied.
    pub updated_at: Timestamp,
    /// 1-based application order; monotonic across evictions.
    pub sequence: u64,
}

impl PolicySnapshot {
    pub(crate) fn from_input(input: SnapshotInput, sequence: u64) -> Self {
        Self {
            version: input.version,
            capabilities: input.capabilities,
            updated_at: Timestamp::now(),
            sequence,
        }
    }

    /// Whether `key` is allowed. Absent keys are denied.
    pub fn is_allowed(&self, key: &str) -> bool {
        self.capabilities.get(key).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_input_collects_capabilities() {
        let input = SnapshotInput::new("v1", [("chat", true), ("tool", false)]);
        assert_eq!(input.capabilities.len(), 2);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn empty_capability_map_is_valid() {
        let input = SnapshotInput::new("v1", Vec::<(String, bool)>::new());
        assert!(input.validate().is_ok());
    }

    #[test]
    fn blank_version_is_rejected() {
        for version in ["", "   "] {
            let input = SnapshotInput::new(version, [("chat", true)]);
            assert_eq!(input.validate(), Err(ValidationError::EmptyVersion));
        }
    }

    #[test]
    fn empty_capability_key_is_rejected() {
        let input = SnapshotInput::new("v1", [("", true)]);
        assert_eq!(input.validate(), Err(ValidationError::EmptyCapabilityKey));
    }

    #[test]
    fn from_json_accepts_well_formed_input() {
        let input = SnapshotInput::from_json(&json!({
            "version": "v2",
            "capabilities": {"tool": true, "chat": false}
        }))
        .unwrap();
        assert_eq!(input.version, "v2");
        assert_eq!(input.capabilities.get("tool"), Some(&true));
    }

    #[test]
    fn from_json_rejects_wrong_shapes() {
        let cases = [
            json!([]),
            json!({"version": 3, "capabilities": {}}),
            json!({"version": "v1"}),
            json!({"version": "v1", "capabilities": ["chat"]}),
        ];
        for case in &cases {
            assert!(
                matches!(
                    SnapshotInput::from_json(case),
                    Err(ValidationError::MalformedSnapshot(_))
                ),
                "expected MalformedSnapshot for {case}"
            );
        }
    }

    #[test]
    fn from_json_missing_version_is_empty_version() {
        let err = SnapshotInput::from_json(&json!({"capabilities": {}})).unwrap_err();
        assert_eq!(err, ValidationError::EmptyVersion);
    }

    #[test]
    fn from_json_rejects_non_boolean_capability() {
        let err = SnapshotInput::from_json(&json!({
            "version": "v1",
            "capabilities": {"chat": "yes"}
        }))
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonBooleanCapability { key: "chat".into() }
        );
    }

    #[test]
    fn from_json_malformed_carries_serde_detail() {
        let err = SnapshotInput::from_json(&json!({"version": 3, "capabilities": {}})).unwrap_err();
        match err {
            ValidationError::MalformedSnapshot(detail) => {
                assert!(detail.contains("invalid type"), "{detail}")
            }
            other => panic!("expected MalformedSnapshot, got {other:?}"),
        }
    }

    #[test]
    fn from_json_names_the_first_non_boolean_key() {
        let err = SnapshotInput::from_json(&json!({
            "version": "v1",
            "capabilities": {"a": true, "b": null, "c": 1}
        }))
        .unwrap_err();
        assert_eq!(err, ValidationError::NonBooleanCapability { key: "b".into() });
    }

    #[test]
    fn absent_key_is_denied() {
        let snapshot = PolicySnapshot::from_input(SnapshotInput::new("v1", [("chat", true)]), 1);
        assert!(snapshot.is_allowed("chat"));
        assert!(!snapshot.is_allowed("tool"));
    }
}
