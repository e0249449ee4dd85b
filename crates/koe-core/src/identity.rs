//! # Knowledge Object Identifiers
//!
//! Ids are random UUIDv4 values wrapped in a newtype so an object id can
//! never be confused with a capability key or a policy version label.
//! Uniqueness for the lifetime of the process is enforced by the escrow at
//! admission time; a collision is reported as an error, never accepted.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a knowledge object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generate a new random object identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ko:{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = uuid::Error;

    /// Accepts both the bare UUID and the `ko:`-prefixed display form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("ko:").unwrap_or(s);
        Uuid::parse_str(raw).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_distinct() {
        assert_ne!(ObjectId::new(), ObjectId::new());
    }

    #[test]
    fn display_then_parse_recovers_id() {
        let id = ObjectId::new();
        let parsed: ObjectId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_accepts_bare_uuid() {
        let uuid = Uuid::new_v4();
        let parsed: ObjectId = uuid.to_string().parse().unwrap();
        assert_eq!(parsed.as_uuid(), &uuid);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("ko:not-a-uuid".parse::<ObjectId>().is_err());
    }
}
