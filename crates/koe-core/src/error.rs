//! # Error Hierarchy
//!
//! Structured error types for the escrow workspace, built with `thiserror`.
//! No `Box<dyn Error>`, no `.unwrap()` outside tests.
//!
//! Validation errors fail fast and commit no partial state. Escrow errors
//! carry the object id and, where relevant, the status the object was in,
//! so that callers can tell id drift apart from a lifecycle violation.

use thiserror::Error;

use crate::identity::ObjectId;
use crate::status::ObjectStatus;

/// Input validation failures.
///
/// Raised synchronously by the snapshot store constructor, `update_snapshot`,
/// the escrow's `create`, and configuration constructors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Snapshot version label is empty or whitespace.
    #[error("snapshot version must be a non-empty string")]
    EmptyVersion,

    /// A capability key in the snapshot map is empty.
    #[error("capability keys must be non-empty strings")]
    EmptyCapabilityKey,

    /// A capability value is not a boolean.
    #[error("capability \"{key}\" must map to a boolean")]
    NonBooleanCapability {
        /// The offending capability key.
        key: String,
    },

    /// The snapshot input does not have the `{version, capabilities}` shape.
    #[error("malformed snapshot input: {0}")]
    MalformedSnapshot(String),

    /// Knowledge object kind is empty.
    #[error("knowledge object kind must be a non-empty string")]
    EmptyKind,

    /// Knowledge object capability key is empty.
    #[error("knowledge object capability key must be a non-empty string")]
    EmptyObjectCapabilityKey,

    /// A configuration value is out of range.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig {
        /// The configuration field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Errors from escrow lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// Malformed `create()` arguments.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No object with this id exists in the escrow.
    #[error("knowledge object {id} not found")]
    NotFound {
        /// The unknown id.
        id: ObjectId,
    },

    /// The object already reached a terminal status.
    #[error("knowledge object {id} is in terminal status {status}")]
    AlreadyTerminal {
        /// The object id.
        id: ObjectId,
        /// The terminal status it holds.
        status: ObjectStatus,
    },

    /// The requested transition is not in the lifecycle table.
    #[error("invalid transition for knowledge object {id}: {from} -> {to}")]
    InvalidTransition {
        /// The object id.
        id: ObjectId,
        /// The current status.
        from: ObjectStatus,
        /// The requested status.
        to: ObjectStatus,
    },

    /// A freshly generated id collided with an existing object.
    #[error("knowledge object id {id} is already in use")]
    DuplicateId {
        /// The colliding id.
        id: ObjectId,
    },
}
