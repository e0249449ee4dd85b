//! # Executor Contract
//!
//! The scheduler hands each eligible [`KnowledgeObject`] to an injected
//! [`Executor`] and maps the result onto a terminal status:
//!
//! | Result                              | Status   | Reason                            |
//! |-------------------------------------|----------|-----------------------------------|
//! | `Ok(ExecutorVerdict::Executed)`     | Executed | `"execution completed"`           |
//! | `Ok(_)` (any other verdict)         | Rejected | `"executor reported rejection"`   |
//! | `Err(Failed)` / `Err(Panicked)`     | Rejected | `"executor threw: <detail>"`      |
//! | `Err(TimedOut)`                     | Rejected | `"executor timed out after <n>ms"`|
//!
//! Executors may suspend arbitrarily long. They should be idempotent or
//! tolerate at-most-once invocation per object; the scheduler never retries.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use async_trait::async_trait;
use koe_escrow::KnowledgeObject;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// ExecutorVerdict
// =============================================================================

/// What an executor decided about one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ExecutorVerdict {
    /// The work was carried out.
    Executed,
    /// The executor declined the work.
    Rejected,
    /// Any other label. Treated as a rejection.
    Unrecognized(String),
}

impl ExecutorVerdict {
    /// Whether this verdict finalizes the object as `Executed`.
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed)
    }

    /// Wire label.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Executed => "executed",
            Self::Rejected => "rejected",
            Self::Unrecognized(label) => label,
        }
    }
}

impl fmt::Display for ExecutorVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ExecutorVerdict {
    fn from(label: &str) -> Self {
        match label {
            "executed" => Self::Executed,
            "rejected" => Self::Rejected,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for ExecutorVerdict {
    fn from(label: String) -> Self {
        match label.as_str() {
            "executed" => Self::Executed,
            "rejected" => Self::Rejected,
            _ => Self::Unrecognized(label),
        }
    }
}

impl From<ExecutorVerdict> for String {
    fn from(verdict: ExecutorVerdict) -> Self {
        match verdict {
            ExecutorVerdict::Unrecognized(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl FromStr for ExecutorVerdict {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

// =============================================================================
// ExecutorError
// =============================================================================

/// Executor failures. All of them are absorbed by the scheduler and turned
/// into a `Rejected` status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The executor returned an error.
    #[error("{message}")]
    Failed {
        /// Executor-supplied description.
        message: String,
    },

    /// The executor task panicked.
    #[error("executor panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The executor exceeded the per-item timeout.
    #[error("executor timed out after {after_ms}ms")]
    TimedOut {
        /// Configured timeout in milliseconds.
        after_ms: u64,
    },
}

impl ExecutorError {
    /// Convenience constructor for [`ExecutorError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Status reason recorded on the rejected object.
    pub fn rejection_reason(&self) -> String {
        match self {
            Self::TimedOut { .. } => self.to_string(),
            Self::Failed { .. } | Self::Panicked { .. } => format!("executor threw: {self}"),
        }
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Injected execution capability.
///
/// # Example
///
/// ```ignore
/// struct Echo;
///
/// #[async_trait]
/// impl Executor for Echo {
///     async fn execute(&self, object: KnowledgeObject) -> Result<ExecutorVerdict, ExecutorError> {
///         println!("{}", object.payload);
///         Ok(ExecutorVerdict::Executed)
///     }
/// }
/// ```
#[async_trait]
pub trait Executor: Send + Sync {
    /// Carry out (or decline) the work described by `object`.
    ///
    /// `object` is a copy; mutating it has no effect on the escrow.
    async fn execute(&self, object: KnowledgeObject) -> Result<ExecutorVerdict, ExecutorError>;
}

type BoxedVerdict = Pin<Box<dyn Future<Output = Result<ExecutorVerdict, ExecutorError>> + Send>>;

/// Adapts an async closure into an [`Executor`].
pub struct FnExecutor<F> {
    f: F,
}

impl<F, Fut> FnExecutor<F>
where
    F: Fn(KnowledgeObject) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ExecutorVerdict, ExecutorError>> + Send + 'static,
{
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Executor for FnExecutor<F>
where
    F: Fn(KnowledgeObject) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ExecutorVerdict, ExecutorError>> + Send + 'static,
{
    async fn execute(&self, object: KnowledgeObject) -> Result<ExecutorVerdict, ExecutorError> {
        let fut: BoxedVerdict = Box::pin((self.f)(object));
        fut.await
    }
}

impl<F> fmt::Debug for FnExecutor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExecutor").finish_non_exhaustive()
    }
}
