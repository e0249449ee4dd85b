//! # Gates
//!
//! A [`Gate`] is a pure decision function: given a [`GateContext`] it returns
//! a [`GateDecision`] (allowed or not, plus the reasons). Threshold checks
//! that would otherwise be duplicated per domain (risk scores, duty-cycle
//! envelopes, deny lists) are expressed as gates and injected into the
//! escrow, which consults its gate alongside the capability check when it
//! admits or reconciles an object.
//!
//! Gates must be deterministic for a given context: reconciliation relies on
//! re-evaluating the same object yielding the same answer until the snapshot
//! changes.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// What a gate gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    /// Object kind.
    pub kind: &'a str,
    /// Capability key the object depends on.
    pub capability_key: &'a str,
    /// Opaque object payload.
    pub payload: &'a serde_json::Value,
    /// Snapshot version the decision is made under.
    pub policy_version: &'a str,
}

/// A gate verdict with its reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Whether the gate allows the object.
    pub allowed: bool,
    /// Human-readable reasons (may be empty on allow).
    pub reasons: Vec<String>,
}

impl GateDecision {
    /// An allow decision with no reasons.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reasons: Vec::new(),
        }
    }

    /// A deny decision with one reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reasons: vec![reason.into()],
        }
    }

    /// Reasons joined with `"; "`.
    pub fn joined_reasons(&self) -> String {
        self.reasons.join("; ")
    }
}

/// A pure `(context) -> (decision, reasons)` function.
pub trait Gate: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Decide.
    fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision;
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Gate for AllowAll {
    fn name(&self) -> &str {
        "allow_all"
    }

    fn evaluate(&self, _ctx: &GateContext<'_>) -> GateDecision {
        GateDecision::allow()
    }
}

/// Denies objects whose kind is on a fixed list.
#[derive(Debug, Clone, Default)]
pub struct KindDenyList {
    kinds: BTreeSet<String>,
}

impl KindDenyList {
    /// Build from any iterator of kinds.
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }
}

impl Gate for KindDenyList {
    fn name(&self) -> &str {
        "kind_deny_list"
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        if self.kinds.contains(ctx.kind) {
            GateDecision::deny(format!("kind \"{}\" is on the deny list", ctx.kind))
        } else {
            GateDecision::allow()
        }
    }
}

/// Conjunction of gates. Every gate is evaluated so the reasons are complete.
#[derive(Clone, Default)]
pub struct AllOf {
    gates: Vec<Arc<dyn Gate>>,
}

impl AllOf {
    /// Create an empty conjunction (allows everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a gate.
    pub fn with(mut self, gate: Arc<dyn Gate>) -> Self {
        self.gates.push(gate);
        self
    }
}

impl std::fmt::Debug for AllOf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.gates.iter().map(|g| g.name()).collect();
        f.debug_struct("AllOf").field("gates", &names).finish()
    }
}

impl Gate for AllOf {
    fn name(&self) -> &str {
        "all_of"
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let mut decision = GateDecision::allow();
        for gate in &self.gates {
            let inner = gate.evaluate(ctx);
            decision.allowed &= inner.allowed;
            decision
                .reasons
                .extend(inner.reasons.into_iter().map(|r| format!("{}: {r}", gate.name())));
        }
        decision
    }
}
