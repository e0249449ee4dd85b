//! # Scenario Files
//!
//! A scenario drives one in-process escrow from an initial snapshot through
//! an ordered list of steps, with a scripted executor standing in for real
//! work.
//!
//! ```yaml
//! snapshot:
//!   version: v1
//!   capabilities: { chat: true, tool: false }
//! scheduler:            # optional, overrides KOE_* environment settings
//!   max_exec_per_tick: 2
//!   executor_timeout_ms: 500
//!   tick_interval_ms: 10  # pace of the `periodic` step
//! executor:
//!   default: executed   # executed | rejected | fail | hang | any label
//!   kinds: { tool-call: fail }
//! deny_kinds: [shell]   # optional kind deny-list gate
//! objects:
//!   - { name: greet, kind: chat-request, capability_key: chat, payload: {} }
//!   - { name: lookup, kind: tool-call, capability_key: tool }
//! steps:
//!   - tick
//!   - update_snapshot: { version: v2, capabilities: { chat: true, tool: true } }
//!   - reconcile
//!   - drain
//!   - create: { kind: chat-request, capability_key: chat }
//!   - periodic            # background runner until nothing is eligible
//! ```
//!
//! Files ending in `.json` are read as JSON; everything else as YAML.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use koe_escrow::KnowledgeObject;
use koe_policy::SnapshotInput;
use koe_scheduler::{ConfigError, Executor, ExecutorError, ExecutorVerdict, SchedulerConfig};
use serde::{Deserialize, Serialize};

/// Scripted label that fails the executor call.
pub const VERDICT_FAIL: &str = "fail";
/// Scripted label that never completes; only the per-item timeout ends it.
pub const VERDICT_HANG: &str = "hang";

// ---------------------------------------------------------------------------
// File model
// ---------------------------------------------------------------------------

/// A parsed scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Initial `{version, capabilities}` snapshot.
    pub snapshot: serde_json::Value,
    /// Scheduler overrides.
    #[serde(default)]
    pub scheduler: Option<SchedulerSection>,
    /// Snapshot history bound.
    #[serde(default)]
    pub max_snapshot_history: Option<usize>,
    /// Per-kind executor verdicts.
    #[serde(default)]
    pub executor: ExecutorScript,
    /// Kinds held back by a deny-list gate.
    #[serde(default)]
    pub deny_kinds: Vec<String>,
    /// Objects admitted before the first step.
    #[serde(default)]
    pub objects: Vec<ObjectSpec>,
    /// Ordered steps.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Scheduler overrides in a scenario file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    /// Batch size per tick.
    pub max_exec_per_tick: Option<usize>,
    /// Per-item timeout in milliseconds; `0` disables it.
    pub executor_timeout_ms: Option<u64>,
    /// Periodic tick interval in milliseconds.
    pub tick_interval_ms: Option<u64>,
}

impl SchedulerSection {
    /// Apply the overrides on top of `base` and validate the result.
    pub fn apply(&self, base: SchedulerConfig) -> Result<SchedulerConfig, ConfigError> {
        let mut config = base;
        if let Some(max) = self.max_exec_per_tick {
            config = config.with_max_exec_per_tick(max);
        }
        if let Some(ms) = self.executor_timeout_ms {
            config = config.with_executor_timeout((ms > 0).then(|| Duration::from_millis(ms)));
        }
        if let Some(ms) = self.tick_interval_ms {
            config = config.with_tick_interval(Duration::from_millis(ms));
        }
        config.validate()?;
        Ok(config)
    }
}

/// Scripted executor behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorScript {
    /// Verdict for kinds not listed in `kinds`.
    #[serde(default = "default_verdict")]
    pub default: String,
    /// Verdict per object kind.
    #[serde(default)]
    pub kinds: BTreeMap<String, String>,
}

fn default_verdict() -> String {
    "executed".to_string()
}

impl Default for ExecutorScript {
    fn default() -> Self {
        Self {
            default: default_verdict(),
            kinds: BTreeMap::new(),
        }
    }
}

impl ExecutorScript {
    /// Label scripted for `kind`.
    pub fn verdict_for(&self, kind: &str) -> &str {
        self.kinds.get(kind).unwrap_or(&self.default)
    }

    fn uses(&self, label: &str) -> bool {
        self.default == label || self.kinds.values().any(|v| v == label)
    }
}

/// An object to admit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectSpec {
    /// Optional handle used in the summary.
    #[serde(default)]
    pub name: Option<String>,
    /// Object kind.
    pub kind: String,
    /// Capability the object depends on.
    pub capability_key: String,
    /// Opaque payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// One scenario step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Replace the policy snapshot.
    UpdateSnapshot(serde_json::Value),
    /// Promote pending objects against the current snapshot.
    Reconcile,
    /// Run one scheduler tick.
    Tick,
    /// Tick until the scheduler reports idle.
    Drain,
    /// Run the periodic runner until no object is eligible.
    Periodic,
    /// Admit one more object.
    Create(ObjectSpec),
}

impl Step {
    /// Step name as written in scenario files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateSnapshot(_) => "update_snapshot",
            Self::Reconcile => "reconcile",
            Self::Tick => "tick",
            Self::Drain => "drain",
            Self::Periodic => "periodic",
            Self::Create(_) => "create",
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl Scenario {
    /// Read and parse a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario file: {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
                .with_context(|| format!("failed to parse scenario JSON: {}", path.display()))
        } else {
            Self::from_yaml_str(&content)
                .with_context(|| format!("failed to parse scenario YAML: {}", path.display()))
        }
    }

    /// Parse scenario JSON.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse scenario YAML.
    ///
    /// The document goes through a JSON value first so that steps use the
    /// same single-key-map shape in both formats.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_yaml::from_str(content)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Scheduler configuration: `base` with this file's overrides applied.
    pub fn scheduler_config(&self, base: SchedulerConfig) -> Result<SchedulerConfig, ConfigError> {
        match &self.scheduler {
            Some(section) => section.apply(base),
            None => Ok(base),
        }
    }

    /// Every problem found, in file order, with the scheduler overrides
    /// applied on top of the `KOE_*` environment. Empty means the scenario is
    /// runnable.
    pub fn validate(&self) -> Vec<String> {
        match SchedulerConfig::from_env() {
            Ok(base) => self.validate_against(base),
            Err(e) => {
                let mut problems = vec![format!("environment: {e}")];
                problems.extend(self.validate_against(SchedulerConfig::default()));
                problems
            }
        }
    }

    /// Like [`Scenario::validate`], with the overrides applied on top of `base`.
    pub fn validate_against(&self, base: SchedulerConfig) -> Vec<String> {
        let mut problems = Vec::new();

        if let Err(e) = SnapshotInput::from_json(&self.snapshot) {
            problems.push(format!("snapshot: {e}"));
        }

        let config = match self.scheduler_config(base) {
            Ok(config) => Some(config),
            Err(e) => {
                problems.push(format!("scheduler: {e}"));
                None
            }
        };
        if self.max_snapshot_history == Some(0) {
            problems.push("max_snapshot_history: must be at least 1".to_string());
        }
        if self.executor.uses(VERDICT_HANG)
            && config.is_some_and(|c| c.executor_timeout.is_none())
        {
            problems.push(format!(
                "executor: \"{VERDICT_HANG}\" requires an executor timeout"
            ));
        }

        let mut names = HashSet::new();
        let mut check_object = |label: String, spec: &ObjectSpec, problems: &mut Vec<String>| {
            if spec.kind.trim().is_empty() {
                problems.push(format!("{label}: kind must not be empty"));
            }
            if spec.capability_key.trim().is_empty() {
                problems.push(format!("{label}: capability_key must not be empty"));
            }
            if let Some(name) = &spec.name {
                if !names.insert(name.clone()) {
                    problems.push(format!("{label}: duplicate object name \"{name}\""));
                }
            }
        };

        for (i, spec) in self.objects.iter().enumerate() {
            check_object(format!("objects[{i}]"), spec, &mut problems);
        }
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                Step::UpdateSnapshot(value) => {
                    if let Err(e) = SnapshotInput::from_json(value) {
                        problems.push(format!("steps[{i}] update_snapshot: {e}"));
                    }
                }
                Step::Create(spec) => check_object(format!("steps[{i}] create"), spec, &mut problems),
                Step::Reconcile | Step::Tick | Step::Drain | Step::Periodic => {}
            }
        }

        problems
    }
}

// ---------------------------------------------------------------------------
// Scripted executor
// ---------------------------------------------------------------------------

/// Executor that answers from an [`ExecutorScript`].
#[derive(Debug, Clone)]
pub struct ScriptedExecutor {
    script: ExecutorScript,
}

impl ScriptedExecutor {
    /// Wrap `script`.
    pub fn new(script: ExecutorScript) -> Self {
        Self { script }
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, object: KnowledgeObject) -> Result<ExecutorVerdict, ExecutorError> {
        match self.script.verdict_for(&object.kind) {
            VERDICT_FAIL => Err(ExecutorError::failed(format!(
                "scripted failure for kind {}",
                object.kind
            ))),
            VERDICT_HANG => std::future::pending().await,
            label => Ok(ExecutorVerdict::from(label)),
        }
    }
}
