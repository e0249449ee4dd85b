//! # Run Subcommand
//!
//! Executes a scenario against a fresh in-process escrow and prints a JSON
//! summary of every step and the final object statuses.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use koe_core::{
    AuditTrail, EscrowObserver, FanoutObserver, KindDenyList, ObjectId, ObjectStatus,
    TracingObserver,
};
use koe_escrow::{KnowledgeObjectEscrow, ReconcileReport};
use koe_policy::{PolicySnapshotStore, SnapshotStoreConfig};
use koe_scheduler::{spawn_periodic, DeferredExecutionScheduler, SchedulerConfig, TickOutcome};

use crate::scenario::{ObjectSpec, Scenario, ScriptedExecutor, Step};

/// Arguments for the `koe run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario file (YAML, or JSON with a `.json` extension).
    #[arg(value_name = "SCENARIO")]
    pub path: PathBuf,

    /// Record every lifecycle event and include entry digests in the summary.
    #[arg(long)]
    pub audit: bool,

    /// Emit compact JSON instead of pretty-printed.
    #[arg(long)]
    pub compact: bool,

    /// Write the summary to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Result of running a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSummary {
    /// Snapshot version after the last step.
    pub policy_version: String,
    /// Snapshots retained in history.
    pub snapshot_history: usize,
    /// Object count per status.
    pub counts: BTreeMap<ObjectStatus, usize>,
    /// Every admitted object, in admission order.
    pub objects: Vec<ObjectSummary>,
    /// What each step did.
    pub steps: Vec<StepRecord>,
    /// Audit trail digests, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditSummary>,
}

impl ScenarioSummary {
    /// Summary entry for the object named `name`.
    pub fn object(&self, name: &str) -> Option<&ObjectSummary> {
        self.objects.iter().find(|o| o.name.as_deref() == Some(name))
    }
}

/// Final state of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Name from the scenario file, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Object id.
    pub id: ObjectId,
    /// Object kind.
    pub kind: String,
    /// Final status.
    pub status: ObjectStatus,
    /// Final status reason.
    pub status_reason: String,
    /// Snapshot version at admission.
    pub policy_version_at_creation: String,
    /// Snapshot version at the terminal transition.
    pub policy_version_at_execution: Option<String>,
}

/// What one step did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepRecord {
    /// `update_snapshot`.
    UpdateSnapshot {
        /// New version.
        version: String,
        /// Application sequence.
        sequence: u64,
    },
    /// `reconcile`.
    Reconcile(ReconcileReport),
    /// `tick`.
    Tick {
        /// Tick result.
        outcome: TickOutcome,
    },
    /// `drain`.
    Drain {
        /// Ticks that processed a batch.
        ticks: usize,
        /// Objects handed to the executor.
        processed: usize,
    },
    /// `periodic`.
    Periodic {
        /// Ticks issued by the runner, including idle ones.
        ticks: u64,
    },
    /// `create`.
    Create {
        /// Name from the scenario file, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// New object id.
        id: ObjectId,
        /// Initial status.
        status: ObjectStatus,
    },
}

/// Audit digests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSummary {
    /// Retained entries.
    pub entries: usize,
    /// `kind:sha256:<hex>` per entry, oldest first.
    pub digests: Vec<String>,
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Execute the run subcommand.
///
/// Returns exit code: 0 on success, 1 if the scenario fails validation.
pub fn run_run(args: &RunArgs) -> Result<u8> {
    let scenario = Scenario::load(&args.path)?;
    let problems = scenario.validate();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("FAIL: {problem}");
        }
        return Ok(1);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let summary = runtime.block_on(execute(&scenario, args.audit))?;

    let rendered = if args.compact {
        serde_json::to_string(&summary)?
    } else {
        serde_json::to_string_pretty(&summary)?
    };
    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write summary: {}", path.display()))?;
            eprintln!("OK: wrote summary to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(0)
}

/// Run `scenario` to completion. Requires a Tokio runtime.
pub async fn execute(scenario: &Scenario, audit: bool) -> Result<ScenarioSummary> {
    let trail = Arc::new(AuditTrail::default());
    let observer: Arc<dyn EscrowObserver> = if audit {
        Arc::new(
            FanoutObserver::new()
                .with(Arc::new(TracingObserver))
                .with(trail.clone()),
        )
    } else {
        Arc::new(TracingObserver)
    };

    let store_config = match scenario.max_snapshot_history {
        Some(max) => SnapshotStoreConfig::new(max)?,
        None => SnapshotStoreConfig::from_env()?,
    };
    let store = Arc::new(
        PolicySnapshotStore::from_json(&scenario.snapshot)
            .context("invalid initial snapshot")?
            .with_config(store_config)
            .with_observer(Arc::clone(&observer)),
    );

    let mut escrow =
        KnowledgeObjectEscrow::new(Arc::clone(&store)).with_observer(Arc::clone(&observer));
    if !scenario.deny_kinds.is_empty() {
        escrow = escrow.with_gate(Arc::new(KindDenyList::new(scenario.deny_kinds.iter().cloned())));
    }
    let escrow = Arc::new(escrow);

    let config = scenario.scheduler_config(SchedulerConfig::from_env()?)?;
    let scheduler = Arc::new(
        DeferredExecutionScheduler::new(
            Arc::clone(&escrow),
            Arc::new(ScriptedExecutor::new(scenario.executor.clone())),
        )
        .with_config(config)
        .with_observer(Arc::clone(&observer)),
    );

    tracing::info!(
        objects = scenario.objects.len(),
        steps = scenario.steps.len(),
        policy_version = %store.version(),
        "running scenario"
    );

    let mut admitted: Vec<(Option<String>, ObjectId)> = Vec::new();
    for spec in &scenario.objects {
        admit(&escrow, spec, &mut admitted)?;
    }

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (i, step) in scenario.steps.iter().enumerate() {
        tracing::debug!(index = i, step = step.name(), "scenario step");
        let record = match step {
            Step::UpdateSnapshot(value) => {
                let snapshot = store
                    .update_snapshot_json(value)
                    .with_context(|| format!("steps[{i}] update_snapshot"))?;
                StepRecord::UpdateSnapshot {
                    version: snapshot.version,
                    sequence: snapshot.sequence,
                }
            }
            Step::Reconcile => StepRecord::Reconcile(escrow.reconcile_with_current_policy()),
            Step::Tick => StepRecord::Tick {
                outcome: scheduler.tick().await,
            },
            Step::Drain => {
                let (mut ticks, mut processed) = (0, 0);
                loop {
                    match scheduler.tick().await {
                        TickOutcome::Drained(report) => {
                            ticks += 1;
                            processed += report.processed.len();
                        }
                        TickOutcome::Idle => break,
                        TickOutcome::AlreadyRunning => bail!("steps[{i}] drain: scheduler busy"),
                    }
                }
                StepRecord::Drain { ticks, processed }
            }
            Step::Periodic => StepRecord::Periodic {
                ticks: run_periodic(&scheduler)
                    .await
                    .with_context(|| format!("steps[{i}] periodic"))?,
            },
            Step::Create(spec) => {
                let (id, status) = admit(&escrow, spec, &mut admitted)
                    .with_context(|| format!("steps[{i}] create"))?;
                StepRecord::Create {
                    name: spec.name.clone(),
                    id,
                    status,
                }
            }
        };
        steps.push(record);
    }

    let objects = admitted
        .into_iter()
        .filter_map(|(name, id)| {
            escrow.get(&id).map(|o| ObjectSummary {
                name,
                id: o.id,
                kind: o.kind,
                status: o.status,
                status_reason: o.status_reason,
                policy_version_at_creation: o.policy_version_at_creation,
                policy_version_at_execution: o.policy_version_at_execution,
            })
        })
        .collect();

    let audit = audit.then(|| AuditSummary {
        entries: trail.len(),
        digests: trail
            .entries()
            .iter()
            .filter_map(|e| e.digest().map(|d| format!("{}:{d}", e.kind.as_str())))
            .collect(),
    });

    Ok(ScenarioSummary {
        policy_version: store.version(),
        snapshot_history: store.history_len(),
        counts: escrow.status_counts().into_iter().collect(),
        objects,
        steps,
        audit,
    })
}

/// Let the periodic runner work until nothing is eligible, then stop it.
async fn run_periodic(scheduler: &Arc<DeferredExecutionScheduler>) -> Result<u64> {
    let poll = scheduler.config().tick_interval;
    let (shutdown, rx) = tokio::sync::watch::channel(false);
    let runner = spawn_periodic(Arc::clone(scheduler), rx);
    while !scheduler
        .escrow()
        .list_by_status(ObjectStatus::Eligible)
        .is_empty()
    {
        tokio::time::sleep(poll).await;
    }
    // The runner may already have exited; its tick count is still returned.
    let _ = shutdown.send(true);
    runner.await.context("periodic runner panicked")
}

fn admit(
    escrow: &KnowledgeObjectEscrow,
    spec: &ObjectSpec,
    admitted: &mut Vec<(Option<String>, ObjectId)>,
) -> Result<(ObjectId, ObjectStatus)> {
    let object = escrow.create(&spec.kind, &spec.capability_key, spec.payload.clone())?;
    admitted.push((spec.name.clone(), object.id.clone()));
    Ok((object.id, object.status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_object_runs_after_policy_update() {
        let scenario = Scenario::from_yaml_str(
            r#"
snapshot: { version: v1, capabilities: { tool: false } }
objects:
  - { name: lookup, kind: tool-call, capability_key: tool }
steps:
  - tick
  - update_snapshot: { version: v2, capabilities: { tool: true } }
  - reconcile
  - tick
"#,
        )
        .unwrap();
        let summary = execute(&scenario, false).await.unwrap();

        assert_eq!(summary.steps[0], StepRecord::Tick { outcome: TickOutcome::Idle });
        assert_eq!(
            summary.steps[2],
            StepRecord::Reconcile(ReconcileReport {
                promoted_count: 1,
                policy_version: "v2".into()
            })
        );
        let lookup = summary.object("lookup").unwrap();
        assert_eq!(lookup.status, ObjectStatus::Executed);
        assert_eq!(lookup.policy_version_at_creation, "v1");
        assert_eq!(lookup.policy_version_at_execution.as_deref(), Some("v2"));
        assert_eq!(summary.snapshot_history, 2);
        assert!(summary.audit.is_none());
    }

    #[tokio::test]
    async fn audit_summary_lists_every_event() {
        let scenario = Scenario::from_yaml_str(
            r#"
snapshot: { version: v1, capabilities: { chat: true } }
objects:
  - { kind: chat-request, capability_key: chat }
steps: [ tick ]
"#,
        )
        .unwrap();
        let summary = execute(&scenario, true).await.unwrap();
        let audit = summary.audit.unwrap();
        // admitted, finalized, tick completed
        assert_eq!(audit.entries, 3);
        assert!(audit.digests[0].starts_with("object_admitted:sha256:"));
        assert!(audit.digests[2].starts_with("tick_completed:sha256:"));
    }

    #[tokio::test]
    async fn periodic_step_drains_at_the_configured_pace() {
        let scenario = Scenario::from_yaml_str(
            r#"
snapshot: { version: v1, capabilities: { chat: true } }
scheduler: { max_exec_per_tick: 1, tick_interval_ms: 5 }
objects:
  - { kind: chat-request, capability_key: chat }
  - { kind: chat-request, capability_key: chat }
  - { kind: chat-request, capability_key: chat }
steps: [ periodic ]
"#,
        )
        .unwrap();
        let summary = execute(&scenario, false).await.unwrap();

        let StepRecord::Periodic { ticks } = &summary.steps[0] else {
            panic!("unexpected record: {:?}", summary.steps[0]);
        };
        assert!(*ticks >= 3, "{ticks} ticks");
        assert_eq!(summary.counts[&ObjectStatus::Executed], 3);
        assert_eq!(summary.counts[&ObjectStatus::Eligible], 0);
    }

    #[test]
    fn summary_json_uses_snake_case_statuses() {
        let summary = ScenarioSummary {
            policy_version: "v1".into(),
            snapshot_history: 1,
            counts: [(ObjectStatus::PendingPolicy, 2)].into_iter().collect(),
            objects: Vec::new(),
            steps: vec![StepRecord::Drain { ticks: 1, processed: 2 }],
            audit: None,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["counts"]["pending_policy"], 2);
        assert_eq!(value["steps"][0]["step"], "drain");
        assert!(value.get("audit").is_none());
    }
}
