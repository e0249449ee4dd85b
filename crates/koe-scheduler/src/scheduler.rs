//! # Deferred Execution Scheduler
//!
//! Drains `Eligible` objects from the escrow in bounded batches.
//!
//! ## Tick
//!
//! 1. Test-and-set the running flag. If another tick holds it, report
//!    `TickSkipped` and return [`TickOutcome::AlreadyRunning`] without
//!    touching the escrow.
//! 2. List `Eligible` objects; return [`TickOutcome::Idle`] if there are none.
//! 3. Take the first `max_exec_per_tick` in admission order and, one at a
//!    time, run the executor on its own task under the per-item timeout.
//! 4. Map each outcome to `mark_executed` / `mark_rejected`.
//!
//! Per-item failures (executor errors, panics, timeouts, or a `mark_*` call
//! losing a race with another caller) never abort the batch. `tick()` has no
//! error path.
//!
//! The running flag is released by a drop guard, so a tick future that is
//! cancelled mid-batch still frees the scheduler. The executor task for the
//! in-flight item is aborted in that case and the item stays `Eligible`.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use koe_core::{EscrowEvent, EscrowObserver, ObjectId, ObjectStatus, TracingObserver};
use koe_escrow::{KnowledgeObject, KnowledgeObjectEscrow};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SchedulerConfig;
use crate::executor::{Executor, ExecutorError, ExecutorVerdict};

/// Status reason for any non-`executed` verdict.
pub const REJECTED_BY_EXECUTOR: &str = "executor reported rejection";

// ---------------------------------------------------------------------------
// Tick results
// ---------------------------------------------------------------------------

/// Per-tick accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Objects handed to the executor, in dispatch order.
    pub processed: Vec<ObjectId>,
    /// Objects finalized as `Executed`.
    pub executed: usize,
    /// Objects finalized as `Rejected`.
    pub rejected: usize,
    /// Objects another caller finalized while the executor ran.
    pub skipped: usize,
}

/// Result of one [`DeferredExecutionScheduler::tick`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Another tick was in flight; nothing happened.
    AlreadyRunning,
    /// No eligible objects.
    Idle,
    /// A batch was processed.
    Drained(TickReport),
}

impl TickOutcome {
    /// The batch report, if a batch ran.
    pub fn report(&self) -> Option<&TickReport> {
        match self {
            Self::Drained(report) => Some(report),
            Self::AlreadyRunning | Self::Idle => None,
        }
    }

    /// Number of objects handed to the executor.
    pub fn processed_count(&self) -> usize {
        self.report().map_or(0, |r| r.processed.len())
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Tick-driven drain of the escrow's eligible backlog.
///
/// `tick()` spawns executor tasks and must be awaited inside a Tokio runtime.
pub struct DeferredExecutionScheduler {
    escrow: Arc<KnowledgeObjectEscrow>,
    executor: Arc<dyn Executor>,
    config: SchedulerConfig,
    running: AtomicBool,
    observer: Arc<dyn EscrowObserver>,
}

impl DeferredExecutionScheduler {
    /// Create a scheduler with the default configuration.
    pub fn new(escrow: Arc<KnowledgeObjectEscrow>, executor: Arc<dyn Executor>) -> Self {
        Self {
            escrow,
            executor,
            config: SchedulerConfig::default(),
            running: AtomicBool::new(false),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Builder: set the configuration. A zero batch size is treated as 1.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder: set the lifecycle observer.
    pub fn with_observer(mut self, observer: Arc<dyn EscrowObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The escrow being drained.
    pub fn escrow(&self) -> &Arc<KnowledgeObjectEscrow> {
        &self.escrow
    }

    /// Whether a tick is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Process at most `max_exec_per_tick` eligible objects.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            self.observer.observe(&EscrowEvent::TickSkipped);
            return TickOutcome::AlreadyRunning;
        };

        let batch: Vec<KnowledgeObject> = self
            .escrow
            .list_by_status(ObjectStatus::Eligible)
            .into_iter()
            .take(self.config.max_exec_per_tick.max(1))
            .collect();
        if batch.is_empty() {
            return TickOutcome::Idle;
        }

        let mut report = TickReport::default();
        for object in batch {
            let id = object.id.clone();
            report.processed.push(id.clone());
            debug!(object_id = %id, kind = %object.kind, "dispatching to executor");

            let finalized = match self.dispatch(object).await {
                Ok(verdict) if verdict.is_executed() => self.escrow.mark_executed(&id),
                Ok(verdict) => {
                    debug!(object_id = %id, %verdict, "executor declined");
                    self.escrow.mark_rejected(&id, REJECTED_BY_EXECUTOR)
                }
                Err(err) => {
                    warn!(object_id = %id, error = %err, "executor failed");
                    self.escrow.mark_rejected(&id, err.rejection_reason())
                }
            };

            match finalized {
                Ok(object) if object.status == ObjectStatus::Executed => report.executed += 1,
                Ok(_) => report.rejected += 1,
                Err(err) => {
                    warn!(object_id = %id, error = %err, "object finalized elsewhere; skipped");
                    report.skipped += 1;
                }
            }
        }

        self.observer.observe(&EscrowEvent::TickCompleted {
            processed: report.processed.len(),
            executed: report.executed,
            rejected: report.rejected,
            skipped: report.skipped,
        });
        TickOutcome::Drained(report)
    }

    async fn dispatch(&self, object: KnowledgeObject) -> Result<ExecutorVerdict, ExecutorError> {
        let executor = Arc::clone(&self.executor);
        let mut task = AbortOnDrop(tokio::spawn(async move { executor.execute(object).await }));

        let joined = match self.config.executor_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task.0).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(ExecutorError::TimedOut {
                        after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            },
            None => (&mut task.0).await,
        };

        match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(ExecutorError::Panicked {
                message: panic_message(err.into_panic()),
            }),
            Err(err) => Err(ExecutorError::failed(err.to_string())),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

impl std::fmt::Debug for DeferredExecutionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredExecutionScheduler")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::executor::FnExecutor;
    use koe_core::NoopObserver;
    use koe_policy::{PolicySnapshotStore, SnapshotInput};
    use proptest::prelude::*;

    proptest! {
        /// A tick never processes more than the batch size, and repeated
        /// ticks finalize every eligible object exactly once.
        #[test]
        fn ticks_drain_in_bounded_batches(eligible in 0usize..24, blocked in 0usize..6, batch in 1usize..8) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let store = PolicySnapshotStore::new(SnapshotInput::new("v1", [("chat", true)]))
                    .unwrap()
                    .with_observer(Arc::new(NoopObserver));
                let escrow = Arc::new(
                    KnowledgeObjectEscrow::new(Arc::new(store)).with_observer(Arc::new(NoopObserver)),
                );
                for _ in 0..eligible {
                    escrow.create("k", "chat", serde_json::json!({})).unwrap();
                }
                for _ in 0..blocked {
                    escrow.create("k", "tool", serde_json::json!({})).unwrap();
                }
                let scheduler = DeferredExecutionScheduler::new(
                    Arc::clone(&escrow),
                    Arc::new(FnExecutor::new(|_o: KnowledgeObject| async {
                        Ok(ExecutorVerdict::Executed)
                    })),
                )
                .with_observer(Arc::new(NoopObserver))
                .with_config(SchedulerConfig::default().with_max_exec_per_tick(batch));

                let mut seen = std::collections::HashSet::new();
                loop {
                    let outcome = scheduler.tick().await;
                    let Some(report) = outcome.report() else { break };
                    prop_assert!(report.processed.len() <= batch);
                    for id in &report.processed {
                        prop_assert!(seen.insert(id.clone()));
                    }
                }
                prop_assert_eq!(seen.len(), eligible);
                prop_assert_eq!(escrow.list_by_status(ObjectStatus::PendingPolicy).len(), blocked);
                Ok(())
            })?;
        }
    }
}
