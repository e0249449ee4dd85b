//! Periodic tick driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::scheduler::DeferredExecutionScheduler;

/// Tick `scheduler` every [`crate::SchedulerConfig::tick_interval`] until
/// `shutdown` turns `true` or its sender is dropped.
///
/// Missed intervals are skipped rather than bursted. A tick in progress when
/// shutdown fires runs to completion. The handle yields the number of ticks
/// issued.
pub fn spawn_periodic(
    scheduler: Arc<DeferredExecutionScheduler>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<u64> {
    let period = scheduler.config().tick_interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = 0u64;

        info!(interval_ms = period.as_millis() as u64, "periodic scheduler started");
        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    ticks += 1;
                    let outcome = scheduler.tick().await;
                    debug!(tick = ticks, processed = outcome.processed_count(), "periodic tick");
                }
            }
        }
        info!(ticks, "periodic scheduler stopped");
        ticks
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::executor::{ExecutorVerdict, FnExecutor};
    use koe_core::{NoopObserver, ObjectStatus};
    use koe_escrow::{KnowledgeObject, KnowledgeObjectEscrow};
    use koe_policy::{PolicySnapshotStore, SnapshotInput};

    fn scheduler() -> Arc<DeferredExecutionScheduler> {
        scheduler_ticking_every(Duration::from_millis(5))
    }

    fn scheduler_ticking_every(interval: Duration) -> Arc<DeferredExecutionScheduler> {
        let store = PolicySnapshotStore::new(SnapshotInput::new("v1", [("chat", true)]))
            .unwrap()
            .with_observer(Arc::new(NoopObserver));
        let escrow = Arc::new(
            KnowledgeObjectEscrow::new(Arc::new(store)).with_observer(Arc::new(NoopObserver)),
        );
        let executor = FnExecutor::new(|_o: KnowledgeObject| async { Ok(ExecutorVerdict::Executed) });
        Arc::new(
            DeferredExecutionScheduler::new(escrow, Arc::new(executor))
                .with_config(SchedulerConfig::default().with_tick_interval(interval))
                .with_observer(Arc::new(NoopObserver)),
        )
    }

    #[tokio::test]
    async fn drains_backlog_until_shutdown() {
        let scheduler = scheduler();
        for _ in 0..12 {
            scheduler
                .escrow()
                .create("chat-request", "chat", serde_json::json!({}))
                .unwrap();
        }
        let (tx, rx) = watch::channel(false);
        let handle = spawn_periodic(Arc::clone(&scheduler), rx);

        let mut waited = 0;
        while !scheduler.escrow().list_by_status(ObjectStatus::Eligible).is_empty() && waited < 200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += 1;
        }
        tx.send(true).unwrap();

        let ticks = handle.await.unwrap();
        assert!(ticks >= 3);
        assert_eq!(scheduler.escrow().list_by_status(ObjectStatus::Executed).len(), 12);
    }

    #[tokio::test]
    async fn dropped_sender_stops_runner() {
        let (tx, rx) = watch::channel(false);
        let handle = spawn_periodic(scheduler(), rx);
        drop(tx);
        assert!(tokio::time::timeout(Duration::from_secs(5), handle).await.is_ok());
    }

    #[tokio::test]
    async fn already_signalled_shutdown_issues_no_ticks() {
        let (_tx, rx) = watch::channel(true);
        let ticks = spawn_periodic(scheduler(), rx).await.unwrap();
        assert_eq!(ticks, 0);
    }

    #[tokio::test]
    async fn period_comes_from_scheduler_config() {
        let (tx, rx) = watch::channel(false);
        let handle = spawn_periodic(scheduler_ticking_every(Duration::from_secs(3600)), rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        // The first interval tick fires immediately; the next is an hour out.
        assert_eq!(handle.await.unwrap(), 1);
    }
}
