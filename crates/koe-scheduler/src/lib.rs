//! # koe-scheduler — Deferred Execution Scheduler
//!
//! Periodically drains the escrow's `Eligible` backlog through an injected
//! async [`Executor`].
//!
//! - **Executor** (`executor.rs`): the [`Executor`] trait, [`ExecutorVerdict`]
//!   labels, [`ExecutorError`], and the [`FnExecutor`] closure adapter.
//! - **Scheduler** (`scheduler.rs`): the atomic running guard and the bounded,
//!   sequential tick.
//! - **Runner** (`runner.rs`): [`spawn_periodic`], an interval loop paced by
//!   the scheduler's configured tick interval, with a `watch` shutdown signal.
//! - **Config** (`config.rs`): batch size, per-item timeout, tick interval.
//!
//! ## Example
//!
//! ```ignore
//! let config = SchedulerConfig::from_env()?;
//! let scheduler = Arc::new(DeferredExecutionScheduler::new(escrow, executor).with_config(config));
//! let (tx, rx) = tokio::sync::watch::channel(false);
//! let runner = spawn_periodic(scheduler, rx);
//! // ...
//! tx.send(true)?;
//! let ticks = runner.await?;
//! ```

pub mod config;
pub mod executor;
pub mod runner;
pub mod scheduler;

pub use config::{ConfigError, SchedulerConfig};
pub use executor::{Executor, ExecutorError, ExecutorVerdict, FnExecutor};
pub use runner::spawn_periodic;
pub use scheduler::{DeferredExecutionScheduler, TickOutcome, TickReport, REJECTED_BY_EXECUTOR};
