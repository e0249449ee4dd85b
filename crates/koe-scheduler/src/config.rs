//! Scheduler configuration.
//!
//! Defaults suit an interactive process. Override via environment variables
//! or explicit construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default batch size per tick.
pub const DEFAULT_MAX_EXEC_PER_TICK: usize = 5;
/// Default per-item executor timeout.
pub const DEFAULT_EXECUTOR_TIMEOUT: Duration = Duration::from_secs(30);
/// Default interval for [`crate::spawn_periodic`].
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum objects handed to the executor per tick (≥ 1).
    pub max_exec_per_tick: usize,
    /// Per-item executor timeout. `None` waits indefinitely.
    pub executor_timeout: Option<Duration>,
    /// Interval between ticks for the periodic runner.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_exec_per_tick: DEFAULT_MAX_EXEC_PER_TICK,
            executor_timeout: Some(DEFAULT_EXECUTOR_TIMEOUT),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl SchedulerConfig {
    /// Create a validated configuration.
    ///
    /// # Errors
    ///
    /// `ConfigError::OutOfRange` if `max_exec_per_tick` is zero, the timeout
    /// is `Some(0)`, or `tick_interval` is zero.
    pub fn new(
        max_exec_per_tick: usize,
        executor_timeout: Option<Duration>,
        tick_interval: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            max_exec_per_tick,
            executor_timeout,
            tick_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants [`SchedulerConfig::new`] enforces.
    ///
    /// # Errors
    ///
    /// See [`SchedulerConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_exec_per_tick == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_exec_per_tick",
                reason: "must be at least 1".into(),
            });
        }
        if self.executor_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::OutOfRange {
                field: "executor_timeout",
                reason: "must be positive; use None to disable".into(),
            });
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::OutOfRange {
                field: "tick_interval",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Builder: override the batch size.
    pub fn with_max_exec_per_tick(mut self, max: usize) -> Self {
        self.max_exec_per_tick = max;
        self
    }

    /// Builder: override the per-item timeout.
    pub fn with_executor_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.executor_timeout = timeout;
        self
    }

    /// Builder: override the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `KOE_MAX_EXEC_PER_TICK` (default: 5)
    /// - `KOE_EXECUTOR_TIMEOUT_MS` (default: 30000; `0` disables the timeout)
    /// - `KOE_TICK_INTERVAL_MS` (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`SchedulerConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_exec_per_tick = match lookup("KOE_MAX_EXEC_PER_TICK") {
            Some(raw) => parse_var("KOE_MAX_EXEC_PER_TICK", &raw)?,
            None => defaults.max_exec_per_tick,
        };
        let executor_timeout = match lookup("KOE_EXECUTOR_TIMEOUT_MS") {
            Some(raw) => match parse_var::<u64>("KOE_EXECUTOR_TIMEOUT_MS", &raw)? {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            None => defaults.executor_timeout,
        };
        let tick_interval = match lookup("KOE_TICK_INTERVAL_MS") {
            Some(raw) => Duration::from_millis(parse_var("KOE_TICK_INTERVAL_MS", &raw)?),
            None => defaults.tick_interval,
        };

        Self::new(max_exec_per_tick, executor_timeout, tick_interval)
    }
}

fn parse_var<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidVar {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidVar {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure.
        reason: String,
    },
    /// A field is outside its permitted range.
    #[error("invalid scheduler config field {field}: {reason}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Constraint violated.
        reason: String,
    },
}
