//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Per-tick budgets and cancellation timing for a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum tasks started per update, including immediate `run` calls.
    pub max_tasks_per_update: usize,
    /// Maximum `end` callbacks fired per finishing pass.
    pub max_finish_per_update: usize,
    /// Upper bound on how long `cancel_all_tasks` waits for threaded tasks.
    pub max_wait_ms: u64,
    /// Lower bound on how long `cancel_all_tasks` takes, even if nothing runs.
    pub min_wait_ms: u64,
    /// Run threaded tasks inline on the driving thread.
    pub disable_multithreading: bool,
    /// Worker thread count; 0 lets the pool pick one per core.
    pub worker_threads: usize,
}

impl SchedulerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.max_tasks_per_update == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_tasks_per_update must be > 0".to_string(),
            ));
        }
        if self.max_finish_per_update == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_finish_per_update must be > 0".to_string(),
            ));
        }
        if self.min_wait_ms > self.max_wait_ms {
            return Err(SchedulerError::InvalidConfig(format!(
                "min_wait_ms ({}) exceeds max_wait_ms ({})",
                self.min_wait_ms, self.max_wait_ms
            )));
        }
        Ok(())
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn min_wait(&self) -> Duration {
        Duration::from_millis(self.min_wait_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_update: 100,
            max_finish_per_update: 100,
            max_wait_ms: 1000,
            min_wait_ms: 0,
            disable_multithreading: false,
            worker_threads: 0,
        }
    }
}
