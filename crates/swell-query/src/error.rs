//! Query error types.

use swell_scheduler::SchedulerError;
use thiserror::Error;

/// Query result type alias.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Query error types.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Buffer length does not match the grid dimensions.
    #[error("grid buffer holds {actual} values, expected {expected}")]
    GridSizeMismatch { expected: usize, actual: usize },

    /// Grid dimensions or channel layout are unusable.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// Configuration validation failure.
    #[error("invalid query config: {0}")]
    InvalidConfig(String),

    /// Failure surfaced by the scheduler driving query tasks.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl QueryError {
    pub fn size_mismatch(expected: usize, actual: usize) -> Self {
        Self::GridSizeMismatch { expected, actual }
    }
}
