//! Scheduler errors.
//!
//! Two layers of failure exist:
//!
//! - [`TaskError`] is raised by a task body, possibly on a worker thread. It
//!   is never thrown where it happens; it is parked in the scheduler's
//!   single-slot exception holder and re-raised on the driving thread.
//! - [`SchedulerError`] is what the driving thread sees: a deferred
//!   [`TaskError`], or a misuse of the scheduler itself.

use std::any::Any;

use thiserror::Error;

use crate::types::TaskId;

/// Scheduler result type alias.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Failure raised by a task body.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    /// The task reported a failure.
    #[error("{task} failed: {message}")]
    Failed {
        /// Task that failed.
        task: TaskId,
        /// Description of the failure.
        message: String,
    },

    /// The task body panicked and the panic was caught by the scheduler.
    #[error("{task} panicked: {message}")]
    Panicked {
        /// Task that panicked.
        task: TaskId,
        /// Panic payload rendered as text.
        message: String,
    },
}

impl TaskError {
    /// Build a [`TaskError::Failed`] for `task`.
    pub fn failed(task: TaskId, message: impl Into<String>) -> Self {
        Self::Failed {
            task,
            message: message.into(),
        }
    }

    /// Build a [`TaskError::Panicked`] from a caught panic payload.
    pub fn panicked(task: TaskId, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { task, message }
    }

    /// Task the failure belongs to.
    pub fn task(&self) -> TaskId {
        match self {
            TaskError::Failed { task, .. } | TaskError::Panicked { task, .. } => *task,
        }
    }
}

/// Errors surfaced on the driving thread.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A task failed since the last check and the failure is being re-raised.
    #[error("deferred task failure: {0}")]
    Task(#[from] TaskError),

    /// `clear` was called while tasks were still on the running queue.
    #[error("cannot clear scheduler: {count} task(s) still running")]
    TasksRunning {
        /// Number of running tasks.
        count: usize,
    },

    /// The worker pool could not be created.
    #[error("worker pool: {0}")]
    WorkerPool(String),

    /// Configuration validation failure.
    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),
}
