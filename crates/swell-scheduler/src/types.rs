//! Core scheduler types

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Allocate a fresh process-wide identifier
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Lifecycle state derived from a task's flags
///
/// Being on the running queue is tracked by the scheduler, not by the task,
/// so `Started` covers both "started" and "running".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Started,
    Ran,
    Finished,
    Cancelled,
}

impl TaskState {
    /// True once the task can no longer make progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Cancelled)
    }
}

/// The four disjoint scheduler queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Scheduled,
    Running,
    Waiting,
    Finishing,
}

impl QueueKind {
    /// All queues, in lookup order
    pub const ALL: [QueueKind; 4] = [
        QueueKind::Scheduled,
        QueueKind::Running,
        QueueKind::Waiting,
        QueueKind::Finishing,
    ];
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueKind::Scheduled => "scheduled",
            QueueKind::Running => "running",
            QueueKind::Waiting => "waiting",
            QueueKind::Finishing => "finishing",
        };
        f.write_str(name)
    }
}
