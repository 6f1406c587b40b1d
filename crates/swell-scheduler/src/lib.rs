//! Swell Scheduler
//!
//! Multi-queue task scheduler driven once per tick from a single thread.
//!
//! # Architecture
//!
//! - [`task`] - The [`Task`] contract, lifecycle flags and [`TaskContext`]
//! - [`scheduler`] - [`Scheduler`] with its scheduled, running, waiting and
//!   finishing queues
//! - [`cooperative`] - Step runner for task bodies that yield across ticks
//! - [`worker`] - Worker pool seam for threaded task bodies
//! - [`config`] - Per-tick budgets and cancellation timing
//! - [`error`] - Task failures and scheduler errors
//!
//! # Execution Model
//!
//! Each call to [`Scheduler::update`]:
//!
//! 1. **Finish** - fire `end` for tasks that reported completion
//! 2. **Start** - pop scheduled tasks up to the per-tick budget; inline tasks
//!    complete immediately, threaded tasks go to the worker pool, cooperative
//!    tasks go to the step runner
//! 3. **Finish** - fire `end` for anything that completed during step 2
//!
//! Failures raised off the driving thread are parked and re-raised by the next
//! update.

pub mod config;
pub mod cooperative;
pub mod error;
mod exception;
mod queue;
pub mod scheduler;
pub mod task;
pub mod types;
pub mod worker;

pub use config::SchedulerConfig;
pub use cooperative::{CooperativeRunner, StepRunner};
pub use error::{Result, SchedulerError, TaskError};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use task::{StepSequence, Task, TaskContext, TaskCore, TaskRef};
pub use types::{QueueKind, TaskId, TaskState};
pub use worker::{Job, RayonWorkerPool, WorkerPool};
