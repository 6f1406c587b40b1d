//! Task contract and lifecycle flags.
//!
//! A task moves through `Created → Started → Ran → Finished`, or is
//! cancelled from `Created`/`Started` while it still sits on the scheduled or
//! waiting queue. The scheduler owns every transition except `Ran`, which a
//! task reports itself through [`TaskContext::finished`] (possibly from a
//! worker thread).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::error::TaskError;
use crate::scheduler::SchedulerHandle;
use crate::types::{TaskId, TaskState};

const STARTED: u64 = 1 << 0;
const RAN: u64 = 1 << 1;
const CANCELLED: u64 = 1 << 2;
const ENDED: u64 = 1 << 3;

/// Flags live in the low byte; the rest counts resets.
const EPOCH_SHIFT: u32 = 8;
const FLAG_MASK: u64 = (1 << EPOCH_SHIFT) - 1;

/// Shared handle to a schedulable task
pub type TaskRef = Arc<dyn Task>;

/// Lazily produced suspend points of a cooperative task body.
///
/// Each call to `next` resumes the body until its next suspension point.
/// Exhaustion means the body is done. The sequence is not restartable.
pub type StepSequence = Box<dyn Iterator<Item = Result<(), TaskError>> + Send>;

/// Identity and lifecycle flags embedded in every task.
///
/// Every [`reset`](TaskCore::reset) starts a new epoch. A [`TaskContext`]
/// belongs to the epoch it was created in, so a body abandoned by an earlier
/// run can no longer complete or discard the task.
#[derive(Debug)]
pub struct TaskCore {
    id: TaskId,
    flags: AtomicU64,
}

impl TaskCore {
    pub fn new() -> Self {
        Self {
            id: TaskId::next(),
            flags: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Lifecycle state derived from the current flags
    pub fn state(&self) -> TaskState {
        let flags = self.flags.load(Ordering::Acquire) & FLAG_MASK;
        if flags & CANCELLED != 0 {
            TaskState::Cancelled
        } else if flags & ENDED != 0 {
            TaskState::Finished
        } else if flags & RAN != 0 {
            TaskState::Ran
        } else if flags & STARTED != 0 {
            TaskState::Started
        } else {
            TaskState::Created
        }
    }

    pub fn is_started(&self) -> bool {
        self.has(STARTED)
    }

    pub fn has_ran(&self) -> bool {
        self.has(RAN)
    }

    pub fn is_cancelled(&self) -> bool {
        self.has(CANCELLED)
    }

    pub fn has_ended(&self) -> bool {
        self.has(ENDED)
    }

    /// Reset count, bumped by every [`reset`](TaskCore::reset)
    pub fn epoch(&self) -> u64 {
        self.flags.load(Ordering::Acquire) >> EPOCH_SHIFT
    }

    /// Return the task to `Created` in a new epoch so it can be scheduled again.
    ///
    /// Only valid while the task sits on no scheduler queue.
    pub fn reset(&self) {
        let next = (self.epoch() + 1) << EPOCH_SHIFT;
        self.flags.store(next, Ordering::Release);
    }

    pub(crate) fn mark_started(&self) {
        self.flags.fetch_or(STARTED, Ordering::AcqRel);
    }

    pub(crate) fn mark_ran(&self) {
        self.flags.fetch_or(RAN, Ordering::AcqRel);
    }

    /// Mark `Ran` only if the task is still in `epoch`
    pub(crate) fn mark_ran_in(&self, epoch: u64) -> bool {
        self.flags
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |flags| {
                (flags >> EPOCH_SHIFT == epoch).then_some(flags | RAN)
            })
            .is_ok()
    }

    pub(crate) fn mark_cancelled(&self) {
        self.flags.fetch_or(CANCELLED, Ordering::AcqRel);
    }

    /// Set the ended flag, returning true only for the first caller
    pub(crate) fn try_mark_ended(&self) -> bool {
        self.flags.fetch_or(ENDED, Ordering::AcqRel) & ENDED == 0
    }

    fn has(&self, flag: u64) -> bool {
        self.flags.load(Ordering::Acquire) & flag != 0
    }
}

impl Default for TaskCore {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of schedulable work.
///
/// Callers never branch on the concrete type: the scheduler drives every task
/// through the same hooks and reads its capabilities from
/// [`is_threaded`](Task::is_threaded) and [`no_finish`](Task::no_finish).
pub trait Task: Send + Sync {
    /// Identity and lifecycle flags
    fn core(&self) -> &TaskCore;

    /// May run on a worker thread
    fn is_threaded(&self) -> bool {
        false
    }

    /// Skip the finishing queue; [`end`](Task::end) is never invoked by the scheduler
    fn no_finish(&self) -> bool {
        false
    }

    /// Called on the driving thread right before [`run`](Task::run)
    fn start(&self) {}

    /// Execute the task body.
    ///
    /// Returning `Some(steps)` hands a cooperative body to the step runner.
    /// A threaded task runs on a worker and must call
    /// [`TaskContext::finished`] when its body completes.
    fn run(&self, ctx: TaskContext) -> Result<Option<StepSequence>, TaskError>;

    /// Fires exactly once, on the driving thread, after the task ran and was
    /// not cancelled
    fn end(&self) {}

    /// Fires when the task is cancelled
    fn cancel(&self) {}

    fn id(&self) -> TaskId {
        self.core().id()
    }
}

/// Handle given to a running task body.
///
/// Carries the task itself plus a way back into the scheduler, so a worker
/// thread can signal completion or park a failure.
#[derive(Clone)]
pub struct TaskContext {
    task: TaskRef,
    handle: SchedulerHandle,
    epoch: u64,
}

impl TaskContext {
    pub(crate) fn new(task: TaskRef, handle: SchedulerHandle) -> Self {
        let epoch = task.core().epoch();
        Self {
            task,
            handle,
            epoch,
        }
    }

    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    /// Cooperative cancellation check.
    ///
    /// Also true once the task has been reset under this body.
    pub fn is_cancelled(&self) -> bool {
        self.task.core().is_cancelled() || self.is_stale()
    }

    /// The task was reset after this context was created
    pub fn is_stale(&self) -> bool {
        self.task.core().epoch() != self.epoch
    }

    pub fn has_ran(&self) -> bool {
        self.task.core().has_ran()
    }

    /// Report that the body completed.
    ///
    /// Marks the task `Ran` and moves it from the running queue to the
    /// finishing queue. Safe to call from any thread. Ignored if the task
    /// was reset since this run started.
    pub fn finished(&self) {
        if !self.task.core().mark_ran_in(self.epoch) {
            trace!(task = %self.id(), "stale completion ignored");
            return;
        }
        self.handle.finished(&self.task, self.epoch);
    }

    /// Park a failure for the driving thread to re-raise
    pub fn throw(&self, error: TaskError) {
        self.handle.throw(error);
    }

    /// Build a failure attributed to this task
    pub fn fail(&self, message: impl Into<String>) -> TaskError {
        TaskError::failed(self.id(), message)
    }

    /// Drop the task from the scheduler without queueing it for `end`
    pub(crate) fn discard(&self) {
        if self.task.core().mark_ran_in(self.epoch) {
            self.handle.discard(&self.task);
        }
    }
}
