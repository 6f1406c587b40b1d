//! Multi-queue task scheduler
//!
//! One driving thread calls [`Scheduler::update`] per tick. Threaded tasks
//! run their bodies on a worker pool between ticks; cooperative tasks hand a
//! step sequence to the step runner, advanced by
//! [`Scheduler::advance_cooperative`]. Every queue transition and the
//! exception slot sit behind a single lock.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::SchedulerConfig;
use crate::cooperative::{CooperativeRunner, StepRunner};
use crate::error::{Result, SchedulerError, TaskError};
use crate::exception::ExceptionSlot;
use crate::queue::TaskQueues;
use crate::task::{TaskContext, TaskRef};
use crate::types::QueueKind;
use crate::worker::{RayonWorkerPool, WorkerPool};

/// Queues and exception slot, guarded together
#[derive(Default)]
struct SchedulerState {
    queues: TaskQueues,
    exception: ExceptionSlot,
}

/// State reachable from worker threads
#[derive(Default)]
struct Shared {
    state: Mutex<SchedulerState>,
    shutting_down: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Only a task still on the running queue in the same epoch moves on to
    /// finishing. Inline completions are ended by the caller of `run`.
    fn finished(&self, task: &TaskRef, epoch: u64) {
        let id = task.id();
        let mut state = self.lock();
        if task.core().epoch() != epoch {
            trace!(task = %id, "completion from a reset task ignored");
            return;
        }
        if state.queues.remove(QueueKind::Running, id).is_none() {
            trace!(task = %id, "finished while not running");
            return;
        }

        if self.is_shutting_down() || task.no_finish() || task.core().is_cancelled() {
            trace!(task = %id, "finished without finishing pass");
            return;
        }
        state.queues.push(QueueKind::Finishing, task.clone());
        trace!(task = %id, "queued for finishing");
    }

    fn throw(&self, error: TaskError) {
        let mut state = self.lock();
        if let Some(previous) = state.exception.store(error) {
            warn!(%previous, "unobserved task failure overwritten");
        }
    }

    fn discard(&self, task: &TaskRef) {
        let mut state = self.lock();
        state.queues.remove(QueueKind::Running, task.id());
        state.queues.remove(QueueKind::Finishing, task.id());
    }
}

/// Cloneable handle into the scheduler for task bodies on any thread.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Completion-signaling entry point for a run started in `epoch`; see
    /// [`Scheduler::finished`]
    pub fn finished(&self, task: &TaskRef, epoch: u64) {
        self.shared.finished(task, epoch);
    }

    /// Park a failure; see [`Scheduler::throw`]
    pub fn throw(&self, error: TaskError) {
        self.shared.throw(error);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    pub(crate) fn discard(&self, task: &TaskRef) {
        self.shared.discard(task);
    }
}

/// Drives tasks through the scheduled, running, waiting and finishing queues.
pub struct Scheduler {
    shared: Arc<Shared>,
    config: SchedulerConfig,
    pool: Option<Arc<dyn WorkerPool>>,
    cooperative: Box<dyn CooperativeRunner>,
    /// Tasks started since the current update began
    started_this_update: usize,
    updates: u64,
}

impl Scheduler {
    /// Create a scheduler with a rayon worker pool and the default step runner
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let pool: Option<Arc<dyn WorkerPool>> = if config.disable_multithreading {
            None
        } else {
            Some(Arc::new(RayonWorkerPool::new(config.worker_threads)?))
        };
        Self::with_parts(config, pool, Box::new(StepRunner::new()))
    }

    /// Create a scheduler from explicit collaborators
    pub fn with_parts(
        config: SchedulerConfig,
        pool: Option<Arc<dyn WorkerPool>>,
        cooperative: Box<dyn CooperativeRunner>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = if config.disable_multithreading { None } else { pool };
        info!(
            threaded = pool.is_some(),
            max_tasks_per_update = config.max_tasks_per_update,
            "scheduler created"
        );
        Ok(Self {
            shared: Arc::new(Shared::default()),
            config,
            pool,
            cooperative,
            started_this_update: 0,
            updates: 0,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Handle for signaling completion or failure from task bodies
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queue a task; silently rejected while shutting down
    pub fn add(&self, task: TaskRef) {
        if self.is_shutting_down() {
            debug!(task = %task.id(), "add rejected: shutting down");
            return;
        }
        let mut state = self.shared.lock();
        debug_assert!(
            state.queues.locate(task.id()).is_none(),
            "{} is already queued",
            task.id()
        );
        trace!(task = %task.id(), "task scheduled");
        state.queues.push(QueueKind::Scheduled, task);
    }

    /// Run a task now if this tick's budget allows, otherwise schedule it.
    ///
    /// The window opens at the start of each `update`, so calls made after
    /// it share whatever that update left unspent.
    pub fn run(&mut self, task: TaskRef) {
        if self.is_shutting_down() {
            debug!(task = %task.id(), "run rejected: shutting down");
            return;
        }
        if self.started_this_update < self.config.max_tasks_per_update {
            self.run_task(task);
        } else {
            trace!(task = %task.id(), "budget exhausted, deferring");
            self.add(task);
        }
    }

    /// Park a task on the waiting queue
    pub fn add_waiting(&self, task: TaskRef) {
        if self.is_shutting_down() {
            debug!(task = %task.id(), "add_waiting rejected: shutting down");
            return;
        }
        let mut state = self.shared.lock();
        debug_assert!(
            state.queues.locate(task.id()).is_none(),
            "{} is already queued",
            task.id()
        );
        state.queues.push(QueueKind::Waiting, task);
    }

    /// Release a waiting task, running it immediately or scheduling it.
    ///
    /// Returns false if the task was not waiting or the scheduler is
    /// shutting down.
    pub fn stop_waiting(&mut self, task: &TaskRef, run: bool) -> bool {
        if self.is_shutting_down() {
            debug!(task = %task.id(), "stop_waiting rejected: shutting down");
            return false;
        }
        let released = self.shared.lock().queues.remove(QueueKind::Waiting, task.id());
        let Some(task) = released else {
            return false;
        };
        if run {
            self.run_task(task);
        } else {
            self.shared.lock().queues.push(QueueKind::Scheduled, task);
        }
        true
    }

    /// Cancel a scheduled or waiting task.
    ///
    /// Running and finishing tasks are left alone; they are expected to
    /// observe their own cancelled flag. Returns true if the task was removed.
    pub fn cancel(&self, task: &TaskRef) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            match state.queues.locate(task.id()) {
                Some(kind @ (QueueKind::Scheduled | QueueKind::Waiting)) => {
                    state.queues.remove(kind, task.id())
                }
                _ => None,
            }
        };
        match removed {
            Some(task) => {
                debug!(task = %task.id(), "task cancelled");
                task.core().mark_cancelled();
                task.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything, waiting a bounded time for threaded bodies.
    ///
    /// Scheduled and waiting tasks are dropped at once. Running tasks get
    /// their cancel hook; threaded ones are given up to `max_wait_ms` to
    /// report `Ran`, after which the running queue is cleared regardless.
    /// The call never returns before `min_wait_ms` has elapsed.
    #[instrument(skip(self))]
    pub fn cancel_all_tasks(&mut self) {
        let started = Instant::now();
        let (dropped, running) = {
            let mut state = self.shared.lock();
            let mut dropped = state.queues.drain(QueueKind::Scheduled);
            dropped.extend(state.queues.drain(QueueKind::Waiting));
            let running: Vec<TaskRef> = state.queues.tasks(QueueKind::Running).cloned().collect();
            (dropped, running)
        };

        for task in dropped.iter().chain(running.iter()) {
            task.core().mark_cancelled();
            task.cancel();
        }
        debug!(dropped = dropped.len(), running = running.len(), "tasks cancelled");

        let deadline = started + self.config.max_wait();
        loop {
            let pending = running
                .iter()
                .filter(|task| task.is_threaded() && !task.core().has_ran())
                .count();
            if pending == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!(pending, "abandoning threaded tasks after wait timeout");
                break;
            }
            thread::yield_now();
        }

        self.shared.lock().queues.drain(QueueKind::Running);

        let elapsed = started.elapsed();
        let min_wait = self.config.min_wait();
        if elapsed < min_wait {
            thread::sleep(min_wait - elapsed);
        }
    }

    /// Advance the scheduler by one tick.
    ///
    /// Finishes completed tasks, starts scheduled tasks up to the per-tick
    /// budget, then finishes again. A failure parked by any task since the
    /// last check is re-raised here.
    #[instrument(skip(self), fields(update = self.updates))]
    pub fn update(&mut self) -> Result<()> {
        self.updates += 1;
        self.started_this_update = 0;
        self.finish_tasks();
        self.check_for_exception()?;

        while self.started_this_update < self.config.max_tasks_per_update {
            let next = self.shared.lock().queues.pop_front(QueueKind::Scheduled);
            let Some(task) = next else {
                break;
            };
            self.run_task(task);
            self.check_for_exception()?;
        }

        self.finish_tasks();
        Ok(())
    }

    /// Fire `end` for tasks on the finishing queue, up to the per-tick cap
    pub fn finish_tasks(&mut self) -> usize {
        let mut finished = 0;
        while finished < self.config.max_finish_per_update {
            let next = self.shared.lock().queues.pop_front(QueueKind::Finishing);
            let Some(task) = next else {
                break;
            };
            if task.core().has_ran() {
                end_task(&task);
            }
            finished += 1;
        }
        if finished > 0 {
            trace!(finished, "finishing pass");
        }
        finished
    }

    /// Step every live cooperative sequence once
    pub fn advance_cooperative(&mut self) -> usize {
        self.cooperative.advance()
    }

    /// Completion-signaling entry point.
    ///
    /// Removes the task from the running queue and queues it for `end`
    /// unless the scheduler is shutting down, the task opts out of finishing,
    /// or it was cancelled. The only entry point meant for worker threads.
    pub fn finished(&self, task: &TaskRef) {
        self.shared.finished(task, task.core().epoch());
    }

    /// Park a failure for the next [`check_for_exception`](Self::check_for_exception).
    ///
    /// The slot holds one failure; an unobserved earlier one is replaced.
    pub fn throw(&self, error: TaskError) {
        self.shared.throw(error);
    }

    /// Take and re-raise the parked failure, if any
    pub fn check_for_exception(&self) -> Result<()> {
        let pending = self.shared.lock().exception.take();
        match pending {
            Some(err) => {
                error!(%err, "re-raising task failure");
                Err(SchedulerError::Task(err))
            }
            None => Ok(()),
        }
    }

    /// Wipe every queue; fails while any task is running
    pub fn clear(&self) -> Result<()> {
        let mut state = self.shared.lock();
        let count = state.queues.len(QueueKind::Running);
        if count > 0 {
            return Err(SchedulerError::TasksRunning { count });
        }
        state.queues.clear();
        Ok(())
    }

    /// Stop accepting work, cancel everything and clear the queues.
    ///
    /// Cleanup failures are logged and swallowed so shutdown always completes.
    #[instrument(skip(self))]
    pub fn shutdown(&mut self) {
        info!("scheduler shutting down");
        self.shared.shutting_down.store(true, Ordering::Release);
        self.cancel_all_tasks();
        if let Err(err) = self.clear() {
            warn!(%err, "scheduler cleanup failed during shutdown");
        }
        self.cooperative.clear();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    /// True while any of the four queues holds a task
    pub fn has_tasks(&self) -> bool {
        !self.shared.lock().queues.is_empty()
    }

    /// Queue currently holding `task`
    pub fn queue_of(&self, task: &TaskRef) -> Option<QueueKind> {
        self.shared.lock().queues.locate(task.id())
    }

    pub fn queue_len(&self, kind: QueueKind) -> usize {
        self.shared.lock().queues.len(kind)
    }

    pub fn scheduled_count(&self) -> usize {
        self.queue_len(QueueKind::Scheduled)
    }

    pub fn running_count(&self) -> usize {
        self.queue_len(QueueKind::Running)
    }

    pub fn waiting_count(&self) -> usize {
        self.queue_len(QueueKind::Waiting)
    }

    pub fn finishing_count(&self) -> usize {
        self.queue_len(QueueKind::Finishing)
    }

    fn run_task(&mut self, task: TaskRef) {
        self.started_this_update += 1;
        let ctx = TaskContext::new(task.clone(), self.handle());

        task.core().mark_started();
        task.start();

        if task.is_threaded()
            && let Some(pool) = &self.pool
        {
            // Optimistically running: the worker may finish before we return.
            self.shared.lock().queues.push(QueueKind::Running, task.clone());
            trace!(task = %task.id(), "dispatched to worker");
            pool.spawn(Box::new(move || run_on_worker(task, ctx)));
            return;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(ctx.clone())))
            .unwrap_or_else(|payload| Err(TaskError::panicked(task.id(), payload.as_ref())));
        match outcome {
            Ok(Some(steps)) => {
                if task.core().has_ran() {
                    self.complete_inline(&task);
                } else {
                    self.shared.lock().queues.push(QueueKind::Running, task.clone());
                    self.cooperative.submit(ctx, steps);
                }
            }
            Ok(None) => {
                task.core().mark_ran();
                self.complete_inline(&task);
            }
            Err(err) => {
                warn!(task = %task.id(), %err, "task failed");
                self.shared.throw(err);
                ctx.discard();
            }
        }
    }

    /// End a task that completed during its own `run` call
    fn complete_inline(&self, task: &TaskRef) {
        {
            let mut state = self.shared.lock();
            state.queues.remove(QueueKind::Finishing, task.id());
            state.queues.remove(QueueKind::Running, task.id());
        }
        if !task.no_finish() {
            end_task(task);
        }
    }
}

fn end_task(task: &TaskRef) {
    if task.core().is_cancelled() {
        return;
    }
    if task.core().try_mark_ended() {
        trace!(task = %task.id(), "task ended");
        task.end();
    }
}

/// Body executed on a worker thread.
///
/// A successful body signals its own completion. Failures and panics never
/// unwind into the pool: they are parked and the task is dropped from the
/// running queue.
fn run_on_worker(task: TaskRef, ctx: TaskContext) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(ctx.clone())));
    let err = match outcome {
        Ok(Ok(None)) => return,
        Ok(Ok(Some(_))) => ctx.fail("threaded task returned a step sequence"),
        Ok(Err(err)) => err,
        Err(payload) => TaskError::panicked(task.id(), payload.as_ref()),
    };
    error!(task = %task.id(), %err, "worker task failed");
    ctx.throw(err);
    ctx.discard();
}
