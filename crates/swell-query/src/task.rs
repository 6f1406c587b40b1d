//! Query batches as schedulable tasks.
//!
//! A [`QueryTask`] owns a batch of descriptors, a snapshot of the
//! displacement grids and the scaling derived from them. It runs either as a
//! single atomic body on a worker thread, or cooperatively on the driving
//! thread, yielding every few descriptors. Either way the completion callback
//! fires from `end`, on the driving thread, with every result populated.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use swell_scheduler::{StepSequence, Task, TaskContext, TaskCore, TaskError};
use tracing::{debug, trace, warn};

use crate::grid::InterpolatedGrid;
use crate::overlay::OverlaySource;
use crate::query::QueryDescriptor;
use crate::scaling::GridScaling;
use crate::solver;
use crate::spectrum::{GridSnapshot, SnapshotSync, SpectrumSource};

/// Receives the batch once every descriptor has been solved.
///
/// Runs while the batch is locked; it must not call back into its own task.
pub type QueryCallback = Box<dyn FnMut(&mut [QueryDescriptor]) + Send>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Execution {
    Threaded,
    Cooperative {
        yield_every: usize,
        overlay: Option<Arc<dyn OverlaySource>>,
    },
}

/// Descriptors plus the task-owned wave data they are solved against.
#[derive(Default)]
struct QueryBatch {
    descriptors: Vec<QueryDescriptor>,
    grids: GridSnapshot,
    scaling: GridScaling,
    ocean_level: f32,
}

impl QueryBatch {
    /// Solve one descriptor. Its result must already be cleared.
    fn process(&mut self, index: usize, overlay: Option<&dyn OverlaySource>) {
        let descriptor = &mut self.descriptors[index];
        solver::solve(self.grids.grids(), &mut self.scaling, descriptor);

        let result = &mut descriptor.result;
        result.height += self.ocean_level;
        if let Some(overlay) = overlay {
            let sample = overlay.sample(descriptor.pos_x, descriptor.pos_z);
            result.overlay_height = sample.height;
            result.height += sample.height;
            result.is_clipped = sample.is_clipped();
        }
    }

    /// Solve descriptors from `next` up to `end`, stopping early on
    /// cancellation. Returns the index of the first unprocessed descriptor.
    fn process_range(
        &mut self,
        next: usize,
        end: usize,
        ctx: &TaskContext,
        overlay: Option<&dyn OverlaySource>,
    ) -> usize {
        let end = end.min(self.descriptors.len());
        for index in next..end {
            self.descriptors[index].result.clear();
            if ctx.is_cancelled() {
                return index;
            }
            self.process(index, overlay);
        }
        end
    }

    fn grids(&self) -> &[InterpolatedGrid] {
        self.grids.grids()
    }
}

/// A batch of wave queries.
pub struct QueryTask {
    core: TaskCore,
    execution: Execution,
    batch: Arc<Mutex<QueryBatch>>,
    callback: Mutex<QueryCallback>,
}

impl QueryTask {
    /// Batch solved in one call on a worker thread.
    pub fn threaded(
        descriptors: Vec<QueryDescriptor>,
        callback: impl FnMut(&mut [QueryDescriptor]) + Send + 'static,
    ) -> Self {
        Self::with_execution(descriptors, Execution::Threaded, Box::new(callback))
    }

    /// Batch solved on the driving thread, `yield_every` descriptors per step.
    ///
    /// Results include the overlay's height and clip flag when one is given.
    pub fn cooperative(
        descriptors: Vec<QueryDescriptor>,
        yield_every: usize,
        overlay: Option<Arc<dyn OverlaySource>>,
        callback: impl FnMut(&mut [QueryDescriptor]) + Send + 'static,
    ) -> Self {
        Self::with_execution(
            descriptors,
            Execution::Cooperative {
                yield_every: yield_every.max(1),
                overlay,
            },
            Box::new(callback),
        )
    }

    fn with_execution(
        descriptors: Vec<QueryDescriptor>,
        execution: Execution,
        callback: QueryCallback,
    ) -> Self {
        Self {
            core: TaskCore::new(),
            execution,
            batch: Arc::new(Mutex::new(QueryBatch {
                descriptors,
                ..Default::default()
            })),
            callback: Mutex::new(callback),
        }
    }

    /// Prepare the batch for (re)scheduling against the latest spectrum.
    ///
    /// Copies the displacement grids into the task-owned snapshot, recomputes
    /// scaling and clears every result. Must not be called while the task is
    /// queued on a scheduler.
    pub fn reset(&self, source: &dyn SpectrumSource, ocean_level: f32) -> SnapshotSync {
        debug_assert!(
            !self.core.is_started() || self.core.has_ran() || self.core.is_cancelled(),
            "{} reset while running",
            self.core.id()
        );
        self.core.reset();

        let mut batch = lock(&self.batch);
        let sync = batch.grids.sync_from(source.displacement_grids());
        batch.scaling.update_from(source);
        batch.ocean_level = ocean_level;
        for descriptor in &mut batch.descriptors {
            descriptor.result.clear();
        }
        trace!(task = %self.core.id(), ?sync, "query batch reset");
        sync
    }

    /// Replace the batch's descriptors.
    pub fn set_descriptors(&self, descriptors: Vec<QueryDescriptor>) {
        lock(&self.batch).descriptors = descriptors;
    }

    /// Copy of the batch's descriptors and their current results.
    ///
    /// Blocks while a threaded body is solving the batch; a driving thread
    /// polling mid-run should use [`try_descriptors`](Self::try_descriptors).
    pub fn descriptors(&self) -> Vec<QueryDescriptor> {
        lock(&self.batch).descriptors.clone()
    }

    /// Like [`descriptors`](Self::descriptors), but `None` instead of
    /// waiting while the batch is being solved.
    pub fn try_descriptors(&self) -> Option<Vec<QueryDescriptor>> {
        match self.batch.try_lock() {
            Ok(batch) => Some(batch.descriptors.clone()),
            Err(TryLockError::Poisoned(poisoned)) => {
                Some(poisoned.into_inner().descriptors.clone())
            }
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Number of descriptors. Blocks while a threaded body is solving.
    pub fn len(&self) -> usize {
        lock(&self.batch).descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Task for QueryTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn is_threaded(&self) -> bool {
        matches!(self.execution, Execution::Threaded)
    }

    fn run(&self, ctx: TaskContext) -> Result<Option<StepSequence>, TaskError> {
        match &self.execution {
            Execution::Threaded => {
                {
                    let mut batch = lock(&self.batch);
                    if batch.grids().is_empty() {
                        warn!(task = %ctx.id(), "query batch has no grid snapshot; was it reset?");
                    }
                    let total = batch.descriptors.len();
                    let processed = batch.process_range(0, total, &ctx, None);
                    debug!(task = %ctx.id(), processed, total, "query batch solved");
                }
                ctx.finished();
                Ok(None)
            }
            Execution::Cooperative {
                yield_every,
                overlay,
            } => Ok(Some(Box::new(QuerySteps {
                ctx,
                batch: Arc::clone(&self.batch),
                overlay: overlay.clone(),
                yield_every: *yield_every,
                next: 0,
                done: false,
            }))),
        }
    }

    fn end(&self) {
        let mut batch = lock(&self.batch);
        let mut callback = lock(&self.callback);
        (*callback)(&mut batch.descriptors);
    }

    fn cancel(&self) {
        debug!(task = %self.core.id(), "query batch cancelled");
    }
}

/// Step sequence of a cooperative query batch.
struct QuerySteps {
    ctx: TaskContext,
    batch: Arc<Mutex<QueryBatch>>,
    overlay: Option<Arc<dyn OverlaySource>>,
    yield_every: usize,
    next: usize,
    done: bool,
}

impl Iterator for QuerySteps {
    type Item = Result<(), TaskError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let remaining = {
            let mut batch = lock(&self.batch);
            let end = self.next.saturating_add(self.yield_every);
            self.next = batch.process_range(self.next, end, &self.ctx, self.overlay.as_deref());
            batch.descriptors.len() - self.next
        };

        if remaining == 0 || self.ctx.is_cancelled() {
            trace!(task = %self.ctx.id(), processed = self.next, "cooperative batch done");
            self.done = true;
            self.ctx.finished();
            return None;
        }
        Some(Ok(()))
    }
}
