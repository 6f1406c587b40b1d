//! Displacement bounds as a threaded task.

use std::sync::Mutex;

use swell_scheduler::{StepSequence, Task, TaskContext, TaskCore, TaskError};
use tracing::debug;

use crate::scaling::GridScaling;
use crate::solver::{self, DisplacementBounds};
use crate::spectrum::{GridSnapshot, SnapshotSync, SpectrumSource};
use crate::task::lock;

pub type BoundsCallback = Box<dyn FnMut(DisplacementBounds) + Send>;

#[derive(Default)]
struct BoundsState {
    grids: GridSnapshot,
    scaling: GridScaling,
    bounds: Option<DisplacementBounds>,
}

/// Scans a grid snapshot for its displacement extremes on a worker thread.
///
/// The callback fires from `end` only if the scan ran to completion.
pub struct BoundsTask {
    core: TaskCore,
    state: Mutex<BoundsState>,
    callback: Mutex<BoundsCallback>,
}

impl BoundsTask {
    pub fn new(callback: impl FnMut(DisplacementBounds) + Send + 'static) -> Self {
        Self {
            core: TaskCore::new(),
            state: Mutex::new(BoundsState::default()),
            callback: Mutex::new(Box::new(callback)),
        }
    }

    /// Snapshot the spectrum for the next scan.
    pub fn reset(&self, source: &dyn SpectrumSource) -> SnapshotSync {
        debug_assert!(
            !self.core.is_started() || self.core.has_ran() || self.core.is_cancelled(),
            "{} reset while running",
            self.core.id()
        );
        self.core.reset();

        let mut state = lock(&self.state);
        let sync = state.grids.sync_from(source.displacement_grids());
        state.scaling.update_from(source);
        state.bounds = None;
        sync
    }

    /// Bounds from the last completed scan.
    pub fn bounds(&self) -> Option<DisplacementBounds> {
        lock(&self.state).bounds
    }
}

impl Task for BoundsTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn is_threaded(&self) -> bool {
        true
    }

    fn run(&self, ctx: TaskContext) -> Result<Option<StepSequence>, TaskError> {
        {
            let mut state = lock(&self.state);
            let bounds = solver::find_bounds(state.grids.grids(), &state.scaling, || {
                ctx.is_cancelled()
            });
            if bounds.is_none() {
                debug!(task = %ctx.id(), "bounds scan cancelled");
            }
            state.bounds = bounds;
        }
        ctx.finished();
        Ok(None)
    }

    fn end(&self) {
        let bounds = lock(&self.state).bounds;
        if let Some(bounds) = bounds {
            let mut callback = lock(&self.callback);
            (*callback)(bounds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::InterpolatedGrid;
    use crate::scaling::MAX_GRIDS;
    use crate::spectrum::{DISPLACEMENT_CHANNELS, SpectrumSnapshot};
    use std::sync::Arc;
    use swell_scheduler::{Scheduler, SchedulerConfig};

    #[test]
    fn test_bounds_reported_through_callback() {
        let mut grid = InterpolatedGrid::new(4, 4, DISPLACEMENT_CHANNELS).unwrap();
        grid.set(1, 2, 1, 3.0);
        grid.set(2, 1, 1, -2.0);
        grid.set(3, 3, 0, 0.5);
        let spectrum = SpectrumSnapshot::new(vec![grid], [10.0, 0.0, 0.0, 0.0])
            .unwrap()
            .with_choppiness([2.0; MAX_GRIDS]);

        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let task = Arc::new(BoundsTask::new(move |bounds| sink.lock().unwrap().push(bounds)));
        task.reset(&spectrum);

        let mut scheduler = Scheduler::new(SchedulerConfig {
            disable_multithreading: true,
            ..Default::default()
        })
        .unwrap();
        scheduler.add(task.clone());
        scheduler.update().unwrap();

        let reported = reported.lock().unwrap();
        assert_eq!(
            *reported,
            vec![DisplacementBounds {
                min_height: -2.0,
                max_height: 3.0,
                max_horizontal: 1.0,
            }]
        );
        assert_eq!(task.bounds(), Some(reported[0]));
    }
}
