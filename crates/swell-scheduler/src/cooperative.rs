//! Cooperative execution of stepped task bodies.
//!
//! A cooperative task returns a [`StepSequence`] from `run`. The runner keeps
//! it and advances it one step per host tick, on the driving thread, until the
//! sequence is exhausted or the task is observed cancelled. A step that
//! fails or panics is thrown to the scheduler and its sequence dropped.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, trace, warn};

use crate::error::TaskError;
use crate::task::{StepSequence, TaskContext};

/// Accepts step sequences and advances them across ticks
pub trait CooperativeRunner {
    /// Take ownership of a task's step sequence
    fn submit(&mut self, ctx: TaskContext, steps: StepSequence);

    /// Advance every live sequence by one step, returning how many yielded
    fn advance(&mut self) -> usize;

    /// Number of live sequences
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every live sequence without stepping it
    fn clear(&mut self);
}

struct ActiveSequence {
    ctx: TaskContext,
    steps: StepSequence,
}

/// Round-robin step runner: one step per sequence per `advance`
#[derive(Default)]
pub struct StepRunner {
    active: Vec<ActiveSequence>,
}

impl StepRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CooperativeRunner for StepRunner {
    fn submit(&mut self, ctx: TaskContext, steps: StepSequence) {
        trace!(task = %ctx.id(), "step sequence submitted");
        self.active.push(ActiveSequence { ctx, steps });
    }

    fn advance(&mut self) -> usize {
        let mut yielded = 0;
        self.active.retain_mut(|seq| {
            if seq.ctx.is_cancelled() {
                debug!(task = %seq.ctx.id(), "dropping cancelled step sequence");
                seq.ctx.finished();
                return false;
            }
            let step = panic::catch_unwind(AssertUnwindSafe(|| seq.steps.next())).unwrap_or_else(
                |payload| Some(Err(TaskError::panicked(seq.ctx.id(), payload.as_ref()))),
            );
            match step {
                Some(Ok(())) => {
                    yielded += 1;
                    true
                }
                Some(Err(err)) => {
                    warn!(task = %seq.ctx.id(), %err, "cooperative task failed");
                    seq.ctx.throw(err);
                    seq.ctx.discard();
                    false
                }
                None => {
                    // An exhausted body that never reported completion would
                    // otherwise stay on the running queue forever.
                    if !seq.ctx.has_ran() {
                        seq.ctx.finished();
                    }
                    trace!(task = %seq.ctx.id(), "step sequence exhausted");
                    false
                }
            }
        });
        yielded
    }

    fn len(&self) -> usize {
        self.active.len()
    }

    fn clear(&mut self) {
        self.active.clear();
    }
}
