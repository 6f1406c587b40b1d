//! Tick loop driving query batches against the synthetic spectrum.
//!
//! Each tick the spectrum is regenerated. Whenever the query batch (or the
//! bounds scan) is idle it is reset against the fresh grids and scheduled
//! again; then the cooperative runner is stepped and the scheduler updated.

use std::f32::consts::TAU;
use std::sync::{Arc, Mutex, PoisonError};

use swell_query::{
    BoundsTask, DisplacementBounds, MIN_ERROR, OverlaySample, OverlaySource, QueryDescriptor,
    QueryTask,
};
use swell_scheduler::{Scheduler, TaskRef};
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::RunError;
use crate::synthetic::SyntheticSpectrum;

/// Golden angle, for spreading query points evenly over a disc.
const GOLDEN_ANGLE: f32 = 2.399_963;

/// Aggregate statistics over every delivered batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub batches: u64,
    pub queries: u64,
    pub total_iterations: u64,
    pub max_iterations: u32,
    /// Queries whose residual stayed above their tolerance.
    pub unconverged: u64,
    pub clipped: u64,
    pub min_height: f32,
    pub max_height: f32,
}

impl BatchStats {
    fn record(&mut self, descriptors: &[QueryDescriptor]) {
        if self.queries == 0 {
            self.min_height = f32::INFINITY;
            self.max_height = f32::NEG_INFINITY;
        }
        self.batches += 1;
        for descriptor in descriptors {
            let result = &descriptor.result;
            let tolerance = descriptor.min_error.max(MIN_ERROR);
            self.queries += 1;
            self.total_iterations += u64::from(result.iterations);
            self.max_iterations = self.max_iterations.max(result.iterations);
            if result.error > tolerance * tolerance {
                self.unconverged += 1;
            }
            if result.is_clipped {
                self.clipped += 1;
            }
            self.min_height = self.min_height.min(result.height);
            self.max_height = self.max_height.max(result.height);
        }
    }

    pub fn mean_iterations(&self) -> f64 {
        if self.queries == 0 {
            0.0
        } else {
            self.total_iterations as f64 / self.queries as f64
        }
    }
}

/// Summary returned after a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub ticks: u64,
    pub stats: BatchStats,
    /// Bounds from the last completed scan.
    pub bounds: Option<DisplacementBounds>,
}

/// Query positions spread over a disc of `radius` around the origin.
pub fn build_descriptors(config: &RunConfig, radius: f32) -> Vec<QueryDescriptor> {
    let count = config.batch_size;
    (0..count)
        .map(|i| {
            let r = radius * ((i as f32 + 0.5) / count as f32).sqrt();
            let angle = i as f32 * GOLDEN_ANGLE % TAU;
            QueryDescriptor::new(r * angle.cos(), r * angle.sin())
                .with_min_error(config.query.min_error)
                .with_mode(config.mode)
                .with_tag(i as u64)
        })
        .collect()
}

fn clip_overlay(radius: f32) -> Arc<dyn OverlaySource> {
    let radius_sq = radius * radius;
    Arc::new(move |x: f32, z: f32| OverlaySample {
        height: 0.0,
        clip: if x * x + z * z < radius_sq { 1.0 } else { 0.0 },
    })
}

pub fn run(config: &RunConfig) -> Result<RunReport, RunError> {
    config.validate()?;

    let mut scheduler = Scheduler::new(config.scheduler.clone())?;
    let mut spectrum = SyntheticSpectrum::new(&config.spectrum)?;

    let stats = Arc::new(Mutex::new(BatchStats::default()));
    let sink = Arc::clone(&stats);
    let on_batch = move |descriptors: &mut [QueryDescriptor]| {
        let mut stats = sink.lock().unwrap_or_else(PoisonError::into_inner);
        stats.record(descriptors);
        debug!(batch = stats.batches, queries = descriptors.len(), "query batch delivered");
    };

    let radius = config.spectrum.world_sizes.first().copied().unwrap_or(0.0);
    let descriptors = build_descriptors(config, radius);
    let query_task = Arc::new(if config.cooperative {
        let overlay = (config.clip_radius > 0.0).then(|| clip_overlay(config.clip_radius));
        QueryTask::cooperative(descriptors, config.query.yield_every, overlay, on_batch)
    } else {
        QueryTask::threaded(descriptors, on_batch)
    });

    let latest_bounds = Arc::new(Mutex::new(None));
    let bounds_sink = Arc::clone(&latest_bounds);
    let bounds_task = Arc::new(BoundsTask::new(move |bounds: DisplacementBounds| {
        debug!(?bounds, "displacement bounds updated");
        *bounds_sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(bounds);
    }));

    let query_ref: TaskRef = query_task.clone();
    let bounds_ref: TaskRef = bounds_task.clone();

    info!(
        ticks = config.ticks,
        batch_size = config.batch_size,
        cooperative = config.cooperative,
        grids = config.spectrum.world_sizes.len(),
        "starting run"
    );

    for tick in 0..config.ticks {
        spectrum.advance(config.spectrum.time_step);

        if scheduler.queue_of(&query_ref).is_none() {
            query_task.reset(&spectrum, config.query.ocean_level);
            scheduler.add(query_ref.clone());
        }
        if scheduler.queue_of(&bounds_ref).is_none() {
            bounds_task.reset(&spectrum);
            scheduler.add(bounds_ref.clone());
        }

        let stepped = scheduler.advance_cooperative();
        scheduler.update()?;
        debug!(
            tick,
            time = spectrum.time(),
            stepped,
            running = scheduler.running_count(),
            finishing = scheduler.finishing_count(),
            "tick complete"
        );
    }

    scheduler.shutdown();

    let stats = stats.lock().unwrap_or_else(PoisonError::into_inner).clone();
    let bounds = *latest_bounds.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(RunReport {
        ticks: config.ticks,
        stats,
        bounds,
    })
}
