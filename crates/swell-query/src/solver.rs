//! Displacement solver.
//!
//! Sampling the displacement grids at a world position returns the vector of
//! whatever surface point *started* there, not the one that ends up there.
//! With two or more grids the solver inverts the horizontal displacement by
//! fixed-point iteration; with one grid, or when the caller asks for raw
//! displacement, it samples directly.

use crate::grid::InterpolatedGrid;
use crate::query::{QueryDescriptor, QueryMode};
use crate::scaling::GridScaling;

/// Floor on the convergence tolerance, in world units.
pub const MIN_ERROR: f32 = 0.01;

/// Iteration cap of the fixed-point solve.
pub const MAX_ITERATIONS: u32 = 20;

/// Safety bound on reported heights.
pub const MAX_HEIGHT: f32 = 40.0;

/// Grids scanned by [`find_bounds`], coarsest first.
const BOUNDS_GRIDS: usize = 3;

fn clamp_height(height: f32) -> f32 {
    height.clamp(-MAX_HEIGHT, MAX_HEIGHT)
}

/// Solve one query in place against the first `scaling.num_grids()` grids.
///
/// The result is cleared first. Non-convergence is not an error: the last
/// estimate is written together with its iteration count and residual.
pub fn solve(grids: &[InterpolatedGrid], scaling: &mut GridScaling, query: &mut QueryDescriptor) {
    query.result.clear();
    let active = scaling.num_grids().min(grids.len());
    if query.mode == QueryMode::Displacement || query.enabled_grids(active) < 2 {
        sample_direct(&grids[..active], scaling, query);
    } else {
        sample_iterative(&grids[..active], scaling, query);
    }
}

/// Sample every enabled grid once at the query position.
///
/// Only the vertical component is resolved; horizontal displacement outputs
/// stay zero. Per-grid vectors are still reported in `raw`.
pub fn sample_direct(grids: &[InterpolatedGrid], scaling: &mut GridScaling, query: &mut QueryDescriptor) {
    let (x, z) = (query.pos_x, query.pos_z);
    let mut vertical = 0.0;
    for (index, grid) in grids.iter().enumerate() {
        if !query.sample_grids[index] {
            continue;
        }
        let sample = scaling.sample_grid(grid, index, x, z);
        query.result.raw[index] = sample;
        vertical += sample[1];
    }

    let result = &mut query.result;
    result.height = clamp_height(vertical * scaling.vertical_scale());
    result.displacement_x = 0.0;
    result.displacement_z = 0.0;
    result.iterations = 0;
    result.error = 0.0;
}

/// Find the source coordinate whose displaced position lands on the query.
///
/// Starting from the query position, each step moves the estimate by the
/// remaining horizontal miss and resamples. Stops once the squared miss is
/// within `max(min_error, MIN_ERROR)²` or after [`MAX_ITERATIONS`].
pub fn sample_iterative(
    grids: &[InterpolatedGrid],
    scaling: &mut GridScaling,
    query: &mut QueryDescriptor,
) {
    let (x, z) = (query.pos_x, query.pos_z);
    let tolerance = query.min_error.max(MIN_ERROR);
    let tolerance_sq = tolerance * tolerance;

    let (mut u, mut v) = (x, z);
    let (mut dx, mut dz) = (x, z);
    let mut iterations = 0;
    let mut error = 0.0;
    let mut height = 0.0;
    let mut displacement = (0.0, 0.0);

    while iterations < MAX_ITERATIONS {
        u += x - dx;
        v += z - dz;

        let mut disp_x = 0.0;
        let mut disp_z = 0.0;
        let mut vertical = 0.0;
        for (index, grid) in grids.iter().enumerate() {
            if !query.sample_grids[index] {
                continue;
            }
            let sample = scaling.sample_grid(grid, index, u, v);
            query.result.raw[index] = sample;
            let choppiness = scaling.choppiness(index);
            disp_x += sample[0] * choppiness;
            vertical += sample[1];
            disp_z += sample[2] * choppiness;
        }

        dx = u + disp_x;
        dz = v + disp_z;
        error = (x - dx) * (x - dx) + (z - dz) * (z - dz);
        iterations += 1;
        height = vertical * scaling.vertical_scale();
        displacement = (disp_x, disp_z);

        // NaN input never converges; stop at once.
        if error <= tolerance_sq || error.is_nan() {
            break;
        }
    }

    let result = &mut query.result;
    result.height = clamp_height(height);
    result.displacement_x = displacement.0;
    result.displacement_z = displacement.1;
    result.iterations = iterations;
    result.error = error;
}

/// Conservative world-space extent of the displaced surface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DisplacementBounds {
    pub min_height: f32,
    pub max_height: f32,
    /// Largest horizontal displacement any surface point can reach.
    pub max_horizontal: f32,
}

/// Scan the coarsest grids for the displacement extremes.
///
/// Only the first three active grids are scanned; the finest contributes
/// little amplitude. Per-grid extremes are summed, so the bound holds even
/// when every grid peaks at the same point. `is_cancelled` is polled once per
/// texel; a cancelled scan returns `None`.
pub fn find_bounds(
    grids: &[InterpolatedGrid],
    scaling: &GridScaling,
    is_cancelled: impl Fn() -> bool,
) -> Option<DisplacementBounds> {
    let active = scaling.num_grids().min(grids.len()).min(BOUNDS_GRIDS);
    let mut bounds = DisplacementBounds::default();

    for (index, grid) in grids.iter().take(active).enumerate() {
        let mut min_vertical = f32::INFINITY;
        let mut max_vertical = f32::NEG_INFINITY;
        let mut max_horizontal_sq: f32 = 0.0;

        for y in 0..grid.height() {
            for x in 0..grid.width() {
                if is_cancelled() {
                    return None;
                }
                let texel = grid.texel(x, y);
                min_vertical = min_vertical.min(texel[1]);
                max_vertical = max_vertical.max(texel[1]);
                max_horizontal_sq = max_horizontal_sq.max(texel[0] * texel[0] + texel[2] * texel[2]);
            }
        }

        bounds.min_height += min_vertical * scaling.vertical_scale();
        bounds.max_height += max_vertical * scaling.vertical_scale();
        bounds.max_horizontal += max_horizontal_sq.sqrt() * scaling.choppiness(index).abs();
    }

    if bounds.min_height > bounds.max_height {
        std::mem::swap(&mut bounds.min_height, &mut bounds.max_height);
    }
    Some(bounds)
}
