//! Per-batch grid scaling.
//!
//! Maps a world position onto each grid's normalized sample coordinates and
//! owns the scratch buffer the solver samples into. Exactly one task owns a
//! `GridScaling`; it is recomputed on every reset.

use crate::grid::InterpolatedGrid;
use crate::spectrum::{DISPLACEMENT_CHANNELS, SpectrumSource};

/// Upper bound on displacement grids per batch.
pub const MAX_GRIDS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct GridScaling {
    inv_grid_sizes: [f32; MAX_GRIDS],
    choppiness: [f32; MAX_GRIDS],
    vertical_scale: f32,
    offset: [f32; 2],
    num_grids: usize,
    scratch: Vec<f32>,
}

impl Default for GridScaling {
    fn default() -> Self {
        Self {
            inv_grid_sizes: [0.0; MAX_GRIDS],
            choppiness: [0.0; MAX_GRIDS],
            vertical_scale: 1.0,
            offset: [0.0; 2],
            num_grids: 0,
            scratch: vec![0.0; DISPLACEMENT_CHANNELS],
        }
    }
}

impl GridScaling {
    /// Scaling for `num_grids` grids of the given world sizes.
    ///
    /// A zero world size disables sampling of that grid's variation: every
    /// position maps to the grid origin.
    pub fn new(
        num_grids: usize,
        grid_sizes: [f32; MAX_GRIDS],
        choppiness: [f32; MAX_GRIDS],
        vertical_scale: f32,
    ) -> Self {
        let mut scaling = Self::default();
        scaling.set(num_grids, grid_sizes, choppiness, vertical_scale, [0.0; 2]);
        scaling
    }

    pub fn with_offset(mut self, offset: [f32; 2]) -> Self {
        self.offset = offset;
        self
    }

    /// Recompute from the spectrum's current sizes, choppiness, scale and offset.
    pub fn update_from(&mut self, source: &dyn SpectrumSource) {
        let num_grids = source.num_grids().min(source.displacement_grids().len());
        self.set(
            num_grids,
            source.grid_sizes(),
            source.choppiness(),
            source.vertical_scale(),
            source.offset(),
        );
        let channels = source
            .displacement_grids()
            .iter()
            .map(InterpolatedGrid::channels)
            .max()
            .unwrap_or(DISPLACEMENT_CHANNELS);
        self.reserve_scratch(channels);
    }

    fn set(
        &mut self,
        num_grids: usize,
        grid_sizes: [f32; MAX_GRIDS],
        choppiness: [f32; MAX_GRIDS],
        vertical_scale: f32,
        offset: [f32; 2],
    ) {
        self.num_grids = num_grids.min(MAX_GRIDS);
        for (inv, size) in self.inv_grid_sizes.iter_mut().zip(grid_sizes) {
            *inv = if size > 0.0 { size.recip() } else { 0.0 };
        }
        self.choppiness = choppiness;
        self.vertical_scale = vertical_scale;
        self.offset = offset;
    }

    fn reserve_scratch(&mut self, channels: usize) {
        let channels = channels.max(DISPLACEMENT_CHANNELS);
        if self.scratch.len() < channels {
            self.scratch.resize(channels, 0.0);
        }
    }

    pub fn num_grids(&self) -> usize {
        self.num_grids
    }

    pub fn inv_grid_size(&self, grid: usize) -> f32 {
        self.inv_grid_sizes[grid]
    }

    pub fn choppiness(&self, grid: usize) -> f32 {
        self.choppiness[grid]
    }

    pub fn vertical_scale(&self) -> f32 {
        self.vertical_scale
    }

    pub fn offset(&self) -> [f32; 2] {
        self.offset
    }

    /// Normalized sample coordinates of world `(x, z)` in grid `grid`.
    #[inline]
    pub fn grid_coords(&self, grid: usize, x: f32, z: f32) -> (f32, f32) {
        let inv = self.inv_grid_sizes[grid];
        ((x + self.offset[0]) * inv, (z + self.offset[1]) * inv)
    }

    /// Sample one grid at world `(x, z)`, returning its unscaled
    /// displacement vector.
    pub fn sample_grid(
        &mut self,
        grid: &InterpolatedGrid,
        index: usize,
        x: f32,
        z: f32,
    ) -> [f32; DISPLACEMENT_CHANNELS] {
        debug_assert!(
            grid.channels() >= DISPLACEMENT_CHANNELS,
            "displacement grid has {} channels",
            grid.channels()
        );
        self.reserve_scratch(grid.channels());
        let (u, v) = self.grid_coords(index, x, z);
        grid.sample(u, v, &mut self.scratch);
        [self.scratch[0], self.scratch[1], self.scratch[2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_sizes() {
        let scaling = GridScaling::new(2, [200.0, 50.0, 0.0, 0.0], [1.0; MAX_GRIDS], 1.0);
        assert_eq!(scaling.num_grids(), 2);
        assert_eq!(scaling.inv_grid_size(0), 0.005);
        assert_eq!(scaling.inv_grid_size(1), 0.02);
        assert_eq!(scaling.inv_grid_size(2), 0.0);
    }

    #[test]
    fn test_grid_coords_apply_offset() {
        let scaling = GridScaling::new(1, [10.0, 0.0, 0.0, 0.0], [1.0; MAX_GRIDS], 1.0)
            .with_offset([5.0, -5.0]);
        assert_eq!(scaling.grid_coords(0, 5.0, 10.0), (1.0, 0.5));
    }

    #[test]
    fn test_num_grids_is_capped() {
        let scaling = GridScaling::new(9, [1.0; MAX_GRIDS], [1.0; MAX_GRIDS], 1.0);
        assert_eq!(scaling.num_grids(), MAX_GRIDS);
    }

    #[test]
    fn test_sample_grid_reads_displacement_channels() {
        let mut grid = InterpolatedGrid::new(2, 2, 4).unwrap();
        for y in 0..2 {
            for x in 0..2 {
                grid.set(x, y, 0, 1.0);
                grid.set(x, y, 1, 2.0);
                grid.set(x, y, 2, 3.0);
                grid.set(x, y, 3, 9.0);
            }
        }
        let mut scaling = GridScaling::new(1, [8.0, 0.0, 0.0, 0.0], [1.0; MAX_GRIDS], 1.0);
        assert_eq!(scaling.sample_grid(&grid, 0, 3.0, -7.0), [1.0, 2.0, 3.0]);
    }
}
