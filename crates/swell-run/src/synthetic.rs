//! Animated sum-of-sines spectrum.
//!
//! Stands in for an FFT ocean: each grid carries two periodic trochoidal
//! waves whose wavelength matches the grid's world size. The grids are
//! regenerated in place every tick, so query tasks exercise the copy-in-place
//! path of their reset.

use std::f32::consts::{FRAC_1_SQRT_2, TAU};

use swell_query::{
    DISPLACEMENT_CHANNELS, InterpolatedGrid, MAX_GRIDS, QueryError, SpectrumSnapshot,
    SpectrumSource,
};
use tracing::debug;

use crate::config::SpectrumConfig;

const GRAVITY: f32 = 9.81;

/// Second wave, travelling diagonally, relative to the first.
const CROSS_WAVE_SCALE: f32 = 0.5;

struct WaveLayer {
    amplitude: f32,
    /// Angular frequency from deep-water dispersion.
    omega: f32,
}

pub struct SyntheticSpectrum {
    snapshot: SpectrumSnapshot,
    layers: Vec<WaveLayer>,
    drift: [f32; 2],
    time: f32,
}

impl SyntheticSpectrum {
    pub fn new(config: &SpectrumConfig) -> Result<Self, QueryError> {
        let mut grid_sizes = [0.0; MAX_GRIDS];
        let mut choppiness = [0.0; MAX_GRIDS];
        let mut grids = Vec::with_capacity(config.world_sizes.len());
        let mut layers = Vec::with_capacity(config.world_sizes.len());

        for (i, world_size) in config.world_sizes.iter().take(MAX_GRIDS).enumerate() {
            let wave_number = TAU / world_size;
            grid_sizes[i] = *world_size;
            choppiness[i] = config.choppiness;
            layers.push(WaveLayer {
                amplitude: config.steepness / wave_number,
                omega: (GRAVITY * wave_number).sqrt(),
            });
            grids.push(
                InterpolatedGrid::new(config.grid_size, config.grid_size, DISPLACEMENT_CHANNELS)?
                    .with_half_pixel_offset(true),
            );
        }

        let snapshot = SpectrumSnapshot::new(grids, grid_sizes)?
            .with_choppiness(choppiness)
            .with_vertical_scale(config.vertical_scale);

        let mut spectrum = Self {
            snapshot,
            layers,
            drift: config.drift,
            time: 0.0,
        };
        spectrum.regenerate();
        Ok(spectrum)
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Step the animation and rewrite every grid in place.
    pub fn advance(&mut self, dt: f32) {
        self.time += dt;
        self.snapshot
            .set_offset([self.drift[0] * self.time, self.drift[1] * self.time]);
        self.regenerate();
    }

    fn regenerate(&mut self) {
        let time = self.time;
        for (grid, layer) in self.snapshot.grids_mut().iter_mut().zip(&self.layers) {
            write_layer(grid, layer, time);
        }
        debug!(time, "synthetic spectrum regenerated");
    }
}

fn write_layer(grid: &mut InterpolatedGrid, layer: &WaveLayer, time: f32) {
    let size = grid.width();
    let phase_t = layer.omega * time;
    for y in 0..size {
        let py = (y as f32 + 0.5) / size as f32 * TAU;
        for x in 0..size {
            let px = (x as f32 + 0.5) / size as f32 * TAU;
            let along = px - phase_t;
            // Diagonal wave number is sqrt(2) k, so its frequency scales by 2^(1/4).
            let cross = px + py - phase_t * std::f32::consts::SQRT_2.sqrt();

            let cross_amp = layer.amplitude * CROSS_WAVE_SCALE;
            let horizontal = cross_amp * cross.sin() * FRAC_1_SQRT_2;
            grid.set(x, y, 0, -layer.amplitude * along.sin() - horizontal);
            grid.set(x, y, 1, layer.amplitude * along.cos() + cross_amp * cross.cos());
            grid.set(x, y, 2, -horizontal);
        }
    }
}

impl SpectrumSource for SyntheticSpectrum {
    fn grid_size(&self) -> usize {
        self.snapshot.grid_size()
    }

    fn num_grids(&self) -> usize {
        self.snapshot.num_grids()
    }

    fn grid_sizes(&self) -> [f32; MAX_GRIDS] {
        self.snapshot.grid_sizes()
    }

    fn choppiness(&self) -> [f32; MAX_GRIDS] {
        self.snapshot.choppiness()
    }

    fn vertical_scale(&self) -> f32 {
        self.snapshot.vertical_scale()
    }

    fn offset(&self) -> [f32; 2] {
        self.snapshot.offset()
    }

    fn displacement_grids(&self) -> &[InterpolatedGrid] {
        self.snapshot.displacement_grids()
    }
}
