//! Query descriptors and results.

use serde::{Deserialize, Serialize};

use crate::scaling::MAX_GRIDS;
use crate::solver::MIN_ERROR;
use crate::spectrum::DISPLACEMENT_CHANNELS;

/// What a query asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Height of the surface that ends up above the query position.
    #[default]
    Position,
    /// Displacement sampled at the literal query position, no inversion.
    Displacement,
}

/// Solver output for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueryResult {
    /// Surface height, including ocean level and overlay height.
    pub height: f32,
    /// Height contributed by the overlay source.
    pub overlay_height: f32,
    pub displacement_x: f32,
    pub displacement_z: f32,
    /// Unscaled displacement vector from each enabled grid.
    pub raw: [[f32; DISPLACEMENT_CHANNELS]; MAX_GRIDS],
    /// Solver iterations spent; 0 for direct sampling.
    pub iterations: u32,
    /// Squared horizontal residual of the last iteration.
    pub error: f32,
    /// The overlay marked this position as clipped.
    pub is_clipped: bool,
}

impl QueryResult {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One query: input position and flags plus the result written in place.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub pos_x: f32,
    pub pos_z: f32,
    /// Which of the spectrum's grids contribute to this query.
    pub sample_grids: [bool; MAX_GRIDS],
    /// Convergence tolerance in world units; floored at [`MIN_ERROR`].
    pub min_error: f32,
    pub mode: QueryMode,
    /// Caller-defined identifier, untouched by the solver.
    pub tag: u64,
    pub result: QueryResult,
}

impl QueryDescriptor {
    /// Position query at world `(x, z)` sampling every grid.
    pub fn new(x: f32, z: f32) -> Self {
        Self {
            pos_x: x,
            pos_z: z,
            sample_grids: [true; MAX_GRIDS],
            min_error: MIN_ERROR,
            mode: QueryMode::Position,
            tag: 0,
            result: QueryResult::default(),
        }
    }

    pub fn with_grids(mut self, sample_grids: [bool; MAX_GRIDS]) -> Self {
        self.sample_grids = sample_grids;
        self
    }

    pub fn with_min_error(mut self, min_error: f32) -> Self {
        self.min_error = min_error;
        self
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_tag(mut self, tag: u64) -> Self {
        self.tag = tag;
        self
    }

    /// Number of enabled grids among the first `active`.
    pub fn enabled_grids(&self, active: usize) -> usize {
        self.sample_grids
            .iter()
            .take(active.min(MAX_GRIDS))
            .filter(|enabled| **enabled)
            .count()
    }
}
