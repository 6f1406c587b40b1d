//! Swell Query
//!
//! Answers "what is the wave height at world point (x, z) right now" against
//! continuously regenerated displacement grids, in batches scheduled on a
//! [`swell_scheduler::Scheduler`].
//!
//! # Modules
//!
//! - [`grid`] - [`InterpolatedGrid`] with wrap/clamp addressing and bilinear sampling
//! - [`scaling`] - World to grid coordinate mapping per batch
//! - [`solver`] - Direct and fixed-point displacement solves, extremum scan
//! - [`query`] - [`QueryDescriptor`] in, [`QueryResult`] out
//! - [`spectrum`] - Spectrum collaborator and task-owned grid snapshots
//! - [`overlay`] - Host overlay heights and clipping
//! - [`task`] - [`QueryTask`], threaded or cooperative
//! - [`bounds`] - [`BoundsTask`]
//!
//! # Flow
//!
//! ```text
//! descriptors ─► QueryTask::reset(spectrum) ─► Scheduler::add
//!     ─► worker thread or cooperative steps ─► solver per descriptor
//!     ─► Scheduler::update fires end ─► callback(descriptors)
//! ```

pub mod bounds;
pub mod config;
pub mod error;
pub mod grid;
pub mod overlay;
pub mod query;
pub mod scaling;
pub mod solver;
pub mod spectrum;
pub mod task;

pub use bounds::{BoundsCallback, BoundsTask};
pub use config::QueryConfig;
pub use error::{QueryError, Result};
pub use grid::{InterpolatedGrid, clamp_address, wrap_address};
pub use overlay::{OverlaySample, OverlaySource};
pub use query::{QueryDescriptor, QueryMode, QueryResult};
pub use scaling::{GridScaling, MAX_GRIDS};
pub use solver::{DisplacementBounds, MAX_HEIGHT, MAX_ITERATIONS, MIN_ERROR, find_bounds, solve};
pub use spectrum::{
    DISPLACEMENT_CHANNELS, GridSnapshot, SnapshotSync, SpectrumSnapshot, SpectrumSource,
};
pub use task::{QueryCallback, QueryTask};
