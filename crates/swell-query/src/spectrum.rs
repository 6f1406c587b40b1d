//! Spectrum collaborator and task-owned grid snapshots.
//!
//! The spectrum producer regenerates its displacement grids continuously. A
//! query batch never reads them directly: on reset it copies them into a
//! [`GridSnapshot`] it owns, so the solver runs without any locking.

use tracing::debug;

use crate::error::{QueryError, Result};
use crate::grid::InterpolatedGrid;
use crate::scaling::MAX_GRIDS;

/// Channels per displacement texel: horizontal x, vertical, horizontal z.
pub const DISPLACEMENT_CHANNELS: usize = 3;

/// Read-only view of the latest wave spectrum state.
pub trait SpectrumSource {
    /// Texel resolution shared by every displacement grid.
    fn grid_size(&self) -> usize;

    /// Number of active displacement grids, at most [`MAX_GRIDS`].
    fn num_grids(&self) -> usize;

    /// World-space extent covered by each grid.
    fn grid_sizes(&self) -> [f32; MAX_GRIDS];

    /// Horizontal displacement multiplier of each grid.
    fn choppiness(&self) -> [f32; MAX_GRIDS];

    /// Multiplier applied to the summed vertical displacement.
    fn vertical_scale(&self) -> f32;

    /// World-space offset added to every query position.
    fn offset(&self) -> [f32; 2];

    /// Latest displacement grids, coarsest first.
    fn displacement_grids(&self) -> &[InterpolatedGrid];
}

/// Owned spectrum state.
#[derive(Debug, Clone)]
pub struct SpectrumSnapshot {
    grids: Vec<InterpolatedGrid>,
    grid_sizes: [f32; MAX_GRIDS],
    choppiness: [f32; MAX_GRIDS],
    vertical_scale: f32,
    offset: [f32; 2],
}

impl SpectrumSnapshot {
    /// Build a snapshot from 1 to [`MAX_GRIDS`] grids sharing one layout.
    pub fn new(grids: Vec<InterpolatedGrid>, grid_sizes: [f32; MAX_GRIDS]) -> Result<Self> {
        let Some(first) = grids.first() else {
            return Err(QueryError::InvalidGrid("spectrum needs at least one grid".to_string()));
        };
        if grids.len() > MAX_GRIDS {
            return Err(QueryError::InvalidGrid(format!(
                "spectrum holds {} grids, at most {MAX_GRIDS} supported",
                grids.len()
            )));
        }
        if first.channels() < DISPLACEMENT_CHANNELS {
            return Err(QueryError::InvalidGrid(format!(
                "displacement grids need {DISPLACEMENT_CHANNELS} channels, got {}",
                first.channels()
            )));
        }
        if first.width() != first.height() {
            return Err(QueryError::InvalidGrid(format!(
                "displacement grids must be square, got {}x{}",
                first.width(),
                first.height()
            )));
        }
        if let Some(odd) = grids.iter().find(|grid| !grid.same_layout(first)) {
            return Err(QueryError::InvalidGrid(format!(
                "grid layout {}x{}x{} differs from {}x{}x{}",
                odd.width(),
                odd.height(),
                odd.channels(),
                first.width(),
                first.height(),
                first.channels()
            )));
        }
        Ok(Self {
            grids,
            grid_sizes,
            choppiness: [1.0; MAX_GRIDS],
            vertical_scale: 1.0,
            offset: [0.0; 2],
        })
    }

    pub fn with_choppiness(mut self, choppiness: [f32; MAX_GRIDS]) -> Self {
        self.choppiness = choppiness;
        self
    }

    pub fn with_vertical_scale(mut self, vertical_scale: f32) -> Self {
        self.vertical_scale = vertical_scale;
        self
    }

    pub fn with_offset(mut self, offset: [f32; 2]) -> Self {
        self.offset = offset;
        self
    }

    /// Mutable access for producers regenerating the grids in place.
    pub fn grids_mut(&mut self) -> &mut [InterpolatedGrid] {
        &mut self.grids
    }

    pub fn set_offset(&mut self, offset: [f32; 2]) {
        self.offset = offset;
    }
}

impl SpectrumSource for SpectrumSnapshot {
    fn grid_size(&self) -> usize {
        self.grids.first().map_or(0, InterpolatedGrid::width)
    }

    fn num_grids(&self) -> usize {
        self.grids.len()
    }

    fn grid_sizes(&self) -> [f32; MAX_GRIDS] {
        self.grid_sizes
    }

    fn choppiness(&self) -> [f32; MAX_GRIDS] {
        self.choppiness
    }

    fn vertical_scale(&self) -> f32 {
        self.vertical_scale
    }

    fn offset(&self) -> [f32; 2] {
        self.offset
    }

    fn displacement_grids(&self) -> &[InterpolatedGrid] {
        &self.grids
    }
}

/// How a [`GridSnapshot`] absorbed new grid data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSync {
    /// Grid count or layout changed; buffers were replaced.
    Reallocated,
    /// Layout matched; existing buffers were overwritten.
    Overwritten,
}

/// Task-owned copy of the displacement grids.
#[derive(Debug, Clone, Default)]
pub struct GridSnapshot {
    grids: Vec<InterpolatedGrid>,
}

impl GridSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `source` into the snapshot, reallocating only on a layout change.
    pub fn sync_from(&mut self, source: &[InterpolatedGrid]) -> SnapshotSync {
        debug_assert!(
            source
                .iter()
                .all(|grid| grid.channels() >= DISPLACEMENT_CHANNELS),
            "displacement grids need {DISPLACEMENT_CHANNELS} channels"
        );

        let same_layout = self.grids.len() == source.len()
            && self
                .grids
                .iter()
                .zip(source)
                .all(|(ours, theirs)| ours.same_layout(theirs));

        if same_layout {
            for (ours, theirs) in self.grids.iter_mut().zip(source) {
                ours.copy_from(theirs);
            }
            SnapshotSync::Overwritten
        } else {
            debug!(
                from = self.grids.len(),
                to = source.len(),
                "grid snapshot reallocated"
            );
            self.grids = source.to_vec();
            SnapshotSync::Reallocated
        }
    }

    pub fn grids(&self) -> &[InterpolatedGrid] {
        &self.grids
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(size: usize, value: f32) -> InterpolatedGrid {
        let mut grid = InterpolatedGrid::new(size, size, DISPLACEMENT_CHANNELS).unwrap();
        grid.fill(value);
        grid
    }

    #[test]
    fn test_snapshot_reallocates_then_overwrites() {
        let mut snapshot = GridSnapshot::new();
        assert!(snapshot.is_empty());

        let first = vec![grid(4, 1.0), grid(4, 2.0)];
        assert_eq!(snapshot.sync_from(&first), SnapshotSync::Reallocated);
        let buffer = snapshot.grids()[0].data().as_ptr();

        let second = vec![grid(4, 5.0), grid(4, 6.0)];
        assert_eq!(snapshot.sync_from(&second), SnapshotSync::Overwritten);
        assert_eq!(snapshot.grids()[0].data().as_ptr(), buffer);
        assert_eq!(snapshot.grids()[1].get(3, 3, 2), 6.0);
    }

    #[test]
    fn test_snapshot_reallocates_on_size_change() {
        let mut snapshot = GridSnapshot::new();
        snapshot.sync_from(&[grid(4, 1.0)]);
        assert_eq!(snapshot.sync_from(&[grid(8, 1.0)]), SnapshotSync::Reallocated);
        assert_eq!(snapshot.grids()[0].width(), 8);
        assert_eq!(snapshot.sync_from(&[grid(8, 1.0), grid(8, 1.0)]), SnapshotSync::Reallocated);
    }

    #[test]
    fn test_spectrum_rejects_mixed_layouts() {
        let err = SpectrumSnapshot::new(vec![grid(4, 0.0), grid(8, 0.0)], [1.0; MAX_GRIDS]);
        assert!(matches!(err, Err(QueryError::InvalidGrid(_))));
    }

    #[test]
    fn test_spectrum_rejects_too_few_channels() {
        let thin = InterpolatedGrid::new(4, 4, 1).unwrap();
        assert!(SpectrumSnapshot::new(vec![thin], [1.0; MAX_GRIDS]).is_err());
        assert!(SpectrumSnapshot::new(Vec::new(), [1.0; MAX_GRIDS]).is_err());
    }

    #[test]
    fn test_spectrum_reports_layout() {
        let spectrum = SpectrumSnapshot::new(vec![grid(16, 0.0); 3], [100.0, 30.0, 8.0, 0.0])
            .unwrap()
            .with_vertical_scale(2.0);
        assert_eq!(spectrum.grid_size(), 16);
        assert_eq!(spectrum.num_grids(), 3);
        assert_eq!(spectrum.vertical_scale(), 2.0);
        assert_eq!(spectrum.choppiness(), [1.0; MAX_GRIDS]);
    }
}
