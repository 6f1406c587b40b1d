//! Run configuration, loaded from JSON.
//!
//! Every field is optional in the file; missing ones take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use swell_query::{MAX_GRIDS, QueryConfig, QueryMode};
use swell_scheduler::SchedulerConfig;

use crate::error::RunError;

/// Synthetic spectrum parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Texels per grid side.
    pub grid_size: usize,
    /// World extent of each grid, coarsest first.
    pub world_sizes: Vec<f32>,
    /// Wave amplitude times wave number; below ~0.3 the solver converges.
    pub steepness: f32,
    pub choppiness: f32,
    pub vertical_scale: f32,
    /// World units per second the patch drifts.
    pub drift: [f32; 2],
    /// Seconds per tick.
    pub time_step: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            grid_size: 64,
            world_sizes: vec![256.0, 64.0, 16.0],
            steepness: 0.15,
            choppiness: 1.0,
            vertical_scale: 1.0,
            drift: [0.5, 0.0],
            time_step: 1.0 / 60.0,
        }
    }
}

impl SpectrumConfig {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.grid_size < 2 {
            return Err(RunError::InvalidConfig(format!(
                "spectrum.grid_size must be >= 2, got {}",
                self.grid_size
            )));
        }
        if self.world_sizes.is_empty() || self.world_sizes.len() > MAX_GRIDS {
            return Err(RunError::InvalidConfig(format!(
                "spectrum.world_sizes needs 1 to {MAX_GRIDS} entries, got {}",
                self.world_sizes.len()
            )));
        }
        if let Some(size) = self.world_sizes.iter().find(|size| !size.is_finite() || **size <= 0.0) {
            return Err(RunError::InvalidConfig(format!(
                "spectrum.world_sizes entries must be > 0, got {size}"
            )));
        }
        let scalars = [
            ("steepness", self.steepness),
            ("choppiness", self.choppiness),
            ("vertical_scale", self.vertical_scale),
            ("time_step", self.time_step),
            ("drift[0]", self.drift[0]),
            ("drift[1]", self.drift[1]),
        ];
        if let Some((name, value)) = scalars.iter().find(|(_, value)| !value.is_finite()) {
            return Err(RunError::InvalidConfig(format!(
                "spectrum.{name} must be finite, got {value}"
            )));
        }
        Ok(())
    }
}

/// Everything one run of the driver needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub scheduler: SchedulerConfig,
    pub query: QueryConfig,
    pub spectrum: SpectrumConfig,
    /// Host ticks to drive.
    pub ticks: u64,
    /// Descriptors per query batch.
    pub batch_size: usize,
    /// Solve batches on the driving thread instead of the worker pool.
    pub cooperative: bool,
    pub mode: QueryMode,
    /// Radius around the origin the overlay clips; 0 disables the overlay.
    pub clip_radius: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            query: QueryConfig::default(),
            spectrum: SpectrumConfig::default(),
            ticks: 120,
            batch_size: 256,
            cooperative: false,
            mode: QueryMode::Position,
            clip_radius: 0.0,
        }
    }
}

impl RunConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self, RunError> {
        let data = std::fs::read_to_string(path).map_err(|source| RunError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| RunError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), RunError> {
        self.scheduler.validate()?;
        self.query.validate()?;
        self.spectrum.validate()?;
        if self.ticks == 0 {
            return Err(RunError::InvalidConfig("ticks must be > 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(RunError::InvalidConfig("batch_size must be > 0".to_string()));
        }
        if !self.clip_radius.is_finite() || self.clip_radius < 0.0 {
            return Err(RunError::InvalidConfig(format!(
                "clip_radius must be finite and >= 0, got {}",
                self.clip_radius
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_partial_config() {
        let file = write_config(
            r#"{
                "ticks": 10,
                "cooperative": true,
                "mode": "displacement",
                "scheduler": { "max_tasks_per_update": 4 },
                "spectrum": { "world_sizes": [100.0, 10.0] }
            }"#,
        );

        let config = RunConfig::load(file.path()).unwrap();

        assert_eq!(config.ticks, 10);
        assert!(config.cooperative);
        assert_eq!(config.mode, QueryMode::Displacement);
        assert_eq!(config.scheduler.max_tasks_per_update, 4);
        assert_eq!(config.scheduler.max_wait_ms, 1000);
        assert_eq!(config.spectrum.world_sizes, vec![100.0, 10.0]);
        assert_eq!(config.spectrum.grid_size, 64);
        assert_eq!(config.batch_size, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let file = write_config("{ ticks: ");
        assert!(matches!(
            RunConfig::load(file.path()),
            Err(RunError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(RunConfig::load(&missing), Err(RunError::Io { .. })));
    }

    #[test]
    fn test_validate_catches_nested_errors() {
        let mut config = RunConfig::default();
        config.query.yield_every = 0;
        assert!(matches!(config.validate(), Err(RunError::Query(_))));

        let mut config = RunConfig::default();
        config.scheduler.min_wait_ms = 5_000;
        assert!(matches!(config.validate(), Err(RunError::Scheduler(_))));

        let mut config = RunConfig::default();
        config.spectrum.world_sizes = vec![1.0; MAX_GRIDS + 1];
        assert!(matches!(config.validate(), Err(RunError::InvalidConfig(_))));

        let mut config = RunConfig::default();
        config.spectrum.world_sizes = vec![64.0, 0.0];
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.ticks = 0;
        assert!(config.validate().is_err());
    }
}
