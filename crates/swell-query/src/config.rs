//! Query batch configuration.

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::solver::MIN_ERROR;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Descriptors processed per step by cooperative query tasks.
    pub yield_every: usize,
    /// Height added to every result.
    pub ocean_level: f32,
    /// Default convergence tolerance for new descriptors.
    pub min_error: f32,
}

impl QueryConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.yield_every == 0 {
            return Err(QueryError::InvalidConfig(
                "yield_every must be > 0".to_string(),
            ));
        }
        if !self.ocean_level.is_finite() {
            return Err(QueryError::InvalidConfig(format!(
                "ocean_level must be finite, got {}",
                self.ocean_level
            )));
        }
        if !self.min_error.is_finite() || self.min_error < 0.0 {
            return Err(QueryError::InvalidConfig(format!(
                "min_error must be finite and non-negative, got {}",
                self.min_error
            )));
        }
        Ok(())
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            yield_every: 16,
            ocean_level: 0.0,
            min_error: MIN_ERROR,
        }
    }
}
