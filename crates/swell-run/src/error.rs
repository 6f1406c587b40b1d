use std::path::PathBuf;

use swell_query::QueryError;
use swell_scheduler::SchedulerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid run config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Query(#[from] QueryError),
}
