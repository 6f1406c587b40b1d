//! Worker pool seam for threaded tasks.

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{Result, SchedulerError};

/// Boxed body dispatched to a worker thread
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs off the driving thread
pub trait WorkerPool: Send + Sync {
    /// Queue a job; returns immediately
    fn spawn(&self, job: Job);

    fn thread_count(&self) -> usize;
}

/// Worker pool backed by a dedicated rayon thread pool
pub struct RayonWorkerPool {
    pool: ThreadPool,
}

impl RayonWorkerPool {
    /// Build a pool with `threads` workers (0 = one per core)
    pub fn new(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("swell-worker-{i}"))
            .build()
            .map_err(|e| SchedulerError::WorkerPool(e.to_string()))?;
        debug!(threads = pool.current_num_threads(), "worker pool created");
        Ok(Self { pool })
    }
}

impl WorkerPool for RayonWorkerPool {
    fn spawn(&self, job: Job) {
        self.pool.spawn(job);
    }

    fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}
