//! Swell Run - drives wave query batches against a synthetic ocean
//!
//! Loads a run config (or uses defaults), animates a sum-of-sines spectrum
//! and schedules query and bounds tasks against it every tick, then logs a
//! summary of the solved batches.

mod config;
mod error;
mod run;
mod synthetic;

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::RunConfig;
use crate::error::RunError;

#[derive(Parser, Debug)]
#[command(name = "swell-run")]
#[command(about = "Drive wave query batches against an animated synthetic ocean")]
struct Cli {
    /// Path to a JSON run config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of host ticks to drive
    #[arg(long)]
    ticks: Option<u64>,

    /// Descriptors per query batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Solve batches on the driving thread, a few descriptors per tick
    #[arg(long)]
    cooperative: bool,

    /// Worker pool size (0 = one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Run threaded tasks inline on the driving thread
    #[arg(long)]
    single_threaded: bool,
}

impl Cli {
    /// Command-line flags override the config file.
    fn apply(&self, config: &mut RunConfig) {
        if let Some(ticks) = self.ticks {
            config.ticks = ticks;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(threads) = self.threads {
            config.scheduler.worker_threads = threads;
        }
        config.cooperative |= self.cooperative;
        config.scheduler.disable_multithreading |= self.single_threaded;
    }

    fn load_config(&self) -> Result<RunConfig, RunError> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading config from: {}", path.display());
                RunConfig::load(path)?
            }
            None => RunConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,swell_scheduler=debug,swell_query=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let report = match run::run(&config) {
        Ok(report) => report,
        Err(e) => {
            error!("Run failed: {}", e);
            std::process::exit(1);
        }
    };

    let stats = &report.stats;
    info!(
        ticks = report.ticks,
        batches = stats.batches,
        queries = stats.queries,
        mean_iterations = stats.mean_iterations(),
        max_iterations = stats.max_iterations,
        unconverged = stats.unconverged,
        clipped = stats.clipped,
        "run complete"
    );
    if stats.queries > 0 {
        info!("Height range: {:.3} .. {:.3}", stats.min_height, stats.max_height);
    }
    match report.bounds {
        Some(bounds) => info!(
            "Displacement bounds: height {:.3} .. {:.3}, horizontal {:.3}",
            bounds.min_height, bounds.max_height, bounds.max_horizontal
        ),
        None => info!("No bounds scan completed"),
    }
}
