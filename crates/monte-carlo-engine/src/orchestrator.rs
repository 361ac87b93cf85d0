use std::ops::Range;
use std::time::Instant;

use position_sizer::PositionSizer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use sim_core::{SimulationConfig, SimulationError, SimulationResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::simulator::TradeSequenceSimulator;

/// Paths simulated between two progress reports.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Derive an independent per-path seed (SplitMix64 finalizer).
pub fn path_seed(base_seed: u64, path_index: u64) -> u64 {
    let mut z = base_seed.wrapping_add(path_index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Runs `num_simulations` independent paths in batches.
///
/// Each batch is simulated in parallel on the rayon pool; between batches
/// the runner reports progress, yields to the async runtime and checks for
/// cancellation. Path `i` always uses the generator seeded with
/// `path_seed(base, i)`, so a fixed seed reproduces a run exactly regardless
/// of batch size or thread count.
#[derive(Debug, Clone)]
pub struct MonteCarloRunner {
    batch_size: usize,
    seed: Option<u64>,
    cancel: Option<CancellationToken>,
    sizer: PositionSizer,
}

impl Default for MonteCarloRunner {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            seed: None,
            cancel: None,
            sizer: PositionSizer::default(),
        }
    }
}

impl MonteCarloRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_sizer(mut self, sizer: PositionSizer) -> Self {
        self.sizer = sizer;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Simulate every path, reporting cumulative progress in percent.
    ///
    /// Progress is non-decreasing and the final report is exactly 100.0
    /// (a run with zero simulations reports 100.0 once). Returns
    /// [`SimulationError::Cancelled`] if the token fires before the last batch.
    pub async fn run_all<F>(
        &self,
        config: &SimulationConfig,
        mut on_progress: F,
    ) -> Result<Vec<SimulationResult>, SimulationError>
    where
        F: FnMut(f64),
    {
        let total = config.num_simulations;
        let base_seed = self.resolve_seed();
        self.log_start(config, base_seed);

        let started = Instant::now();
        let simulator = TradeSequenceSimulator::new(config).with_sizer(self.sizer.clone());
        let mut results = Vec::with_capacity(total);

        while results.len() < total {
            self.check_cancelled(results.len())?;

            let start = results.len();
            let end = (start + self.batch_size).min(total);
            results.extend(simulate_batch(&simulator, base_seed, start..end));

            on_progress(progress_percent(end, total));
            debug!(completed = end, total, "Batch complete");

            tokio::task::yield_now().await;
        }

        if total == 0 {
            on_progress(100.0);
        }

        info!(
            simulations = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Monte Carlo run complete"
        );
        Ok(results)
    }

    /// Synchronous variant of [`run_all`](Self::run_all) for callers outside
    /// an async runtime. Batching, seeding and cancellation behave the same.
    pub fn run_blocking(
        &self,
        config: &SimulationConfig,
    ) -> Result<Vec<SimulationResult>, SimulationError> {
        let total = config.num_simulations;
        let base_seed = self.resolve_seed();
        self.log_start(config, base_seed);

        let simulator = TradeSequenceSimulator::new(config).with_sizer(self.sizer.clone());
        let mut results = Vec::with_capacity(total);

        while results.len() < total {
            self.check_cancelled(results.len())?;
            let start = results.len();
            let end = (start + self.batch_size).min(total);
            results.extend(simulate_batch(&simulator, base_seed, start..end));
        }

        Ok(results)
    }

    fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| rand::thread_rng().gen())
    }

    fn check_cancelled(&self, completed: usize) -> Result<(), SimulationError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => {
                warn!(completed, "Monte Carlo run cancelled");
                Err(SimulationError::Cancelled { completed })
            }
            _ => Ok(()),
        }
    }

    fn log_start(&self, config: &SimulationConfig, base_seed: u64) {
        if config.enable_regimes && config.regimes.is_empty() {
            warn!("Regimes enabled with an empty regime table, using the normal regime");
        }
        info!(
            simulations = config.num_simulations,
            trades = config.num_trades,
            sizing = config.position_sizing.name(),
            regimes = config.enable_regimes,
            batch_size = self.batch_size,
            seed = base_seed,
            "Starting Monte Carlo run"
        );
    }
}

fn simulate_batch(
    simulator: &TradeSequenceSimulator<'_>,
    base_seed: u64,
    paths: Range<usize>,
) -> Vec<SimulationResult> {
    paths
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(path_seed(base_seed, i as u64));
            simulator.run(&mut rng)
        })
        .collect()
}

fn progress_percent(completed: usize, total: usize) -> f64 {
    if completed >= total {
        100.0
    } else {
        completed as f64 / total as f64 * 100.0
    }
}
