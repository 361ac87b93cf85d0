pub mod aggregate;
pub mod orchestrator;
pub mod simulator;

#[cfg(test)]
mod tests;

pub use aggregate::{aggregate, DRAWDOWN_BUCKETS, DRAWDOWN_THRESHOLDS, RETURN_HISTOGRAM_BINS};
pub use orchestrator::{path_seed, MonteCarloRunner, DEFAULT_BATCH_SIZE};
pub use simulator::TradeSequenceSimulator;
