//! sim-runner: run a Monte Carlo trading simulation and print a JSON report.
//!
//! Usage:
//!   cargo run -p sim-runner -- --config strategy.json --simulations 5000
//!   cargo run -p sim-runner -- --seed 42 --pretty
//!
//! `SIM_CONFIG` and `SIM_SEED` are read from the environment (or `.env`)
//! when the matching flag is absent. Ctrl-C cancels at the next batch boundary.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use monte_carlo_engine::{aggregate, MonteCarloRunner, DEFAULT_BATCH_SIZE};
use serde::Serialize;
use sim_core::{AggregateStatistics, SimulationConfig, SimulationError, SimulationResult};
use tokio_util::sync::CancellationToken;

/// Paths echoed in full in the report.
const SAMPLE_PATHS: usize = 5;
/// Progress is logged every this many percent.
const PROGRESS_LOG_STEP: f64 = 10.0;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    generated_at: DateTime<Utc>,
    config: SimulationConfig,
    statistics: AggregateStatistics,
    sample_paths: Vec<SimulationResult>,
}

#[derive(Debug, Default, PartialEq)]
struct RunnerOptions {
    config_path: Option<PathBuf>,
    seed: Option<u64>,
    simulations: Option<usize>,
    batch_size: usize,
    pretty: bool,
}

impl RunnerOptions {
    /// Parse flags, falling back to `SIM_CONFIG` / `SIM_SEED` via `env`.
    fn parse<F>(args: &[String], env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag_value = |name: &str| {
            args.iter()
                .position(|a| a == name)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        let config_path = flag_value("--config")
            .or_else(|| env("SIM_CONFIG"))
            .map(PathBuf::from);

        let seed = flag_value("--seed")
            .or_else(|| env("SIM_SEED"))
            .map(|v| v.parse::<u64>().with_context(|| format!("Invalid seed '{v}'")))
            .transpose()?;

        let simulations = flag_value("--simulations")
            .map(|v| {
                v.parse::<usize>()
                    .with_context(|| format!("Invalid simulation count '{v}'"))
            })
            .transpose()?;

        let batch_size = flag_value("--batch-size")
            .map(|v| v.parse::<usize>().with_context(|| format!("Invalid batch size '{v}'")))
            .transpose()?
            .unwrap_or(DEFAULT_BATCH_SIZE);

        Ok(Self {
            config_path,
            seed,
            simulations,
            batch_size,
            pretty: args.iter().any(|a| a == "--pretty"),
        })
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SimulationConfig> {
    match path {
        Some(path) => SimulationConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(SimulationConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sim_runner=info,monte_carlo_engine=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage:");
        eprintln!("  sim-runner [--config PATH] [--seed N] [--simulations N] [--batch-size N] [--pretty]");
        eprintln!();
        eprintln!("Environment:");
        eprintln!("  SIM_CONFIG   JSON config path used when --config is absent");
        eprintln!("  SIM_SEED     Base seed used when --seed is absent");
        return Ok(());
    }

    let options = RunnerOptions::parse(&args, |key| std::env::var(key).ok())?;
    let mut config = load_config(options.config_path.as_deref())?;
    if let Some(simulations) = options.simulations {
        config.num_simulations = simulations;
    }
    config.validate().context("Invalid simulation config")?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling after the current batch");
            ctrl_c.cancel();
        }
    });

    let mut runner = MonteCarloRunner::new()
        .with_batch_size(options.batch_size)
        .with_cancellation(cancel);
    if let Some(seed) = options.seed {
        runner = runner.with_seed(seed);
    }

    let mut next_log = PROGRESS_LOG_STEP;
    let results = match runner
        .run_all(&config, |progress| {
            if progress >= next_log {
                tracing::info!("Progress: {:.0}%", progress);
                while next_log <= progress {
                    next_log += PROGRESS_LOG_STEP;
                }
            }
        })
        .await
    {
        Ok(results) => results,
        Err(SimulationError::Cancelled { completed }) => {
            tracing::warn!("Run cancelled after {} simulations, no report written", completed);
            return Ok(());
        }
        Err(e) => return Err(e).context("Simulation failed"),
    };

    let statistics = aggregate(&results, &config);
    tracing::info!(
        "Median return {:.2} ({:.2}%), ruin probability {:.2}%, median max drawdown {:.2}%",
        statistics.median_return,
        statistics.median_return_percent,
        statistics.probability_of_ruin,
        statistics.median_max_drawdown
    );

    let report = SimulationReport {
        generated_at: Utc::now(),
        sample_paths: results.into_iter().take(SAMPLE_PATHS).collect(),
        config,
        statistics,
    };

    let json = if options.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("Failed to serialize report")?;
    println!("{json}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("sim-runner")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_defaults() {
        let options = RunnerOptions::parse(&args(&[]), |_| None).unwrap();
        assert_eq!(options.config_path, None);
        assert_eq!(options.seed, None);
        assert_eq!(options.simulations, None);
        assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!options.pretty);
    }

    #[test]
    fn test_parse_flags() {
        let options = RunnerOptions::parse(
            &args(&[
                "--config", "cfg.json", "--seed", "42", "--simulations", "250", "--batch-size",
                "50", "--pretty",
            ]),
            |_| None,
        )
        .unwrap();
        assert_eq!(options.config_path, Some(PathBuf::from("cfg.json")));
        assert_eq!(options.seed, Some(42));
        assert_eq!(options.simulations, Some(250));
        assert_eq!(options.batch_size, 50);
        assert!(options.pretty);
    }

    #[test]
    fn test_env_fallback_and_flag_precedence() {
        let env = |key: &str| match key {
            "SIM_CONFIG" => Some("env.json".to_string()),
            "SIM_SEED" => Some("7".to_string()),
            _ => None,
        };
        let from_env = RunnerOptions::parse(&args(&[]), env).unwrap();
        assert_eq!(from_env.config_path, Some(PathBuf::from("env.json")));
        assert_eq!(from_env.seed, Some(7));

        let from_flag = RunnerOptions::parse(&args(&["--seed", "9"]), env).unwrap();
        assert_eq!(from_flag.seed, Some(9));
    }

    #[test]
    fn test_parse_rejects_bad_numbers() {
        assert!(RunnerOptions::parse(&args(&["--seed", "abc"]), |_| None).is_err());
        assert!(RunnerOptions::parse(&args(&["--simulations", "-1"]), |_| None).is_err());
    }

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn test_partial_config_json() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"winRate": 60, "numTrades": 250, "positionSizing": "halfKelly"}"#)
                .unwrap();
        assert_eq!(config.win_rate, 60.0);
        assert_eq!(config.num_trades, 250);
        assert_eq!(config.starting_capital, SimulationConfig::default().starting_capital);
    }
}
