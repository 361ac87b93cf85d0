use approx::assert_relative_eq;
use sim_core::{
    PositionSizingMethod, SequenceRiskMode, SimulationConfig, SimulationError, SimulationResult,
    TerminationReason,
};
use tokio_util::sync::CancellationToken;

use crate::aggregate::aggregate;
use crate::orchestrator::MonteCarloRunner;

/// Helper: a symmetric coin-flip strategy risking 1% of the starting capital.
fn coin_flip_config(num_simulations: usize) -> SimulationConfig {
    SimulationConfig {
        starting_capital: 10_000.0,
        num_trades: 100,
        win_rate: 50.0,
        avg_win: 100.0,
        avg_loss: 100.0,
        position_sizing: PositionSizingMethod::FixedPercent,
        risk_per_trade: 1.0,
        enable_compounding: false,
        enable_regimes: false,
        num_simulations,
        ..Default::default()
    }
}

/// Helper: run synchronously with a fixed seed.
fn run_seeded(config: &SimulationConfig, seed: u64) -> Vec<SimulationResult> {
    MonteCarloRunner::new()
        .with_seed(seed)
        .run_blocking(config)
        .unwrap()
}

/// Helper: worst drawdown seen over the first `trades` trades of a path.
fn early_drawdown(result: &SimulationResult, trades: usize) -> f64 {
    let end = (trades + 1).min(result.drawdown_curve.len());
    result.drawdown_curve[..end].iter().copied().fold(0.0, f64::max)
}

// =============================================================================
// Test 1: Every path starts at the starting capital and never reports a
// negative drawdown
// =============================================================================

#[test]
fn test_paths_are_well_formed() {
    let config = SimulationConfig {
        enable_regimes: true,
        enable_compounding: true,
        risk_per_trade: 3.0,
        num_simulations: 300,
        ..Default::default()
    };
    let results = run_seeded(&config, 11);

    assert_eq!(results.len(), 300);
    for r in &results {
        assert_eq!(r.equity_curve[0], config.starting_capital);
        assert_eq!(r.equity_curve.len(), r.trades_executed + 1);
        assert_eq!(r.drawdown_curve.len(), r.equity_curve.len());
        assert!(r.drawdown_curve.iter().all(|&dd| dd >= 0.0));
        assert!(r.max_drawdown >= 0.0);
        let curve_max = r.drawdown_curve.iter().copied().fold(0.0, f64::max);
        assert_relative_eq!(r.max_drawdown, curve_max);
        assert_relative_eq!(r.total_return, r.final_capital - config.starting_capital);
    }
}

// =============================================================================
// Test 2: Losing every trade at 100% risk ruins the account within two trades
// =============================================================================

#[test]
fn test_certain_loss_full_risk_ruins() {
    let config = SimulationConfig {
        win_rate: 0.0,
        risk_per_trade: 100.0,
        position_sizing: PositionSizingMethod::FixedPercent,
        enable_compounding: false,
        num_simulations: 200,
        ..Default::default()
    };
    let results = run_seeded(&config, 5);

    let ruin_level = config.starting_capital * 0.1;
    for r in &results {
        assert!(r.trades_executed <= 2);
        assert_eq!(r.termination, TerminationReason::Ruin);
        if r.trades_executed == 2 {
            assert!(r.equity_curve[1] >= ruin_level);
        }
    }
    let stats = aggregate(&results, &config);
    assert_relative_eq!(stats.probability_of_ruin, 100.0);
    assert_relative_eq!(stats.win_probability, 0.0);
}

// =============================================================================
// Test 3: Progress is non-decreasing and finishes at exactly 100
// =============================================================================

#[tokio::test]
async fn test_progress_reports() {
    let config = coin_flip_config(1_050);
    let mut reports = Vec::new();
    let results = MonteCarloRunner::new()
        .with_seed(1)
        .with_batch_size(100)
        .run_all(&config, |p| reports.push(p))
        .await
        .unwrap();

    assert_eq!(results.len(), 1_050);
    assert_eq!(reports.len(), 11);
    assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    assert!(reports.iter().all(|&p| (0.0..=100.0).contains(&p)));
    assert_eq!(*reports.last().unwrap(), 100.0);
}

// =============================================================================
// Test 4: Aggregation is pure
// =============================================================================

#[test]
fn test_aggregate_idempotent() {
    let config = SimulationConfig {
        enable_regimes: true,
        num_simulations: 250,
        ..Default::default()
    };
    let results = run_seeded(&config, 99);

    let first = aggregate(&results, &config);
    let second = aggregate(&results, &config);
    assert_eq!(first, second);
    assert_eq!(first.num_simulations, 250);
}

// =============================================================================
// Test 5: A zero-edge coin flip is centred on zero and never ruins
// =============================================================================

#[test]
fn test_coin_flip_distribution() {
    let config = coin_flip_config(2_000);
    let results = run_seeded(&config, 42);
    let stats = aggregate(&results, &config);

    assert_eq!(stats.num_simulations, 2_000);
    assert!(
        (stats.win_probability - 50.0).abs() < 5.0,
        "win probability {}",
        stats.win_probability
    );
    // Standard error of the mean is roughly 23 here
    assert!(stats.mean_return.abs() < 100.0, "mean return {}", stats.mean_return);
    assert_eq!(stats.probability_of_ruin, 0.0);
    assert!((stats.kelly.observed_win_rate - 50.0).abs() < 2.0);
    assert!(stats.kelly.full.abs() < 1e-12);
    assert!(stats.std_dev_return > 0.0);

    // Percentile table is ordered
    for w in stats.percentiles.windows(2) {
        assert!(w[0].total_return <= w[1].total_return);
    }
    assert!(stats.cvar_95 >= stats.var_95);
    assert!(stats.var_99 >= stats.var_95);
}

// =============================================================================
// Test 6: A forced losing streak deepens the early drawdown
// =============================================================================

#[test]
fn test_bad_start_deepens_early_drawdown() {
    let normal = SimulationConfig {
        win_rate: 70.0,
        num_simulations: 100,
        bad_start_losses: 10,
        ..Default::default()
    };
    let bad_start = SimulationConfig {
        sequence_risk_mode: SequenceRiskMode::BadStart,
        ..normal.clone()
    };

    let normal_paths = run_seeded(&normal, 17);
    let bad_paths = run_seeded(&bad_start, 17);

    let mut normal_total = 0.0;
    let mut bad_total = 0.0;
    for (n, b) in normal_paths.iter().zip(&bad_paths) {
        let n_dd = early_drawdown(n, 10);
        let b_dd = early_drawdown(b, 10);
        assert!(b_dd >= n_dd);
        assert!(b.max_consecutive_losses >= 10);
        normal_total += n_dd;
        bad_total += b_dd;
    }
    assert!(bad_total > normal_total);
}

// =============================================================================
// Test 7: Degenerate configurations complete without error
// =============================================================================

#[tokio::test]
async fn test_zero_simulations() {
    let config = coin_flip_config(0);
    let mut reports = Vec::new();
    let results = MonteCarloRunner::new()
        .run_all(&config, |p| reports.push(p))
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(reports, vec![100.0]);

    let stats = aggregate(&results, &config);
    assert_eq!(stats.num_simulations, 0);
    assert_eq!(stats.percentiles.len(), 9);
}

#[test]
fn test_zero_trades() {
    let config = SimulationConfig {
        num_trades: 0,
        ..coin_flip_config(20)
    };
    let results = run_seeded(&config, 3);
    let stats = aggregate(&results, &config);

    assert!(results.iter().all(|r| r.final_capital == 10_000.0));
    assert_relative_eq!(stats.breakeven_probability, 100.0);
    assert_eq!(stats.mean_max_drawdown, 0.0);
    assert_eq!(stats.expectancy_per_trade, 0.0);
    assert_eq!(stats.sharpe_ratio, 0.0);
}

#[test]
fn test_regimes_enabled_with_empty_table() {
    let config = SimulationConfig {
        enable_regimes: true,
        regimes: Vec::new(),
        ..coin_flip_config(30)
    };
    let results = run_seeded(&config, 4);
    let stats = aggregate(&results, &config);

    let regimes = stats.regime_performance.unwrap();
    assert_eq!(regimes.len(), 1);
    assert_eq!(regimes[0].regime_id, "normal");
    assert_relative_eq!(regimes[0].time_share_percent, 100.0);
}

// =============================================================================
// Test 8: Cancellation stops at a batch boundary
// =============================================================================

#[tokio::test]
async fn test_cancellation_between_batches() {
    let config = coin_flip_config(1_000);
    let token = CancellationToken::new();
    let trigger = token.clone();

    let outcome = MonteCarloRunner::new()
        .with_seed(8)
        .with_batch_size(100)
        .with_cancellation(token)
        .run_all(&config, |_| trigger.cancel())
        .await;

    assert_eq!(outcome, Err(SimulationError::Cancelled { completed: 100 }));
}

// =============================================================================
// Test 9: A fixed seed reproduces the run; a different seed does not
// =============================================================================

#[test]
fn test_seeded_runs_reproduce() {
    let config = SimulationConfig {
        enable_regimes: true,
        num_simulations: 80,
        ..Default::default()
    };
    let a = run_seeded(&config, 1234);
    let b = run_seeded(&config, 1234);
    let c = run_seeded(&config, 4321);

    assert_eq!(a, b);
    assert_ne!(a, c);
}

// =============================================================================
// Test 10: Regime breakdown reflects the regime modifiers
// =============================================================================

#[test]
fn test_regime_breakdown() {
    let config = SimulationConfig {
        enable_regimes: true,
        num_simulations: 400,
        ..Default::default()
    };
    let results = run_seeded(&config, 21);
    let stats = aggregate(&results, &config);

    let regimes = stats.regime_performance.unwrap();
    let ids: Vec<&str> = regimes.iter().map(|r| r.regime_id.as_str()).collect();
    assert_eq!(ids, vec!["bull", "bear", "sideways", "volatile"]);

    let share: f64 = regimes.iter().map(|r| r.time_share_percent).sum();
    assert_relative_eq!(share, 100.0, epsilon = 1e-9);

    let bull = &regimes[0];
    let bear = &regimes[1];
    assert!(bull.trades > 0 && bear.trades > 0);
    // 65% vs 40% effective win rate
    assert!(bull.win_rate > bear.win_rate + 10.0);
    assert!(bull.avg_return_per_trade > bear.avg_return_per_trade);
}

#[test]
fn test_regime_breakdown_absent_when_disabled() {
    let config = coin_flip_config(10);
    let stats = aggregate(&run_seeded(&config, 2), &config);
    assert!(stats.regime_performance.is_none());
}

// =============================================================================
// Test 11: Kelly sizing with compounding never stakes more than the account
// =============================================================================

#[test]
fn test_kelly_sizing_compounds_safely() {
    for method in [
        PositionSizingMethod::Kelly,
        PositionSizingMethod::HalfKelly,
        PositionSizingMethod::QuarterKelly,
        PositionSizingMethod::AntiMartingale,
        PositionSizingMethod::FixedDollar,
    ] {
        let config = SimulationConfig {
            position_sizing: method,
            enable_compounding: true,
            risk_per_trade: 2.0,
            num_simulations: 100,
            ..Default::default()
        };
        let results = run_seeded(&config, 31);
        let stats = aggregate(&results, &config);

        assert_eq!(stats.num_simulations, 100, "{}", method.name());
        assert!(stats.mean_final_capital.is_finite());
        assert!(results.iter().all(|r| r.final_capital.is_finite()));
    }
}

// =============================================================================
// Test 12: A drawdown stop ends paths early and is counted separately
// =============================================================================

#[test]
fn test_drawdown_stop_probability() {
    let config = SimulationConfig {
        win_rate: 30.0,
        risk_per_trade: 3.0,
        max_drawdown_stop: Some(15.0),
        num_simulations: 200,
        ..Default::default()
    };
    let results = run_seeded(&config, 6);
    let stats = aggregate(&results, &config);

    assert!(stats.probability_of_drawdown_stop > 50.0);
    assert!(stats.avg_trades_executed < config.num_trades as f64);
    for r in results
        .iter()
        .filter(|r| r.termination == TerminationReason::MaxDrawdownStop)
    {
        assert!(r.max_drawdown >= 15.0);
    }
}

// =============================================================================
// Test 13: Retirement withdrawals reduce final capital but not expectancy
// =============================================================================

#[test]
fn test_retirement_withdrawals_excluded_from_expectancy() {
    let plain = coin_flip_config(200);
    let retirement = SimulationConfig {
        sequence_risk_mode: SequenceRiskMode::Retirement,
        retirement_withdrawal: 100.0,
        ..plain.clone()
    };

    let plain_stats = aggregate(&run_seeded(&plain, 12), &plain);
    let retirement_paths = run_seeded(&retirement, 12);
    let retirement_stats = aggregate(&retirement_paths, &retirement);

    assert!(retirement_paths
        .iter()
        .all(|r| (r.total_withdrawn - 500.0).abs() < 1e-9));
    assert_relative_eq!(
        retirement_stats.mean_return,
        plain_stats.mean_return - 500.0,
        epsilon = 1e-6
    );
    assert_relative_eq!(
        retirement_stats.expectancy_per_trade,
        plain_stats.expectancy_per_trade,
        epsilon = 1e-9
    );
}

// =============================================================================
// Test 14: A stake larger than capital is still traded while above 10%
// =============================================================================

#[test]
fn test_oversized_stake_does_not_ruin() {
    let config = SimulationConfig {
        num_trades: 50,
        win_rate: 100.0,
        position_sizing: PositionSizingMethod::FixedDollar,
        risk_per_trade: 60.0,
        sequence_risk_mode: SequenceRiskMode::BadStart,
        bad_start_losses: 1,
        ..coin_flip_config(100)
    };
    let results = run_seeded(&config, 7);

    for r in &results {
        assert!(r.equity_curve[1] < 6_000.0);
        assert_eq!(r.trades_executed, 50);
        assert_eq!(r.termination, TerminationReason::Completed);
        assert!(r.final_capital > config.starting_capital);
    }
    let stats = aggregate(&results, &config);
    assert_relative_eq!(stats.probability_of_ruin, 0.0);
}
