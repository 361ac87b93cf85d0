use std::collections::BTreeMap;

use position_sizer::optimal_f;
use risk_metrics::{
    bounded_ratio, cagr, calmar_ratio, conditional_value_at_risk, excess_kurtosis,
    gain_to_pain_ratio, histogram, histogram_with_edges, mar_ratio, median_sorted, omega_ratio,
    pain_index, percentile_sorted, period_returns, safe_div, sharpe_ratio, skewness,
    sortino_ratio, sorted_ascending, tail_ratio, ulcer_index, value_at_risk,
};
use sim_core::{
    AggregateStatistics, DurationSummary, KellyAnalysis, MarketRegime, PercentileRow,
    RegimePerformance, RegimeTally, ReturnProjections, SimulationConfig, SimulationResult,
    TerminationReason, ThresholdProbability, PERCENTILE_LEVELS,
};
use statrs::statistics::Statistics;

/// Bins in the total-return histogram.
pub const RETURN_HISTOGRAM_BINS: usize = 30;

/// Fixed bucket edges (percent) for the max-drawdown histogram.
pub const DRAWDOWN_BUCKETS: [f64; 7] = [0.0, 5.0, 10.0, 20.0, 30.0, 50.0, 100.0];

/// Max-drawdown levels reported as exceedance probabilities.
pub const DRAWDOWN_THRESHOLDS: [f64; 4] = [10.0, 20.0, 30.0, 50.0];

/// Paths whose total return is within this many currency units of zero
/// count as breakeven.
pub const BREAKEVEN_BAND: f64 = 0.01;

const TRADING_DAYS_PER_WEEK: f64 = 5.0;
const TRADING_DAYS_PER_MONTH: f64 = 21.0;

/// Reduce a set of simulated paths to distribution and risk statistics.
///
/// Pure over its inputs: the same results and configuration always produce
/// the same statistics. An empty result set yields zeroed statistics with the
/// percentile table still labelled.
pub fn aggregate(results: &[SimulationResult], config: &SimulationConfig) -> AggregateStatistics {
    if results.is_empty() {
        return empty_statistics(config);
    }

    let n = results.len() as f64;
    let start = config.starting_capital;

    let returns: Vec<f64> = results.iter().map(|r| r.total_return).collect();
    let return_pcts: Vec<f64> = results.iter().map(|r| r.return_percent).collect();
    let max_dds: Vec<f64> = results.iter().map(|r| r.max_drawdown).collect();
    let finals: Vec<f64> = results.iter().map(|r| r.final_capital).collect();

    let sorted_returns = sorted_ascending(&returns);
    let sorted_return_pcts = sorted_ascending(&return_pcts);
    let sorted_dds = sorted_ascending(&max_dds);
    let sorted_finals = sorted_ascending(&finals);

    let share = |count: usize| count as f64 / n * 100.0;

    let median_return = median_sorted(&sorted_returns);
    let median_return_percent = median_sorted(&sorted_return_pcts);
    let median_max_drawdown = median_sorted(&sorted_dds);
    let median_final_capital = median_sorted(&sorted_finals);

    let cagr_percent = cagr(start, median_final_capital, config.years());
    let periods_per_year = config.trades_per_year();

    let total_trades: usize = results.iter().map(|r| r.trades_executed).sum();
    let trading_pnl: f64 = results
        .iter()
        .map(|r| r.total_return + r.total_withdrawn)
        .sum();
    let expectancy = safe_div(trading_pnl, total_trades as f64);

    AggregateStatistics {
        num_simulations: results.len(),
        avg_trades_executed: total_trades as f64 / n,

        mean_return: returns.iter().mean(),
        median_return,
        std_dev_return: returns.iter().population_std_dev(),
        min_return: sorted_returns[0],
        max_return: sorted_returns[sorted_returns.len() - 1],
        mean_return_percent: return_pcts.iter().mean(),
        median_return_percent,
        mean_final_capital: finals.iter().mean(),
        median_final_capital,
        skewness: skewness(&returns),
        excess_kurtosis: excess_kurtosis(&returns),

        win_probability: share(count_where(results, |r| r.total_return >= BREAKEVEN_BAND)),
        loss_probability: share(count_where(results, |r| r.total_return <= -BREAKEVEN_BAND)),
        breakeven_probability: share(count_where(results, |r| {
            r.total_return.abs() < BREAKEVEN_BAND
        })),
        probability_of_ruin: share(count_where(results, |r| {
            r.termination == TerminationReason::Ruin
        })),
        probability_of_drawdown_stop: share(count_where(results, |r| {
            r.termination == TerminationReason::MaxDrawdownStop
        })),
        drawdown_exceedance: DRAWDOWN_THRESHOLDS
            .iter()
            .map(|&threshold| ThresholdProbability {
                threshold,
                probability: share(max_dds.iter().filter(|&&dd| dd >= threshold).count()),
            })
            .collect(),

        mean_max_drawdown: max_dds.iter().mean(),
        median_max_drawdown,
        worst_max_drawdown: sorted_dds[sorted_dds.len() - 1],
        max_drawdown_95: percentile_sorted(&sorted_dds, 95.0),

        var_95: value_at_risk(&sorted_returns, 0.95),
        var_99: value_at_risk(&sorted_returns, 0.99),
        cvar_95: conditional_value_at_risk(&sorted_returns, 0.95),
        cvar_99: conditional_value_at_risk(&sorted_returns, 0.99),
        sharpe_ratio: median_path_ratio(results, |rets| sharpe_ratio(rets, periods_per_year)),
        sortino_ratio: median_path_ratio(results, |rets| sortino_ratio(rets, periods_per_year)),
        calmar_ratio: calmar_ratio(cagr_percent, median_max_drawdown),
        mar_ratio: mar_ratio(median_return_percent, median_max_drawdown),
        omega_ratio: omega_ratio(&returns, 0.0),
        tail_ratio: tail_ratio(&sorted_returns),
        gain_to_pain_ratio: gain_to_pain_ratio(&returns),
        profit_factor: bounded_ratio(
            results.iter().map(|r| r.total_win_amount).sum(),
            results.iter().map(|r| r.total_loss_amount).sum(),
        ),
        ulcer_index: results.iter().map(|r| ulcer_index(&r.equity_curve)).sum::<f64>() / n,
        pain_index: results.iter().map(|r| pain_index(&r.drawdown_curve)).sum::<f64>() / n,
        recovery_factor: safe_div(median_return, median_max_drawdown * start / 100.0),
        expectancy_per_trade: expectancy,
        cagr: cagr_percent,

        kelly: kelly_analysis(results, config),

        avg_max_consecutive_wins: results
            .iter()
            .map(|r| r.max_consecutive_wins as f64)
            .sum::<f64>()
            / n,
        avg_max_consecutive_losses: results
            .iter()
            .map(|r| r.max_consecutive_losses as f64)
            .sum::<f64>()
            / n,
        worst_consecutive_losses: results
            .iter()
            .map(|r| r.max_consecutive_losses)
            .max()
            .unwrap_or(0),

        durations: duration_summary(results),
        projections: projections(expectancy, config),
        percentiles: PERCENTILE_LEVELS
            .iter()
            .map(|&p| PercentileRow {
                percentile: p,
                total_return: percentile_sorted(&sorted_returns, p),
                return_percent: percentile_sorted(&sorted_return_pcts, p),
                max_drawdown: percentile_sorted(&sorted_dds, p),
                final_capital: percentile_sorted(&sorted_finals, p),
            })
            .collect(),
        regime_performance: config
            .enable_regimes
            .then(|| regime_performance(results, config)),
        return_histogram: histogram(&returns, RETURN_HISTOGRAM_BINS),
        drawdown_histogram: histogram_with_edges(&max_dds, &DRAWDOWN_BUCKETS),
    }
}

fn empty_statistics(config: &SimulationConfig) -> AggregateStatistics {
    AggregateStatistics {
        kelly: kelly_analysis(&[], config),
        percentiles: PERCENTILE_LEVELS
            .iter()
            .map(|&percentile| PercentileRow {
                percentile,
                ..Default::default()
            })
            .collect(),
        drawdown_exceedance: DRAWDOWN_THRESHOLDS
            .iter()
            .map(|&threshold| ThresholdProbability {
                threshold,
                probability: 0.0,
            })
            .collect(),
        regime_performance: config.enable_regimes.then(Vec::new),
        drawdown_histogram: histogram_with_edges(&[], &DRAWDOWN_BUCKETS),
        ..Default::default()
    }
}

/// Median of a per-path ratio over paths with at least two trades.
fn median_path_ratio<F>(results: &[SimulationResult], ratio: F) -> f64
where
    F: Fn(&[f64]) -> f64,
{
    let values: Vec<f64> = results
        .iter()
        .filter(|r| r.trades_executed >= 2)
        .map(|r| ratio(&period_returns(&r.equity_curve)))
        .collect();
    median_sorted(&sorted_ascending(&values))
}

fn kelly_analysis(results: &[SimulationResult], config: &SimulationConfig) -> KellyAnalysis {
    let full = optimal_f(config.win_rate, config.avg_win, config.avg_loss);

    let wins: usize = results.iter().map(|r| r.num_wins).sum();
    let losses: usize = results.iter().map(|r| r.num_losses).sum();
    let win_amount: f64 = results.iter().map(|r| r.total_win_amount).sum();
    let loss_amount: f64 = results.iter().map(|r| r.total_loss_amount).sum();

    let observed_win_rate = safe_div(wins as f64, (wins + losses) as f64) * 100.0;
    let avg_win = safe_div(win_amount, wins as f64);
    let avg_loss = safe_div(loss_amount, losses as f64);

    KellyAnalysis {
        full,
        half: full / 2.0,
        quarter: full / 4.0,
        observed: optimal_f(observed_win_rate, avg_win, avg_loss),
        observed_win_rate,
        observed_payoff_ratio: safe_div(avg_win, avg_loss),
    }
}

fn duration_summary(results: &[SimulationResult]) -> DurationSummary {
    let durations: Vec<usize> = results
        .iter()
        .flat_map(|r| r.drawdown_durations.iter().copied())
        .collect();
    let recoveries: Vec<usize> = results
        .iter()
        .flat_map(|r| r.recovery_times.iter().copied())
        .collect();

    let time_in_drawdown: f64 = results
        .iter()
        .map(|r| {
            let under_water: usize = r.drawdown_durations.iter().sum();
            safe_div(under_water as f64, r.drawdown_curve.len() as f64) * 100.0
        })
        .sum::<f64>()
        / results.len().max(1) as f64;

    DurationSummary {
        avg_duration: mean_usize(&durations),
        max_duration: durations.iter().copied().max().unwrap_or(0),
        avg_recovery_time: mean_usize(&recoveries),
        max_recovery_time: recoveries.iter().copied().max().unwrap_or(0),
        avg_time_in_drawdown_percent: time_in_drawdown,
        unrecovered_episodes: durations.len().saturating_sub(recoveries.len()),
    }
}

fn projections(per_trade: f64, config: &SimulationConfig) -> ReturnProjections {
    let daily = per_trade * config.avg_trades_per_day;
    let weekly = daily * TRADING_DAYS_PER_WEEK;
    let monthly = daily * TRADING_DAYS_PER_MONTH;
    let yearly = daily * config.trading_days_per_year;
    let pct = |amount: f64| safe_div(amount, config.starting_capital) * 100.0;

    ReturnProjections {
        per_trade,
        daily,
        weekly,
        monthly,
        yearly,
        daily_percent: pct(daily),
        weekly_percent: pct(weekly),
        monthly_percent: pct(monthly),
        yearly_percent: pct(yearly),
    }
}

fn regime_performance(
    results: &[SimulationResult],
    config: &SimulationConfig,
) -> Vec<RegimePerformance> {
    let mut merged: BTreeMap<&str, RegimeTally> = BTreeMap::new();
    for result in results {
        for (id, tally) in &result.regime_stats {
            merged.entry(id.as_str()).or_default().merge(tally);
        }
    }
    let total_trades: usize = merged.values().map(|t| t.trades).sum();

    // Configured order first, then anything observed but not configured
    let mut order: Vec<&str> = Vec::new();
    for regime in &config.regimes {
        if !order.contains(&regime.id.as_str()) {
            order.push(regime.id.as_str());
        }
    }
    for &id in merged.keys() {
        if !order.contains(&id) {
            order.push(id);
        }
    }

    let fallback = MarketRegime::normal();
    order
        .into_iter()
        .map(|id| {
            let tally = merged.get(id).cloned().unwrap_or_default();
            let name = config
                .regimes
                .iter()
                .find(|r| r.id == id)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| {
                    if id == fallback.id {
                        fallback.name.clone()
                    } else {
                        id.to_string()
                    }
                });

            RegimePerformance {
                regime_id: id.to_string(),
                name,
                trades: tally.trades,
                time_share_percent: safe_div(tally.trades as f64, total_trades as f64) * 100.0,
                win_rate: safe_div(tally.wins as f64, tally.trades as f64) * 100.0,
                avg_return_per_trade: safe_div(tally.pnl_sum, tally.trades as f64),
                worst_drawdown: tally.worst_drawdown,
            }
        })
        .collect()
}

fn count_where<P>(results: &[SimulationResult], pred: P) -> usize
where
    P: Fn(&SimulationResult) -> bool,
{
    results.iter().filter(|r| pred(r)).count()
}

fn mean_usize(values: &[usize]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<usize>() as f64 / values.len() as f64
    }
}
