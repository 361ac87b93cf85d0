use sim_core::UNBOUNDED_RATIO;
use statrs::statistics::Statistics;

use crate::drawdown::drawdown_curve;

/// `numerator / denominator`, or 0 when the denominator is zero or the
/// result is not finite.
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() < 1e-12 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// Gains over losses, shared by profit factor, Omega and Gain-to-Pain.
///
/// No losses but some gains reports [`UNBOUNDED_RATIO`]; neither reports 0.
pub fn bounded_ratio(gains: f64, losses: f64) -> f64 {
    if losses > 1e-12 {
        safe_div(gains, losses)
    } else if gains > 0.0 {
        UNBOUNDED_RATIO
    } else {
        0.0
    }
}

/// Index of the left-tail cut-off for a confidence level: `floor(n * (1 - c))`,
/// kept inside the population.
fn tail_index(n: usize, confidence: f64) -> usize {
    let idx = (n as f64 * (1.0 - confidence)).floor();
    if idx.is_finite() && idx > 0.0 {
        (idx as usize).min(n - 1)
    } else {
        0
    }
}

/// Value at Risk over returns sorted ascending.
///
/// The loss magnitude at the `1 - confidence` percentile; 0 when that
/// percentile is a gain or there is no data.
pub fn value_at_risk(sorted_returns: &[f64], confidence: f64) -> f64 {
    if sorted_returns.is_empty() {
        return 0.0;
    }
    let idx = tail_index(sorted_returns.len(), confidence);
    (-sorted_returns[idx]).max(0.0)
}

/// Conditional VaR (expected shortfall): average loss of every return at or
/// below the VaR index. Always at least [`value_at_risk`] for the same input.
pub fn conditional_value_at_risk(sorted_returns: &[f64], confidence: f64) -> f64 {
    if sorted_returns.is_empty() {
        return 0.0;
    }
    let idx = tail_index(sorted_returns.len(), confidence);
    let tail = &sorted_returns[..=idx];
    let tail_mean = tail.iter().sum::<f64>() / tail.len() as f64;
    (-tail_mean).max(0.0)
}

/// Ulcer Index - measures the depth and duration of drawdowns.
///
/// UI = sqrt(mean((DD_i)^2)), with DD taken from the running peak of the
/// equity curve. Lower is better. Unlike max drawdown, Ulcer Index penalizes
/// prolonged drawdowns more than brief sharp ones.
pub fn ulcer_index(equity_curve: &[f64]) -> f64 {
    if equity_curve.is_empty() {
        return 0.0;
    }

    let drawdowns = drawdown_curve(equity_curve);
    let mean_sq_dd = drawdowns.iter().map(|dd| dd.powi(2)).sum::<f64>() / drawdowns.len() as f64;
    mean_sq_dd.sqrt()
}

/// Pain Index - arithmetic mean of a drawdown curve.
pub fn pain_index(drawdown_curve: &[f64]) -> f64 {
    if drawdown_curve.is_empty() {
        return 0.0;
    }
    drawdown_curve.iter().sum::<f64>() / drawdown_curve.len() as f64
}

/// Compound annual growth rate in percent.
pub fn cagr(starting_capital: f64, final_capital: f64, years: f64) -> f64 {
    if starting_capital <= 0.0 || years <= 0.0 {
        return 0.0;
    }
    if final_capital <= 0.0 {
        return -100.0;
    }
    let growth = (final_capital / starting_capital).powf(1.0 / years) - 1.0;
    if growth.is_finite() {
        growth * 100.0
    } else {
        0.0
    }
}

/// Calmar ratio: annualized return over the (median) max drawdown.
pub fn calmar_ratio(cagr_percent: f64, max_drawdown_percent: f64) -> f64 {
    safe_div(cagr_percent, max_drawdown_percent)
}

/// MAR ratio: return over the horizon, not annualized, per unit of max drawdown.
pub fn mar_ratio(return_percent: f64, max_drawdown_percent: f64) -> f64 {
    safe_div(return_percent, max_drawdown_percent)
}

/// Omega ratio: sum of gains above threshold / sum of losses below threshold.
pub fn omega_ratio(returns: &[f64], threshold: f64) -> f64 {
    let gains: f64 = returns.iter().map(|r| (r - threshold).max(0.0)).sum();
    let losses: f64 = returns.iter().map(|r| (threshold - r).max(0.0)).sum();
    bounded_ratio(gains, losses)
}

/// Tail ratio: |95th percentile| / |5th percentile| over ascending returns.
pub fn tail_ratio(sorted_returns: &[f64]) -> f64 {
    if sorted_returns.is_empty() {
        return 0.0;
    }
    let p95 = crate::distribution::percentile_sorted(sorted_returns, 95.0);
    let p5 = crate::distribution::percentile_sorted(sorted_returns, 5.0);
    safe_div(p95.abs(), p5.abs())
}

/// Gain-to-Pain ratio: total positive return over total absolute negative return.
pub fn gain_to_pain_ratio(returns: &[f64]) -> f64 {
    let gains: f64 = returns.iter().filter(|r| **r > 0.0).sum();
    let pain: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum();
    bounded_ratio(gains, pain)
}

/// Annualized Sharpe ratio of per-period returns (zero risk-free rate).
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let mean = returns.mean();
    let std = returns.std_dev();
    safe_div(mean, std) * periods_per_year.sqrt()
}

/// Annualized Sortino ratio: mean return over downside deviation.
pub fn sortino_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let downside_var = returns.iter().map(|r| r.min(0.0).powi(2)).sum::<f64>() / n;
    safe_div(mean, downside_var.sqrt()) * periods_per_year.sqrt()
}

/// Per-period simple returns of an equity curve. Periods starting from a
/// non-positive value are skipped.
pub fn period_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 3.0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n;
    let m2: f64 = values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let m3: f64 = values.iter().map(|r| (r - mean).powi(3)).sum::<f64>() / n;
    safe_div(m3, m2.sqrt().powi(3))
}

pub fn excess_kurtosis(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 4.0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n;
    let m2: f64 = values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let m4: f64 = values.iter().map(|r| (r - mean).powi(4)).sum::<f64>() / n;
    if m2 > 1e-15 {
        m4 / m2.powi(2) - 3.0
    } else {
        0.0
    }
}
