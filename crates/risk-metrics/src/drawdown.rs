use serde::{Deserialize, Serialize};

/// Drawdown duration and recovery statistics for one drawdown curve.
///
/// A drawdown episode is a contiguous run of strictly positive drawdown
/// samples. Its length counts as a duration and, once drawdown returns to
/// zero, as a recovery time. An episode still open at the end of the curve
/// has a duration but no recovery time: the path never recovered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawdownProfile {
    pub durations: Vec<usize>,
    pub avg_duration: f64,
    pub max_duration: usize,
    pub recovery_times: Vec<usize>,
    pub avg_recovery_time: f64,
    /// Percentage of samples with drawdown > 0
    pub time_in_drawdown_percent: f64,
}

impl DrawdownProfile {
    /// True when the final episode had not recovered by the end of the curve.
    pub fn ends_in_drawdown(&self) -> bool {
        self.durations.len() > self.recovery_times.len()
    }
}

/// Scan a drawdown curve once and collect episode statistics.
pub fn analyze_drawdowns(drawdown_curve: &[f64]) -> DrawdownProfile {
    if drawdown_curve.is_empty() {
        return DrawdownProfile::default();
    }

    let mut durations: Vec<usize> = Vec::new();
    let mut recovery_times: Vec<usize> = Vec::new();
    let mut current_len = 0usize;
    let mut samples_in_drawdown = 0usize;

    for &dd in drawdown_curve {
        if dd > 0.0 {
            current_len += 1;
            samples_in_drawdown += 1;
        } else if current_len > 0 {
            // Recovered
            durations.push(current_len);
            recovery_times.push(current_len);
            current_len = 0;
        }
    }

    // Ongoing drawdown at the end of the curve
    if current_len > 0 {
        durations.push(current_len);
    }

    DrawdownProfile {
        avg_duration: mean_len(&durations),
        max_duration: durations.iter().copied().max().unwrap_or(0),
        avg_recovery_time: mean_len(&recovery_times),
        time_in_drawdown_percent: samples_in_drawdown as f64 / drawdown_curve.len() as f64
            * 100.0,
        durations,
        recovery_times,
    }
}

/// Percentage drawdown from the running peak for every point of an equity curve.
pub fn drawdown_curve(equity_curve: &[f64]) -> Vec<f64> {
    let mut peak = f64::MIN;
    equity_curve
        .iter()
        .map(|&equity| {
            peak = peak.max(equity);
            drawdown_percent(peak, equity)
        })
        .collect()
}

/// `(peak - equity) / peak * 100`, or 0 when the peak is not positive.
pub fn drawdown_percent(peak: f64, equity: f64) -> f64 {
    if peak > 0.0 {
        ((peak - equity) / peak * 100.0).max(0.0)
    } else {
        0.0
    }
}

pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    drawdown_curve(equity_curve).into_iter().fold(0.0, f64::max)
}

fn mean_len(values: &[usize]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<usize>() as f64 / values.len() as f64
    }
}
