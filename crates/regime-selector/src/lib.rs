use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use sim_core::{MarketRegime, RandomSource, SimulationConfig};

/// Draw a regime with probability proportional to its weight.
///
/// Draws `u` in `[0, total_weight)` and returns the first regime whose
/// cumulative weight exceeds it. Falls back to the first regime when no
/// cumulative weight exceeds the draw (zero-sum weights, rounding at the
/// upper edge). Returns `None` only for an empty table.
pub fn select_regime<R>(regimes: &[MarketRegime], rng: &mut R) -> Option<usize>
where
    R: RandomSource + ?Sized,
{
    if regimes.is_empty() {
        return None;
    }

    let total_weight: f64 = regimes
        .iter()
        .map(|r| if r.probability.is_finite() { r.probability.max(0.0) } else { 0.0 })
        .sum();

    let target = rng.draw() * total_weight;
    let mut cumulative = 0.0;
    for (idx, regime) in regimes.iter().enumerate() {
        if regime.probability.is_finite() {
            cumulative += regime.probability.max(0.0);
        }
        if cumulative > target {
            return Some(idx);
        }
    }

    Some(0)
}

/// Number of trades to hold a freshly drawn regime: the switch frequency
/// jittered by up to ±50% so switches do not land on a fixed period.
pub fn hold_length<R>(switch_frequency: usize, rng: &mut R) -> usize
where
    R: RandomSource + ?Sized,
{
    let jitter = 0.5 + rng.draw();
    ((switch_frequency as f64 * jitter).round() as usize).max(1)
}

/// Snapshot of the selector, mostly useful for debugging a path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime_id: String,
    pub remaining_trades: usize,
}

/// Holds the active regime of a single path and resamples it when its
/// countdown expires.
///
/// When regimes are disabled (or the table is empty) the selector carries the
/// flat [`MarketRegime::normal`] regime for the whole path and never consumes
/// random draws.
#[derive(Debug, Clone)]
pub struct RegimeSelector<'a> {
    regimes: Cow<'a, [MarketRegime]>,
    switch_frequency: usize,
    current: usize,
    remaining: usize,
}

impl<'a> RegimeSelector<'a> {
    pub fn new(regimes: &'a [MarketRegime], switch_frequency: usize) -> Self {
        let regimes = if regimes.is_empty() {
            Cow::Owned(vec![MarketRegime::normal()])
        } else {
            Cow::Borrowed(regimes)
        };

        Self {
            regimes,
            switch_frequency,
            current: 0,
            remaining: 0,
        }
    }

    /// Single flat regime, no switching.
    pub fn flat() -> Self {
        Self {
            regimes: Cow::Owned(vec![MarketRegime::normal()]),
            switch_frequency: 0,
            current: 0,
            remaining: usize::MAX,
        }
    }

    pub fn from_config(config: &'a SimulationConfig) -> Self {
        if config.enable_regimes {
            Self::new(&config.regimes, config.regime_switch_frequency)
        } else {
            Self::flat()
        }
    }

    /// True when the selector can switch between more than one regime.
    pub fn is_switching(&self) -> bool {
        self.regimes.len() > 1
    }

    pub fn active(&self) -> &MarketRegime {
        &self.regimes[self.current]
    }

    /// Regime for the next trade, resampling first if the hold has expired.
    pub fn advance<R>(&mut self, rng: &mut R) -> &MarketRegime
    where
        R: RandomSource + ?Sized,
    {
        if self.is_switching() {
            if self.remaining == 0 {
                self.current = select_regime(&self.regimes, rng).unwrap_or(0);
                self.remaining = hold_length(self.switch_frequency, rng);
            }
            self.remaining -= 1;
        }

        &self.regimes[self.current]
    }

    pub fn state(&self) -> RegimeState {
        RegimeState {
            regime_id: self.active().id.clone(),
            remaining_trades: self.remaining,
        }
    }
}
