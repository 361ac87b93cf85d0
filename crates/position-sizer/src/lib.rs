use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub use sim_core::PositionSizingMethod;

/// Kelly Criterion fraction of capital to risk per trade.
///
/// Formula: f* = (bp - q) / b
/// where:
///   b = payoff ratio (avg_win / avg_loss)
///   p = probability of winning
///   q = probability of losing (1 - p)
///
/// `win_rate` is a percentage (0-100). The result is unclamped and negative
/// when there is no edge; a non-positive average win or loss yields 0.
pub fn kelly_fraction(win_rate: f64, avg_win: f64, avg_loss: f64) -> f64 {
    if !(avg_win > 0.0 && avg_loss > 0.0) || !win_rate.is_finite() {
        return 0.0;
    }

    let p = (win_rate / 100.0).clamp(0.0, 1.0);
    let q = 1.0 - p;
    let b = avg_win / avg_loss;

    (p * b - q) / b
}

/// Kelly fraction clamped to `[0, 1]`.
pub fn optimal_f(win_rate: f64, avg_win: f64, avg_loss: f64) -> f64 {
    kelly_fraction(win_rate, avg_win, avg_loss).clamp(0.0, 1.0)
}

/// State of a path at the moment the next stake is sized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingContext {
    /// Risk per trade in percent (0-100)
    pub risk_per_trade: f64,
    /// Running capital when compounding, starting capital otherwise
    pub base_capital: f64,
    pub starting_capital: f64,
    pub consecutive_wins: usize,
    /// Effective win rate after regime modifiers, in percent
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
}

/// Position sizing calculator.
///
/// The Kelly caps bound the damage an over-estimated win rate can do:
/// even a large computed edge never stakes more than the cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizer {
    /// Cap on the full Kelly fraction (e.g., 0.25 = 25%)
    pub full_kelly_cap: f64,

    /// Cap on half-Kelly
    pub half_kelly_cap: f64,

    /// Cap on quarter-Kelly
    pub quarter_kelly_cap: f64,

    /// Stake increase per consecutive win for anti-martingale (0.2 = +20%)
    pub streak_step: f64,

    /// Maximum anti-martingale stake multiplier
    pub max_streak_multiplier: f64,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self {
            full_kelly_cap: 0.25,
            half_kelly_cap: 0.15,
            quarter_kelly_cap: 0.10,
            streak_step: 0.2,
            max_streak_multiplier: 2.0,
        }
    }
}

impl PositionSizer {
    pub fn new(
        full_kelly_cap: f64,
        half_kelly_cap: f64,
        quarter_kelly_cap: f64,
        streak_step: f64,
        max_streak_multiplier: f64,
    ) -> Result<Self> {
        for (label, cap) in [
            ("full_kelly_cap", full_kelly_cap),
            ("half_kelly_cap", half_kelly_cap),
            ("quarter_kelly_cap", quarter_kelly_cap),
        ] {
            if !(cap > 0.0 && cap <= 1.0) {
                bail!("{} must be between 0 and 1", label);
            }
        }
        if !(streak_step >= 0.0) {
            bail!("streak_step must be non-negative");
        }
        if !(max_streak_multiplier >= 1.0) {
            bail!("max_streak_multiplier must be at least 1");
        }

        Ok(Self {
            full_kelly_cap,
            half_kelly_cap,
            quarter_kelly_cap,
            streak_step,
            max_streak_multiplier,
        })
    }

    /// Fraction of base capital staked by a Kelly-family policy.
    ///
    /// Returns `None` for policies that do not use the Kelly criterion.
    pub fn kelly_stake_fraction(
        &self,
        method: PositionSizingMethod,
        win_rate: f64,
        avg_win: f64,
        avg_loss: f64,
    ) -> Option<f64> {
        let (multiplier, cap) = match method {
            PositionSizingMethod::Kelly => (1.0, self.full_kelly_cap),
            PositionSizingMethod::HalfKelly => (0.5, self.half_kelly_cap),
            PositionSizingMethod::QuarterKelly => (0.25, self.quarter_kelly_cap),
            _ => return None,
        };

        let raw = kelly_fraction(win_rate, avg_win, avg_loss);
        Some((raw * multiplier).clamp(0.0, cap))
    }

    /// Stake multiplier for the current winning streak.
    pub fn streak_multiplier(&self, consecutive_wins: usize) -> f64 {
        (1.0 + self.streak_step * consecutive_wins as f64).min(self.max_streak_multiplier)
    }

    /// Capital to risk on the next trade. Never negative.
    pub fn size(&self, method: PositionSizingMethod, ctx: &SizingContext) -> f64 {
        let risk = ctx.risk_per_trade / 100.0;

        let amount = match method {
            PositionSizingMethod::FixedPercent => ctx.base_capital * risk,
            PositionSizingMethod::FixedDollar => ctx.starting_capital * risk,
            PositionSizingMethod::Kelly
            | PositionSizingMethod::HalfKelly
            | PositionSizingMethod::QuarterKelly => {
                let fraction = self
                    .kelly_stake_fraction(method, ctx.win_rate, ctx.avg_win, ctx.avg_loss)
                    .unwrap_or(0.0);
                ctx.base_capital * fraction
            }
            PositionSizingMethod::AntiMartingale => {
                ctx.base_capital * risk * self.streak_multiplier(ctx.consecutive_wins)
            }
        };

        if amount.is_finite() {
            amount.max(0.0)
        } else {
            0.0
        }
    }
}
