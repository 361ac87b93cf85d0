use std::collections::BTreeMap;

use position_sizer::{PositionSizer, SizingContext};
use regime_selector::RegimeSelector;
use risk_metrics::{analyze_drawdowns, bounded_ratio, drawdown_percent};
use sim_core::{
    RandomSource, RegimeTally, SequenceRiskMode, SimulationConfig, SimulationResult,
    TerminationReason, RUIN_THRESHOLD, WITHDRAWAL_INTERVAL,
};

/// Spread of the per-trade outcome multiplier at volatility 1.0 (±30%).
const BASE_TRADE_VARIANCE: f64 = 0.3;

/// Runs one synthetic trade sequence for a fixed configuration.
///
/// All path state (capital, peak, streaks, curves) lives on the stack of a
/// single [`run`](Self::run) call, so one simulator can be shared across
/// threads and every path is independent.
#[derive(Debug, Clone)]
pub struct TradeSequenceSimulator<'a> {
    config: &'a SimulationConfig,
    sizer: PositionSizer,
}

impl<'a> TradeSequenceSimulator<'a> {
    pub fn new(config: &'a SimulationConfig) -> Self {
        Self {
            config,
            sizer: PositionSizer::default(),
        }
    }

    pub fn with_sizer(mut self, sizer: PositionSizer) -> Self {
        self.sizer = sizer;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        self.config
    }

    /// Simulate a single path.
    ///
    /// The path stops early on ruin (capital below 10% of the start) or when
    /// drawdown reaches `max_drawdown_stop`.
    pub fn run<R>(&self, rng: &mut R) -> SimulationResult
    where
        R: RandomSource + ?Sized,
    {
        let config = self.config;
        let starting_capital = config.starting_capital;
        let ruin_level = starting_capital * RUIN_THRESHOLD;
        let mut regimes = RegimeSelector::from_config(config);

        let mut capital = starting_capital;
        let mut peak = starting_capital;
        let mut max_drawdown = 0.0_f64;

        let mut equity_curve = Vec::with_capacity(config.num_trades + 1);
        let mut drawdown_curve = Vec::with_capacity(config.num_trades + 1);
        equity_curve.push(capital);
        drawdown_curve.push(drawdown_percent(peak, capital));

        let mut regime_history: Vec<String> = Vec::with_capacity(config.num_trades);
        let mut time_in_each_regime: BTreeMap<String, usize> = BTreeMap::new();
        let mut regime_stats: BTreeMap<String, RegimeTally> = BTreeMap::new();

        let mut num_wins = 0usize;
        let mut num_losses = 0usize;
        let mut consecutive_wins = 0usize;
        let mut consecutive_losses = 0usize;
        let mut max_consecutive_wins = 0usize;
        let mut max_consecutive_losses = 0usize;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_win_amount = 0.0_f64;
        let mut total_loss_amount = 0.0_f64;
        let mut total_withdrawn = 0.0_f64;
        let mut total_commission = 0.0_f64;
        let mut total_slippage = 0.0_f64;
        let mut termination = TerminationReason::Completed;

        for trade_idx in 0..config.num_trades {
            if capital < ruin_level {
                termination = TerminationReason::Ruin;
                break;
            }

            // Effective parameters under the active regime
            let regime = regimes.advance(rng);
            let win_rate = (config.win_rate + regime.win_rate_modifier).clamp(0.0, 100.0);
            let avg_win = config.avg_win * regime.avg_win_multiplier;
            let avg_loss = config.avg_loss * regime.avg_loss_multiplier;
            let volatility = regime.volatility_multiplier;
            let regime_id = regime.id.clone();

            // The draw is consumed even for forced losses so that a bad start
            // and a normal run on the same seed diverge only in the forced trades.
            let roll = rng.draw();
            let forced_loss = config.sequence_risk_mode == SequenceRiskMode::BadStart
                && trade_idx < config.bad_start_losses;
            let drawn_win = !forced_loss && roll * 100.0 < win_rate;

            let base_capital = if config.enable_compounding {
                capital
            } else {
                starting_capital
            };
            let position = self.sizer.size(
                config.position_sizing,
                &SizingContext {
                    risk_per_trade: config.risk_per_trade,
                    base_capital,
                    starting_capital,
                    consecutive_wins,
                    win_rate,
                    avg_win,
                    avg_loss,
                },
            );

            let multiplier =
                (1.0 + (rng.draw() - 0.5) * 2.0 * (BASE_TRADE_VARIANCE * volatility)).max(0.0);
            let payoff_ratio = if avg_loss > 0.0 { avg_win / avg_loss } else { 1.0 };
            let mut pnl = if drawn_win {
                position * payoff_ratio * multiplier
            } else {
                -position * multiplier
            };

            // Signed: trims a win, shrinks a loss
            if config.include_slippage && config.slippage_percent > 0.0 {
                let slipped = pnl * (1.0 - config.slippage_percent / 100.0);
                total_slippage += pnl - slipped;
                pnl = slipped;
            }
            if config.include_commission {
                pnl -= config.commission_per_trade;
                total_commission += config.commission_per_trade;
            }

            if config.sequence_risk_mode == SequenceRiskMode::Retirement
                && (trade_idx + 1) % WITHDRAWAL_INTERVAL == 0
            {
                capital -= config.retirement_withdrawal;
                total_withdrawn += config.retirement_withdrawal;
            }

            capital += pnl;
            if capital > peak {
                peak = capital;
            }
            let drawdown = drawdown_percent(peak, capital);
            max_drawdown = max_drawdown.max(drawdown);

            let is_win = pnl > 0.0;
            if is_win {
                num_wins += 1;
                total_win_amount += pnl;
                largest_win = largest_win.max(pnl);
                consecutive_wins += 1;
                consecutive_losses = 0;
                max_consecutive_wins = max_consecutive_wins.max(consecutive_wins);
            } else {
                num_losses += 1;
                total_loss_amount += -pnl;
                largest_loss = largest_loss.max(-pnl);
                consecutive_losses += 1;
                consecutive_wins = 0;
                max_consecutive_losses = max_consecutive_losses.max(consecutive_losses);
            }

            regime_stats
                .entry(regime_id.clone())
                .or_default()
                .record(is_win, pnl, drawdown);
            *time_in_each_regime.entry(regime_id.clone()).or_insert(0) += 1;
            regime_history.push(regime_id);

            equity_curve.push(capital);
            drawdown_curve.push(drawdown);

            if capital < ruin_level {
                termination = TerminationReason::Ruin;
                break;
            }
            if let Some(stop) = config.max_drawdown_stop {
                if drawdown >= stop {
                    termination = TerminationReason::MaxDrawdownStop;
                    break;
                }
            }
        }

        let profile = analyze_drawdowns(&drawdown_curve);
        let total_return = capital - starting_capital;
        let return_percent = if starting_capital > 0.0 {
            total_return / starting_capital * 100.0
        } else {
            0.0
        };

        SimulationResult {
            final_capital: capital,
            total_return,
            return_percent,
            max_drawdown,
            trades_executed: regime_history.len(),
            termination,
            num_wins,
            num_losses,
            largest_win,
            largest_loss,
            max_consecutive_wins,
            max_consecutive_losses,
            profit_factor: bounded_ratio(total_win_amount, total_loss_amount),
            total_win_amount,
            total_loss_amount,
            total_withdrawn,
            total_commission,
            total_slippage,
            regime_history,
            time_in_each_regime,
            regime_stats,
            drawdown_durations: profile.durations,
            recovery_times: profile.recovery_times,
            equity_curve,
            drawdown_curve,
        }
    }
}
