use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::SimulationError;

/// Fraction of starting capital below which a path counts as ruined.
pub const RUIN_THRESHOLD: f64 = 0.1;

/// Retirement withdrawals are taken on every Nth trade.
pub const WITHDRAWAL_INTERVAL: usize = 20;

/// Reported instead of infinity when a gains/losses ratio has no losses.
pub const UNBOUNDED_RATIO: f64 = 999.0;

/// Percentile levels reported in the aggregate percentile table.
pub const PERCENTILE_LEVELS: [f64; 9] = [1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0];

/// Position sizing policy applied to every simulated trade
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PositionSizingMethod {
    /// Risk a fixed percentage of the base capital
    #[default]
    FixedPercent,
    /// Risk a fixed percentage of the starting capital, never compounding
    FixedDollar,
    /// Full Kelly fraction, capped at 25%
    Kelly,
    /// Half Kelly fraction, capped at 15%
    HalfKelly,
    /// Quarter Kelly fraction, capped at 10%
    QuarterKelly,
    /// Scale the stake up with the current winning streak
    AntiMartingale,
}

impl PositionSizingMethod {
    pub fn name(&self) -> &'static str {
        match self {
            PositionSizingMethod::FixedPercent => "Fixed Percent",
            PositionSizingMethod::FixedDollar => "Fixed Dollar",
            PositionSizingMethod::Kelly => "Kelly",
            PositionSizingMethod::HalfKelly => "Half Kelly",
            PositionSizingMethod::QuarterKelly => "Quarter Kelly",
            PositionSizingMethod::AntiMartingale => "Anti-Martingale",
        }
    }
}

/// Ordering effects applied on top of the random trade draw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SequenceRiskMode {
    #[default]
    Normal,
    /// The first `bad_start_losses` trades are forced losses
    BadStart,
    /// A fixed withdrawal is taken every 20th trade
    Retirement,
}

/// A market regime modifying the base trade statistics while it is active.
///
/// `probability` is a relative weight; weights need not sum to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRegime {
    pub id: String,
    pub name: String,
    pub probability: f64,
    /// Added to the base win rate (percentage points)
    pub win_rate_modifier: f64,
    pub avg_win_multiplier: f64,
    pub avg_loss_multiplier: f64,
    pub volatility_multiplier: f64,
}

impl MarketRegime {
    /// Flat regime used when regime switching is disabled.
    pub fn normal() -> Self {
        Self {
            id: "normal".to_string(),
            name: "Normal".to_string(),
            probability: 100.0,
            win_rate_modifier: 0.0,
            avg_win_multiplier: 1.0,
            avg_loss_multiplier: 1.0,
            volatility_multiplier: 1.0,
        }
    }

    /// Default bull / bear / sideways / volatile regime table.
    pub fn default_table() -> Vec<Self> {
        vec![
            Self {
                id: "bull".to_string(),
                name: "Bull Market".to_string(),
                probability: 30.0,
                win_rate_modifier: 10.0,
                avg_win_multiplier: 1.2,
                avg_loss_multiplier: 0.8,
                volatility_multiplier: 0.8,
            },
            Self {
                id: "bear".to_string(),
                name: "Bear Market".to_string(),
                probability: 20.0,
                win_rate_modifier: -15.0,
                avg_win_multiplier: 0.8,
                avg_loss_multiplier: 1.3,
                volatility_multiplier: 1.3,
            },
            Self {
                id: "sideways".to_string(),
                name: "Sideways".to_string(),
                probability: 35.0,
                win_rate_modifier: 0.0,
                avg_win_multiplier: 0.9,
                avg_loss_multiplier: 0.9,
                volatility_multiplier: 0.7,
            },
            Self {
                id: "volatile".to_string(),
                name: "High Volatility".to_string(),
                probability: 15.0,
                win_rate_modifier: -5.0,
                avg_win_multiplier: 1.5,
                avg_loss_multiplier: 1.5,
                volatility_multiplier: 2.0,
            },
        ]
    }
}

/// Input to a Monte Carlo run. Percent fields use a 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationConfig {
    pub starting_capital: f64,
    pub num_trades: usize,
    pub win_rate: f64,
    /// Average winning trade (positive magnitude)
    pub avg_win: f64,
    /// Average losing trade (positive magnitude)
    pub avg_loss: f64,
    pub position_sizing: PositionSizingMethod,
    pub risk_per_trade: f64,
    pub enable_compounding: bool,

    pub enable_regimes: bool,
    pub regimes: Vec<MarketRegime>,
    /// Mean number of trades a regime is held before resampling
    pub regime_switch_frequency: usize,

    /// Stop the path once drawdown reaches this percentage
    pub max_drawdown_stop: Option<f64>,

    pub sequence_risk_mode: SequenceRiskMode,
    pub bad_start_losses: usize,
    pub retirement_withdrawal: f64,

    pub include_slippage: bool,
    pub slippage_percent: f64,
    pub include_commission: bool,
    pub commission_per_trade: f64,

    pub trading_days_per_year: f64,
    pub avg_trades_per_day: f64,
    pub num_simulations: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            starting_capital: 10_000.0,
            num_trades: 100,
            win_rate: 55.0,
            avg_win: 150.0,
            avg_loss: 100.0,
            position_sizing: PositionSizingMethod::FixedPercent,
            risk_per_trade: 1.0,
            enable_compounding: false,
            enable_regimes: false,
            regimes: MarketRegime::default_table(),
            regime_switch_frequency: 20,
            max_drawdown_stop: None,
            sequence_risk_mode: SequenceRiskMode::Normal,
            bad_start_losses: 10,
            retirement_withdrawal: 500.0,
            include_slippage: false,
            slippage_percent: 0.1,
            include_commission: false,
            commission_per_trade: 1.0,
            trading_days_per_year: 252.0,
            avg_trades_per_day: 2.0,
            num_simulations: 1000,
        }
    }
}

impl SimulationConfig {
    /// Load a camelCase JSON config; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, SimulationError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Trades expected per calendar year of trading.
    pub fn trades_per_year(&self) -> f64 {
        self.trading_days_per_year * self.avg_trades_per_day
    }

    /// Length of the simulated horizon in years (0 when the cadence is unset).
    pub fn years(&self) -> f64 {
        let per_year = self.trades_per_year();
        if per_year > 0.0 {
            self.num_trades as f64 / per_year
        } else {
            0.0
        }
    }

    /// Sanity-check user supplied values.
    ///
    /// The engine itself tolerates any input; this is for outer surfaces that
    /// want to reject obviously broken forms before running.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let finite_fields = [
            ("startingCapital", self.starting_capital),
            ("winRate", self.win_rate),
            ("avgWin", self.avg_win),
            ("avgLoss", self.avg_loss),
            ("riskPerTrade", self.risk_per_trade),
            ("retirementWithdrawal", self.retirement_withdrawal),
            ("slippagePercent", self.slippage_percent),
            ("commissionPerTrade", self.commission_per_trade),
            ("tradingDaysPerYear", self.trading_days_per_year),
            ("avgTradesPerDay", self.avg_trades_per_day),
        ];
        for (field, value) in finite_fields {
            if !value.is_finite() {
                return Err(SimulationError::InvalidConfig(format!("{field} must be finite")));
            }
        }

        if self.starting_capital <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "startingCapital must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.win_rate) {
            return Err(SimulationError::InvalidConfig(
                "winRate must be between 0 and 100".to_string(),
            ));
        }
        if self.avg_win < 0.0 || self.avg_loss < 0.0 {
            return Err(SimulationError::InvalidConfig(
                "avgWin and avgLoss must be non-negative magnitudes".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.risk_per_trade) {
            return Err(SimulationError::InvalidConfig(
                "riskPerTrade must be between 0 and 100".to_string(),
            ));
        }
        if let Some(stop) = self.max_drawdown_stop {
            if !(stop > 0.0 && stop <= 100.0) {
                return Err(SimulationError::InvalidConfig(
                    "maxDrawdownStop must be in (0, 100]".to_string(),
                ));
            }
        }
        if !(0.0..=100.0).contains(&self.slippage_percent) {
            return Err(SimulationError::InvalidConfig(
                "slippagePercent must be between 0 and 100".to_string(),
            ));
        }
        if self.commission_per_trade < 0.0 || self.retirement_withdrawal < 0.0 {
            return Err(SimulationError::InvalidConfig(
                "commissionPerTrade and retirementWithdrawal must be non-negative".to_string(),
            ));
        }
        if self.trading_days_per_year <= 0.0 || self.avg_trades_per_day <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "tradingDaysPerYear and avgTradesPerDay must be positive".to_string(),
            ));
        }
        for regime in &self.regimes {
            let params = [
                regime.probability,
                regime.avg_win_multiplier,
                regime.avg_loss_multiplier,
                regime.volatility_multiplier,
            ];
            if params.iter().any(|v| !v.is_finite() || *v < 0.0) || !regime.win_rate_modifier.is_finite() {
                return Err(SimulationError::InvalidConfig(format!(
                    "regime '{}' has negative or non-finite parameters",
                    regime.id
                )));
            }
        }

        Ok(())
    }
}

/// Why a simulated path stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminationReason {
    /// All configured trades were executed
    #[default]
    Completed,
    /// Drawdown reached `max_drawdown_stop`
    MaxDrawdownStop,
    /// Capital fell below the ruin threshold or could not fund the next stake
    Ruin,
}

/// Running per-regime totals collected while a path is simulated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeTally {
    pub trades: usize,
    pub wins: usize,
    pub pnl_sum: f64,
    pub worst_drawdown: f64,
}

impl RegimeTally {
    pub fn record(&mut self, is_win: bool, pnl: f64, drawdown: f64) {
        self.trades += 1;
        if is_win {
            self.wins += 1;
        }
        self.pnl_sum += pnl;
        self.worst_drawdown = self.worst_drawdown.max(drawdown);
    }

    pub fn merge(&mut self, other: &RegimeTally) {
        self.trades += other.trades;
        self.wins += other.wins;
        self.pnl_sum += other.pnl_sum;
        self.worst_drawdown = self.worst_drawdown.max(other.worst_drawdown);
    }
}

/// One synthetic trading path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub final_capital: f64,
    pub total_return: f64,
    pub return_percent: f64,
    /// Largest peak-to-trough decline, in percent
    pub max_drawdown: f64,
    /// Capital after each trade, starting with the initial capital
    pub equity_curve: Vec<f64>,
    /// Drawdown percent for every point of `equity_curve`
    pub drawdown_curve: Vec<f64>,
    pub trades_executed: usize,
    pub termination: TerminationReason,
    pub num_wins: usize,
    pub num_losses: usize,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub profit_factor: f64,
    pub total_win_amount: f64,
    pub total_loss_amount: f64,
    pub total_withdrawn: f64,
    pub total_commission: f64,
    pub total_slippage: f64,
    /// Active regime id for every executed trade
    pub regime_history: Vec<String>,
    pub time_in_each_regime: BTreeMap<String, usize>,
    pub regime_stats: BTreeMap<String, RegimeTally>,
    pub drawdown_durations: Vec<usize>,
    pub recovery_times: Vec<usize>,
}

impl SimulationResult {
    pub fn is_ruined(&self) -> bool {
        self.termination == TerminationReason::Ruin
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdProbability {
    pub threshold: f64,
    pub probability: f64,
}

/// Kelly sizing derived from the configured and the realised edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KellyAnalysis {
    pub full: f64,
    pub half: f64,
    pub quarter: f64,
    /// Kelly fraction implied by the simulated trades
    pub observed: f64,
    pub observed_win_rate: f64,
    pub observed_payoff_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationSummary {
    pub avg_duration: f64,
    pub max_duration: usize,
    pub avg_recovery_time: f64,
    pub max_recovery_time: usize,
    pub avg_time_in_drawdown_percent: f64,
    /// Drawdown episodes still open when their path ended
    pub unrecovered_episodes: usize,
}

/// Expected P&L extrapolated from the mean per-trade result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnProjections {
    pub per_trade: f64,
    pub daily: f64,
    pub weekly: f64,
    pub monthly: f64,
    pub yearly: f64,
    pub daily_percent: f64,
    pub weekly_percent: f64,
    pub monthly_percent: f64,
    pub yearly_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileRow {
    pub percentile: f64,
    pub total_return: f64,
    pub return_percent: f64,
    pub max_drawdown: f64,
    pub final_capital: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimePerformance {
    pub regime_id: String,
    pub name: String,
    pub trades: usize,
    pub time_share_percent: f64,
    pub win_rate: f64,
    pub avg_return_per_trade: f64,
    pub worst_drawdown: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    /// Share of the population in this bin, in percent
    pub frequency: f64,
}

/// Statistics over every path of a Monte Carlo run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStatistics {
    pub num_simulations: usize,
    pub avg_trades_executed: f64,

    pub mean_return: f64,
    pub median_return: f64,
    pub std_dev_return: f64,
    pub min_return: f64,
    pub max_return: f64,
    pub mean_return_percent: f64,
    pub median_return_percent: f64,
    pub mean_final_capital: f64,
    pub median_final_capital: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,

    pub win_probability: f64,
    pub loss_probability: f64,
    pub breakeven_probability: f64,
    pub probability_of_ruin: f64,
    pub probability_of_drawdown_stop: f64,
    pub drawdown_exceedance: Vec<ThresholdProbability>,

    pub mean_max_drawdown: f64,
    pub median_max_drawdown: f64,
    pub worst_max_drawdown: f64,
    pub max_drawdown_95: f64,

    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub cvar_99: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub mar_ratio: f64,
    pub omega_ratio: f64,
    pub tail_ratio: f64,
    pub gain_to_pain_ratio: f64,
    pub profit_factor: f64,
    pub ulcer_index: f64,
    pub pain_index: f64,
    pub recovery_factor: f64,
    pub expectancy_per_trade: f64,
    pub cagr: f64,

    pub kelly: KellyAnalysis,

    pub avg_max_consecutive_wins: f64,
    pub avg_max_consecutive_losses: f64,
    pub worst_consecutive_losses: usize,

    pub durations: DurationSummary,
    pub projections: ReturnProjections,
    pub percentiles: Vec<PercentileRow>,
    pub regime_performance: Option<Vec<RegimePerformance>>,
    pub return_histogram: Vec<HistogramBin>,
    pub drawdown_histogram: Vec<HistogramBin>,
}
