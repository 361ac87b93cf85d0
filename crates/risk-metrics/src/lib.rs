pub mod distribution;
pub mod drawdown;
pub mod ratios;

pub use distribution::{
    histogram, histogram_with_edges, median_sorted, percentile_sorted, sorted_ascending,
};
pub use drawdown::{analyze_drawdowns, drawdown_curve, drawdown_percent, max_drawdown, DrawdownProfile};
pub use position_sizer::{kelly_fraction, optimal_f};
pub use ratios::*;
