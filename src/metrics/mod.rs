//! Regime metrics module.
//!
//! Provides descriptive statistics per fitted regime:
//! - Days, share of history, spell counts and mean spell length
//! - Mean daily return and annualized volatility
//! - Maximum drawdown within the regime
//! - Regime balance diagnostics

pub mod regime_stats;

pub use regime_stats::{
    DrawdownAnalysis, MetricsError, RegimeBalance, RegimeStats, RegimeStatsCalculator,
    MIN_REGIME_SHARE,
};
