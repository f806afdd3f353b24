//! Regime-conditional return analytics.
//!
//! Provides:
//! - Forward returns over fixed horizons, tagged with the starting regime
//! - Interpolated quantile summaries per (regime, horizon) with sample gating

pub mod forward_returns;
pub mod quantile_engine;

pub use forward_returns::{
    forward_return, forward_samples, interpolated_quantile, ForwardReturnSample, ReturnKind,
};
pub use quantile_engine::{
    ConditionalQuantileEngine, QuantileConfig, QuantileError, QuantileEstimate, QuantilePoint,
    QuantileTable, RegimeQuantileSummary,
};
