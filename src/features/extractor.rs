//! Rolling feature extraction from a daily price series.
//!
//! Each output row corresponds to one date whose rolling windows are fully
//! populated. The first `warmup` dates never get a row.

use std::fmt;

use chrono::NaiveDate;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

use crate::data::PriceSeries;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("Insufficient data: need at least {required} prices, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid feature config: {0}")]
    InvalidConfig(String),
}

/// Named feature columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Log return over `return_window` days.
    LogReturn,
    /// Realized volatility over `volatility_window` days.
    RealizedVol,
    /// Realized volatility over `long_volatility_window` days.
    RealizedVolLong,
    /// ln(fast SMA / slow SMA).
    Trend,
    /// Close relative to its rolling maximum, minus one.
    Drawdown,
}

impl FeatureKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LogReturn => "log_return",
            Self::RealizedVol => "realized_vol",
            Self::RealizedVolLong => "realized_vol_long",
            Self::Trend => "trend",
            Self::Drawdown => "drawdown",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Window configuration for feature extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub return_window: usize,
    pub volatility_window: usize,
    pub long_volatility_window: usize,
    pub trend_fast_window: usize,
    pub trend_slow_window: usize,
    /// Rolling-maximum window for drawdown; `None` drops the column.
    pub drawdown_window: Option<usize>,
    /// Scale volatility by sqrt(trading_days_per_year).
    pub annualize: bool,
    pub trading_days_per_year: f64,
}

/// The 252-row drawdown window dominates the default warmup: a series needs
/// more than a year of rows before the first feature row, and shorter
/// histories should set `drawdown_window = None`.
impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            return_window: 1,
            volatility_window: 20,
            long_volatility_window: 60,
            trend_fast_window: 20,
            trend_slow_window: 60,
            drawdown_window: Some(252),
            annualize: true,
            trading_days_per_year: 252.0,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), FeatureError> {
        let windows = [
            ("return_window", self.return_window),
            ("trend_fast_window", self.trend_fast_window),
            ("trend_slow_window", self.trend_slow_window),
            ("drawdown_window", self.drawdown_window.unwrap_or(1)),
        ];
        for (name, window) in windows {
            if window == 0 {
                return Err(FeatureError::InvalidConfig(format!("{} must be >= 1", name)));
            }
        }

        if self.volatility_window < 2 || self.long_volatility_window < 2 {
            return Err(FeatureError::InvalidConfig(
                "volatility windows must be >= 2".to_string(),
            ));
        }
        if self.trend_fast_window >= self.trend_slow_window {
            return Err(FeatureError::InvalidConfig(format!(
                "trend_fast_window ({}) must be < trend_slow_window ({})",
                self.trend_fast_window, self.trend_slow_window
            )));
        }
        if !(self.trading_days_per_year > 0.0) {
            return Err(FeatureError::InvalidConfig(
                "trading_days_per_year must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of leading dates without a feature row.
    pub fn warmup(&self) -> usize {
        [
            self.return_window,
            self.volatility_window,
            self.long_volatility_window,
            self.trend_slow_window,
            self.drawdown_window.unwrap_or(0),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Columns produced, in order.
    pub fn kinds(&self) -> Vec<FeatureKind> {
        let mut kinds = vec![
            FeatureKind::LogReturn,
            FeatureKind::RealizedVol,
            FeatureKind::RealizedVolLong,
            FeatureKind::Trend,
        ];
        if self.drawdown_window.is_some() {
            kinds.push(FeatureKind::Drawdown);
        }
        kinds
    }
}

/// Feature rows aligned to dates.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    kinds: Vec<FeatureKind>,
    dates: Vec<NaiveDate>,
    values: Array2<f64>,
    warmup: usize,
}

impl FeatureMatrix {
    pub fn new(
        kinds: Vec<FeatureKind>,
        dates: Vec<NaiveDate>,
        values: Array2<f64>,
        warmup: usize,
    ) -> Result<Self, FeatureError> {
        if values.nrows() != dates.len() || values.ncols() != kinds.len() {
            return Err(FeatureError::InvalidConfig(format!(
                "shape {:?} does not match {} dates x {} features",
                values.dim(),
                dates.len(),
                kinds.len()
            )));
        }
        Ok(Self {
            kinds,
            dates,
            values,
            warmup,
        })
    }

    pub fn kinds(&self) -> &[FeatureKind] {
        &self.kinds
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn warmup(&self) -> usize {
        self.warmup
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.kinds.len()
    }

    pub fn column_index(&self, kind: FeatureKind) -> Option<usize> {
        self.kinds.iter().position(|k| *k == kind)
    }

    pub fn column(&self, kind: FeatureKind) -> Option<ArrayView1<'_, f64>> {
        self.column_index(kind).map(|idx| self.values.column(idx))
    }

    /// Value of a feature on the last row.
    pub fn latest(&self, kind: FeatureKind) -> Option<f64> {
        let idx = self.column_index(kind)?;
        let last = self.len().checked_sub(1)?;
        Some(self.values[[last, idx]])
    }
}

/// Builds a `FeatureMatrix` from closes.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Shortest series that yields one feature row.
    pub fn min_length(&self) -> usize {
        self.config.warmup() + 1
    }

    pub fn extract(&self, series: &PriceSeries) -> Result<FeatureMatrix, FeatureError> {
        self.config.validate()?;

        let warmup = self.config.warmup();
        let n = series.len();
        if n < warmup + 1 {
            return Err(FeatureError::InsufficientData {
                required: warmup + 1,
                actual: n,
            });
        }

        let closes = series.closes();
        let dates = series.dates();

        // returns[i] = ln(c[i] / c[i-1]); returns[0] is unused
        let mut returns = vec![0.0; n];
        for i in 1..n {
            returns[i] = (closes[i] / closes[i - 1]).ln();
        }

        let mut prefix = vec![0.0; n + 1];
        for i in 0..n {
            prefix[i + 1] = prefix[i] + closes[i];
        }
        let sma = |end: usize, window: usize| (prefix[end + 1] - prefix[end + 1 - window]) / window as f64;

        let vol_scale = if self.config.annualize {
            self.config.trading_days_per_year.sqrt()
        } else {
            1.0
        };
        let realized_vol = |end: usize, window: usize| {
            returns[end + 1 - window..=end].iter().std_dev() * vol_scale
        };

        let kinds = self.config.kinds();
        let rows = n - warmup;
        let mut values = Array2::zeros((rows, kinds.len()));

        for (row, i) in (warmup..n).enumerate() {
            for (col, kind) in kinds.iter().enumerate() {
                values[[row, col]] = match kind {
                    FeatureKind::LogReturn => {
                        (closes[i] / closes[i - self.config.return_window]).ln()
                    }
                    FeatureKind::RealizedVol => realized_vol(i, self.config.volatility_window),
                    FeatureKind::RealizedVolLong => {
                        realized_vol(i, self.config.long_volatility_window)
                    }
                    FeatureKind::Trend => {
                        (sma(i, self.config.trend_fast_window)
                            / sma(i, self.config.trend_slow_window))
                        .ln()
                    }
                    FeatureKind::Drawdown => {
                        let window = self.config.drawdown_window.unwrap_or(1);
                        let peak = closes[i + 1 - window..=i]
                            .iter()
                            .copied()
                            .fold(f64::MIN, f64::max);
                        closes[i] / peak - 1.0
                    }
                };
            }
        }

        FeatureMatrix::new(kinds, dates[warmup..].to_vec(), values, warmup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
    }

    fn small_config() -> FeatureConfig {
        FeatureConfig {
            return_window: 1,
            volatility_window: 2,
            long_volatility_window: 3,
            trend_fast_window: 2,
            trend_slow_window: 3,
            drawdown_window: Some(3),
            annualize: false,
            trading_days_per_year: 252.0,
        }
    }

    fn wavy(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 * (1.0 + 0.01 * (i as f64 * 0.3).sin()) * (1.0 + 0.0005 * i as f64))
            .collect()
    }

    #[test]
    fn test_warmup_boundary() {
        let extractor = FeatureExtractor::default();
        assert_eq!(extractor.min_length(), 253);

        let exact = PriceSeries::from_closes("SPY", start(), &wavy(253)).unwrap();
        let matrix = extractor.extract(&exact).unwrap();
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix.warmup(), 252);
        assert_eq!(matrix.dates()[0], exact.last_date().unwrap());

        let short = PriceSeries::from_closes("SPY", start(), &wavy(252)).unwrap();
        assert_eq!(
            extractor.extract(&short),
            Err(FeatureError::InsufficientData {
                required: 253,
                actual: 252
            })
        );
    }

    #[test]
    fn test_length_invariant() {
        let series = PriceSeries::from_closes("SPY", start(), &wavy(400)).unwrap();
        let matrix = FeatureExtractor::default().extract(&series).unwrap();
        assert_eq!(matrix.len(), series.len() - matrix.warmup());
        assert_eq!(matrix.n_features(), 5);
    }

    #[test]
    fn test_known_values() {
        let closes = [100.0, 110.0, 99.0, 99.0, 108.9];
        let series = PriceSeries::from_closes("SPY", start(), &closes).unwrap();
        let matrix = FeatureExtractor::new(small_config()).extract(&series).unwrap();
        assert_eq!(matrix.len(), 2);

        let r1 = (1.1f64).ln();
        let r2 = (0.9f64).ln();
        let v = matrix.values();
        let tol = 1e-12;

        // Row for index 3
        assert!((v[[0, 0]] - 0.0).abs() < tol);
        assert!((v[[0, 1]] - r2.abs() / 2f64.sqrt()).abs() < tol);
        let mean = (r1 + r2) / 3.0;
        let long = (((r1 - mean).powi(2) + (r2 - mean).powi(2) + mean.powi(2)) / 2.0).sqrt();
        assert!((v[[0, 2]] - long).abs() < tol);
        assert!((v[[0, 3]] - (99.0f64 / (308.0 / 3.0)).ln()).abs() < tol);
        assert!((v[[0, 4]] - (99.0 / 110.0 - 1.0)).abs() < tol);

        // Row for index 4: new high, so no drawdown
        assert!((v[[1, 0]] - r1).abs() < 1e-9);
        assert!(v[[1, 4]].abs() < 1e-9);
        assert_eq!(matrix.latest(FeatureKind::Drawdown), Some(v[[1, 4]]));
    }

    #[test]
    fn test_annualization_scales_volatility() {
        let series = PriceSeries::from_closes("SPY", start(), &wavy(30)).unwrap();
        let raw = FeatureExtractor::new(small_config()).extract(&series).unwrap();
        let annual = FeatureExtractor::new(FeatureConfig {
            annualize: true,
            ..small_config()
        })
        .extract(&series)
        .unwrap();

        let raw_vol = raw.column(FeatureKind::RealizedVol).unwrap();
        let annual_vol = annual.column(FeatureKind::RealizedVol).unwrap();
        for (r, a) in raw_vol.iter().zip(annual_vol.iter()) {
            assert!((a - r * 252f64.sqrt()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_flat_series_is_all_zero() {
        let series = PriceSeries::from_closes("SPY", start(), &[50.0; 10]).unwrap();
        let matrix = FeatureExtractor::new(small_config()).extract(&series).unwrap();
        assert!(matrix.values().iter().all(|v| v.abs() < 1e-15));
    }

    #[test]
    fn test_rows_depend_only_on_past() {
        let closes = wavy(300);
        let full = PriceSeries::from_closes("SPY", start(), &closes).unwrap();
        let prefix = PriceSeries::from_closes("SPY", start(), &closes[..280]).unwrap();

        let extractor = FeatureExtractor::default();
        let a = extractor.extract(&full).unwrap();
        let b = extractor.extract(&prefix).unwrap();
        for row in 0..b.len() {
            assert_eq!(a.values().row(row), b.values().row(row));
        }
    }

    #[test]
    fn test_drawdown_optional() {
        let config = FeatureConfig {
            drawdown_window: None,
            ..small_config()
        };
        assert_eq!(config.warmup(), 3);
        assert!(!config.kinds().contains(&FeatureKind::Drawdown));
    }

    #[test]
    fn test_default_warmup_is_drawdown_window() {
        let config = FeatureConfig::default();
        assert_eq!(config.warmup(), 252);
        let without = FeatureConfig {
            drawdown_window: None,
            ..FeatureConfig::default()
        };
        assert_eq!(without.warmup(), 60);
    }

    #[test]
    fn test_invalid_config() {
        let bad_trend = FeatureConfig {
            trend_fast_window: 60,
            trend_slow_window: 20,
            ..FeatureConfig::default()
        };
        assert!(matches!(bad_trend.validate(), Err(FeatureError::InvalidConfig(_))));

        let bad_vol = FeatureConfig {
            volatility_window: 1,
            ..FeatureConfig::default()
        };
        assert!(matches!(bad_vol.validate(), Err(FeatureError::InvalidConfig(_))));
    }
}
