//! Conditional forward-return distributions.
//!
//! For every regime and horizon, collects the forward returns that started in
//! that regime and summarises them with interpolated quantiles. Groups below
//! the sample threshold are reported as insufficient rather than dropped, so
//! the table always holds every (regime, horizon) pair.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;
use tracing::debug;

use super::forward_returns::{forward_samples, interpolated_quantile, ReturnKind};
use crate::data::PriceSeries;
use crate::regime::RegimeAssignment;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantileError {
    #[error("Horizon must be at least one row")]
    ZeroHorizon,

    #[error("Assignment date {0} is not in the price series")]
    UnknownDate(NaiveDate),

    #[error("Invalid quantile level {0} (must be within [0, 1])")]
    InvalidLevel(f64),

    #[error("Invalid quantile config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantileConfig {
    /// Probability levels, reported in ascending order.
    pub levels: Vec<f64>,
    /// Minimum group size before quantiles are reported.
    pub min_samples: usize,
    pub return_kind: ReturnKind,
}

impl Default for QuantileConfig {
    fn default() -> Self {
        Self {
            levels: vec![0.10, 0.25, 0.50, 0.75, 0.90],
            min_samples: 20,
            return_kind: ReturnKind::Simple,
        }
    }
}

impl QuantileConfig {
    pub fn validate(&self) -> Result<(), QuantileError> {
        if self.levels.is_empty() {
            return Err(QuantileError::InvalidConfig(
                "at least one quantile level is required".to_string(),
            ));
        }
        if let Some(bad) = self
            .levels
            .iter()
            .find(|p| !p.is_finite() || !(0.0..=1.0).contains(*p))
        {
            return Err(QuantileError::InvalidLevel(*bad));
        }
        if self.min_samples == 0 {
            return Err(QuantileError::InvalidConfig(
                "min_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn sorted_levels(&self) -> Vec<f64> {
        let mut levels = self.levels.clone();
        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup();
        levels
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantilePoint {
    pub level: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuantileEstimate {
    Defined {
        quantiles: Vec<QuantilePoint>,
        mean: f64,
    },
    InsufficientData {
        required: usize,
    },
}

impl QuantileEstimate {
    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Defined { .. })
    }

    /// Value at a level, if defined and the level was configured.
    pub fn at(&self, level: f64) -> Option<f64> {
        match self {
            Self::Defined { quantiles, .. } => quantiles
                .iter()
                .find(|q| (q.level - level).abs() < 1e-12)
                .map(|q| q.value),
            Self::InsufficientData { .. } => None,
        }
    }

    pub fn mean(&self) -> Option<f64> {
        match self {
            Self::Defined { mean, .. } => Some(*mean),
            Self::InsufficientData { .. } => None,
        }
    }
}

/// Forward-return distribution for one (regime, horizon) group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeQuantileSummary {
    pub regime: usize,
    pub horizon: usize,
    pub sample_count: usize,
    pub estimate: QuantileEstimate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantileTable {
    pub return_kind: ReturnKind,
    pub levels: Vec<f64>,
    pub horizons: Vec<usize>,
    pub num_regimes: usize,
    /// Ordered by regime, then horizon.
    pub summaries: Vec<RegimeQuantileSummary>,
}

impl QuantileTable {
    pub fn get(&self, regime: usize, horizon: usize) -> Option<&RegimeQuantileSummary> {
        self.summaries
            .iter()
            .find(|s| s.regime == regime && s.horizon == horizon)
    }

    pub fn for_regime(&self, regime: usize) -> Vec<&RegimeQuantileSummary> {
        self.summaries.iter().filter(|s| s.regime == regime).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConditionalQuantileEngine {
    config: QuantileConfig,
}

impl ConditionalQuantileEngine {
    pub fn new(config: QuantileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuantileConfig {
        &self.config
    }

    pub fn compute(
        &self,
        series: &PriceSeries,
        assignment: &RegimeAssignment,
        horizons: &[usize],
    ) -> Result<QuantileTable, QuantileError> {
        self.config.validate()?;
        if horizons.iter().any(|h| *h == 0) {
            return Err(QuantileError::ZeroHorizon);
        }

        let mut horizons = horizons.to_vec();
        horizons.sort_unstable();
        horizons.dedup();
        let levels = self.config.sorted_levels();
        let k = assignment.num_regimes();

        // grouped[regime][horizon index]
        let mut grouped: Vec<Vec<Vec<f64>>> = vec![vec![Vec::new(); horizons.len()]; k];
        for (hi, &h) in horizons.iter().enumerate() {
            for sample in forward_samples(series, assignment, h, self.config.return_kind)? {
                grouped[sample.regime][hi].push(sample.value);
            }
        }

        let mut summaries = Vec::with_capacity(k * horizons.len());
        for (regime, by_horizon) in grouped.into_iter().enumerate() {
            for (hi, mut values) in by_horizon.into_iter().enumerate() {
                let sample_count = values.len();
                let estimate = if sample_count < self.config.min_samples {
                    QuantileEstimate::InsufficientData {
                        required: self.config.min_samples,
                    }
                } else {
                    values.sort_by(|a, b| a.total_cmp(b));
                    let quantiles = levels
                        .iter()
                        .filter_map(|&level| {
                            interpolated_quantile(&values, level)
                                .map(|value| QuantilePoint { level, value })
                        })
                        .collect();
                    QuantileEstimate::Defined {
                        quantiles,
                        mean: values.iter().mean(),
                    }
                };

                debug!(
                    "Regime {} horizon {}: {} samples",
                    regime, horizons[hi], sample_count
                );
                summaries.push(RegimeQuantileSummary {
                    regime,
                    horizon: horizons[hi],
                    sample_count,
                    estimate,
                });
            }
        }

        Ok(QuantileTable {
            return_kind: self.config.return_kind,
            levels,
            horizons,
            num_regimes: k,
            summaries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::features::{FeatureConfig, FeatureExtractor};
    use crate::regime::RegimeClassifier;
    use crate::test_support::regime_switching_series;

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        PriceSeries::from_closes("TEST", start, closes).unwrap()
    }

    /// Hard assignment over the given dates with the given labels.
    fn hard_assignment(dates: &[NaiveDate], labels: &[usize], k: usize) -> RegimeAssignment {
        let mut probs = Array2::zeros((dates.len(), k));
        for (i, &label) in labels.iter().enumerate() {
            probs[[i, label]] = 1.0;
        }
        RegimeAssignment::from_probabilities(dates, &probs).unwrap()
    }

    fn random_walk(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price = 100.0;
        (0..n)
            .map(|_| {
                price *= 1.0 + rng.gen_range(-0.02..0.02);
                price
            })
            .collect()
    }

    fn config(min_samples: usize) -> QuantileConfig {
        QuantileConfig {
            min_samples,
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_quantiles_on_known_returns() {
        // Forward 1-row returns: 0.01, 0.02, 0.03, 0.04
        let s = series(&[100.0, 101.0, 103.02, 106.1106, 110.355024]);
        let dates = s.dates();
        let assignment = hard_assignment(&dates, &[0; 5], 1);

        let engine = ConditionalQuantileEngine::new(QuantileConfig {
            levels: vec![0.5, 0.1],
            min_samples: 4,
            return_kind: ReturnKind::Simple,
        });
        let table = engine.compute(&s, &assignment, &[1]).unwrap();
        let summary = table.get(0, 1).unwrap();

        assert_eq!(summary.sample_count, 4);
        assert_eq!(table.levels, vec![0.1, 0.5]);
        assert!((summary.estimate.at(0.5).unwrap() - 0.025).abs() < 1e-9);
        assert!((summary.estimate.at(0.1).unwrap() - 0.013).abs() < 1e-9);
        assert!((summary.estimate.mean().unwrap() - 0.025).abs() < 1e-9);
    }

    #[test]
    fn test_quantiles_are_monotone() {
        let closes = random_walk(400, 11);
        let s = series(&closes);
        let dates = s.dates();
        let labels: Vec<usize> = (0..dates.len()).map(|i| (i / 50) % 3).collect();
        let assignment = hard_assignment(&dates, &labels, 3);

        let table = ConditionalQuantileEngine::new(QuantileConfig::default())
            .compute(&s, &assignment, &[5, 20])
            .unwrap();

        for summary in &table.summaries {
            if let QuantileEstimate::Defined { quantiles, .. } = &summary.estimate {
                for pair in quantiles.windows(2) {
                    assert!(pair[0].value <= pair[1].value);
                }
            } else {
                panic!("regime {} should have enough samples", summary.regime);
            }
        }
    }

    #[test]
    fn test_quantiles_are_monotone_on_fitted_regimes() {
        let s = regime_switching_series(42, &[(250, 0.002), (250, 0.02)]);
        let features = FeatureExtractor::new(FeatureConfig {
            volatility_window: 10,
            long_volatility_window: 20,
            trend_fast_window: 5,
            trend_slow_window: 20,
            drawdown_window: None,
            ..FeatureConfig::default()
        })
        .extract(&s)
        .unwrap();

        for k in [2, 3] {
            let fit = RegimeClassifier::default().fit_and_infer(&features, k).unwrap();
            let table = ConditionalQuantileEngine::new(QuantileConfig::default())
                .compute(&s, &fit.assignment, &[5, 20])
                .unwrap();
            assert_eq!(table.summaries.len(), k * 2);

            let mut defined = 0;
            for summary in &table.summaries {
                if let QuantileEstimate::Defined { quantiles, .. } = &summary.estimate {
                    defined += 1;
                    let levels: Vec<f64> = quantiles.iter().map(|q| q.level).collect();
                    assert_eq!(levels, vec![0.10, 0.25, 0.50, 0.75, 0.90]);
                    for pair in quantiles.windows(2) {
                        assert!(
                            pair[0].value <= pair[1].value,
                            "k={} regime {} horizon {}",
                            k,
                            summary.regime,
                            summary.horizon
                        );
                    }
                }
            }
            assert!(defined >= 2, "k={}", k);
        }
    }

    #[test]
    fn test_every_pair_present() {
        let s = series(&random_walk(60, 3));
        let dates = s.dates();
        // Regime 2 never occurs
        let labels: Vec<usize> = (0..dates.len()).map(|i| i % 2).collect();
        let assignment = hard_assignment(&dates, &labels, 3);

        let table = ConditionalQuantileEngine::new(config(5))
            .compute(&s, &assignment, &[20, 5, 5])
            .unwrap();

        assert_eq!(table.horizons, vec![5, 20]);
        assert_eq!(table.summaries.len(), 6);
        let empty = table.get(2, 20).unwrap();
        assert_eq!(empty.sample_count, 0);
        assert_eq!(empty.estimate, QuantileEstimate::InsufficientData { required: 5 });
        assert_eq!(table.for_regime(1).len(), 2);
    }

    #[test]
    fn test_min_sample_gating() {
        let s = series(&random_walk(25, 5));
        let dates = s.dates();
        // 21 assignment dates; t + 1 < 25 for all of them
        let assignment = hard_assignment(&dates[..21], &[0; 21], 1);

        let at = ConditionalQuantileEngine::new(config(21))
            .compute(&s, &assignment, &[1])
            .unwrap();
        assert!(at.get(0, 1).unwrap().estimate.is_defined());

        let below = ConditionalQuantileEngine::new(config(22))
            .compute(&s, &assignment, &[1])
            .unwrap();
        let summary = below.get(0, 1).unwrap();
        assert_eq!(summary.sample_count, 21);
        assert_eq!(summary.estimate, QuantileEstimate::InsufficientData { required: 22 });
    }

    #[test]
    fn test_ignores_prices_after_window() {
        let mut closes = random_walk(50, 9);
        let s1 = series(&closes);
        *closes.last_mut().unwrap() *= 3.0;
        let s2 = series(&closes);

        // Only dates whose 5-row window ends before the final row
        let dates = s1.dates();
        let assignment = hard_assignment(&dates[..44], &[0; 44], 1);

        let engine = ConditionalQuantileEngine::new(config(10));
        let t1 = engine.compute(&s1, &assignment, &[5]).unwrap();
        let t2 = engine.compute(&s2, &assignment, &[5]).unwrap();
        assert_eq!(t1, t2);
    }

    #[test]
    fn test_rejects_bad_input() {
        let s = series(&random_walk(30, 1));
        let dates = s.dates();
        let assignment = hard_assignment(&dates, &[0; 30], 1);
        let engine = ConditionalQuantileEngine::new(QuantileConfig::default());

        assert_eq!(
            engine.compute(&s, &assignment, &[5, 0]),
            Err(QuantileError::ZeroHorizon)
        );

        let bad_levels = ConditionalQuantileEngine::new(QuantileConfig {
            levels: vec![0.5, 1.2],
            ..Default::default()
        });
        assert_eq!(
            bad_levels.compute(&s, &assignment, &[5]),
            Err(QuantileError::InvalidLevel(1.2))
        );

        let shifted: Vec<NaiveDate> = dates.iter().map(|d| *d + chrono::Duration::days(1000)).collect();
        let foreign = hard_assignment(&shifted, &[0; 30], 1);
        assert!(matches!(
            engine.compute(&s, &foreign, &[5]),
            Err(QuantileError::UnknownDate(_))
        ));
    }
}
