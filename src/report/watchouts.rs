//! Watchout labels and the market-side rules that raise them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::features::{FeatureKind, FeatureMatrix};
use crate::regime::RegimePosterior;

/// Condition worth a second look before acting on the regime read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Watchout {
    /// Negative headlines that could move the open.
    GapRisk,
    /// Clustered coverage of one event topic.
    EventRisk,
    /// Current posterior is diffuse.
    RegimeUncertainty,
    /// Short-window volatility well above the long window.
    VolatilitySpike,
    /// Price far below its rolling peak.
    DeepDrawdown,
}

impl Watchout {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GapRisk => "gap_risk",
            Self::EventRisk => "event_risk",
            Self::RegimeUncertainty => "regime_uncertainty",
            Self::VolatilitySpike => "volatility_spike",
            Self::DeepDrawdown => "deep_drawdown",
        }
    }
}

impl fmt::Display for Watchout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchoutThresholds {
    /// Max posterior probability below which the regime is uncertain.
    pub min_confidence: f64,
    /// realized_vol / realized_vol_long above which volatility is spiking.
    pub vol_spike_ratio: f64,
    /// Drawdown (negative fraction) below which it is deep.
    pub deep_drawdown: f64,
}

impl Default for WatchoutThresholds {
    fn default() -> Self {
        Self {
            min_confidence: 0.60,
            vol_spike_ratio: 1.15,
            deep_drawdown: -0.20,
        }
    }
}

/// Watchouts raised by the latest posterior and feature row.
pub fn market_watchouts(
    posterior: &RegimePosterior,
    features: &FeatureMatrix,
    thresholds: &WatchoutThresholds,
) -> BTreeSet<Watchout> {
    let mut out = BTreeSet::new();

    let max_prob = posterior
        .probabilities
        .iter()
        .copied()
        .fold(0.0_f64, f64::max);
    if max_prob < thresholds.min_confidence {
        out.insert(Watchout::RegimeUncertainty);
    }

    if let (Some(short), Some(long)) = (
        features.latest(FeatureKind::RealizedVol),
        features.latest(FeatureKind::RealizedVolLong),
    ) {
        if long > 0.0 && short > thresholds.vol_spike_ratio * long {
            out.insert(Watchout::VolatilitySpike);
        }
    }

    if let Some(dd) = features.latest(FeatureKind::Drawdown) {
        if dd < thresholds.deep_drawdown {
            out.insert(Watchout::DeepDrawdown);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::arr2;

    fn posterior(probabilities: Vec<f64>) -> RegimePosterior {
        RegimePosterior {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            label: 0,
            probabilities,
        }
    }

    fn features(vol: f64, vol_long: f64, drawdown: f64) -> FeatureMatrix {
        let kinds = vec![
            FeatureKind::RealizedVol,
            FeatureKind::RealizedVolLong,
            FeatureKind::Drawdown,
        ];
        let dates = vec![NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()];
        FeatureMatrix::new(kinds, dates, arr2(&[[vol, vol_long, drawdown]]), 0).unwrap()
    }

    #[test]
    fn test_calm_market_raises_nothing() {
        let out = market_watchouts(
            &posterior(vec![0.9, 0.1]),
            &features(0.15, 0.15, -0.05),
            &WatchoutThresholds::default(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_each_rule() {
        let t = WatchoutThresholds::default();

        let out = market_watchouts(&posterior(vec![0.55, 0.45]), &features(0.1, 0.1, 0.0), &t);
        assert_eq!(out.into_iter().collect::<Vec<_>>(), vec![Watchout::RegimeUncertainty]);

        let out = market_watchouts(&posterior(vec![1.0, 0.0]), &features(0.30, 0.20, 0.0), &t);
        assert_eq!(out.into_iter().collect::<Vec<_>>(), vec![Watchout::VolatilitySpike]);

        let out = market_watchouts(&posterior(vec![1.0, 0.0]), &features(0.1, 0.1, -0.25), &t);
        assert_eq!(out.into_iter().collect::<Vec<_>>(), vec![Watchout::DeepDrawdown]);
    }

    #[test]
    fn test_boundaries_are_strict() {
        let t = WatchoutThresholds::default();
        let out = market_watchouts(&posterior(vec![0.6, 0.4]), &features(0.22, 0.20, -0.20), &t);
        assert!(out.is_empty());
        assert_eq!(Watchout::VolatilitySpike.to_string(), "volatility_spike");
    }
}
