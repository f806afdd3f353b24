//! Mapping from volatility-ordered regime labels to a policy name.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::assignment::RegimePosterior;

/// Posterior confidence below which the regime is treated as in transition.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.60;

/// Policy stance implied by the current regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimePolicy {
    /// Calmest regime.
    RiskOn,
    /// Any regime between the calmest and the most volatile.
    LateCycle,
    /// Most volatile regime.
    RiskOff,
    /// Posterior too diffuse to commit to a regime.
    Transition,
}

impl RegimePolicy {
    /// Policy for a label from a fit ordered by ascending volatility.
    pub fn from_label(label: usize, num_regimes: usize, confidence: f64, min_confidence: f64) -> Self {
        if confidence < min_confidence {
            Self::Transition
        } else if label == 0 {
            Self::RiskOn
        } else if label + 1 >= num_regimes {
            Self::RiskOff
        } else {
            Self::LateCycle
        }
    }

    pub fn from_posterior(posterior: &RegimePosterior, min_confidence: f64) -> Self {
        Self::from_label(
            posterior.label,
            posterior.probabilities.len(),
            posterior.confidence(),
            min_confidence,
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RiskOn => "risk_on",
            Self::LateCycle => "late_cycle",
            Self::RiskOff => "risk_off",
            Self::Transition => "transition",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::RiskOn => "Low-volatility regime",
            Self::LateCycle => "Intermediate regime, volatility building",
            Self::RiskOff => "High-volatility regime",
            Self::Transition => "Regime probabilities are mixed",
        }
    }
}

impl fmt::Display for RegimePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_policy_by_label() {
        assert_eq!(RegimePolicy::from_label(0, 3, 0.9, 0.6), RegimePolicy::RiskOn);
        assert_eq!(RegimePolicy::from_label(1, 3, 0.9, 0.6), RegimePolicy::LateCycle);
        assert_eq!(RegimePolicy::from_label(2, 3, 0.9, 0.6), RegimePolicy::RiskOff);
        assert_eq!(RegimePolicy::from_label(1, 2, 0.9, 0.6), RegimePolicy::RiskOff);
    }

    #[test]
    fn test_low_confidence_is_transition() {
        let posterior = RegimePosterior {
            date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            label: 0,
            probabilities: vec![0.55, 0.45],
        };
        assert_eq!(
            RegimePolicy::from_posterior(&posterior, DEFAULT_MIN_CONFIDENCE),
            RegimePolicy::Transition
        );
        assert_eq!(RegimePolicy::Transition.to_string(), "transition");
    }
}
