//! Per-regime descriptive statistics.
//!
//! Daily returns are attributed to the regime of the day they end on.
//! Drawdown is measured on the equity curve compounded from that regime's
//! days only.

use chrono::NaiveDate;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

use crate::data::PriceSeries;
use crate::regime::RegimeAssignment;

/// Share of rows below which a regime is reported as underpopulated.
pub const MIN_REGIME_SHARE: f64 = 0.05;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("Assignment date {0} is not in the price series")]
    UnknownDate(NaiveDate),
}

/// Statistics for a regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeStats {
    pub regime: usize,
    pub days: usize,
    pub pct_of_total: f64,
    pub mean_daily_return: f64,
    pub annualized_volatility: f64,
    /// Largest peak-to-trough decline, in percent (positive).
    pub max_drawdown_pct: f64,
    pub spells: usize,
    pub mean_spell_length: f64,
    /// Average posterior probability of the regime over all rows.
    pub mean_probability: f64,
}

impl RegimeStats {
    fn empty(regime: usize) -> Self {
        Self {
            regime,
            days: 0,
            pct_of_total: 0.0,
            mean_daily_return: 0.0,
            annualized_volatility: 0.0,
            max_drawdown_pct: 0.0,
            spells: 0,
            mean_spell_length: 0.0,
            mean_probability: 0.0,
        }
    }
}

/// Drawdown analysis details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    pub max_drawdown_pct: f64,
    pub peak_index: Option<usize>,
    pub trough_index: Option<usize>,
    /// Completed drawdowns (recovered to a new high).
    pub drawdown_periods: usize,
}

/// How evenly rows are spread across regimes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeBalance {
    pub counts: Vec<usize>,
    pub min_regime_size: usize,
    pub smallest_share: f64,
}

impl RegimeBalance {
    pub fn from_counts(counts: Vec<usize>) -> Self {
        let total: usize = counts.iter().sum();
        let min_regime_size = counts.iter().copied().min().unwrap_or(0);
        let smallest_share = if total > 0 {
            min_regime_size as f64 / total as f64
        } else {
            0.0
        };
        Self {
            counts,
            min_regime_size,
            smallest_share,
        }
    }

    pub fn is_imbalanced(&self, min_share: f64) -> bool {
        self.smallest_share < min_share
    }
}

/// Regime statistics calculator.
pub struct RegimeStatsCalculator;

impl RegimeStatsCalculator {
    /// One entry per regime in `0..K`, including regimes with no rows.
    pub fn calculate(
        series: &PriceSeries,
        assignment: &RegimeAssignment,
    ) -> Result<Vec<RegimeStats>, MetricsError> {
        let k = assignment.num_regimes();
        let closes = series.closes();
        let total = assignment.len();

        let mut returns: Vec<Vec<f64>> = vec![Vec::new(); k];
        for posterior in assignment.posteriors() {
            let t = series
                .index_of(posterior.date)
                .ok_or(MetricsError::UnknownDate(posterior.date))?;
            if t > 0 {
                returns[posterior.label].push(closes[t] / closes[t - 1] - 1.0);
            }
        }

        let spells = Self::spell_counts(&assignment.labels(), k);
        let counts = assignment.counts();
        let occupancy = assignment
            .probability_matrix()
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![0.0; k]);

        let stats = (0..k)
            .map(|regime| {
                let days = counts[regime];
                if days == 0 {
                    return RegimeStats {
                        mean_probability: occupancy[regime],
                        ..RegimeStats::empty(regime)
                    };
                }
                let r = &returns[regime];
                let mean_daily_return = if r.is_empty() { 0.0 } else { r.iter().mean() };
                let annualized_volatility = if r.len() < 2 {
                    0.0
                } else {
                    r.iter().std_dev() * TRADING_DAYS_PER_YEAR.sqrt()
                };

                let mut equity = Vec::with_capacity(r.len() + 1);
                equity.push(1.0);
                for ret in r {
                    let last = equity[equity.len() - 1];
                    equity.push(last * (1.0 + ret));
                }

                RegimeStats {
                    regime,
                    days,
                    pct_of_total: days as f64 / total as f64 * 100.0,
                    mean_daily_return,
                    annualized_volatility,
                    max_drawdown_pct: Self::analyze_drawdown(&equity).max_drawdown_pct,
                    spells: spells[regime],
                    mean_spell_length: days as f64 / spells[regime].max(1) as f64,
                    mean_probability: occupancy[regime],
                }
            })
            .collect();

        Ok(stats)
    }

    pub fn balance(assignment: &RegimeAssignment) -> RegimeBalance {
        RegimeBalance::from_counts(assignment.counts())
    }

    /// Number of maximal same-label runs per regime.
    pub fn spell_counts(labels: &[usize], num_regimes: usize) -> Vec<usize> {
        let mut spells = vec![0; num_regimes];
        let mut prev: Option<usize> = None;
        for &label in labels {
            if prev != Some(label) {
                spells[label] += 1;
            }
            prev = Some(label);
        }
        spells
    }

    /// Analyze drawdown from an equity curve.
    pub fn analyze_drawdown(equity_curve: &[f64]) -> DrawdownAnalysis {
        let Some(&first) = equity_curve.first() else {
            return DrawdownAnalysis {
                max_drawdown_pct: 0.0,
                peak_index: None,
                trough_index: None,
                drawdown_periods: 0,
            };
        };

        let mut peak = first;
        let mut peak_idx = 0;
        let mut in_drawdown = false;
        let mut periods = 0;
        let mut max_dd = 0.0;
        let mut max_peak = None;
        let mut max_trough = None;

        for (i, &equity) in equity_curve.iter().enumerate() {
            if equity > peak {
                if in_drawdown {
                    periods += 1;
                }
                peak = equity;
                peak_idx = i;
                in_drawdown = false;
            } else if equity < peak {
                in_drawdown = true;
                let dd = if peak > 0.0 {
                    (peak - equity) / peak * 100.0
                } else {
                    0.0
                };
                if dd > max_dd {
                    max_dd = dd;
                    max_peak = Some(peak_idx);
                    max_trough = Some(i);
                }
            }
        }

        DrawdownAnalysis {
            max_drawdown_pct: max_dd,
            peak_index: max_peak,
            trough_index: max_trough,
            drawdown_periods: periods,
        }
    }
}
