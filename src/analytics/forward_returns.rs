//! Forward returns keyed by the regime at the start of the window.
//!
//! Horizons count trading rows of the series, not calendar days. A sample
//! for date t and horizon h exists only when row t + h is inside the series,
//! so no sample ever reaches past the last observed close.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::quantile_engine::QuantileError;
use crate::data::PriceSeries;
use crate::regime::RegimeAssignment;

/// How a forward price change is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    /// close[t+h] / close[t] - 1
    #[default]
    Simple,
    /// ln(close[t+h] / close[t])
    Log,
}

impl ReturnKind {
    pub fn compute(&self, start: f64, end: f64) -> f64 {
        match self {
            Self::Simple => end / start - 1.0,
            Self::Log => (end / start).ln(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardReturnSample {
    pub date: NaiveDate,
    pub regime: usize,
    pub horizon: usize,
    pub value: f64,
}

/// Forward return from row `t` over `horizon` rows, if the window fits.
pub fn forward_return(closes: &[f64], t: usize, horizon: usize, kind: ReturnKind) -> Option<f64> {
    let end = t.checked_add(horizon)?;
    if end >= closes.len() {
        return None;
    }
    Some(kind.compute(closes[t], closes[end]))
}

/// One sample per assignment date whose full window lies within the series.
pub fn forward_samples(
    series: &PriceSeries,
    assignment: &RegimeAssignment,
    horizon: usize,
    kind: ReturnKind,
) -> Result<Vec<ForwardReturnSample>, QuantileError> {
    if horizon == 0 {
        return Err(QuantileError::ZeroHorizon);
    }

    let closes = series.closes();
    let mut samples = Vec::with_capacity(assignment.len());
    for posterior in assignment.posteriors() {
        let t = series
            .index_of(posterior.date)
            .ok_or(QuantileError::UnknownDate(posterior.date))?;
        if let Some(value) = forward_return(&closes, t, horizon, kind) {
            samples.push(ForwardReturnSample {
                date: posterior.date,
                regime: posterior.label,
                horizon,
                value,
            });
        }
    }
    Ok(samples)
}

/// Quantile of ascending-sorted data by linear interpolation between order
/// statistics (Hyndman-Fan type 7).
pub fn interpolated_quantile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = h - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceSeries::from_closes("TEST", start, closes).unwrap()
    }

    fn single_regime(dates: &[NaiveDate]) -> RegimeAssignment {
        let probs = Array2::from_elem((dates.len(), 1), 1.0);
        RegimeAssignment::from_probabilities(dates, &probs).unwrap()
    }

    #[test]
    fn test_type7_interpolation() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(interpolated_quantile(&x, 0.0), Some(1.0));
        assert_eq!(interpolated_quantile(&x, 1.0), Some(4.0));
        assert!((interpolated_quantile(&x, 0.5).unwrap() - 2.5).abs() < 1e-12);
        assert!((interpolated_quantile(&x, 0.1).unwrap() - 1.3).abs() < 1e-12);
        assert_eq!(interpolated_quantile(&[7.0], 0.9), Some(7.0));
        assert_eq!(interpolated_quantile(&[], 0.5), None);
        assert_eq!(interpolated_quantile(&x, 1.5), None);
    }

    #[test]
    fn test_simple_and_log_returns() {
        let closes = [100.0, 110.0, 121.0];
        let simple = forward_return(&closes, 0, 2, ReturnKind::Simple).unwrap();
        let log = forward_return(&closes, 0, 2, ReturnKind::Log).unwrap();
        assert!((simple - 0.21).abs() < 1e-12);
        assert!((log - 1.21f64.ln()).abs() < 1e-12);
        assert_eq!(forward_return(&closes, 1, 2, ReturnKind::Simple), None);
    }

    #[test]
    fn test_samples_never_pass_series_end() {
        let s = series(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        let assignment = single_regime(&s.dates());

        for h in 1..=6 {
            let samples = forward_samples(&s, &assignment, h, ReturnKind::Simple).unwrap();
            assert_eq!(samples.len(), s.len().saturating_sub(h));
            let last_start = samples.last().map(|x| s.index_of(x.date).unwrap());
            if let Some(t) = last_start {
                assert!(t + h < s.len());
            }
        }
    }

    #[test]
    fn test_horizon_counts_rows_not_days() {
        // Friday -> next Monday is one row
        let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let s = PriceSeries::from_closes("TEST", start, &[100.0, 102.0]).unwrap();
        let samples = forward_samples(&s, &single_regime(&s.dates()), 1, ReturnKind::Simple).unwrap();
        assert_eq!(samples.len(), 1);
        assert!((samples[0].value - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_errors() {
        let s = series(&[100.0, 101.0]);
        let assignment = single_regime(&s.dates());
        assert!(matches!(
            forward_samples(&s, &assignment, 0, ReturnKind::Simple),
            Err(QuantileError::ZeroHorizon)
        ));

        let foreign = [NaiveDate::from_ymd_opt(1999, 1, 4).unwrap()];
        assert!(matches!(
            forward_samples(&s, &single_regime(&foreign), 1, ReturnKind::Simple),
            Err(QuantileError::UnknownDate(_))
        ));
    }
}
