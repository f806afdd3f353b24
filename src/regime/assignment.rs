//! Per-date regime labels and posterior probabilities.

use chrono::NaiveDate;
use ndarray::Array2;
use serde::Serialize;

use super::model::FitError;

/// Regime posterior for one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimePosterior {
    pub date: NaiveDate,
    pub label: usize,
    pub probabilities: Vec<f64>,
}

impl RegimePosterior {
    /// Probability of the assigned label.
    pub fn confidence(&self) -> f64 {
        self.probabilities.get(self.label).copied().unwrap_or(0.0)
    }
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Labels and probabilities for every feature-matrix date.
///
/// Every probability vector has `num_regimes` entries in [0, 1] summing to
/// one, and every label is the argmax of its vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeAssignment {
    num_regimes: usize,
    posteriors: Vec<RegimePosterior>,
}

impl RegimeAssignment {
    /// Build from a `T x K` matrix, renormalising each row.
    pub fn from_probabilities(
        dates: &[NaiveDate],
        probabilities: &Array2<f64>,
    ) -> Result<Self, FitError> {
        let (rows, k) = probabilities.dim();
        if rows != dates.len() {
            return Err(FitError::InvalidConfig(format!(
                "{} probability rows for {} dates",
                rows,
                dates.len()
            )));
        }

        let mut posteriors = Vec::with_capacity(rows);
        for (date, row) in dates.iter().zip(probabilities.rows()) {
            let clipped: Vec<f64> = row
                .iter()
                .map(|p| if p.is_finite() { p.max(0.0) } else { 0.0 })
                .collect();
            let sum: f64 = clipped.iter().sum();
            if sum <= 0.0 {
                return Err(FitError::InvalidConfig(format!(
                    "posterior for {} has no mass",
                    date
                )));
            }
            let probs: Vec<f64> = clipped.iter().map(|p| (p / sum).min(1.0)).collect();

            posteriors.push(RegimePosterior {
                date: *date,
                label: argmax(&probs),
                probabilities: probs,
            });
        }

        Ok(Self {
            num_regimes: k,
            posteriors,
        })
    }

    pub fn num_regimes(&self) -> usize {
        self.num_regimes
    }

    pub fn posteriors(&self) -> &[RegimePosterior] {
        &self.posteriors
    }

    pub fn len(&self) -> usize {
        self.posteriors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posteriors.is_empty()
    }

    pub fn latest(&self) -> Option<&RegimePosterior> {
        self.posteriors.last()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.posteriors.iter().map(|p| p.date).collect()
    }

    pub fn labels(&self) -> Vec<usize> {
        self.posteriors.iter().map(|p| p.label).collect()
    }

    /// Label on a date, if the date has a posterior.
    pub fn label_at(&self, date: NaiveDate) -> Option<usize> {
        self.posteriors
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| self.posteriors[idx].label)
    }

    /// Number of dates assigned to each regime.
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_regimes];
        for p in &self.posteriors {
            counts[p.label] += 1;
        }
        counts
    }

    pub fn probability_matrix(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.len(), self.num_regimes));
        for (i, p) in self.posteriors.iter().enumerate() {
            for (j, v) in p.probabilities.iter().enumerate() {
                out[[i, j]] = *v;
            }
        }
        out
    }

    /// Reorder regimes so that new label `j` is old label `order[j]`.
    pub(crate) fn permuted(&self, order: &[usize]) -> Self {
        let posteriors = self
            .posteriors
            .iter()
            .map(|p| {
                let probabilities: Vec<f64> = order.iter().map(|&old| p.probabilities[old]).collect();
                RegimePosterior {
                    date: p.date,
                    label: argmax(&probabilities),
                    probabilities,
                }
            })
            .collect();

        Self {
            num_regimes: self.num_regimes,
            posteriors,
        }
    }
}
