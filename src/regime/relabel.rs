//! Deterministic relabelling of fitted regimes.
//!
//! EM returns states in an arbitrary order that changes with the seed. States
//! are reordered by ascending emission mean of one feature, ties by fit
//! index, so label 0 is always e.g. the calmest regime.

use super::assignment::RegimeAssignment;
use super::model::{FitError, RegimeModel};
use crate::features::FeatureKind;

/// Old state index for each new label.
pub fn regime_order(model: &RegimeModel, kind: FeatureKind) -> Result<Vec<usize>, FitError> {
    let col = model
        .feature_kinds
        .iter()
        .position(|k| *k == kind)
        .ok_or_else(|| FitError::InvalidConfig(format!("model has no {} feature", kind)))?;

    let mut order: Vec<usize> = (0..model.num_regimes()).collect();
    order.sort_by(|&a, &b| {
        model.means[[a, col]]
            .total_cmp(&model.means[[b, col]])
            .then(a.cmp(&b))
    });
    Ok(order)
}

/// Reorder model and assignment consistently. Pure and idempotent.
pub fn relabel(
    model: &RegimeModel,
    assignment: &RegimeAssignment,
    kind: FeatureKind,
) -> Result<(RegimeModel, RegimeAssignment), FitError> {
    let order = regime_order(model, kind)?;
    if assignment.num_regimes() != order.len() {
        return Err(FitError::InvalidConfig(format!(
            "assignment has {} regimes, model has {}",
            assignment.num_regimes(),
            order.len()
        )));
    }

    let mut relabelled = model.clone();
    for (new, &old) in order.iter().enumerate() {
        relabelled.means.row_mut(new).assign(&model.means.row(old));
        relabelled.variances.row_mut(new).assign(&model.variances.row(old));
        relabelled.weights[new] = model.weights[old];
        relabelled.initial[new] = model.initial[old];
    }
    if let (Some(src), Some(dst)) = (&model.transition, relabelled.transition.as_mut()) {
        for (a, &old_a) in order.iter().enumerate() {
            for (b, &old_b) in order.iter().enumerate() {
                dst[[a, b]] = src[[old_a, old_b]];
            }
        }
    }

    Ok((relabelled, assignment.permuted(&order)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::model::{ModelKind, Standardizer};
    use chrono::NaiveDate;
    use ndarray::arr2;

    fn model() -> RegimeModel {
        RegimeModel {
            kind: ModelKind::HiddenMarkov,
            feature_kinds: vec![FeatureKind::LogReturn, FeatureKind::RealizedVol],
            standardizer: Standardizer {
                center: vec![0.0, 0.0],
                scale: vec![1.0, 1.0],
            },
            means: arr2(&[[0.1, 2.0], [0.0, -1.0], [-0.2, 0.5]]),
            variances: arr2(&[[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]),
            weights: vec![0.2, 0.5, 0.3],
            initial: vec![0.1, 0.6, 0.3],
            transition: Some(arr2(&[[0.8, 0.1, 0.1], [0.05, 0.9, 0.05], [0.2, 0.2, 0.6]])),
        }
    }

    fn assignment() -> RegimeAssignment {
        let dates: Vec<NaiveDate> = (1..=2)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let probs = arr2(&[[0.5, 0.25, 0.25], [0.125, 0.375, 0.5]]);
        RegimeAssignment::from_probabilities(&dates, &probs).unwrap()
    }

    #[test]
    fn test_orders_by_feature_mean() {
        let (m, a) = relabel(&model(), &assignment(), FeatureKind::RealizedVol).unwrap();

        assert_eq!(m.means.column(1).to_vec(), vec![-1.0, 0.5, 2.0]);
        assert_eq!(m.weights, vec![0.5, 0.3, 0.2]);
        assert_eq!(m.initial, vec![0.6, 0.3, 0.1]);
        let t = m.transition.as_ref().unwrap();
        assert_eq!(t.row(0).to_vec(), vec![0.9, 0.05, 0.05]);
        assert_eq!(t.row(2).to_vec(), vec![0.1, 0.1, 0.8]);

        // Old label 0 (highest vol) becomes 2, old label 2 becomes 1
        assert_eq!(a.labels(), vec![2, 1]);
        assert_eq!(a.posteriors()[0].probabilities, vec![0.25, 0.25, 0.5]);
        assert_eq!(a.posteriors()[1].probabilities, vec![0.375, 0.5, 0.125]);
    }

    #[test]
    fn test_relabel_is_idempotent() {
        let (m1, a1) = relabel(&model(), &assignment(), FeatureKind::RealizedVol).unwrap();
        let (m2, a2) = relabel(&m1, &a1, FeatureKind::RealizedVol).unwrap();
        assert_eq!(m1, m2);
        assert_eq!(a1, a2);
    }

    #[test]
    fn test_ties_keep_fit_order() {
        let mut tied = model();
        tied.means = arr2(&[[0.0, 1.0], [0.0, 1.0], [0.0, 0.0]]);
        assert_eq!(regime_order(&tied, FeatureKind::RealizedVol).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn test_missing_feature() {
        assert!(relabel(&model(), &assignment(), FeatureKind::Drawdown).is_err());
    }
}
