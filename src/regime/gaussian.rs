//! Diagonal-covariance Gaussian emissions.

use std::f64::consts::PI;

use ndarray::{Array1, Array2, ArrayView1};

/// Gaussian with independent dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalGaussian {
    pub mean: Array1<f64>,
    /// Per-dimension variance, regularisation already included.
    pub variance: Array1<f64>,
    log_norm: f64,
}

/// Weighted moments of one state, before regularisation.
#[derive(Debug, Clone)]
pub struct WeightedMoments {
    pub mass: f64,
    pub mean: Array1<f64>,
    pub variance: Array1<f64>,
}

impl WeightedMoments {
    /// Sum of per-dimension variances.
    pub fn total_variance(&self) -> f64 {
        self.variance.sum()
    }
}

impl DiagonalGaussian {
    pub fn new(mean: Array1<f64>, variance: Array1<f64>) -> Self {
        let log_norm = -0.5
            * variance
                .iter()
                .map(|v| (2.0 * PI * v).ln())
                .sum::<f64>();
        Self {
            mean,
            variance,
            log_norm,
        }
    }

    pub fn from_moments(moments: &WeightedMoments, regularization: f64) -> Self {
        Self::new(
            moments.mean.clone(),
            moments.variance.mapv(|v| v + regularization),
        )
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn log_pdf(&self, x: ArrayView1<'_, f64>) -> f64 {
        let quad: f64 = x
            .iter()
            .zip(self.mean.iter())
            .zip(self.variance.iter())
            .map(|((xi, mu), var)| (xi - mu).powi(2) / var)
            .sum();
        self.log_norm - 0.5 * quad
    }
}

/// Weighted mean and (population) variance of each column.
pub fn weighted_moments(samples: &Array2<f64>, weights: ArrayView1<'_, f64>) -> WeightedMoments {
    let d = samples.ncols();
    let mass = weights.sum();

    let mut mean = Array1::zeros(d);
    let mut variance = Array1::zeros(d);
    if mass <= 0.0 {
        return WeightedMoments {
            mass,
            mean,
            variance,
        };
    }

    for (row, w) in samples.rows().into_iter().zip(weights.iter()) {
        mean.scaled_add(*w, &row);
    }
    mean /= mass;

    for (row, w) in samples.rows().into_iter().zip(weights.iter()) {
        for j in 0..d {
            variance[j] += w * (row[j] - mean[j]).powi(2);
        }
    }
    variance /= mass;

    WeightedMoments {
        mass,
        mean,
        variance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_log_pdf_standard_normal() {
        let g = DiagonalGaussian::new(array![0.0], array![1.0]);
        let expected = -0.5 * (2.0 * PI).ln();
        assert!((g.log_pdf(array![0.0].view()) - expected).abs() < 1e-12);
        assert!((g.log_pdf(array![1.0].view()) - (expected - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_log_pdf_is_sum_of_dimensions() {
        let joint = DiagonalGaussian::new(array![1.0, -2.0], array![0.5, 4.0]);
        let a = DiagonalGaussian::new(array![1.0], array![0.5]);
        let b = DiagonalGaussian::new(array![-2.0], array![4.0]);

        let x = array![0.3, 1.0];
        let split = a.log_pdf(array![0.3].view()) + b.log_pdf(array![1.0].view());
        assert!((joint.log_pdf(x.view()) - split).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_moments() {
        let samples = ndarray::arr2(&[[1.0, 10.0], [3.0, 10.0], [100.0, -5.0]]);
        let weights = array![1.0, 1.0, 0.0];
        let m = weighted_moments(&samples, weights.view());

        assert_eq!(m.mass, 2.0);
        assert_eq!(m.mean, array![2.0, 10.0]);
        assert_eq!(m.variance, array![1.0, 0.0]);
        assert_eq!(m.total_variance(), 1.0);

        let g = DiagonalGaussian::from_moments(&m, 1e-6);
        assert!((g.variance[1] - 1e-6).abs() < 1e-18);
    }
}
