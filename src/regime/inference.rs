//! Posterior inference in log space.
//!
//! Works on a precomputed `T x K` matrix of emission log-likelihoods so the
//! same routines serve the mixture and the hidden Markov model.

use ndarray::{Array1, Array2};

use super::gaussian::DiagonalGaussian;

/// ln(sum(exp(values))) without overflow. Empty or all `-inf` gives `-inf`.
pub fn log_sum_exp(values: impl IntoIterator<Item = f64> + Clone) -> f64 {
    let max = values.clone().into_iter().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = values.into_iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Emission log-likelihood of every observation under every state.
pub fn emission_log_likelihoods(
    observations: &Array2<f64>,
    emissions: &[DiagonalGaussian],
) -> Array2<f64> {
    let t = observations.nrows();
    let k = emissions.len();
    let mut out = Array2::zeros((t, k));
    for (row, obs) in observations.rows().into_iter().enumerate() {
        for (state, emission) in emissions.iter().enumerate() {
            out[[row, state]] = emission.log_pdf(obs);
        }
    }
    out
}

/// Independent per-row posteriors of a mixture.
///
/// Returns `(gamma, log_likelihood)`.
pub fn mixture_posteriors(log_emissions: &Array2<f64>, log_weights: &Array1<f64>) -> (Array2<f64>, f64) {
    let (t, k) = log_emissions.dim();
    let mut gamma = Array2::zeros((t, k));
    let mut log_likelihood = 0.0;

    for row in 0..t {
        let joint: Vec<f64> = (0..k)
            .map(|s| log_weights[s] + log_emissions[[row, s]])
            .collect();
        let norm = log_sum_exp(joint.iter().copied());
        log_likelihood += norm;
        for s in 0..k {
            gamma[[row, s]] = (joint[s] - norm).exp();
        }
    }

    (gamma, log_likelihood)
}

/// Smoothed posteriors of a hidden Markov model.
#[derive(Debug, Clone)]
pub struct HmmPosterior {
    /// P(state_t = j | all observations), `T x K`.
    pub gamma: Array2<f64>,
    /// Expected transition counts summed over time, `K x K`.
    pub xi_sum: Array2<f64>,
    pub log_likelihood: f64,
}

/// Forward-backward recursion in log space.
pub fn forward_backward(
    log_emissions: &Array2<f64>,
    log_initial: &Array1<f64>,
    log_transition: &Array2<f64>,
) -> HmmPosterior {
    let (t, k) = log_emissions.dim();
    if t == 0 {
        return HmmPosterior {
            gamma: Array2::zeros((0, k)),
            xi_sum: Array2::zeros((k, k)),
            log_likelihood: 0.0,
        };
    }

    let mut log_alpha = Array2::from_elem((t, k), f64::NEG_INFINITY);
    for j in 0..k {
        log_alpha[[0, j]] = log_initial[j] + log_emissions[[0, j]];
    }
    for row in 1..t {
        for j in 0..k {
            let incoming = log_sum_exp((0..k).map(|i| log_alpha[[row - 1, i]] + log_transition[[i, j]]));
            log_alpha[[row, j]] = incoming + log_emissions[[row, j]];
        }
    }
    let log_likelihood = log_sum_exp((0..k).map(|j| log_alpha[[t - 1, j]]));

    let mut log_beta = Array2::zeros((t, k));
    for row in (0..t - 1).rev() {
        for i in 0..k {
            log_beta[[row, i]] = log_sum_exp((0..k).map(|j| {
                log_transition[[i, j]] + log_emissions[[row + 1, j]] + log_beta[[row + 1, j]]
            }));
        }
    }

    let mut gamma = Array2::zeros((t, k));
    for row in 0..t {
        let mut sum = 0.0;
        for j in 0..k {
            let p = (log_alpha[[row, j]] + log_beta[[row, j]] - log_likelihood).exp();
            gamma[[row, j]] = p;
            sum += p;
        }
        if sum > 0.0 {
            for j in 0..k {
                gamma[[row, j]] /= sum;
            }
        }
    }

    let mut xi_sum = Array2::zeros((k, k));
    for row in 0..t - 1 {
        for i in 0..k {
            for j in 0..k {
                let log_xi = log_alpha[[row, i]]
                    + log_transition[[i, j]]
                    + log_emissions[[row + 1, j]]
                    + log_beta[[row + 1, j]]
                    - log_likelihood;
                xi_sum[[i, j]] += log_xi.exp();
            }
        }
    }

    HmmPosterior {
        gamma,
        xi_sum,
        log_likelihood,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_state_emissions() -> Vec<DiagonalGaussian> {
        vec![
            DiagonalGaussian::new(array![0.0], array![1.0]),
            DiagonalGaussian::new(array![3.0], array![1.0]),
        ]
    }

    #[test]
    fn test_log_sum_exp() {
        assert!((log_sum_exp([0.0, 0.0]) - 2f64.ln()).abs() < 1e-12);
        assert!((log_sum_exp([1000.0, 1000.0]) - (1000.0 + 2f64.ln())).abs() < 1e-9);
        assert_eq!(log_sum_exp([f64::NEG_INFINITY, f64::NEG_INFINITY]), f64::NEG_INFINITY);
        assert_eq!(log_sum_exp(Vec::<f64>::new()), f64::NEG_INFINITY);
    }

    #[test]
    fn test_forward_backward_posteriors_sum_to_one() {
        let obs = ndarray::arr2(&[[0.1], [0.2], [2.8], [3.1]]);
        let log_e = emission_log_likelihoods(&obs, &two_state_emissions());
        let log_init = array![0.6f64, 0.4].mapv(f64::ln);
        let log_trans = ndarray::arr2(&[[0.7f64, 0.3], [0.4, 0.6]]).mapv(f64::ln);

        let post = forward_backward(&log_e, &log_init, &log_trans);
        for row in post.gamma.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert!(post.gamma[[0, 0]] > 0.5);
        assert!(post.gamma[[3, 1]] > 0.5);
        // Expected transitions over T-1 steps
        assert!((post.xi_sum.sum() - 3.0).abs() < 1e-9);
        assert!(post.log_likelihood.is_finite());
    }

    #[test]
    fn test_single_state_hmm_matches_mixture() {
        let obs = ndarray::arr2(&[[0.5], [-0.25], [1.5]]);
        let emissions = vec![DiagonalGaussian::new(array![0.0], array![2.0])];
        let log_e = emission_log_likelihoods(&obs, &emissions);

        let hmm = forward_backward(&log_e, &array![0.0], &ndarray::arr2(&[[0.0]]));
        let (_, mix_ll) = mixture_posteriors(&log_e, &array![0.0]);
        assert!((hmm.log_likelihood - mix_ll).abs() < 1e-12);
        assert!((hmm.log_likelihood - log_e.sum()).abs() < 1e-12);
    }

    #[test]
    fn test_mixture_posteriors() {
        let obs = ndarray::arr2(&[[1.5]]);
        let log_e = emission_log_likelihoods(&obs, &two_state_emissions());
        let (gamma, _) = mixture_posteriors(&log_e, &array![0.5f64, 0.5].mapv(f64::ln));
        // Equidistant from both means with equal weights
        assert!((gamma[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((gamma[[0, 1]] - 0.5).abs() < 1e-12);
    }
}
