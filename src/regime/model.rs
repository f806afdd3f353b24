//! Probabilistic regime model fitted by expectation-maximisation.
//!
//! Two model families share the same machinery:
//! - `HiddenMarkov`: Gaussian HMM with diagonal covariances, smoothed
//!   forward-backward posteriors and a learned transition matrix.
//! - `Mixture`: Gaussian mixture with diagonal covariances and independent
//!   per-date posteriors.
//!
//! Features are z-scored before fitting. Each restart is seeded with
//! k-means++ from `seed + restart`, restarts run in parallel, and the best
//! final log-likelihood wins (ties to the lowest restart index), so a fit is
//! deterministic for a given seed.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::assignment::RegimeAssignment;
use super::gaussian::{weighted_moments, DiagonalGaussian};
use super::inference::{emission_log_likelihoods, forward_backward, mixture_posteriors};
use super::relabel::relabel;
use super::seeding::kmeans;
use crate::features::{FeatureKind, FeatureMatrix};

/// Responsibility mass below which a state counts as empty.
const MIN_STATE_MASS: f64 = 1e-8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("Degenerate state {state}: {reason}")]
    Degenerate { state: usize, reason: String },

    #[error("Too few observations: {rows} rows for {regimes} regimes")]
    TooFewObservations { rows: usize, regimes: usize },

    #[error("Non-finite log-likelihood at iteration {iteration}")]
    NonFiniteLikelihood { iteration: usize },

    #[error("Invalid model config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    HiddenMarkov,
    Mixture,
}

/// Regime model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub num_regimes: usize,
    pub kind: ModelKind,
    /// Minimum log-likelihood improvement per iteration.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub restarts: usize,
    pub seed: u64,
    /// Total variance (before regularisation) below which a state is degenerate.
    pub variance_floor: f64,
    /// Added to every variance used in likelihoods.
    pub variance_regularization: f64,
    /// Initial self-transition probability of the HMM.
    pub sticky_init: f64,
    /// Feature used to order regimes after fitting; `None` keeps fit order.
    pub ordering: Option<FeatureKind>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_regimes: 3,
            kind: ModelKind::HiddenMarkov,
            tolerance: 1e-4,
            max_iterations: 200,
            restarts: 4,
            seed: 7,
            variance_floor: 1e-9,
            variance_regularization: 1e-6,
            sticky_init: 0.9,
            ordering: Some(FeatureKind::RealizedVol),
        }
    }
}

impl ModelConfig {
    /// Whether labels come out ordered from calmest to most volatile.
    pub fn orders_by_volatility(&self) -> bool {
        matches!(
            self.ordering,
            Some(FeatureKind::RealizedVol | FeatureKind::RealizedVolLong)
        )
    }

    pub fn validate(&self) -> Result<(), FitError> {
        if self.num_regimes == 0 {
            return Err(FitError::InvalidConfig("num_regimes must be >= 1".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(FitError::InvalidConfig("max_iterations must be >= 1".to_string()));
        }
        if self.restarts == 0 {
            return Err(FitError::InvalidConfig("restarts must be >= 1".to_string()));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(FitError::InvalidConfig("tolerance must be positive".to_string()));
        }
        if !(self.variance_floor >= 0.0 && self.variance_regularization >= 0.0) {
            return Err(FitError::InvalidConfig(
                "variance floor and regularization must be non-negative".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.sticky_init) {
            return Err(FitError::InvalidConfig("sticky_init must be in [0, 1)".to_string()));
        }
        Ok(())
    }
}

/// Z-score scaler. Zero-variance columns are centred only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standardizer {
    pub center: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Standardizer {
    pub fn fit(data: &Array2<f64>) -> Self {
        let n = data.nrows().max(1) as f64;
        let mut center = Vec::with_capacity(data.ncols());
        let mut scale = Vec::with_capacity(data.ncols());

        for col in data.columns() {
            let mean = col.sum() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            center.push(mean);
            scale.push(if std > 1e-12 { std } else { 1.0 });
        }

        Self { center, scale }
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let mut out = data.clone();
        for (j, mut col) in out.columns_mut().into_iter().enumerate() {
            let (c, s) = (self.center[j], self.scale[j]);
            col.mapv_inplace(|v| (v - c) / s);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    Converged,
    NotConverged,
}

/// How the winning fit got there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitDiagnostics {
    pub status: ConvergenceStatus,
    /// M-steps performed by the winning restart.
    pub iterations: usize,
    pub log_likelihood: f64,
    pub best_restart: usize,
    /// Final log-likelihood per restart; `None` for discarded restarts.
    pub restart_log_likelihoods: Vec<Option<f64>>,
}

impl FitDiagnostics {
    pub fn converged(&self) -> bool {
        self.status == ConvergenceStatus::Converged
    }

    pub fn discarded_restarts(&self) -> usize {
        self.restart_log_likelihoods.iter().filter(|r| r.is_none()).count()
    }
}

/// Fitted parameters. Means and variances live in standardised space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeModel {
    pub kind: ModelKind,
    pub feature_kinds: Vec<FeatureKind>,
    pub standardizer: Standardizer,
    /// `K x D` emission means.
    #[serde(skip)]
    pub means: Array2<f64>,
    /// `K x D` emission variances, regularisation included.
    #[serde(skip)]
    pub variances: Array2<f64>,
    /// Mixture weights, or average state occupancy for the HMM.
    pub weights: Vec<f64>,
    pub initial: Vec<f64>,
    /// `K x K` transition matrix (HMM only).
    #[serde(skip)]
    pub transition: Option<Array2<f64>>,
}

impl RegimeModel {
    pub fn num_regimes(&self) -> usize {
        self.means.nrows()
    }

    /// Emission mean of a feature in unscaled units.
    pub fn feature_mean(&self, state: usize, kind: FeatureKind) -> Option<f64> {
        let col = self.feature_kinds.iter().position(|k| *k == kind)?;
        let z = *self.means.get([state, col])?;
        Some(z * self.standardizer.scale[col] + self.standardizer.center[col])
    }

    /// Expected number of consecutive days in each state, from the
    /// transition diagonal.
    pub fn expected_durations(&self) -> Option<Vec<f64>> {
        let transition = self.transition.as_ref()?;
        Some(
            transition
                .diag()
                .iter()
                .map(|p| if *p < 1.0 { 1.0 / (1.0 - p) } else { f64::INFINITY })
                .collect(),
        )
    }

    fn emissions(&self) -> Vec<DiagonalGaussian> {
        self.means
            .rows()
            .into_iter()
            .zip(self.variances.rows())
            .map(|(m, v)| DiagonalGaussian::new(m.to_owned(), v.to_owned()))
            .collect()
    }

    /// E-step: posteriors, expected transition counts (HMM only) and
    /// log-likelihood of standardised observations.
    fn e_step(&self, observations: &Array2<f64>) -> (Array2<f64>, Option<Array2<f64>>, f64) {
        let log_emissions = emission_log_likelihoods(observations, &self.emissions());
        match (&self.transition, self.kind) {
            (Some(transition), ModelKind::HiddenMarkov) => {
                let log_initial = Array1::from(self.initial.clone()).mapv(f64::ln);
                let post = forward_backward(&log_emissions, &log_initial, &transition.mapv(f64::ln));
                (post.gamma, Some(post.xi_sum), post.log_likelihood)
            }
            _ => {
                let log_weights = Array1::from(self.weights.clone()).mapv(f64::ln);
                let (gamma, log_likelihood) = mixture_posteriors(&log_emissions, &log_weights);
                (gamma, None, log_likelihood)
            }
        }
    }
}

/// Model, assignment and diagnostics of a fit.
#[derive(Debug, Clone)]
pub struct RegimeFit {
    pub model: RegimeModel,
    pub assignment: RegimeAssignment,
    pub diagnostics: FitDiagnostics,
}

struct RestartOutcome {
    model: RegimeModel,
    gamma: Array2<f64>,
    log_likelihood: f64,
    iterations: usize,
    status: ConvergenceStatus,
}

/// Fits a regime model over a feature matrix.
#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    config: ModelConfig,
}

impl RegimeClassifier {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Fit with the configured number of regimes.
    pub fn fit(&self, features: &FeatureMatrix) -> Result<RegimeFit, FitError> {
        self.fit_and_infer(features, self.config.num_regimes)
    }

    /// Fit a `num_regimes`-state model and infer per-date posteriors.
    pub fn fit_and_infer(
        &self,
        features: &FeatureMatrix,
        num_regimes: usize,
    ) -> Result<RegimeFit, FitError> {
        let config = ModelConfig {
            num_regimes,
            ..self.config.clone()
        };
        config.validate()?;

        let rows = features.len();
        if rows < num_regimes || rows == 0 {
            return Err(FitError::TooFewObservations {
                rows,
                regimes: num_regimes,
            });
        }
        if features.values().iter().any(|v| !v.is_finite()) {
            return Err(FitError::InvalidConfig("feature matrix contains non-finite values".to_string()));
        }

        let standardizer = Standardizer::fit(features.values());
        let observations = standardizer.transform(features.values());

        let outcomes: Vec<Result<RestartOutcome, FitError>> = (0..config.restarts)
            .into_par_iter()
            .map(|restart| {
                fit_restart(
                    &config,
                    &observations,
                    features.kinds(),
                    &standardizer,
                    config.seed.wrapping_add(restart as u64),
                )
            })
            .collect();

        let mut best: Option<(usize, RestartOutcome)> = None;
        let mut first_error: Option<FitError> = None;
        let mut restart_log_likelihoods = Vec::with_capacity(outcomes.len());

        for (restart, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(outcome) => {
                    restart_log_likelihoods.push(Some(outcome.log_likelihood));
                    let better = best
                        .as_ref()
                        .map_or(true, |(_, b)| outcome.log_likelihood > b.log_likelihood);
                    if better {
                        best = Some((restart, outcome));
                    }
                }
                Err(e) => {
                    debug!("Restart {} discarded: {}", restart, e);
                    restart_log_likelihoods.push(None);
                    first_error.get_or_insert(e);
                }
            }
        }

        let (best_restart, outcome) = match best {
            Some(best) => best,
            None => {
                let err = first_error.unwrap_or_else(|| {
                    FitError::InvalidConfig("no restarts were run".to_string())
                });
                warn!("All {} restarts failed: {}", config.restarts, err);
                return Err(err);
            }
        };

        let assignment = RegimeAssignment::from_probabilities(features.dates(), &outcome.gamma)?;
        let (model, assignment) = match config.ordering {
            Some(kind) => relabel(&outcome.model, &assignment, kind)?,
            None => (outcome.model, assignment),
        };

        let diagnostics = FitDiagnostics {
            status: outcome.status,
            iterations: outcome.iterations,
            log_likelihood: outcome.log_likelihood,
            best_restart,
            restart_log_likelihoods,
        };

        match diagnostics.status {
            ConvergenceStatus::Converged => info!(
                "Fitted {} regimes ({:?}) on {} rows: converged after {} iterations, log-likelihood {:.4}",
                num_regimes, config.kind, rows, diagnostics.iterations, diagnostics.log_likelihood
            ),
            ConvergenceStatus::NotConverged => warn!(
                "Fitted {} regimes ({:?}) on {} rows: not converged after {} iterations, log-likelihood {:.4}",
                num_regimes, config.kind, rows, diagnostics.iterations, diagnostics.log_likelihood
            ),
        }

        Ok(RegimeFit {
            model,
            assignment,
            diagnostics,
        })
    }
}

/// Gaussian parameters for every state from responsibilities.
fn estimate_emissions(
    config: &ModelConfig,
    observations: &Array2<f64>,
    gamma: &Array2<f64>,
) -> Result<(Array2<f64>, Array2<f64>, Vec<f64>), FitError> {
    let (k, d) = (gamma.ncols(), observations.ncols());
    let mut means = Array2::zeros((k, d));
    let mut variances = Array2::zeros((k, d));
    let mut masses = Vec::with_capacity(k);

    for state in 0..k {
        let moments = weighted_moments(observations, gamma.column(state));
        if moments.mass < MIN_STATE_MASS {
            return Err(FitError::Degenerate {
                state,
                reason: "responsibility mass vanished".to_string(),
            });
        }
        if moments.total_variance() < config.variance_floor {
            return Err(FitError::Degenerate {
                state,
                reason: format!(
                    "total variance {:.3e} below floor {:.3e}",
                    moments.total_variance(),
                    config.variance_floor
                ),
            });
        }
        let emission = DiagonalGaussian::from_moments(&moments, config.variance_regularization);
        means.row_mut(state).assign(&emission.mean);
        variances.row_mut(state).assign(&emission.variance);
        masses.push(moments.mass);
    }

    Ok((means, variances, masses))
}

fn normalize(values: &[f64]) -> Vec<f64> {
    let sum: f64 = values.iter().sum();
    values.iter().map(|v| v / sum).collect()
}

fn initial_transition(k: usize, sticky: f64) -> Array2<f64> {
    if k == 1 {
        return Array2::ones((1, 1));
    }
    let off = (1.0 - sticky) / (k - 1) as f64;
    Array2::from_shape_fn((k, k), |(i, j)| if i == j { sticky } else { off })
}

fn transition_from_counts(xi_sum: &Array2<f64>) -> Array2<f64> {
    let k = xi_sum.nrows();
    let mut transition = Array2::from_elem((k, k), 1.0 / k as f64);
    for (i, row) in xi_sum.axis_iter(Axis(0)).enumerate() {
        let total = row.sum();
        if total > 0.0 {
            for j in 0..k {
                transition[[i, j]] = row[j] / total;
            }
        }
    }
    transition
}

fn fit_restart(
    config: &ModelConfig,
    observations: &Array2<f64>,
    feature_kinds: &[FeatureKind],
    standardizer: &Standardizer,
    seed: u64,
) -> Result<RestartOutcome, FitError> {
    let k = config.num_regimes;
    let t = observations.nrows();
    let mut rng = StdRng::seed_from_u64(seed);

    let hard = kmeans(observations, k, &mut rng);
    let mut gamma = Array2::zeros((t, k));
    for (row, label) in hard.iter().enumerate() {
        gamma[[row, *label]] = 1.0;
    }

    let (means, variances, masses) = estimate_emissions(config, observations, &gamma)?;
    let weights = normalize(&masses);
    let transition = match config.kind {
        ModelKind::HiddenMarkov => Some(initial_transition(k, config.sticky_init)),
        ModelKind::Mixture => None,
    };

    let mut model = RegimeModel {
        kind: config.kind,
        feature_kinds: feature_kinds.to_vec(),
        standardizer: standardizer.clone(),
        means,
        variances,
        initial: weights.clone(),
        weights,
        transition,
    };

    let mut prev_ll = f64::NEG_INFINITY;
    let mut status = ConvergenceStatus::NotConverged;
    let mut iterations = 0;

    loop {
        let (posterior, xi_sum, log_likelihood) = model.e_step(observations);

        if !log_likelihood.is_finite() {
            return Err(FitError::NonFiniteLikelihood {
                iteration: iterations,
            });
        }
        gamma = posterior;

        let improvement = log_likelihood - prev_ll;
        prev_ll = log_likelihood;
        if iterations > 0 && improvement < config.tolerance {
            status = ConvergenceStatus::Converged;
            break;
        }

        if iterations == config.max_iterations {
            break;
        }

        // M-step
        let (means, variances, masses) = estimate_emissions(config, observations, &gamma)?;
        model.means = means;
        model.variances = variances;
        model.weights = normalize(&masses);
        if let Some(xi_sum) = xi_sum {
            model.initial = gamma.row(0).to_vec();
            model.transition = Some(transition_from_counts(&xi_sum));
        }
        iterations += 1;

        if iterations % 25 == 0 {
            debug!("Seed {} iteration {}: log-likelihood = {:.4}", seed, iterations, log_likelihood);
        }
    }

    Ok(RestartOutcome {
        model,
        gamma,
        log_likelihood: prev_ll,
        iterations,
        status,
    })
}
