//! Market regime detection.
//!
//! Fits a latent-state model over price features and returns, per date, a
//! regime label with posterior probabilities:
//! - `model`: configuration, EM fitting, restarts, diagnostics
//! - `relabel`: volatility ordering of the fitted states
//! - `policy`: risk_on / late_cycle / risk_off / transition mapping

pub mod assignment;
pub mod gaussian;
pub mod inference;
pub mod model;
pub mod policy;
pub mod relabel;
pub mod seeding;

pub use assignment::{RegimeAssignment, RegimePosterior};
pub use model::{
    ConvergenceStatus, FitDiagnostics, FitError, ModelConfig, ModelKind, RegimeClassifier,
    RegimeFit, RegimeModel, Standardizer,
};
pub use policy::{RegimePolicy, DEFAULT_MIN_CONFIDENCE};
pub use relabel::{regime_order, relabel};
