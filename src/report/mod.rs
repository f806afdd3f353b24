//! Analysis report assembled by the pipeline.

pub mod watchouts;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::analytics::{QuantileEstimate, QuantileTable, RegimeQuantileSummary};
use crate::metrics::{RegimeBalance, RegimeStats};
use crate::news::NewsScoreResult;
use crate::regime::{FitDiagnostics, RegimePolicy};
use crate::validation::DataIntegrityReport;

pub use watchouts::{market_watchouts, Watchout, WatchoutThresholds};

/// Which stage raised a soft issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    DataIntegrity,
    NotConverged,
    RegimeImbalance,
    InsufficientSamples,
    NewsUnavailable,
}

/// Soft issue that did not stop the analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub message: String,
}

impl Annotation {
    pub fn new(kind: AnnotationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Regime on the last analysed date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentRegime {
    pub label: usize,
    pub probabilities: Vec<f64>,
    pub confidence: f64,
    /// `None` when labels are not ordered by volatility.
    pub policy: Option<RegimePolicy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegimeReport {
    pub ticker: String,
    pub as_of: NaiveDate,
    pub rows_used: usize,
    pub num_regimes: usize,
    pub current: CurrentRegime,
    /// Latest value of each feature, keyed by feature name.
    pub latest_features: BTreeMap<String, f64>,
    pub quantiles: QuantileTable,
    /// Quantile rows for the current regime only.
    pub current_ranges: Vec<RegimeQuantileSummary>,
    pub regime_stats: Vec<RegimeStats>,
    pub balance: RegimeBalance,
    pub diagnostics: FitDiagnostics,
    /// Expected spell length per regime, in rows (HMM only).
    pub expected_durations: Option<Vec<f64>>,
    pub integrity: DataIntegrityReport,
    pub news: Option<NewsScoreResult>,
    pub watchouts: BTreeSet<Watchout>,
    pub annotations: Vec<Annotation>,
}

impl RegimeReport {
    pub fn has_annotation(&self, kind: AnnotationKind) -> bool {
        self.annotations.iter().any(|a| a.kind == kind)
    }

    /// Generate a summary report.
    pub fn summary(&self) -> String {
        let probs: Vec<String> = self
            .current
            .probabilities
            .iter()
            .map(|p| format!("{:.3}", p))
            .collect();
        let policy = match self.current.policy {
            Some(policy) => format!("{}: {}", policy, policy.description()),
            None => "unordered labels, no policy".to_string(),
        };

        let mut out = format!(
            "Regime Report: {} (as of {})\n\
             ==============================\n\
             Regime: {} of {} (confidence {:.1}%)\n\
             Policy: {}\n\
             Probabilities: [{}]\n\
             Fit: {:?} after {} iterations, log-likelihood {:.2}\n",
            self.ticker,
            self.as_of,
            self.current.label,
            self.num_regimes,
            self.current.confidence * 100.0,
            policy,
            probs.join(", "),
            self.diagnostics.status,
            self.diagnostics.iterations,
            self.diagnostics.log_likelihood
        );
        if let Some(durations) = &self.expected_durations {
            let ds: Vec<String> = durations.iter().map(|d| format!("{:.1}d", d)).collect();
            out.push_str(&format!("Expected durations: [{}]\n", ds.join(", ")));
        }

        out.push_str("\nForward returns from current regime:\n");
        for summary in &self.current_ranges {
            let line = match &summary.estimate {
                QuantileEstimate::Defined { quantiles, mean } => {
                    let qs: Vec<String> = quantiles
                        .iter()
                        .map(|q| format!("p{:.0}={:+.2}%", q.level * 100.0, q.value * 100.0))
                        .collect();
                    format!(
                        "  {:>3}d (n={}): {} mean={:+.2}%\n",
                        summary.horizon,
                        summary.sample_count,
                        qs.join(" "),
                        mean * 100.0
                    )
                }
                QuantileEstimate::InsufficientData { required } => format!(
                    "  {:>3}d (n={}): insufficient data (need {})\n",
                    summary.horizon, summary.sample_count, required
                ),
            };
            out.push_str(&line);
        }

        out.push_str("\nRegime statistics:\n");
        for stats in &self.regime_stats {
            out.push_str(&format!(
                "  {}: {} days ({:.1}%), avg prob {:.2}, vol {:.1}%, max DD {:.1}%, avg spell {:.1}d\n",
                stats.regime,
                stats.days,
                stats.pct_of_total,
                stats.mean_probability,
                stats.annualized_volatility * 100.0,
                stats.max_drawdown_pct,
                stats.mean_spell_length
            ));
        }

        if let Some(news) = &self.news {
            let flags: Vec<String> = news.flags.iter().map(|f| f.to_string()).collect();
            out.push_str(&format!(
                "\nNews: {} items, score {:+.2}, flags [{}]\n",
                news.item_count,
                news.score,
                flags.join(", ")
            ));
        }

        if !self.watchouts.is_empty() {
            let names: Vec<&str> = self.watchouts.iter().map(|w| w.name()).collect();
            out.push_str(&format!("\nWatchouts: {}\n", names.join(", ")));
        }

        if !self.annotations.is_empty() {
            out.push_str("\nNotes:\n");
            for a in &self.annotations {
                out.push_str(&format!("  - {}\n", a.message));
            }
        }

        out
    }
}
