//! End-to-end analysis of one ticker.
//!
//! Stages run in order: integrity checks, feature extraction, regime fit,
//! conditional quantiles, regime statistics, news scoring, watchouts. Hard
//! failures (too little history, degenerate fit, bad config) abort the run;
//! soft issues are collected as annotations on the report.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analytics::{ConditionalQuantileEngine, QuantileError};
use crate::config::{AnalysisConfig, ConfigError};
use crate::data::{NewsItem, NewsSource, PriceSeries, PriceSource, SourceError};
use crate::features::{FeatureError, FeatureExtractor};
use crate::metrics::{MetricsError, RegimeStatsCalculator, MIN_REGIME_SHARE};
use crate::news::{NewsScoreResult, NewsScorer};
use crate::regime::{FitError, RegimeClassifier, RegimePolicy};
use crate::report::{
    market_watchouts, Annotation, AnnotationKind, CurrentRegime, RegimeReport,
};
use crate::validation::PriceIntegrityValidator;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load prices: {0}")]
    Source(#[from] SourceError),

    #[error("Feature extraction failed: {0}")]
    Features(#[from] FeatureError),

    #[error("Regime fit failed: {0}")]
    Fit(#[from] FitError),

    #[error("Quantile computation failed: {0}")]
    Quantiles(#[from] QuantileError),

    #[error("Regime statistics failed: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Regime fit produced no posteriors")]
    EmptyAssignment,
}

#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    config: AnalysisConfig,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyse a series already in memory. `news: None` skips news scoring.
    pub fn run(
        &self,
        series: &PriceSeries,
        news: Option<&[NewsItem]>,
    ) -> Result<RegimeReport, PipelineError> {
        let scored = news.map(|items| NewsScorer::new(self.config.news.clone()).score(items));
        self.analyze(series, scored, Vec::new())
    }

    /// Load the full history (and news, if a source is given) and analyse it.
    /// A failing news source is annotated, not fatal.
    pub fn run_from_sources(
        &self,
        ticker: &str,
        prices: &dyn PriceSource,
        news: Option<&dyn NewsSource>,
    ) -> Result<RegimeReport, PipelineError> {
        let series = prices.load_prices(ticker, None, None)?;
        info!("Loaded {} bars for {}", series.len(), ticker);

        let mut annotations = Vec::new();
        let scored = news.map(|source| match source.load_news(ticker) {
            Ok(items) => NewsScorer::new(self.config.news.clone()).score(&items),
            Err(e) => {
                warn!("News unavailable for {}: {}", ticker, e);
                annotations.push(Annotation::new(
                    AnnotationKind::NewsUnavailable,
                    format!("News unavailable: {}", e),
                ));
                NewsScoreResult::empty()
            }
        });

        self.analyze(&series, scored, annotations)
    }

    fn analyze(
        &self,
        series: &PriceSeries,
        news: Option<NewsScoreResult>,
        mut annotations: Vec<Annotation>,
    ) -> Result<RegimeReport, PipelineError> {
        let config = &self.config;
        config.validate()?;

        let integrity = PriceIntegrityValidator::new(config.integrity.clone()).validate(series);
        debug!("{}", integrity.summary());
        for check in integrity.failed_checks() {
            annotations.push(Annotation::new(
                AnnotationKind::DataIntegrity,
                format!("Data check {} failed: {}", check.name, check.message),
            ));
        }

        let features = FeatureExtractor::new(config.features.clone()).extract(series)?;
        info!(
            "Extracted {} feature rows ({} features, warmup {})",
            features.len(),
            features.n_features(),
            features.warmup()
        );

        let fit = RegimeClassifier::new(config.model.clone()).fit(&features)?;
        if !fit.diagnostics.converged() {
            annotations.push(Annotation::new(
                AnnotationKind::NotConverged,
                format!(
                    "Regime fit did not converge within {} iterations",
                    fit.diagnostics.iterations
                ),
            ));
        }

        let quantiles = ConditionalQuantileEngine::new(config.quantiles.clone()).compute(
            series,
            &fit.assignment,
            &config.horizons,
        )?;

        let regime_stats = RegimeStatsCalculator::calculate(series, &fit.assignment)?;
        let balance = RegimeStatsCalculator::balance(&fit.assignment);
        if balance.is_imbalanced(MIN_REGIME_SHARE) {
            annotations.push(Annotation::new(
                AnnotationKind::RegimeImbalance,
                format!(
                    "Regime imbalance: smallest regime has {} / {} rows ({:.1}%); consider fewer regimes",
                    balance.min_regime_size,
                    fit.assignment.len(),
                    balance.smallest_share * 100.0
                ),
            ));
        }

        let latest = fit
            .assignment
            .latest()
            .ok_or(PipelineError::EmptyAssignment)?;
        // Policy names assume label 0 is the calmest regime.
        let policy = config
            .model
            .orders_by_volatility()
            .then(|| RegimePolicy::from_posterior(latest, config.watchouts.min_confidence));

        let current_ranges: Vec<_> = quantiles
            .for_regime(latest.label)
            .into_iter()
            .cloned()
            .collect();
        for range in current_ranges.iter().filter(|r| !r.estimate.is_defined()) {
            annotations.push(Annotation::new(
                AnnotationKind::InsufficientSamples,
                format!(
                    "Only {} samples for regime {} at {} rows; quantiles withheld",
                    range.sample_count, range.regime, range.horizon
                ),
            ));
        }

        let mut watchouts = market_watchouts(latest, &features, &config.watchouts);
        if let Some(scored) = &news {
            watchouts.extend(scored.watchouts.iter().copied());
        }

        let latest_features: BTreeMap<String, f64> = features
            .kinds()
            .iter()
            .filter_map(|kind| features.latest(*kind).map(|v| (kind.name().to_string(), v)))
            .collect();

        info!(
            "{} as of {}: regime {} ({}), {} watchouts, {} annotations",
            series.ticker(),
            latest.date,
            latest.label,
            policy.map_or("no policy", |p| p.name()),
            watchouts.len(),
            annotations.len()
        );

        Ok(RegimeReport {
            ticker: series.ticker().to_string(),
            as_of: latest.date,
            rows_used: fit.assignment.len(),
            num_regimes: fit.assignment.num_regimes(),
            current: CurrentRegime {
                label: latest.label,
                probabilities: latest.probabilities.clone(),
                confidence: latest.confidence(),
                policy,
            },
            latest_features,
            quantiles,
            current_ranges,
            regime_stats,
            balance,
            diagnostics: fit.diagnostics,
            expected_durations: fit.model.expected_durations(),
            integrity,
            news,
            watchouts,
            annotations,
        })
    }
}
