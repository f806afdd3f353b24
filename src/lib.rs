//! Market regime detection and regime-conditioned forward return
//! distributions for a single security.
//!
//! The core is synchronous and works on in-memory data:
//! `features` -> `regime` -> `analytics`, with `news` scoring alongside and
//! `pipeline` assembling a `report::RegimeReport`. I/O lives in `data`.

pub mod analytics;
pub mod config;
pub mod data;
pub mod features;
pub mod metrics;
pub mod news;
pub mod pipeline;
pub mod regime;
pub mod report;
pub mod validation;

// Re-export commonly used types
pub use analytics::{ConditionalQuantileEngine, QuantileConfig, QuantileTable};
pub use config::AnalysisConfig;
pub use data::{FmpClient, NewsItem, PriceBar, PriceCache, PriceSeries};
pub use features::{FeatureConfig, FeatureExtractor, FeatureMatrix};
pub use metrics::{RegimeStats, RegimeStatsCalculator};
pub use news::{NewsScoreResult, NewsScorer};
pub use pipeline::{AnalysisPipeline, PipelineError};
pub use regime::{RegimeAssignment, RegimeClassifier, RegimePolicy};
pub use report::{RegimeReport, Watchout};
pub use validation::{DataIntegrityReport, PriceIntegrityValidator};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::data::PriceSeries;

    /// Weekday closes from 100.0 whose daily log returns are Gaussian with
    /// a per-segment standard deviation: `segments` is `(rows, std)`.
    pub(crate) fn regime_switching_series(seed: u64, segments: &[(usize, f64)]) -> PriceSeries {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price = 100.0_f64;
        let mut closes = Vec::new();

        for &(rows, std) in segments {
            for _ in 0..rows {
                let u1: f64 = 1.0 - rng.gen::<f64>();
                let u2: f64 = rng.gen::<f64>();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                price *= (z * std).exp();
                closes.push(price);
            }
        }

        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        PriceSeries::from_closes("SIM", start, &closes).unwrap()
    }
}
