//! Analysis configuration.
//!
//! Every section has defaults, so a TOML file only needs the keys it
//! overrides:
//!
//! ```toml
//! horizons = [5, 20]
//!
//! [model]
//! num_regimes = 2
//! kind = "mixture"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::{QuantileConfig, QuantileError};
use crate::features::{FeatureConfig, FeatureError};
use crate::news::NewsConfig;
use crate::regime::{FitError, ModelConfig};
use crate::report::WatchoutThresholds;
use crate::validation::IntegrityConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid feature config: {0}")]
    Features(#[from] FeatureError),

    #[error("Invalid model config: {0}")]
    Model(#[from] FitError),

    #[error("Invalid quantile config: {0}")]
    Quantiles(#[from] QuantileError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Forward-return horizons, in trading rows.
    pub horizons: Vec<usize>,
    /// Directory holding `{TICKER}_eod.parquet` files.
    pub cache_dir: PathBuf,
    /// Days of price history requested when fetching.
    pub history_days: i64,
    /// Days of news considered when fetching.
    pub news_lookback_days: i64,
    pub features: FeatureConfig,
    pub model: ModelConfig,
    pub quantiles: QuantileConfig,
    pub news: NewsConfig,
    pub integrity: IntegrityConfig,
    pub watchouts: WatchoutThresholds,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            horizons: vec![5, 20],
            cache_dir: PathBuf::from("data/cache/prices"),
            history_days: 365 * 10,
            news_lookback_days: 7,
            features: FeatureConfig::default(),
            model: ModelConfig::default(),
            quantiles: QuantileConfig::default(),
            news: NewsConfig::default(),
            integrity: IntegrityConfig::default(),
            watchouts: WatchoutThresholds::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.features.validate()?;
        self.model.validate()?;
        self.quantiles.validate()?;

        if self.horizons.is_empty() {
            return Err(ConfigError::Invalid("at least one horizon is required".to_string()));
        }
        if self.horizons.contains(&0) {
            return Err(ConfigError::Quantiles(QuantileError::ZeroHorizon));
        }
        if !(0.0..=1.0).contains(&self.watchouts.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "watchouts.min_confidence must be within [0, 1], got {}",
                self.watchouts.min_confidence
            )));
        }
        if self.history_days <= 0 || self.news_lookback_days <= 0 {
            return Err(ConfigError::Invalid(
                "history_days and news_lookback_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
