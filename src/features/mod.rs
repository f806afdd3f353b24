//! Price-derived features for regime detection.

pub mod extractor;

pub use extractor::{FeatureConfig, FeatureError, FeatureExtractor, FeatureKind, FeatureMatrix};
