//! News risk scoring.

pub mod lexicon;
pub mod scorer;

pub use lexicon::NewsTopic;
pub use scorer::{ItemScore, NewsConfig, NewsScoreResult, NewsScorer, RiskFlag};
