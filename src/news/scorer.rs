//! Lexicon-based news risk scoring.
//!
//! Each item's headline and body are reduced to a set of words. Sentiment is
//! positive minus negative vocabulary hits; an item with at least one negative
//! hit and non-positive sentiment is a risk headline. Topic hits are counted
//! once per item.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use super::lexicon::{count_hits, tokenize, NewsTopic, NEGATIVE_WORDS, POSITIVE_WORDS};
use crate::data::NewsItem;
use crate::report::Watchout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    /// Risk headlines needed to raise `headline_risk`.
    pub headline_risk_threshold: usize,
    /// Items on one topic needed to raise `<topic>_cluster`.
    pub topic_cluster_threshold: usize,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            headline_risk_threshold: 2,
            topic_cluster_threshold: 2,
        }
    }
}

/// Categorical risk label raised by the news scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskFlag {
    HeadlineRisk,
    TopicCluster(NewsTopic),
}

impl RiskFlag {
    /// Watchout implied by this flag.
    pub fn watchout(&self) -> Watchout {
        match self {
            Self::HeadlineRisk => Watchout::GapRisk,
            Self::TopicCluster(_) => Watchout::EventRisk,
        }
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeadlineRisk => f.write_str("headline_risk"),
            Self::TopicCluster(topic) => write!(f, "{}_cluster", topic),
        }
    }
}

impl Serialize for RiskFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Word counts for one item.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemScore {
    pub positive: usize,
    pub negative: usize,
    pub topics: Vec<NewsTopic>,
}

impl ItemScore {
    pub fn sentiment(&self) -> i64 {
        self.positive as i64 - self.negative as i64
    }

    pub fn is_risk_headline(&self) -> bool {
        self.negative >= 1 && self.sentiment() <= 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsScoreResult {
    /// Net sentiment over all vocabulary hits, in [-1, 1].
    pub score: f64,
    pub flags: BTreeSet<RiskFlag>,
    pub watchouts: BTreeSet<Watchout>,
    pub item_count: usize,
    pub positive_hits: usize,
    pub negative_hits: usize,
    pub risk_headlines: usize,
    pub topic_counts: BTreeMap<NewsTopic, usize>,
}

impl NewsScoreResult {
    /// Result for a ticker with no usable news.
    pub fn empty() -> Self {
        Self {
            score: 0.0,
            flags: BTreeSet::new(),
            watchouts: BTreeSet::new(),
            item_count: 0,
            positive_hits: 0,
            negative_hits: 0,
            risk_headlines: 0,
            topic_counts: NewsTopic::ALL.iter().map(|t| (*t, 0)).collect(),
        }
    }

    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.flags.contains(&flag)
    }
}

#[derive(Debug, Clone)]
pub struct NewsScorer {
    config: NewsConfig,
}

impl NewsScorer {
    pub fn new(config: NewsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NewsConfig {
        &self.config
    }

    pub fn score_item(item: &NewsItem) -> ItemScore {
        let mut text = item.headline.clone();
        if let Some(body) = &item.body {
            text.push(' ');
            text.push_str(body);
        }
        let tokens = tokenize(&text);

        ItemScore {
            positive: count_hits(&tokens, POSITIVE_WORDS),
            negative: count_hits(&tokens, NEGATIVE_WORDS),
            topics: NewsTopic::ALL
                .iter()
                .copied()
                .filter(|t| count_hits(&tokens, t.keywords()) > 0)
                .collect(),
        }
    }

    pub fn score(&self, items: &[NewsItem]) -> NewsScoreResult {
        let mut result = NewsScoreResult::empty();
        result.item_count = items.len();

        let mut net: i64 = 0;
        for item in items {
            let item_score = Self::score_item(item);
            result.positive_hits += item_score.positive;
            result.negative_hits += item_score.negative;
            net += item_score.sentiment();
            if item_score.is_risk_headline() {
                result.risk_headlines += 1;
            }
            for topic in &item_score.topics {
                *result.topic_counts.entry(*topic).or_insert(0) += 1;
            }
        }

        let hits = result.positive_hits + result.negative_hits;
        result.score = if hits > 0 {
            (net as f64 / hits as f64).clamp(-1.0, 1.0)
        } else {
            0.0
        };

        if result.risk_headlines >= self.config.headline_risk_threshold {
            result.flags.insert(RiskFlag::HeadlineRisk);
        }
        for (topic, count) in &result.topic_counts {
            if *count >= self.config.topic_cluster_threshold {
                result.flags.insert(RiskFlag::TopicCluster(*topic));
            }
        }
        result.watchouts = result.flags.iter().map(RiskFlag::watchout).collect();

        debug!(
            "Scored {} news items: score {:.2}, {} risk headlines, {} flags",
            result.item_count,
            result.score,
            result.risk_headlines,
            result.flags.len()
        );
        result
    }
}

impl Default for NewsScorer {
    fn default() -> Self {
        Self::new(NewsConfig::default())
    }
}
