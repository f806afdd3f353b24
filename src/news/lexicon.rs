//! Headline vocabularies.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const NEGATIVE_WORDS: &[&str] = &[
    "lawsuit", "fraud", "probe", "sec", "ban", "recall", "downgrade", "miss", "weak", "cut",
    "layoff", "outage", "breach",
];

pub const POSITIVE_WORDS: &[&str] = &[
    "beat", "upgrade", "record", "strong", "raise", "partnership", "wins", "growth", "profit",
    "surge",
];

/// Event topic a headline can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsTopic {
    Earnings,
    Regulation,
    Security,
    Macro,
}

impl NewsTopic {
    pub const ALL: [NewsTopic; 4] = [Self::Earnings, Self::Regulation, Self::Security, Self::Macro];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Earnings => "earnings",
            Self::Regulation => "regulation",
            Self::Security => "security",
            Self::Macro => "macro",
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Earnings => &["earnings", "guidance", "revenue", "eps", "margin"],
            Self::Regulation => &["sec", "doj", "ftc", "antitrust", "ban", "regulation"],
            Self::Security => &["breach", "hack", "leak", "ransomware", "outage"],
            Self::Macro => &["fed", "rates", "inflation", "jobs", "cpi", "gdp"],
        }
    }
}

impl fmt::Display for NewsTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Distinct lowercase alphabetic words in the text.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_lowercase())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Number of distinct vocabulary words present in the token set.
pub fn count_hits(tokens: &BTreeSet<String>, vocabulary: &[&str]) -> usize {
    vocabulary.iter().filter(|w| tokens.contains(**w)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("SEC probe: Q3 EPS miss, miss again!");
        assert!(tokens.contains("sec"));
        assert!(tokens.contains("eps"));
        assert!(tokens.contains("q"));
        assert_eq!(tokens.iter().filter(|t| *t == "miss").count(), 1);
        assert!(!tokens.iter().any(|t| t.chars().any(|c| !c.is_ascii_lowercase())));
    }

    #[test]
    fn test_count_hits_is_distinct() {
        let tokens = tokenize("weak weak guidance and a recall");
        assert_eq!(count_hits(&tokens, NEGATIVE_WORDS), 2);
        assert_eq!(count_hits(&tokens, NewsTopic::Earnings.keywords()), 1);
    }
}
