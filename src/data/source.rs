//! Data source abstractions.
//!
//! The analysis core never performs I/O itself; callers hand it a source
//! that has already been populated (offline cache, prefetched HTTP data,
//! or fixtures in tests).

use std::collections::HashMap;

use chrono::NaiveDate;
use thiserror::Error;

use super::cache::CacheError;
use super::types::{DataError, NewsItem, PriceSeries};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("No price data for {0}")]
    NotFound(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid data: {0}")]
    Data(#[from] DataError),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Anything that can produce a daily price history for a ticker.
pub trait PriceSource {
    fn load_prices(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries, SourceError>;
}

/// Anything that can produce recent news for a ticker.
pub trait NewsSource {
    fn load_news(&self, ticker: &str) -> Result<Vec<NewsItem>, SourceError>;
}

/// Source backed by data already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    prices: HashMap<String, PriceSeries>,
    news: HashMap<String, Vec<NewsItem>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(mut self, series: PriceSeries) -> Self {
        self.prices
            .insert(series.ticker().to_uppercase(), series);
        self
    }

    pub fn with_news(mut self, ticker: &str, items: Vec<NewsItem>) -> Self {
        self.news.insert(ticker.to_uppercase(), items);
        self
    }
}

impl PriceSource for InMemorySource {
    fn load_prices(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries, SourceError> {
        self.prices
            .get(&ticker.to_uppercase())
            .map(|s| s.between(start, end))
            .ok_or_else(|| SourceError::NotFound(ticker.to_string()))
    }
}

impl NewsSource for InMemorySource {
    fn load_news(&self, ticker: &str) -> Result<Vec<NewsItem>, SourceError> {
        Ok(self
            .news
            .get(&ticker.to_uppercase())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_lookup_is_case_insensitive() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let series = PriceSeries::from_closes("spy", start, &[1.0, 2.0, 3.0]).unwrap();
        let source = InMemorySource::new()
            .with_prices(series)
            .with_news("SPY", vec![NewsItem::headline("Fed holds rates")]);

        let loaded = source.load_prices("SPY", None, None).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(source.load_news("spy").unwrap().len(), 1);
        assert!(source.load_news("QQQ").unwrap().is_empty());
    }

    #[test]
    fn test_in_memory_missing_ticker() {
        let source = InMemorySource::new();
        assert!(matches!(
            source.load_prices("QQQ", None, None),
            Err(SourceError::NotFound(_))
        ));
    }
}
