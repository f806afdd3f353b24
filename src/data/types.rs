//! Core data types for regime analysis.
//!
//! Price history and news items as handed to the analysis core. A
//! `PriceSeries` is validated once on construction so downstream stages can
//! rely on strictly increasing dates and positive closes.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Dates out of order: {next} follows {prev}")]
    UnorderedDates { prev: NaiveDate, next: NaiveDate },

    #[error("Duplicate bar for {0}")]
    DuplicateDate(NaiveDate),

    #[error("Invalid close on {date}: {close}")]
    InvalidClose { date: NaiveDate, close: f64 },
}

/// Daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

impl PriceBar {
    /// Bar where only the close is known (open/high/low mirror it).
    pub fn from_close(date: NaiveDate, close: Decimal) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        }
    }

    pub fn close_f64(&self) -> f64 {
        self.close.try_into().unwrap_or(f64::NAN)
    }
}

/// Ordered daily price history for one ticker.
///
/// Invariants: dates strictly increasing, no duplicates, every close finite
/// and positive. Calendar gaps (weekends, holidays, halts) are allowed and are
/// never filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    ticker: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series from bars already in ascending date order.
    pub fn new(ticker: impl Into<String>, bars: Vec<PriceBar>) -> Result<Self, DataError> {
        for window in bars.windows(2) {
            let (prev, next) = (window[0].date, window[1].date);
            if next == prev {
                return Err(DataError::DuplicateDate(next));
            }
            if next < prev {
                return Err(DataError::UnorderedDates { prev, next });
            }
        }

        for bar in &bars {
            let close = bar.close_f64();
            if !close.is_finite() || close <= 0.0 {
                return Err(DataError::InvalidClose {
                    date: bar.date,
                    close,
                });
            }
        }

        Ok(Self {
            ticker: ticker.into(),
            bars,
        })
    }

    /// Sort bars by date first, then validate.
    pub fn from_unsorted(
        ticker: impl Into<String>,
        mut bars: Vec<PriceBar>,
    ) -> Result<Self, DataError> {
        bars.sort_by_key(|b| b.date);
        Self::new(ticker, bars)
    }

    /// Close-only series on consecutive weekdays starting at `start`.
    pub fn from_closes(
        ticker: impl Into<String>,
        start: NaiveDate,
        closes: &[f64],
    ) -> Result<Self, DataError> {
        let mut date = if is_weekend(start) {
            next_trading_day(start)
        } else {
            start
        };

        let mut bars = Vec::with_capacity(closes.len());
        for &close in closes {
            let price = Decimal::from_f64_retain(close).ok_or(DataError::InvalidClose {
                date,
                close,
            })?;
            bars.push(PriceBar::from_close(date, price));
            date = next_trading_day(date);
        }

        Self::new(ticker, bars)
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    /// Closing prices as `f64`, in date order.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close_f64()).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Row index of a date, if present.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |b| b.date).ok()
    }

    /// Sub-series restricted to an inclusive date range.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> PriceSeries {
        let bars = self
            .bars
            .iter()
            .filter(|b| start.map_or(true, |s| b.date >= s) && end.map_or(true, |e| b.date <= e))
            .cloned()
            .collect();

        PriceSeries {
            ticker: self.ticker.clone(),
            bars,
        }
    }
}

/// A single news item about the analysed ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
}

impl NewsItem {
    pub fn headline(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            body: None,
            published: None,
            source: None,
        }
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Get the next expected trading day (skip weekends).
pub fn next_trading_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while is_weekend(next) {
        next += Duration::days(1);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_next_trading_day() {
        // Friday -> Monday
        assert_eq!(next_trading_day(day(5)), day(8));
        // Monday -> Tuesday
        assert_eq!(next_trading_day(day(8)), day(9));
    }

    #[test]
    fn test_series_rejects_duplicates() {
        let bars = vec![
            PriceBar::from_close(day(2), dec!(100)),
            PriceBar::from_close(day(2), dec!(101)),
        ];
        assert_eq!(
            PriceSeries::new("SPY", bars),
            Err(DataError::DuplicateDate(day(2)))
        );
    }

    #[test]
    fn test_series_rejects_unordered() {
        let bars = vec![
            PriceBar::from_close(day(3), dec!(100)),
            PriceBar::from_close(day(2), dec!(101)),
        ];
        assert!(matches!(
            PriceSeries::new("SPY", bars),
            Err(DataError::UnorderedDates { .. })
        ));
    }

    #[test]
    fn test_series_rejects_non_positive_close() {
        let bars = vec![PriceBar::from_close(day(2), dec!(0))];
        assert!(matches!(
            PriceSeries::new("SPY", bars),
            Err(DataError::InvalidClose { .. })
        ));
    }

    #[test]
    fn test_from_unsorted_sorts() {
        let bars = vec![
            PriceBar::from_close(day(4), dec!(102)),
            PriceBar::from_close(day(2), dec!(100)),
            PriceBar::from_close(day(3), dec!(101)),
        ];
        let series = PriceSeries::from_unsorted("SPY", bars).unwrap();
        assert_eq!(series.dates(), vec![day(2), day(3), day(4)]);
        assert_eq!(series.index_of(day(3)), Some(1));
    }

    #[test]
    fn test_from_closes_skips_weekends() {
        // 2024-01-06 is a Saturday
        let series = PriceSeries::from_closes("SPY", day(6), &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(series.dates(), vec![day(8), day(9), day(10)]);
        assert_eq!(series.closes(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_between_is_inclusive() {
        let series = PriceSeries::from_closes("SPY", day(1), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let sub = series.between(Some(day(2)), Some(day(3)));
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.first_date(), Some(day(2)));
        assert_eq!(sub.ticker(), "SPY");
    }
}
