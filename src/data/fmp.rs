//! Financial Modeling Prep (FMP) client for daily prices and stock news.
//!
//! Endpoints (stable API):
//! - `historical-price-eod/full?symbol=..&from=..&to=..`
//! - `news/stock?symbols=..&limit=..`
//!
//! The API key is passed as the `apikey` query parameter.

use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::types::{DataError, NewsItem, PriceBar, PriceSeries};

/// FMP stable API base URL.
const BASE_URL: &str = "https://financialmodelingprep.com/stable";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "FMP_API_KEY";

/// Minimum interval between requests.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(250);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum FmpError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Missing API key (set FMP_API_KEY)")]
    MissingApiKey,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("No price data returned for {0}")]
    NoData(String),

    #[error("Invalid series: {0}")]
    Data(#[from] DataError),
}

/// Raw end-of-day record. FMP omits fields freely, so everything but the
/// date is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEodRecord {
    pub date: String,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default, alias = "adjclose", alias = "adj_close")]
    pub adj_close: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl RawEodRecord {
    /// Convert to a bar, preferring the adjusted close.
    ///
    /// When the adjusted close differs from the raw close, open/high/low are
    /// scaled by the same factor so the bar stays internally consistent.
    pub fn to_bar(&self) -> Option<PriceBar> {
        let date = NaiveDate::parse_from_str(self.date.get(..10)?, "%Y-%m-%d").ok()?;
        let raw_close = self.close.or(self.adj_close)?;
        let close = self.adj_close.unwrap_or(raw_close);
        if !close.is_finite() || close <= 0.0 {
            return None;
        }

        let factor = if raw_close > 0.0 { close / raw_close } else { 1.0 };
        let scaled = |v: Option<f64>| Decimal::from_f64_retain(v.unwrap_or(raw_close) * factor);

        Some(PriceBar {
            date,
            open: scaled(self.open)?,
            high: scaled(self.high)?,
            low: scaled(self.low)?,
            close: Decimal::from_f64_retain(close)?,
            volume: self.volume.unwrap_or(0.0).max(0.0) as i64,
        })
    }
}

/// Raw stock news record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNewsRecord {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl RawNewsRecord {
    pub fn published(&self) -> Option<DateTime<Utc>> {
        let raw = self.published_date.as_deref()?;
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|dt| dt.and_utc())
    }

    pub fn to_news_item(&self) -> NewsItem {
        NewsItem {
            headline: self.title.clone(),
            body: self.text.clone(),
            published: self.published(),
            source: self.publisher.clone().or_else(|| self.site.clone()),
        }
    }
}

/// Rate-limited FMP client.
pub struct FmpClient {
    client: Client,
    api_key: String,
    last_request: Instant,
    request_count: u64,
}

impl FmpClient {
    pub fn new(api_key: String) -> Result<Self, FmpError> {
        if api_key.trim().is_empty() {
            return Err(FmpError::MissingApiKey);
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            last_request: Instant::now() - MIN_REQUEST_INTERVAL,
            request_count: 0,
        })
    }

    /// Build a client from `FMP_API_KEY`.
    pub fn from_env() -> Result<Self, FmpError> {
        let key = std::env::var(API_KEY_ENV).unwrap_or_default();
        Self::new(key)
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &mut self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, FmpError> {
        let elapsed = self.last_request.elapsed();
        if elapsed < MIN_REQUEST_INTERVAL {
            tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
        }

        let url = format!("{}/{}", BASE_URL, endpoint);
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        debug!("GET {} {:?}", url, params);
        let response = self.client.get(&url).query(&all_params).send().await?;

        self.last_request = Instant::now();
        self.request_count += 1;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FmpError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(FmpError::ApiError(format!("{}: {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| FmpError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Daily bars for a ticker, sorted ascending.
    pub async fn daily_bars(
        &mut self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries, FmpError> {
        let symbol = ticker.trim().to_uppercase();
        let from = start.map(|d| d.format("%Y-%m-%d").to_string());
        let to = end.map(|d| d.format("%Y-%m-%d").to_string());

        let mut params = vec![("symbol", symbol.as_str())];
        if let Some(from) = from.as_deref() {
            params.push(("from", from));
        }
        if let Some(to) = to.as_deref() {
            params.push(("to", to));
        }

        let records: Vec<RawEodRecord> = self.request("historical-price-eod/full", &params).await?;
        let series = records_to_series(&symbol, &records)?;
        info!(
            "Fetched {} bars for {} ({:?} to {:?})",
            series.len(),
            symbol,
            series.first_date(),
            series.last_date()
        );
        Ok(series)
    }

    /// Recent news for a ticker, newest first, restricted to `lookback_days`.
    pub async fn stock_news(
        &mut self,
        ticker: &str,
        limit: usize,
        lookback_days: i64,
    ) -> Result<Vec<NewsItem>, FmpError> {
        let symbol = ticker.trim().to_uppercase();
        let limit = limit.to_string();
        let params = vec![("symbols", symbol.as_str()), ("limit", limit.as_str())];

        let records: Vec<RawNewsRecord> = self.request("news/stock", &params).await?;
        let cutoff = Utc::now() - chrono::Duration::days(lookback_days);
        let items = filter_recent_news(&records, cutoff);

        info!("Fetched {} news items for {}", items.len(), symbol);
        Ok(items)
    }
}

/// Convert raw records into a validated series. Unparseable rows are dropped.
pub fn records_to_series(ticker: &str, records: &[RawEodRecord]) -> Result<PriceSeries, FmpError> {
    let bars: Vec<PriceBar> = records.iter().filter_map(RawEodRecord::to_bar).collect();
    if bars.is_empty() {
        return Err(FmpError::NoData(ticker.to_string()));
    }
    if bars.len() < records.len() {
        debug!("Dropped {} unparseable rows for {}", records.len() - bars.len(), ticker);
    }
    Ok(PriceSeries::from_unsorted(ticker, bars)?)
}

/// Keep items with a title published at or after `cutoff`. Items without a
/// timestamp are kept.
pub fn filter_recent_news(records: &[RawNewsRecord], cutoff: DateTime<Utc>) -> Vec<NewsItem> {
    records
        .iter()
        .filter(|r| !r.title.trim().is_empty())
        .filter(|r| r.published().map_or(true, |p| p >= cutoff))
        .map(RawNewsRecord::to_news_item)
        .collect()
}
