//! Price acquisition with a write-through offline cache.
//!
//! Live mode fetches from FMP, stores into the cache, and falls back to the
//! cached copy when the fetch fails. Offline mode never touches the network.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::cache::{CacheError, PriceCache};
use super::fmp::{FmpClient, FmpError};
use super::types::PriceSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Live,
    Offline,
}

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("Offline mode but no cache for {ticker}: {source}")]
    OfflineCacheMiss {
        ticker: String,
        #[source]
        source: CacheError,
    },

    #[error("Fetch failed for {ticker} and no cached copy exists: {source}")]
    FetchFailed {
        ticker: String,
        #[source]
        source: FmpError,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Load prices for `ticker` according to `mode`.
///
/// A `None` client in live mode behaves like a failed fetch (no API key).
pub async fn acquire_prices(
    client: Option<&mut FmpClient>,
    cache: &PriceCache,
    ticker: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    mode: FetchMode,
) -> Result<PriceSeries, AcquireError> {
    let ticker = ticker.trim().to_uppercase();

    if mode == FetchMode::Offline {
        return cache
            .load(&ticker)
            .map(|s| s.between(start, end))
            .map_err(|source| AcquireError::OfflineCacheMiss { ticker, source });
    }

    let fetched = match client {
        Some(client) => client.daily_bars(&ticker, start, end).await,
        None => Err(FmpError::MissingApiKey),
    };

    match fetched {
        Ok(series) => {
            let path = cache.store(&series)?;
            info!("Cached {} bars for {} at {}", series.len(), ticker, path.display());
            Ok(series)
        }
        Err(e) if cache.contains(&ticker) => {
            warn!("Fetch failed for {} ({}); using cached prices", ticker, e);
            Ok(cache.load(&ticker)?.between(start, end))
        }
        Err(source) => Err(AcquireError::FetchFailed { ticker, source }),
    }
}
