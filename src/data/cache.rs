//! Offline price cache backed by parquet files.
//!
//! One file per ticker at `{cache_dir}/{TICKER}_eod.parquet` with columns:
//! - date (YYYY-MM-DD string)
//! - open, high, low, close (f64)
//! - volume (i64)
//!
//! Writes merge with whatever is already cached, newer bars winning on the
//! same date, so incremental fetches extend the history.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use super::source::{PriceSource, SourceError};
use super::types::{DataError, PriceBar, PriceSeries};

/// Columns written to every cache file.
pub const CACHE_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("No cached prices for {ticker} at {path}")]
    NotCached { ticker: String, path: String },

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid series: {0}")]
    Series(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parquet-backed store of daily price histories.
#[derive(Debug, Clone)]
pub struct PriceCache {
    cache_dir: PathBuf,
}

impl PriceCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, ticker: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}_eod.parquet", ticker.trim().to_uppercase()))
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.cache_path(ticker).exists()
    }

    /// List tickers with a cache file.
    pub fn cached_tickers(&self) -> Result<Vec<String>, CacheError> {
        if !self.cache_dir.exists() {
            return Ok(vec![]);
        }

        let mut tickers = Vec::new();
        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if let Some(ticker) = name.strip_suffix("_eod.parquet") {
                tickers.push(ticker.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }

    /// Load the full cached history for a ticker.
    pub fn load(&self, ticker: &str) -> Result<PriceSeries, CacheError> {
        let path = self.cache_path(ticker);
        if !path.exists() {
            return Err(CacheError::NotCached {
                ticker: ticker.to_uppercase(),
                path: path.display().to_string(),
            });
        }

        let df = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())?.collect()?;
        debug!("Loaded {} cached rows for {}", df.height(), ticker);
        dataframe_to_series(&df, &ticker.to_uppercase())
    }

    /// Write a series to the cache, merging with any existing history.
    pub fn store(&self, series: &PriceSeries) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_path(series.ticker());

        let mut merged: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();
        if path.exists() {
            for bar in self.load(series.ticker())?.bars() {
                merged.insert(bar.date, bar.clone());
            }
        }
        for bar in series.bars() {
            merged.insert(bar.date, bar.clone());
        }

        let combined = PriceSeries::new(
            series.ticker().to_uppercase(),
            merged.into_values().collect(),
        )?;
        let mut df = series_to_dataframe(&combined)?;

        let file = fs::File::create(&path)?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Zstd(Some(ZstdLevel::try_new(3)?)))
            .finish(&mut df)?;

        debug!("Cached {} bars for {} at {}", combined.len(), combined.ticker(), path.display());
        Ok(path)
    }
}

impl PriceSource for PriceCache {
    fn load_prices(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries, SourceError> {
        Ok(self.load(ticker)?.between(start, end))
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.try_into().unwrap_or(f64::NAN)
}

fn series_to_dataframe(series: &PriceSeries) -> Result<DataFrame, CacheError> {
    let bars = series.bars();
    let mut date: Vec<String> = Vec::with_capacity(bars.len());
    let mut open: Vec<f64> = Vec::with_capacity(bars.len());
    let mut high: Vec<f64> = Vec::with_capacity(bars.len());
    let mut low: Vec<f64> = Vec::with_capacity(bars.len());
    let mut close: Vec<f64> = Vec::with_capacity(bars.len());
    let mut volume: Vec<i64> = Vec::with_capacity(bars.len());

    for bar in bars {
        date.push(bar.date.format(DATE_FORMAT).to_string());
        open.push(to_f64(bar.open));
        high.push(to_f64(bar.high));
        low.push(to_f64(bar.low));
        close.push(to_f64(bar.close));
        volume.push(bar.volume);
    }

    let [c_date, c_open, c_high, c_low, c_close, c_volume] = CACHE_COLUMNS;
    let df = DataFrame::new(vec![
        Series::new(c_date.into(), date).into(),
        Series::new(c_open.into(), open).into(),
        Series::new(c_high.into(), high).into(),
        Series::new(c_low.into(), low).into(),
        Series::new(c_close.into(), close).into(),
        Series::new(c_volume.into(), volume).into(),
    ])?;

    Ok(df)
}

fn decimal_at(column: &Float64Chunked, idx: usize, name: &str) -> Result<Decimal, CacheError> {
    column
        .get(idx)
        .and_then(Decimal::from_f64_retain)
        .ok_or_else(|| CacheError::InvalidData(format!("Missing {} at row {}", name, idx)))
}

fn dataframe_to_series(df: &DataFrame, ticker: &str) -> Result<PriceSeries, CacheError> {
    let present: Vec<&str> = df.get_column_names().iter().map(|c| c.as_str()).collect();
    let missing: Vec<&str> = CACHE_COLUMNS
        .iter()
        .copied()
        .filter(|c| !present.contains(c))
        .collect();
    if !missing.is_empty() {
        return Err(CacheError::InvalidData(format!(
            "Cache file for {} is missing columns: {}",
            ticker,
            missing.join(", ")
        )));
    }

    let date_col = df.column("date")?.str()?;
    let open_col = df.column("open")?.f64()?;
    let high_col = df.column("high")?.f64()?;
    let low_col = df.column("low")?.f64()?;
    let close_col = df.column("close")?.f64()?;
    let volume_col = df.column("volume")?.i64()?;

    let mut bars = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let raw_date = date_col
            .get(idx)
            .ok_or_else(|| CacheError::InvalidData(format!("Missing date at row {}", idx)))?;
        let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .map_err(|e| CacheError::InvalidData(format!("Invalid date {}: {}", raw_date, e)))?;

        bars.push(PriceBar {
            date,
            open: decimal_at(open_col, idx, "open")?,
            high: decimal_at(high_col, idx, "high")?,
            low: decimal_at(low_col, idx, "low")?,
            close: decimal_at(close_col, idx, "close")?,
            volume: volume_col.get(idx).unwrap_or(0),
        });
    }

    Ok(PriceSeries::from_unsorted(ticker, bars)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[test]
    fn test_cache_path() {
        let cache = PriceCache::new("data/cache/prices");
        assert_eq!(
            cache.cache_path(" spy "),
            PathBuf::from("data/cache/prices/SPY_eod.parquet")
        );
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path());
        let series = PriceSeries::from_closes("SPY", start(), &[470.5, 471.25, 469.0]).unwrap();

        cache.store(&series).unwrap();
        let loaded = cache.load("spy").unwrap();

        assert_eq!(loaded.ticker(), "SPY");
        assert_eq!(loaded.dates(), series.dates());
        assert_eq!(loaded.closes(), vec![470.5, 471.25, 469.0]);
        assert_eq!(cache.cached_tickers().unwrap(), vec!["SPY".to_string()]);
    }

    #[test]
    fn test_written_schema_matches_cache_columns() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path());
        let series = PriceSeries::from_closes("IWM", start(), &[200.0, 201.5]).unwrap();
        let path = cache.store(&series).unwrap();

        let df = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())
            .unwrap()
            .collect()
            .unwrap();
        let names: Vec<&str> = df.get_column_names().iter().map(|c| c.as_str()).collect();
        assert_eq!(names, CACHE_COLUMNS.to_vec());
    }

    #[test]
    fn test_load_rejects_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path());
        let path = dir.path().join("DIA_eod.parquet");

        let mut df = DataFrame::new(vec![
            Series::new("date".into(), vec!["2024-03-04".to_string()]).into(),
            Series::new("close".into(), vec![390.0]).into(),
        ])
        .unwrap();
        let file = fs::File::create(&path).unwrap();
        ParquetWriter::new(file).finish(&mut df).unwrap();

        match cache.load("DIA") {
            Err(CacheError::InvalidData(msg)) => {
                assert!(msg.contains("open, high, low, volume"), "{}", msg)
            }
            other => panic!("expected InvalidData, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn test_store_merges_with_existing_history() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path());

        let older = PriceSeries::from_closes("QQQ", start(), &[400.0, 401.0, 402.0]).unwrap();
        cache.store(&older).unwrap();

        // Overlaps the last cached day and extends one day further
        let newer_start = older.dates()[2];
        let newer = PriceSeries::from_closes("QQQ", newer_start, &[402.5, 403.0]).unwrap();
        cache.store(&newer).unwrap();

        let loaded = cache.load("QQQ").unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.closes(), vec![400.0, 401.0, 402.5, 403.0]);
    }

    #[test]
    fn test_missing_ticker() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path());
        assert!(matches!(cache.load("IWM"), Err(CacheError::NotCached { .. })));
        assert!(!cache.contains("IWM"));
    }
}
