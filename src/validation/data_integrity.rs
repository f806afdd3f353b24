//! Data integrity validation for daily price series.
//!
//! Validates:
//! - History length (enough rows for the feature warmup)
//! - Calendar gaps (no gap longer than a week)
//! - OHLC consistency (low <= open/close <= high)
//! - Volume sanity (non-negative)
//! - Stale prices (long runs of identical closes)
//!
//! Failures are advisory: the pipeline records them as annotations and keeps
//! going, since structural problems are already rejected by `PriceSeries`.

use serde::{Deserialize, Serialize};

use crate::data::PriceSeries;

/// Result of a single validation check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn fail(name: &str, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
            details,
        }
    }
}

/// Complete integrity report for one series.
#[derive(Debug, Clone, Serialize)]
pub struct DataIntegrityReport {
    pub ticker: String,
    pub row_count: usize,
    pub checks: Vec<CheckResult>,
}

impl DataIntegrityReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|c| c.passed).count();
        let total = self.checks.len();
        format!(
            "{} ({} rows): {}/{} checks passed",
            self.ticker, self.row_count, passed, total
        )
    }
}

/// Thresholds for the integrity checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Minimum number of rows considered usable.
    pub min_rows: usize,
    /// Largest tolerated gap between consecutive bars, in calendar days.
    pub max_gap_days: i64,
    /// Longest tolerated run of identical closes.
    pub max_stale_run: usize,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            min_rows: 60,
            max_gap_days: 7,
            max_stale_run: 10,
        }
    }
}

/// Validator for price series integrity.
#[derive(Debug, Clone, Default)]
pub struct PriceIntegrityValidator {
    config: IntegrityConfig,
}

impl PriceIntegrityValidator {
    pub fn new(config: IntegrityConfig) -> Self {
        Self { config }
    }

    /// Run all validation checks on a series.
    pub fn validate(&self, series: &PriceSeries) -> DataIntegrityReport {
        let checks = vec![
            self.check_history_length(series),
            self.check_calendar_gaps(series),
            self.check_ohlc_consistency(series),
            self.check_volume_sanity(series),
            self.check_stale_prices(series),
        ];

        DataIntegrityReport {
            ticker: series.ticker().to_string(),
            row_count: series.len(),
            checks,
        }
    }

    fn check_history_length(&self, series: &PriceSeries) -> CheckResult {
        if series.len() >= self.config.min_rows {
            CheckResult::pass(
                "history_length",
                &format!("{} rows (minimum {})", series.len(), self.config.min_rows),
            )
        } else {
            CheckResult::fail(
                "history_length",
                &format!(
                    "Only {} rows, need at least {}",
                    series.len(),
                    self.config.min_rows
                ),
                None,
            )
        }
    }

    fn check_calendar_gaps(&self, series: &PriceSeries) -> CheckResult {
        let mut gaps = Vec::new();
        for window in series.bars().windows(2) {
            let (prev, curr) = (window[0].date, window[1].date);
            let gap_days = (curr - prev).num_days();
            if gap_days > self.config.max_gap_days {
                gaps.push(format!("{} to {} ({} days)", prev, curr, gap_days));
            }
        }

        if gaps.is_empty() {
            CheckResult::pass("calendar_gaps", "No major gaps")
        } else {
            CheckResult::fail(
                "calendar_gaps",
                &format!("{} major gaps found", gaps.len()),
                Some(gaps.join(", ")),
            )
        }
    }

    fn check_ohlc_consistency(&self, series: &PriceSeries) -> CheckResult {
        let bad: Vec<String> = series
            .bars()
            .iter()
            .filter(|b| {
                b.low > b.high
                    || b.close < b.low
                    || b.close > b.high
                    || b.open < b.low
                    || b.open > b.high
            })
            .map(|b| b.date.to_string())
            .collect();

        if bad.is_empty() {
            CheckResult::pass("ohlc_consistency", "All bars satisfy low <= open/close <= high")
        } else {
            let shown: Vec<&str> = bad.iter().take(5).map(String::as_str).collect();
            CheckResult::fail(
                "ohlc_consistency",
                &format!("{} inconsistent bars", bad.len()),
                Some(shown.join(", ")),
            )
        }
    }

    fn check_volume_sanity(&self, series: &PriceSeries) -> CheckResult {
        let negative = series.bars().iter().filter(|b| b.volume < 0).count();
        if negative == 0 {
            CheckResult::pass("volume_sanity", "All volumes non-negative")
        } else {
            CheckResult::fail(
                "volume_sanity",
                &format!("{} rows with negative volume", negative),
                None,
            )
        }
    }

    fn check_stale_prices(&self, series: &PriceSeries) -> CheckResult {
        let bars = series.bars();
        let mut longest = 0usize;
        let mut longest_end = None;
        let mut run = 1usize;

        for i in 1..bars.len() {
            if bars[i].close == bars[i - 1].close {
                run += 1;
            } else {
                run = 1;
            }
            if run > longest {
                longest = run;
                longest_end = Some(bars[i].date);
            }
        }

        if longest <= self.config.max_stale_run {
            CheckResult::pass("stale_prices", "No long runs of identical closes")
        } else {
            CheckResult::fail(
                "stale_prices",
                &format!("{} identical closes in a row", longest),
                longest_end.map(|d| format!("run ends {}", d)),
            )
        }
    }
}
