//! regime-lens CLI
//!
//! # Usage
//!
//! ```bash
//! # Set API key for live data
//! export FMP_API_KEY=your-key
//!
//! # Analyze a ticker (fetches prices + news, writes through to the cache)
//! regime-lens analyze SPY
//!
//! # Analyze from the offline cache only, with a custom config
//! regime-lens --config config/default.toml analyze SPY --offline --json
//!
//! # Populate the cache
//! regime-lens fetch --tickers SPY,QQQ,IWM --start 2015-01-01
//!
//! # Check cached data
//! regime-lens validate --tickers SPY,QQQ
//! regime-lens cached
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use regime_lens::config::AnalysisConfig;
use regime_lens::data::{
    acquire_prices, FetchMode, FmpClient, InMemorySource, NewsItem, NewsSource, PriceCache,
    SourceError,
};
use regime_lens::pipeline::AnalysisPipeline;
use regime_lens::validation::PriceIntegrityValidator;

const SEPARATOR: &str = "============================================================";
const NEWS_LIMIT: usize = 50;

#[derive(Parser)]
#[command(name = "regime-lens")]
#[command(about = "Market regime detection with regime-conditioned forward return ranges")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Price cache directory (overrides the config file)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Financial Modeling Prep API key
    #[arg(long, env = "FMP_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the current regime and its forward return ranges
    Analyze {
        /// Ticker symbol
        ticker: String,

        /// Start date (YYYY-MM-DD); defaults to `history_days` before today
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Use cached prices only and skip news
        #[arg(long)]
        offline: bool,

        /// Skip news scoring
        #[arg(long)]
        no_news: bool,

        /// Number of regimes (overrides the config file)
        #[arg(long)]
        regimes: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Also write the JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download daily prices into the cache
    Fetch {
        /// Comma-separated list of tickers
        #[arg(long, default_value = "SPY")]
        tickers: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },

    /// Run integrity checks on cached prices
    Validate {
        /// Comma-separated list of tickers
        #[arg(long, default_value = "SPY")]
        tickers: String,
    },

    /// List cached tickers
    Cached,
}

/// News already fetched (or failed) before the pipeline runs.
struct FetchedNews(Result<Vec<NewsItem>, String>);

impl NewsSource for FetchedNews {
    fn load_news(&self, _ticker: &str) -> Result<Vec<NewsItem>, SourceError> {
        self.0.clone().map_err(SourceError::Unavailable)
    }
}

fn parse_date(value: Option<&str>, what: &str) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("Invalid {} date format: {}", what, s))
        })
        .transpose()
}

fn split_tickers(tickers: &str) -> Vec<String> {
    tickers
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn client_from_key(api_key: Option<&str>) -> Option<FmpClient> {
    let key = api_key?;
    match FmpClient::new(key.to_string()) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("FMP client unavailable: {}", e);
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_analyze(
    config: AnalysisConfig,
    api_key: Option<String>,
    ticker: String,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    offline: bool,
    no_news: bool,
    json: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let ticker = ticker.trim().to_uppercase();
    let cache = PriceCache::new(&config.cache_dir);
    let mode = if offline {
        FetchMode::Offline
    } else {
        FetchMode::Live
    };
    let start = start.or_else(|| Some(Utc::now().date_naive() - Duration::days(config.history_days)));

    let mut client = client_from_key(api_key.as_deref());
    let series = acquire_prices(client.as_mut(), &cache, &ticker, start, end, mode)
        .await
        .with_context(|| format!("Failed to load prices for {}", ticker))?;

    let news = if offline || no_news {
        None
    } else {
        let fetched = match client.as_mut() {
            Some(client) => client
                .stock_news(&ticker, NEWS_LIMIT, config.news_lookback_days)
                .await
                .map_err(|e| e.to_string()),
            None => Err("no FMP API key configured".to_string()),
        };
        Some(FetchedNews(fetched))
    };

    let prices = InMemorySource::new().with_prices(series);
    let pipeline = AnalysisPipeline::new(config);
    let report = pipeline
        .run_from_sources(&ticker, &prices, news.as_ref().map(|n| n as &dyn NewsSource))
        .with_context(|| format!("Analysis failed for {}", ticker))?;

    let rendered = serde_json::to_string_pretty(&report)?;
    if let Some(path) = output {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &rendered)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if json {
        println!("{}", rendered);
    } else {
        println!("{}", report.summary());
    }

    Ok(())
}

async fn cmd_fetch(
    config: &AnalysisConfig,
    api_key: Option<String>,
    tickers: Vec<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    let key = api_key.context("FMP_API_KEY environment variable not set")?;
    let mut client = FmpClient::new(key)?;
    let cache = PriceCache::new(&config.cache_dir);
    let start = start.or_else(|| Some(Utc::now().date_naive() - Duration::days(config.history_days)));

    println!("{}", SEPARATOR);
    println!("Fetching {} tickers into {}", tickers.len(), cache.cache_dir().display());
    println!("{}", SEPARATOR);

    let pb = ProgressBar::new(tickers.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut failures = 0;
    for ticker in &tickers {
        pb.set_message(ticker.clone());
        match acquire_prices(Some(&mut client), &cache, ticker, start, end, FetchMode::Live).await {
            Ok(series) => pb.println(format!(
                "  {}: {} bars ({} to {})",
                ticker,
                series.len(),
                series.first_date().map(|d| d.to_string()).unwrap_or("?".into()),
                series.last_date().map(|d| d.to_string()).unwrap_or("?".into())
            )),
            Err(e) => {
                failures += 1;
                pb.println(format!("  {}: ERROR - {}", ticker, e));
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    println!("\nRequests made: {}", client.request_count());
    if failures > 0 {
        bail!("{} of {} tickers failed", failures, tickers.len());
    }
    Ok(())
}

fn cmd_validate(config: &AnalysisConfig, tickers: Vec<String>) -> Result<()> {
    let cache = PriceCache::new(&config.cache_dir);
    let validator = PriceIntegrityValidator::new(config.integrity.clone());

    let mut failed = 0;
    for ticker in &tickers {
        let series = match cache.load(ticker) {
            Ok(series) => series,
            Err(e) => {
                println!("{}: {}", ticker, e);
                failed += 1;
                continue;
            }
        };

        let report = validator.validate(&series);
        println!("{}", report.summary());
        for check in &report.checks {
            let mark = if check.passed { "ok" } else { "FAIL" };
            println!("  [{}] {}: {}", mark, check.name, check.message);
            if let Some(details) = &check.details {
                println!("         {}", details);
            }
        }
        println!();
        if !report.all_passed() {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} of {} tickers failed validation", failed, tickers.len());
    }
    Ok(())
}

fn cmd_cached(config: &AnalysisConfig) -> Result<()> {
    let cache = PriceCache::new(&config.cache_dir);
    let tickers = cache.cached_tickers()?;
    if tickers.is_empty() {
        println!("No cached tickers in {}", cache.cache_dir().display());
        return Ok(());
    }

    for ticker in tickers {
        let series = cache.load(&ticker)?;
        println!(
            "{:<8} {:>6} bars  {} to {}",
            ticker,
            series.len(),
            series.first_date().map(|d| d.to_string()).unwrap_or("?".into()),
            series.last_date().map(|d| d.to_string()).unwrap_or("?".into())
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("regime_lens=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }

    match cli.command {
        Commands::Analyze {
            ticker,
            start,
            end,
            offline,
            no_news,
            regimes,
            json,
            output,
        } => {
            if let Some(k) = regimes {
                config.model.num_regimes = k;
            }
            let start = parse_date(start.as_deref(), "start")?;
            let end = parse_date(end.as_deref(), "end")?;
            cmd_analyze(config, cli.api_key, ticker, start, end, offline, no_news, json, output)
                .await?;
        }
        Commands::Fetch {
            tickers,
            start,
            end,
        } => {
            let start = parse_date(start.as_deref(), "start")?;
            let end = parse_date(end.as_deref(), "end")?;
            cmd_fetch(&config, cli.api_key, split_tickers(&tickers), start, end).await?;
        }
        Commands::Validate { tickers } => {
            cmd_validate(&config, split_tickers(&tickers))?;
        }
        Commands::Cached => {
            cmd_cached(&config)?;
        }
    }

    Ok(())
}
