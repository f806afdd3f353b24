pub mod acquire;
pub mod cache;
pub mod fmp;
pub mod source;
pub mod types;

pub use acquire::{acquire_prices, AcquireError, FetchMode};
pub use cache::{CacheError, PriceCache, CACHE_COLUMNS};
pub use fmp::{FmpClient, FmpError, RawEodRecord, RawNewsRecord, API_KEY_ENV};
pub use source::{InMemorySource, NewsSource, PriceSource, SourceError};
pub use types::{next_trading_day, DataError, NewsItem, PriceBar, PriceSeries};
