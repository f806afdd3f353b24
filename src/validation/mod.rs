//! Validation of price data before analysis.

pub mod data_integrity;

pub use data_integrity::{
    CheckResult, DataIntegrityReport, IntegrityConfig, PriceIntegrityValidator,
};
