//! Meridian Core - Incremental portfolio performance and risk engine.
//!
//! This crate turns a time-ordered stream of position snapshots and price
//! quotes into a per-tick series of portfolio metrics:
//!
//! - **Feed merging**: Aligns positions and prices by timestamp with forward-fill
//! - **Cost basis**: Infers cash flows from position changes
//! - **Valuation**: Mark-to-market portfolio value and PnL
//! - **Risk metrics**: Rolling volatility, Sharpe ratio, information ratio, max drawdown
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use meridian_core::{create_engine, PortfolioTick};
//!
//! let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
//!
//! let t0 = Utc.timestamp_opt(0, 0).unwrap();
//! let tick = PortfolioTick::new(t0)
//!     .with_position("AAPL", 10.0)
//!     .with_price("AAPL", 150.0);
//!
//! let sample = engine.process(&tick).unwrap();
//! assert_eq!(sample.total_value, 100_000.0);
//! assert_eq!(sample.cash_balance, 98_500.0);
//! ```

pub mod config;
pub mod engine;
pub mod feed;
pub mod portfolio;
pub mod types;

// Re-export commonly used types
pub use config::{EngineConfig, WindowMode};
pub use types::{
    ApiResponse, DataQualityWarning, Instrument, MetricsSample, PortfolioTick, PositionSnapshot,
    PriceQuote,
};

// Re-export main functionality
pub use engine::{compare, create_engine, Comparison, Engine, MetricStream};
pub use feed::{read_fixture, write_metrics_csv, SnapshotMerger};
pub use portfolio::{
    CostBasisTracker, CostBasisUpdate, InstrumentCostBasis, PortfolioState, RiskSnapshot,
    RollingStatistics, Valuation, ValuationEngine,
};

use chrono::{DateTime, Utc};

/// Error types for meridian-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Out-of-order timestamp {timestamp}, last processed {last}")]
    Alignment {
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Engine halted after a fatal error")]
    EngineHalted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid fixture: {0}")]
    Fixture(String),
}

impl Error {
    /// Whether this error aborts the engine for its portfolio.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Alignment { .. } | Error::Configuration(_))
    }
}

/// Result type for meridian-core operations.
pub type Result<T> = std::result::Result<T, Error>;
