//! Core data types for the Meridian metrics pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Instrument identifier (uppercase ticker symbol).
pub type Instrument = String;

/// Normalise a symbol to its map-key form.
pub fn instrument(symbol: &str) -> Instrument {
    symbol.trim().to_uppercase()
}

/// Quantities held per instrument at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Quantity per instrument; may be fractional or negative (short)
    pub positions: BTreeMap<Instrument, f64>,
}

impl PositionSnapshot {
    /// Create an empty snapshot at the given timestamp.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            positions: BTreeMap::new(),
        }
    }

    /// Add a quantity for an instrument.
    pub fn with(mut self, symbol: &str, quantity: f64) -> Self {
        self.positions.insert(instrument(symbol), quantity);
        self
    }
}

/// Prices observed per instrument at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    pub timestamp: DateTime<Utc>,
    pub prices: BTreeMap<Instrument, f64>,
}

impl PriceQuote {
    /// Create an empty quote at the given timestamp.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            prices: BTreeMap::new(),
        }
    }

    /// Add a price for an instrument.
    pub fn with(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(instrument(symbol), price);
        self
    }
}

/// Timestamp-aligned positions and prices; the unit of work for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioTick {
    pub timestamp: DateTime<Utc>,
    pub positions: BTreeMap<Instrument, f64>,
    pub prices: BTreeMap<Instrument, f64>,
}

impl PortfolioTick {
    /// Create an empty tick at the given timestamp.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            positions: BTreeMap::new(),
            prices: BTreeMap::new(),
        }
    }

    /// Set the quantity held for an instrument.
    pub fn with_position(mut self, symbol: &str, quantity: f64) -> Self {
        self.positions.insert(instrument(symbol), quantity);
        self
    }

    /// Set the price of an instrument.
    pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(instrument(symbol), price);
        self
    }

    /// Quantity held, 0 when the instrument is absent.
    pub fn quantity(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).copied().unwrap_or(0.0)
    }

    /// Price of an instrument, if quoted.
    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }
}

/// Metrics emitted for a single tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricsSample {
    pub timestamp: DateTime<Utc>,
    /// Cash plus mark-to-market value of all holdings
    pub total_value: f64,
    /// Total value minus starting balance
    pub pnl: f64,
    /// Cash after this tick's implied cash flows
    pub cash_balance: f64,
    /// Fractional decline from the running peak at this tick
    pub drawdown: f64,
    pub sharpe_ratio: f64,
    pub information_ratio: f64,
    pub rolling_volatility: f64,
    /// Largest drawdown seen over the engine's lifetime
    pub max_drawdown: f64,
}

/// Non-fatal data anomaly. Processing continues with a documented fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// Held instrument with no price observed yet; valued at 0.
    MissingPrice {
        timestamp: DateTime<Utc>,
        instrument: Instrument,
    },
    /// Position reduced from a previous quantity of exactly 0.
    SellFromZero {
        timestamp: DateTime<Utc>,
        instrument: Instrument,
        quantity: f64,
    },
    /// Price quote older than the last emitted tick; dropped.
    StaleQuote {
        timestamp: DateTime<Utc>,
        last_emitted: DateTime<Utc>,
    },
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::MissingPrice {
                timestamp,
                instrument,
            } => write!(
                f,
                "{}: {} held without a known price, valued at 0",
                timestamp, instrument
            ),
            DataQualityWarning::SellFromZero {
                timestamp,
                instrument,
                quantity,
            } => write!(
                f,
                "{}: {} sold to {} from a zero position",
                timestamp, instrument, quantity
            ),
            DataQualityWarning::StaleQuote {
                timestamp,
                last_emitted,
            } => write!(
                f,
                "{}: price quote older than last emitted tick {}, dropped",
                timestamp, last_emitted
            ),
        }
    }
}

/// API response wrapper used for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
