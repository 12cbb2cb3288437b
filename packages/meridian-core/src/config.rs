//! Engine configuration.
//!
//! Configuration is plain data: it can be built in code, loaded from a TOML
//! file, or created through [`crate::create_engine`]. Every engine validates
//! its configuration before it accepts a tick.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default rolling window length, in returns.
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// Trading days per year, used when annualizing daily volatility.
pub const TRADING_DAYS_PER_YEAR: u32 = 252;

/// How the return window used for volatility and ratios is maintained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WindowMode {
    /// Last `size` returns.
    Windowed { size: usize },
    /// Every return since the engine was created.
    FullHistory,
    /// Exponentially weighted mean and variance with smoothing factor `alpha`.
    Exponential { alpha: f64 },
}

impl Default for WindowMode {
    fn default() -> Self {
        WindowMode::Windowed {
            size: DEFAULT_WINDOW_SIZE,
        }
    }
}

/// Settings for a single engine instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Cash held before the first tick
    pub starting_balance: f64,
    /// Return window policy
    pub window: WindowMode,
    /// Scale volatility by sqrt(periods_per_year); leave off for intraday ticks
    pub annualize: bool,
    /// Ticks per year when `annualize` is set
    pub periods_per_year: u32,
    /// Per-tick risk-free rate subtracted in the information ratio
    pub risk_free_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_balance: 100_000.0,
            window: WindowMode::default(),
            annualize: false,
            periods_per_year: TRADING_DAYS_PER_YEAR,
            risk_free_rate: 0.02,
        }
    }
}

impl EngineConfig {
    /// Create a windowed configuration from the four engine parameters.
    pub fn new(
        starting_balance: f64,
        window_size: usize,
        annualize: bool,
        risk_free_rate: f64,
    ) -> Self {
        Self {
            starting_balance,
            window: WindowMode::Windowed { size: window_size },
            annualize,
            risk_free_rate,
            ..Default::default()
        }
    }

    /// Replace the window policy.
    pub fn with_window(mut self, window: WindowMode) -> Self {
        self.window = window;
        self
    }

    /// Check every field, returning a configuration error for the first bad one.
    pub fn validate(&self) -> Result<()> {
        if !self.starting_balance.is_finite() || self.starting_balance < 0.0 {
            return Err(Error::Configuration(format!(
                "starting balance must be a non-negative number, got {}",
                self.starting_balance
            )));
        }

        match self.window {
            WindowMode::Windowed { size: 0 } => {
                return Err(Error::Configuration(
                    "window size must be positive".to_string(),
                ));
            }
            WindowMode::Exponential { alpha } if !(alpha > 0.0 && alpha <= 1.0) => {
                return Err(Error::Configuration(format!(
                    "exponential alpha must be in (0, 1], got {}",
                    alpha
                )));
            }
            _ => {}
        }

        if self.periods_per_year == 0 {
            return Err(Error::Configuration(
                "periods per year must be positive".to_string(),
            ));
        }

        if !self.risk_free_rate.is_finite() {
            return Err(Error::Configuration(format!(
                "risk-free rate must be finite, got {}",
                self.risk_free_rate
            )));
        }

        Ok(())
    }

    /// Factor applied to the raw return standard deviation.
    pub fn annualization_factor(&self) -> f64 {
        if self.annualize {
            (self.periods_per_year as f64).sqrt()
        } else {
            1.0
        }
    }

    /// Parse and validate a configuration from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Get the default configuration file path.
    ///
    /// Default path: `~/.meridian/engine.toml`
    /// Can be overridden with `MERIDIAN_CONFIG` environment variable.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var("MERIDIAN_CONFIG") {
            return PathBuf::from(path);
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".meridian/engine.toml"))
            .unwrap_or_else(|| PathBuf::from("engine.toml"))
    }
}
