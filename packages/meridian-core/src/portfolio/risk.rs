//! Incremental risk statistics over the portfolio value series.
//!
//! A fixed window recomputes its mean and deviation from the held returns on
//! every update, so a return leaving the window leaves no rounding residue.
//! Full history keeps Welford's running moments and the exponential window
//! keeps its own weighted moments, both O(1) per tick. Drawdown always looks
//! back over the full history.

use crate::config::{EngineConfig, WindowMode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Risk metrics after one update.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RiskSnapshot {
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub information_ratio: f64,
    /// Decline from the running peak at this update
    pub drawdown: f64,
    pub max_drawdown: f64,
}

/// Running count, mean and sum of squared deviations.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    count: usize,
    mean: f64,
    m2: f64,
}

impl Moments {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Sample standard deviation; undefined below two observations.
    fn std_dev(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some((self.m2 / (self.count - 1) as f64).sqrt())
    }
}

#[derive(Debug, Clone)]
enum ReturnWindow {
    Windowed {
        size: usize,
        returns: VecDeque<f64>,
    },
    FullHistory {
        moments: Moments,
    },
    Exponential {
        alpha: f64,
        count: usize,
        mean: f64,
        variance: f64,
    },
}

impl ReturnWindow {
    fn new(mode: WindowMode) -> Self {
        match mode {
            WindowMode::Windowed { size } => ReturnWindow::Windowed {
                size,
                returns: VecDeque::with_capacity(size),
            },
            WindowMode::FullHistory => ReturnWindow::FullHistory {
                moments: Moments::default(),
            },
            WindowMode::Exponential { alpha } => ReturnWindow::Exponential {
                alpha,
                count: 0,
                mean: 0.0,
                variance: 0.0,
            },
        }
    }

    fn push(&mut self, r: f64) {
        match self {
            ReturnWindow::Windowed { size, returns } => {
                if returns.len() == *size {
                    returns.pop_front();
                }
                returns.push_back(r);
            }
            ReturnWindow::FullHistory { moments } => moments.push(r),
            ReturnWindow::Exponential {
                alpha,
                count,
                mean,
                variance,
            } => {
                *count += 1;
                if *count == 1 {
                    *mean = r;
                    *variance = 0.0;
                } else {
                    let delta = r - *mean;
                    *mean += *alpha * delta;
                    *variance = (1.0 - *alpha) * (*variance + *alpha * delta * delta);
                }
            }
        }
    }

    /// Mean and standard deviation, when at least two returns are held.
    fn mean_std(&self) -> Option<(f64, f64)> {
        match self {
            ReturnWindow::Windowed { returns, .. } => window_mean_std(returns),
            ReturnWindow::FullHistory { moments } => {
                moments.std_dev().map(|std| (moments.mean, std))
            }
            ReturnWindow::Exponential {
                count,
                mean,
                variance,
                ..
            } => (*count >= 2).then(|| (*mean, variance.sqrt())),
        }
    }

    fn len(&self) -> usize {
        match self {
            ReturnWindow::Windowed { returns, .. } => returns.len(),
            ReturnWindow::FullHistory { moments } => moments.count,
            ReturnWindow::Exponential { count, .. } => *count,
        }
    }
}

/// Two-pass sample mean and standard deviation of the held returns.
fn window_mean_std(returns: &VecDeque<f64>) -> Option<(f64, f64)> {
    let n = returns.len();
    if n < 2 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / n as f64;

    // Identical returns have exactly zero spread even when the mean rounds
    let first = returns[0];
    if returns.iter().all(|&r| r == first) {
        return Some((first, 0.0));
    }

    let m2: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum();
    Some((mean, (m2 / (n - 1) as f64).sqrt()))
}

/// Rolling volatility, Sharpe ratio, information ratio and max drawdown.
#[derive(Debug, Clone)]
pub struct RollingStatistics {
    window: ReturnWindow,
    annualization: f64,
    risk_free_rate: f64,
    previous_value: Option<f64>,
    peak: f64,
    max_drawdown: f64,
}

impl RollingStatistics {
    /// Create statistics seeded with the configured starting balance as the peak.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            window: ReturnWindow::new(config.window),
            annualization: config.annualization_factor(),
            risk_free_rate: config.risk_free_rate,
            previous_value: None,
            peak: config.starting_balance,
            max_drawdown: 0.0,
        }
    }

    /// Fold the next total value into the statistics.
    pub fn update(&mut self, total_value: f64) -> RiskSnapshot {
        if let Some(previous) = self.previous_value {
            if previous != 0.0 {
                let r = total_value / previous - 1.0;
                if r.is_finite() {
                    self.window.push(r);
                }
            } else {
                tracing::debug!("previous total value is zero, return skipped");
            }
        }
        self.previous_value = Some(total_value);

        if total_value > self.peak {
            self.peak = total_value;
        }
        let drawdown = if self.peak > 0.0 {
            ((self.peak - total_value) / self.peak).clamp(0.0, 1.0)
        } else {
            0.0
        };
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }

        let (volatility, sharpe_ratio, information_ratio) = match self.window.mean_std() {
            Some((mean, std)) if std > 0.0 && std.is_finite() => (
                finite_or_zero(std * self.annualization),
                finite_or_zero(mean / std),
                finite_or_zero((mean - self.risk_free_rate) / std),
            ),
            _ => (0.0, 0.0, 0.0),
        };

        RiskSnapshot {
            volatility,
            sharpe_ratio,
            information_ratio,
            drawdown,
            max_drawdown: self.max_drawdown,
        }
    }

    /// Running peak of total value.
    pub fn peak(&self) -> f64 {
        self.peak
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    /// Number of returns currently contributing to the window.
    pub fn return_count(&self) -> usize {
        self.window.len()
    }
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}
