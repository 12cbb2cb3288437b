//! Portfolio state, valuation, and risk statistics.
//!
//! Each tick flows through three stages in order: the cost-basis tracker
//! turns position changes into cash flows, the valuation engine marks the
//! portfolio to market, and the rolling statistics update risk metrics.

mod performance;
mod risk;
mod tracker;

pub use performance::{PortfolioState, Valuation, ValuationEngine};
pub use risk::{RiskSnapshot, RollingStatistics};
pub use tracker::{CostBasisTracker, CostBasisUpdate, InstrumentCostBasis};
