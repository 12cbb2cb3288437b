//! Per-instrument cost basis and implied cash flows.

use crate::types::{DataQualityWarning, Instrument, PortfolioTick};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cost basis state for one instrument.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct InstrumentCostBasis {
    /// Quantity held after the last applied tick
    pub previous_quantity: f64,
    /// Capital tracked as invested in the current position
    pub invested_capital: f64,
}

/// Outcome of applying one tick to the tracker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostBasisUpdate {
    /// Signed change to cash: negative for net buying, positive for net selling
    pub cash_delta: f64,
    pub warnings: Vec<DataQualityWarning>,
}

/// Tracks invested capital per instrument from successive position snapshots.
///
/// Buys add `Δq × price` to invested capital. Sells scale invested capital by
/// the fraction of the position retained (`q_now / q_prev`) rather than
/// subtracting proceeds, so the basis of the remaining shares is unchanged.
#[derive(Debug, Clone, Default)]
pub struct CostBasisTracker {
    bases: BTreeMap<Instrument, InstrumentCostBasis>,
}

impl CostBasisTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the positions in `tick`, returning the cash flow they imply.
    ///
    /// Instruments absent from the tick keep their previous quantity. A
    /// missing price is treated as 0 for the cash flow.
    pub fn apply(&mut self, tick: &PortfolioTick) -> CostBasisUpdate {
        let mut update = CostBasisUpdate::default();

        for (instrument, &quantity) in &tick.positions {
            let price = tick.price(instrument).unwrap_or(0.0);
            let basis = self.bases.entry(instrument.clone()).or_default();
            let previous = basis.previous_quantity;
            let delta = quantity - previous;

            if delta > 0.0 {
                let cost = delta * price;
                update.cash_delta -= cost;
                basis.invested_capital += cost;
            } else if delta < 0.0 {
                update.cash_delta += -delta * price;

                if previous == 0.0 {
                    tracing::warn!(
                        instrument = %instrument,
                        quantity,
                        "sell from a zero position, cost basis left unchanged"
                    );
                    update.warnings.push(DataQualityWarning::SellFromZero {
                        timestamp: tick.timestamp,
                        instrument: instrument.clone(),
                        quantity,
                    });
                } else {
                    basis.invested_capital *= quantity / previous;
                }
            }

            basis.previous_quantity = quantity;
        }

        update
    }

    /// Cost basis for an instrument, if it has ever appeared.
    pub fn get(&self, instrument: &str) -> Option<&InstrumentCostBasis> {
        self.bases.get(instrument)
    }

    /// Invested capital for an instrument, 0 when unseen.
    pub fn invested_capital(&self, instrument: &str) -> f64 {
        self.get(instrument)
            .map(|b| b.invested_capital)
            .unwrap_or(0.0)
    }

    /// Sum of invested capital across all instruments.
    pub fn invested_capital_total(&self) -> f64 {
        self.bases.values().map(|b| b.invested_capital).sum()
    }

    /// Current quantity per instrument.
    pub fn holdings(&self) -> impl Iterator<Item = (&Instrument, f64)> {
        self.bases
            .iter()
            .map(|(instrument, b)| (instrument, b.previous_quantity))
    }

    /// Number of instruments ever seen.
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    /// Whether no instrument has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}
