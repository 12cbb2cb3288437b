//! Portfolio valuation: cash balance plus mark-to-market holdings.

use super::tracker::{CostBasisTracker, CostBasisUpdate};
use crate::types::{DataQualityWarning, Instrument, PortfolioTick};
use std::collections::BTreeSet;

/// The single mutable aggregate threaded through the pipeline.
#[derive(Debug, Clone)]
pub struct PortfolioState {
    starting_balance: f64,
    cash_balance: f64,
    total_value: f64,
    cost_basis: CostBasisTracker,
    /// Held instruments already reported as unpriced
    unpriced: BTreeSet<Instrument>,
}

impl PortfolioState {
    /// Create a state holding only cash.
    pub fn new(starting_balance: f64) -> Self {
        Self {
            starting_balance,
            cash_balance: starting_balance,
            total_value: starting_balance,
            cost_basis: CostBasisTracker::new(),
            unpriced: BTreeSet::new(),
        }
    }

    pub fn starting_balance(&self) -> f64 {
        self.starting_balance
    }

    pub fn cash_balance(&self) -> f64 {
        self.cash_balance
    }

    /// Total value as of the last valued tick.
    pub fn total_value(&self) -> f64 {
        self.total_value
    }

    /// Read-only view of the per-instrument cost basis.
    pub fn cost_basis(&self) -> &CostBasisTracker {
        &self.cost_basis
    }

    pub(crate) fn cost_basis_mut(&mut self) -> &mut CostBasisTracker {
        &mut self.cost_basis
    }
}

/// Value and PnL for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Valuation {
    pub total_value: f64,
    pub pnl: f64,
    pub warnings: Vec<DataQualityWarning>,
}

/// Marks a portfolio to market.
pub struct ValuationEngine;

impl ValuationEngine {
    /// Apply the tick's cash flow to `state` and value every holding.
    ///
    /// `update` must come from applying the same tick to `state`'s cost basis.
    /// Holdings are the tracker's current quantities; a non-zero holding with
    /// no price in the tick is valued at 0. It is reported once, and again
    /// only after it has been priced or flat in between.
    pub fn value(
        tick: &PortfolioTick,
        update: &CostBasisUpdate,
        state: &mut PortfolioState,
    ) -> Valuation {
        state.cash_balance += update.cash_delta;

        let mut warnings = Vec::new();
        let mut holdings_value = 0.0;

        for (instrument, quantity) in state.cost_basis.holdings() {
            match tick.price(instrument) {
                Some(price) => {
                    holdings_value += quantity * price;
                    state.unpriced.remove(instrument);
                }
                None if quantity == 0.0 => {
                    state.unpriced.remove(instrument);
                }
                None => {
                    if !state.unpriced.insert(instrument.clone()) {
                        continue;
                    }
                    tracing::warn!(
                        instrument = %instrument,
                        quantity,
                        "held instrument has no price, valued at 0"
                    );
                    warnings.push(DataQualityWarning::MissingPrice {
                        timestamp: tick.timestamp,
                        instrument: instrument.clone(),
                    });
                }
            }
        }

        let total_value = state.cash_balance + holdings_value;
        state.total_value = total_value;

        Valuation {
            total_value,
            pnl: total_value - state.starting_balance,
            warnings,
        }
    }
}
