//! Timestamp alignment of position snapshots and price quotes.

use crate::types::{
    instrument, DataQualityWarning, Instrument, PortfolioTick, PositionSnapshot, PriceQuote,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::iter::{FusedIterator, Peekable};

/// Lazily merges a position feed and a price feed into ordered ticks.
///
/// One tick is emitted per distinct timestamp. Snapshots at that timestamp
/// apply before quotes at that timestamp. Quantities and prices carry forward
/// between ticks; an instrument never seen has quantity 0, and a held
/// instrument never quoted is priced at 0, with one [`DataQualityWarning`]
/// per instrument until its first quote arrives.
///
/// A position snapshot older than the last emitted tick yields
/// [`Error::Alignment`] and ends the sequence. Stale price quotes are
/// dropped with a warning.
pub struct SnapshotMerger<P, Q>
where
    P: Iterator<Item = PositionSnapshot>,
    Q: Iterator<Item = PriceQuote>,
{
    positions: Peekable<P>,
    quotes: Peekable<Q>,
    holdings: BTreeMap<Instrument, f64>,
    last_prices: BTreeMap<Instrument, f64>,
    unquoted: BTreeSet<Instrument>,
    last_emitted: Option<DateTime<Utc>>,
    warnings: Vec<DataQualityWarning>,
    done: bool,
}

impl<P, Q> SnapshotMerger<P, Q>
where
    P: Iterator<Item = PositionSnapshot>,
    Q: Iterator<Item = PriceQuote>,
{
    /// Create a merger over the two feeds.
    pub fn new<IP, IQ>(positions: IP, quotes: IQ) -> Self
    where
        IP: IntoIterator<IntoIter = P>,
        IQ: IntoIterator<IntoIter = Q>,
    {
        Self {
            positions: positions.into_iter().peekable(),
            quotes: quotes.into_iter().peekable(),
            holdings: BTreeMap::new(),
            last_prices: BTreeMap::new(),
            unquoted: BTreeSet::new(),
            last_emitted: None,
            warnings: Vec::new(),
            done: false,
        }
    }

    /// Data-quality conditions observed so far.
    pub fn warnings(&self) -> &[DataQualityWarning] {
        &self.warnings
    }

    /// Drain the recorded warnings.
    pub fn take_warnings(&mut self) -> Vec<DataQualityWarning> {
        std::mem::take(&mut self.warnings)
    }

    fn drop_stale_quotes(&mut self) {
        let Some(last) = self.last_emitted else {
            return;
        };
        while let Some(quote) = self.quotes.next_if(|q| q.timestamp < last) {
            tracing::warn!(
                timestamp = %quote.timestamp,
                last_emitted = %last,
                "stale price quote dropped"
            );
            self.warnings.push(DataQualityWarning::StaleQuote {
                timestamp: quote.timestamp,
                last_emitted: last,
            });
        }
    }

    fn next_tick(&mut self) -> Option<Result<PortfolioTick>> {
        self.drop_stale_quotes();

        let position_ts = self.positions.peek().map(|s| s.timestamp);
        let quote_ts = self.quotes.peek().map(|q| q.timestamp);

        if let (Some(ts), Some(last)) = (position_ts, self.last_emitted) {
            if ts < last {
                tracing::error!(timestamp = %ts, last = %last, "out-of-order position snapshot");
                return Some(Err(Error::Alignment {
                    timestamp: ts,
                    last,
                }));
            }
        }

        let timestamp = match (position_ts, quote_ts) {
            (None, None) => return None,
            (Some(p), None) => p,
            (None, Some(q)) => q,
            (Some(p), Some(q)) => p.min(q),
        };

        while let Some(snapshot) = self.positions.next_if(|s| s.timestamp == timestamp) {
            for (symbol, quantity) in snapshot.positions {
                self.holdings.insert(instrument(&symbol), quantity);
            }
        }
        while let Some(quote) = self.quotes.next_if(|q| q.timestamp == timestamp) {
            for (symbol, price) in quote.prices {
                self.last_prices.insert(instrument(&symbol), price);
            }
        }

        let mut prices = self.last_prices.clone();
        for (symbol, &quantity) in &self.holdings {
            if quantity != 0.0 && !prices.contains_key(symbol) {
                if self.unquoted.insert(symbol.clone()) {
                    tracing::warn!(
                        instrument = %symbol,
                        timestamp = %timestamp,
                        "held instrument not yet quoted, priced at 0"
                    );
                    self.warnings.push(DataQualityWarning::MissingPrice {
                        timestamp,
                        instrument: symbol.clone(),
                    });
                }
                prices.insert(symbol.clone(), 0.0);
            }
        }

        self.last_emitted = Some(timestamp);

        Some(Ok(PortfolioTick {
            timestamp,
            positions: self.holdings.clone(),
            prices,
        }))
    }
}

impl<P, Q> Iterator for SnapshotMerger<P, Q>
where
    P: Iterator<Item = PositionSnapshot>,
    Q: Iterator<Item = PriceQuote>,
{
    type Item = Result<PortfolioTick>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = self.next_tick();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

impl<P, Q> FusedIterator for SnapshotMerger<P, Q>
where
    P: Iterator<Item = PositionSnapshot>,
    Q: Iterator<Item = PriceQuote>,
{
}
