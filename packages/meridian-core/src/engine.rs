//! The metrics engine: drives ticks through the pipeline and emits samples.
//!
//! An [`Engine`] owns all state for one portfolio. Feeding the same ticks in
//! the same order produces the same samples whether they arrive one at a time
//! through [`Engine::process`] or as a replay through [`Engine::replay`].

use crate::config::EngineConfig;
use crate::portfolio::{PortfolioState, RollingStatistics, ValuationEngine};
use crate::types::{DataQualityWarning, MetricsSample, PortfolioTick};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Create a windowed engine from the four core parameters.
pub fn create_engine(
    starting_balance: f64,
    window_size: usize,
    annualize: bool,
    risk_free_rate: f64,
) -> Result<Engine> {
    Engine::new(EngineConfig::new(
        starting_balance,
        window_size,
        annualize,
        risk_free_rate,
    ))
}

/// Portfolio performance and risk engine for a single portfolio.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    state: PortfolioState,
    stats: RollingStatistics,
    last_timestamp: Option<DateTime<Utc>>,
    warnings: Vec<DataQualityWarning>,
    ticks_processed: u64,
    halted: bool,
}

impl Engine {
    /// Create an engine after validating its configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            starting_balance = config.starting_balance,
            window = ?config.window,
            annualize = config.annualize,
            "engine created"
        );

        Ok(Self {
            state: PortfolioState::new(config.starting_balance),
            stats: RollingStatistics::new(&config),
            config,
            last_timestamp: None,
            warnings: Vec::new(),
            ticks_processed: 0,
            halted: false,
        })
    }

    /// Process one tick and return its metrics.
    ///
    /// Fails with [`Error::Alignment`] if the tick is older than the last one
    /// processed; the engine is halted afterwards and every later call returns
    /// [`Error::EngineHalted`].
    pub fn process(&mut self, tick: &PortfolioTick) -> Result<MetricsSample> {
        if self.halted {
            return Err(Error::EngineHalted);
        }

        if let Some(last) = self.last_timestamp {
            if tick.timestamp < last {
                tracing::error!(timestamp = %tick.timestamp, last = %last, "out-of-order tick");
                self.halted = true;
                return Err(Error::Alignment {
                    timestamp: tick.timestamp,
                    last,
                });
            }
        }
        self.last_timestamp = Some(tick.timestamp);

        let update = self.state.cost_basis_mut().apply(tick);
        let valuation = ValuationEngine::value(tick, &update, &mut self.state);
        let risk = self.stats.update(valuation.total_value);

        self.warnings.extend(update.warnings);
        self.warnings.extend(valuation.warnings);
        self.ticks_processed += 1;

        tracing::debug!(
            timestamp = %tick.timestamp,
            total_value = valuation.total_value,
            pnl = valuation.pnl,
            max_drawdown = risk.max_drawdown,
            "tick processed"
        );

        Ok(MetricsSample {
            timestamp: tick.timestamp,
            total_value: valuation.total_value,
            pnl: valuation.pnl,
            cash_balance: self.state.cash_balance(),
            drawdown: risk.drawdown,
            sharpe_ratio: risk.sharpe_ratio,
            information_ratio: risk.information_ratio,
            rolling_volatility: risk.volatility,
            max_drawdown: risk.max_drawdown,
        })
    }

    /// Process a tick arriving from a fallible feed such as the merger.
    ///
    /// A fatal feed error halts the engine just like a fatal processing error.
    pub fn accept(&mut self, tick: Result<PortfolioTick>) -> Result<MetricsSample> {
        match tick {
            Ok(tick) => self.process(&tick),
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(error = %e, "feed failed, halting engine");
                    self.halted = true;
                }
                Err(e)
            }
        }
    }

    /// Process a bounded batch of ticks.
    pub fn process_batch(&mut self, ticks: &[PortfolioTick]) -> Result<Vec<MetricsSample>> {
        ticks.iter().map(|tick| self.process(tick)).collect()
    }

    /// Replay a finite feed, stopping at the first error.
    pub fn replay<I>(&mut self, ticks: I) -> Result<Vec<MetricsSample>>
    where
        I: IntoIterator<Item = Result<PortfolioTick>>,
    {
        ticks.into_iter().map(|tick| self.accept(tick)).collect()
    }

    /// Lazily process a feed, yielding one sample per tick.
    ///
    /// The stream ends after the first error it yields.
    pub fn stream<I>(&mut self, ticks: I) -> MetricStream<'_, I::IntoIter>
    where
        I: IntoIterator<Item = Result<PortfolioTick>>,
    {
        MetricStream {
            engine: self,
            ticks: ticks.into_iter(),
            failed: false,
        }
    }

    /// Replay a feed until it ends or `stop` is set.
    ///
    /// `stop` is checked before each tick is pulled from the feed; a tick
    /// already pulled always completes.
    pub fn run_until<I>(&mut self, ticks: I, stop: &AtomicBool) -> Result<Vec<MetricsSample>>
    where
        I: IntoIterator<Item = Result<PortfolioTick>>,
    {
        let mut samples = Vec::new();
        let mut ticks = ticks.into_iter();
        while !stop.load(Ordering::Relaxed) {
            let Some(tick) = ticks.next() else {
                return Ok(samples);
            };
            samples.push(self.accept(tick)?);
        }
        tracing::info!(ticks = samples.len(), "replay cancelled");
        Ok(samples)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only view of cash, value and cost basis.
    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    /// Data-quality conditions recorded since the last drain.
    pub fn warnings(&self) -> &[DataQualityWarning] {
        &self.warnings
    }

    /// Drain the recorded warnings.
    pub fn take_warnings(&mut self) -> Vec<DataQualityWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn ticks_processed(&self) -> u64 {
        self.ticks_processed
    }

    /// Whether a fatal error has stopped this engine.
    pub fn is_halted(&self) -> bool {
        self.halted
    }
}

/// Lazy sample stream returned by [`Engine::stream`].
pub struct MetricStream<'a, I> {
    engine: &'a mut Engine,
    ticks: I,
    failed: bool,
}

impl<I> Iterator for MetricStream<'_, I>
where
    I: Iterator<Item = Result<PortfolioTick>>,
{
    type Item = Result<MetricsSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self.engine.accept(self.ticks.next()?);
        self.failed = result.is_err();
        Some(result)
    }
}

/// Metric series for two portfolios processed side by side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub benchmark: Vec<MetricsSample>,
    pub portfolio: Vec<MetricsSample>,
    pub benchmark_warnings: Vec<DataQualityWarning>,
    pub portfolio_warnings: Vec<DataQualityWarning>,
}

impl Comparison {
    /// Portfolio PnL minus benchmark PnL at the last sample of each series.
    pub fn excess_pnl(&self) -> Option<f64> {
        let portfolio = self.portfolio.last()?;
        let benchmark = self.benchmark.last()?;
        Some(portfolio.pnl - benchmark.pnl)
    }
}

/// Run a benchmark and a portfolio through independent engines concurrently.
pub fn compare(
    benchmark_config: &EngineConfig,
    benchmark: &[PortfolioTick],
    portfolio_config: &EngineConfig,
    portfolio: &[PortfolioTick],
) -> Result<Comparison> {
    let mut benchmark_engine = Engine::new(benchmark_config.clone())?;
    let mut portfolio_engine = Engine::new(portfolio_config.clone())?;

    let ((benchmark, benchmark_warnings), (portfolio, portfolio_warnings)) =
        thread::scope(|scope| {
            let handle = scope.spawn(move || {
                let samples = benchmark_engine.process_batch(benchmark);
                (samples, benchmark_engine.take_warnings())
            });
            let samples = portfolio_engine.process_batch(portfolio);
            let portfolio = (samples, portfolio_engine.take_warnings());
            let benchmark = handle
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (benchmark, portfolio)
        });

    Ok(Comparison {
        benchmark: benchmark?,
        portfolio: portfolio?,
        benchmark_warnings,
        portfolio_warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowMode;
    use crate::feed::SnapshotMerger;
    use crate::types::{PositionSnapshot, PriceQuote};
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::cell::Cell;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn single(secs: i64, quantity: f64, price: f64) -> PortfolioTick {
        PortfolioTick::new(ts(secs))
            .with_position("AAPL", quantity)
            .with_price("AAPL", price)
    }

    #[test]
    fn test_cost_basis_scenario() {
        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        let quantities = [0.0, 10.0, 10.0, 5.0];
        let prices = [10.0, 10.0, 12.0, 12.0];

        let mut invested = Vec::new();
        let mut cash = Vec::new();
        let mut last = None;
        for (i, (&q, &p)) in quantities.iter().zip(&prices).enumerate() {
            last = Some(engine.process(&single(i as i64, q, p)).unwrap());
            invested.push(engine.state().cost_basis().invested_capital("AAPL"));
            cash.push(engine.state().cash_balance());
        }

        assert_eq!(invested, vec![0.0, 100.0, 100.0, 50.0]);
        assert_eq!(cash, vec![100_000.0, 99_900.0, 99_900.0, 99_960.0]);

        let last = last.unwrap();
        assert_eq!(last.total_value, 100_020.0);
        assert_eq!(last.pnl, 20.0);
        assert_eq!(last.cash_balance, 99_960.0);
    }

    #[test]
    fn test_round_trip_neutrality() {
        let mut engine = create_engine(50_000.0, 20, false, 0.0).unwrap();
        engine.process(&single(0, 0.0, 80.0)).unwrap();
        let cash_before = engine.state().cash_balance();

        engine.process(&single(1, 30.0, 80.0)).unwrap();
        let sample = engine.process(&single(2, 0.0, 80.0)).unwrap();

        assert_eq!(engine.state().cost_basis().invested_capital("AAPL"), 0.0);
        assert_eq!(engine.state().cash_balance(), cash_before);
        assert_eq!(sample.pnl, 0.0);
    }

    #[test]
    fn test_sell_from_zero_is_not_fatal() {
        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        engine.process(&single(0, 0.0, 20.0)).unwrap();
        let sample = engine.process(&single(1, -5.0, 20.0));

        assert!(sample.is_ok());
        assert!(!engine.is_halted());
        assert_eq!(engine.state().cost_basis().invested_capital("AAPL"), 0.0);
        assert!(matches!(
            engine.warnings(),
            [DataQualityWarning::SellFromZero { .. }]
        ));
    }

    #[test]
    fn test_max_drawdown_scenario() {
        // Fully invested: 10 shares at 10000 with a 100000 starting balance
        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        let prices = [10_000.0, 11_000.0, 9_000.0, 9_500.0];
        let ticks: Vec<PortfolioTick> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| single(i as i64, 10.0, p))
            .collect();
        let samples = engine.process_batch(&ticks).unwrap();

        let totals: Vec<f64> = samples.iter().map(|s| s.total_value).collect();
        assert_eq!(totals, vec![100_000.0, 110_000.0, 90_000.0, 95_000.0]);
        assert_eq!(samples[0].drawdown, 0.0);
        assert_eq!(samples[1].drawdown, 0.0);
        assert_relative_eq!(samples[2].drawdown, 20_000.0 / 110_000.0, epsilon = 1e-12);
        assert_relative_eq!(samples[3].drawdown, 15_000.0 / 110_000.0, epsilon = 1e-12);
        assert_relative_eq!(samples[3].max_drawdown, 0.181818, epsilon = 1e-6);
    }

    #[test]
    fn test_ratios_zero_before_two_returns() {
        let mut engine = create_engine(100_000.0, 20, true, 0.02).unwrap();
        let first = engine.process(&single(0, 10.0, 100.0)).unwrap();
        let second = engine.process(&single(1, 10.0, 150.0)).unwrap();

        for sample in [first, second] {
            assert_eq!(sample.sharpe_ratio, 0.0);
            assert_eq!(sample.information_ratio, 0.0);
            assert_eq!(sample.rolling_volatility, 0.0);
        }
    }

    #[test]
    fn test_out_of_order_tick_halts() {
        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        engine.process(&single(10, 1.0, 1.0)).unwrap();

        let err = engine.process(&single(5, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, Error::Alignment { .. }));
        assert!(err.is_fatal());
        assert!(engine.is_halted());

        assert!(matches!(
            engine.process(&single(20, 1.0, 1.0)),
            Err(Error::EngineHalted)
        ));
    }

    #[test]
    fn test_equal_timestamps_accepted() {
        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        engine.process(&single(1, 1.0, 1.0)).unwrap();
        assert!(engine.process(&single(1, 2.0, 1.0)).is_ok());
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            create_engine(100_000.0, 0, false, 0.0),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            create_engine(-5.0, 20, false, 0.0),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_replay_from_merger() {
        let positions = vec![
            PositionSnapshot::new(ts(0)).with("AAPL", 0.0),
            PositionSnapshot::new(ts(1)).with("AAPL", 10.0),
            PositionSnapshot::new(ts(3)).with("AAPL", 5.0),
        ];
        let quotes = vec![
            PriceQuote::new(ts(0)).with("AAPL", 10.0),
            PriceQuote::new(ts(2)).with("AAPL", 12.0),
        ];

        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        let samples = engine
            .replay(SnapshotMerger::new(positions, quotes))
            .unwrap();

        assert_eq!(samples.len(), 4);
        assert_eq!(samples[3].total_value, 100_020.0);
        assert_eq!(samples[3].pnl, 20.0);
    }

    #[test]
    fn test_replay_fixture_table() {
        let table = include_str!("../fixtures/cost_basis.csv");
        let (positions, quotes) = crate::feed::read_fixture_from_reader(table.as_bytes()).unwrap();
        let mut merger = SnapshotMerger::new(positions, quotes);

        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        let samples = engine.replay(merger.by_ref()).unwrap();

        assert_eq!(samples.len(), 5);
        assert_eq!(samples[3].total_value, 100_020.0);
        assert_eq!(samples[4].total_value, 100_020.0);
        assert_eq!(engine.state().cost_basis().invested_capital("AAPL"), 50.0);
        assert_eq!(engine.state().cost_basis().invested_capital("TSLA"), 0.0);

        // TSLA is shorted before it is ever quoted
        assert!(matches!(
            merger.warnings(),
            [DataQualityWarning::MissingPrice { instrument, .. }] if instrument == "TSLA"
        ));
        assert!(matches!(
            engine.warnings(),
            [DataQualityWarning::SellFromZero { instrument, .. }] if instrument == "TSLA"
        ));
    }

    #[test]
    fn test_replay_halts_on_feed_alignment_error() {
        let positions = vec![
            PositionSnapshot::new(ts(5)).with("AAPL", 1.0),
            PositionSnapshot::new(ts(1)).with("AAPL", 1.0),
        ];
        let quotes = vec![PriceQuote::new(ts(5)).with("AAPL", 1.0)];

        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        let result = engine.replay(SnapshotMerger::new(positions, quotes));

        assert!(matches!(result, Err(Error::Alignment { .. })));
        assert!(engine.is_halted());
        assert_eq!(engine.ticks_processed(), 1);
    }

    #[test]
    fn test_stream_ends_after_error() {
        let ticks = vec![
            Ok(single(2, 1.0, 1.0)),
            Ok(single(1, 1.0, 1.0)),
            Ok(single(3, 1.0, 1.0)),
        ];
        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        let results: Vec<_> = engine.stream(ticks).collect();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_run_until_stops_between_ticks() {
        let stop = AtomicBool::new(false);
        let pulled = Cell::new(0);
        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();

        // The flag is raised while the feed hands over tick 4
        let ticks = (0..10).map(|i| {
            pulled.set(pulled.get() + 1);
            if i == 4 {
                stop.store(true, Ordering::Relaxed);
            }
            Ok(single(i, 1.0, 10.0))
        });
        let samples = engine.run_until(ticks, &stop).unwrap();

        assert_eq!(samples.len(), 5);
        assert_eq!(engine.ticks_processed(), 5);
        assert_eq!(pulled.get(), 5);
    }

    #[test]
    fn test_run_until_pulls_nothing_once_stopped() {
        let stop = AtomicBool::new(true);
        let pulled = Cell::new(0);
        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();

        let ticks = (0..).map(|i| {
            pulled.set(pulled.get() + 1);
            Ok(single(i, 1.0, 10.0))
        });
        let samples = engine.run_until(ticks, &stop).unwrap();

        assert!(samples.is_empty());
        assert_eq!(pulled.get(), 0);
        assert_eq!(engine.ticks_processed(), 0);
    }

    #[test]
    fn test_run_until_drains_finite_feed() {
        let stop = AtomicBool::new(false);
        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        let samples = engine
            .run_until((0..3).map(|i| Ok(single(i, 1.0, 10.0))), &stop)
            .unwrap();
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn test_warnings_collected_from_every_stage() {
        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        engine
            .process(&PortfolioTick::new(ts(0)).with_position("MIRM", 3.0))
            .unwrap();
        engine.process(&single(1, -1.0, 5.0)).unwrap();

        // MIRM stays unpriced on the second tick but is reported once
        assert_eq!(engine.warnings().len(), 2);
        assert!(engine
            .warnings()
            .iter()
            .any(|w| matches!(w, DataQualityWarning::SellFromZero { .. })));
        assert!(engine
            .warnings()
            .iter()
            .all(|w| !matches!(w, DataQualityWarning::StaleQuote { .. })));
    }

    #[test]
    fn test_take_warnings_drains_and_stays_bounded() {
        let mut engine = create_engine(100_000.0, 20, false, 0.0).unwrap();
        for i in 0..200 {
            engine
                .process(&PortfolioTick::new(ts(i)).with_position("MIRM", 3.0))
                .unwrap();
        }
        assert_eq!(engine.warnings().len(), 1);

        let drained = engine.take_warnings();
        assert!(matches!(
            drained.as_slice(),
            [DataQualityWarning::MissingPrice { instrument, .. }] if instrument == "MIRM"
        ));
        assert!(engine.warnings().is_empty());

        engine
            .process(&PortfolioTick::new(ts(200)).with_price("MIRM", 4.0))
            .unwrap();
        engine.process(&PortfolioTick::new(ts(201))).unwrap();
        assert_eq!(engine.warnings().len(), 1);
    }

    #[test]
    fn test_compare_runs_independent_engines() {
        let benchmark: Vec<PortfolioTick> = (0..5)
            .map(|i| single(i, 10.0, 100.0 + i as f64))
            .collect();
        let portfolio: Vec<PortfolioTick> = (0..5)
            .map(|i| single(i, 10.0, 100.0 + 2.0 * i as f64))
            .collect();
        let config = EngineConfig::new(100_000.0, 20, false, 0.0);

        let comparison = compare(&config, &benchmark, &config, &portfolio).unwrap();

        assert_eq!(comparison.benchmark.len(), 5);
        assert_eq!(comparison.portfolio.len(), 5);
        assert_eq!(comparison.benchmark[4].pnl, 40.0);
        assert_eq!(comparison.portfolio[4].pnl, 80.0);
        assert_eq!(comparison.excess_pnl(), Some(40.0));
        assert!(comparison.benchmark_warnings.is_empty());
        assert!(comparison.portfolio_warnings.is_empty());

        let mut solo = Engine::new(config).unwrap();
        assert_eq!(solo.process_batch(&portfolio).unwrap(), comparison.portfolio);
    }

    #[test]
    fn test_compare_reports_each_side_warnings() {
        let benchmark = vec![single(0, 0.0, 10.0), single(1, -2.0, 10.0)];
        let portfolio = vec![PortfolioTick::new(ts(0)).with_position("EQIX", 1.0)];
        let config = EngineConfig::default();

        let comparison = compare(&config, &benchmark, &config, &portfolio).unwrap();

        assert!(matches!(
            comparison.benchmark_warnings.as_slice(),
            [DataQualityWarning::SellFromZero { .. }]
        ));
        assert!(matches!(
            comparison.portfolio_warnings.as_slice(),
            [DataQualityWarning::MissingPrice { instrument, .. }] if instrument == "EQIX"
        ));
    }

    #[test]
    fn test_compare_rejects_bad_config() {
        let bad = EngineConfig::new(100_000.0, 0, false, 0.0);
        let good = EngineConfig::default();
        assert!(compare(&bad, &[], &good, &[]).is_err());
    }

    fn ticks_strategy() -> impl Strategy<Value = Vec<PortfolioTick>> {
        prop::collection::vec((-50i32..50, 1u32..500, -20i32..20, 1u32..300, 0i64..3), 1..60)
            .prop_map(|rows| {
                let mut secs = 0;
                rows.into_iter()
                    .map(|(qa, pa, qb, pb, step)| {
                        secs += step;
                        PortfolioTick::new(ts(secs))
                            .with_position("AAPL", qa as f64)
                            .with_price("AAPL", pa as f64)
                            .with_position("TSLA", qb as f64 / 4.0)
                            .with_price("TSLA", pb as f64 * 0.5)
                    })
                    .collect()
            })
    }

    fn window_strategy() -> impl Strategy<Value = WindowMode> {
        prop_oneof![
            (1usize..30).prop_map(|size| WindowMode::Windowed { size }),
            Just(WindowMode::FullHistory),
            (1u32..=100).prop_map(|a| WindowMode::Exponential {
                alpha: a as f64 / 100.0
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_live_equals_replay(ticks in ticks_strategy(), window in window_strategy()) {
            let config = EngineConfig::default().with_window(window);

            let mut live_engine = Engine::new(config.clone()).unwrap();
            let mut live = Vec::new();
            for tick in &ticks {
                live.push(live_engine.process(tick).unwrap());
            }

            let mut replay_engine = Engine::new(config.clone()).unwrap();
            let replayed = replay_engine.replay(ticks.iter().cloned().map(Ok)).unwrap();

            let mut stream_engine = Engine::new(config).unwrap();
            let streamed = stream_engine
                .stream(ticks.iter().cloned().map(Ok))
                .collect::<Result<Vec<_>>>()
                .unwrap();

            prop_assert_eq!(live.len(), ticks.len());
            prop_assert_eq!(replayed.len(), live.len());
            prop_assert_eq!(streamed.len(), live.len());
            for ((l, r), s) in live.iter().zip(&replayed).zip(&streamed) {
                for other in [r, s] {
                    prop_assert_eq!(l.total_value.to_bits(), other.total_value.to_bits());
                    prop_assert_eq!(l.sharpe_ratio.to_bits(), other.sharpe_ratio.to_bits());
                    prop_assert_eq!(l.information_ratio.to_bits(), other.information_ratio.to_bits());
                    prop_assert_eq!(l.rolling_volatility.to_bits(), other.rolling_volatility.to_bits());
                    prop_assert_eq!(l.max_drawdown.to_bits(), other.max_drawdown.to_bits());
                }
            }
            prop_assert_eq!(live_engine.state().cash_balance().to_bits(),
                replay_engine.state().cash_balance().to_bits());
            prop_assert_eq!(live_engine.warnings(), stream_engine.warnings());
        }

        #[test]
        fn prop_merged_feed_matches_live_ticks(ticks in ticks_strategy(), window in window_strategy()) {
            // Full snapshots at strictly increasing timestamps merge back into the same ticks
            let ticks: Vec<PortfolioTick> = ticks
                .into_iter()
                .enumerate()
                .map(|(i, tick)| PortfolioTick { timestamp: ts(i as i64), ..tick })
                .collect();
            let positions: Vec<PositionSnapshot> = ticks
                .iter()
                .map(|t| PositionSnapshot { timestamp: t.timestamp, positions: t.positions.clone() })
                .collect();
            let quotes: Vec<PriceQuote> = ticks
                .iter()
                .map(|t| PriceQuote { timestamp: t.timestamp, prices: t.prices.clone() })
                .collect();
            let config = EngineConfig::default().with_window(window);

            let mut live_engine = Engine::new(config.clone()).unwrap();
            let live: Vec<MetricsSample> = ticks.iter().map(|t| live_engine.process(t).unwrap()).collect();

            let mut merged_engine = Engine::new(config).unwrap();
            let merged = merged_engine.replay(SnapshotMerger::new(positions, quotes)).unwrap();

            prop_assert_eq!(live, merged);
        }

        #[test]
        fn prop_drawdown_bounded_and_monotone(ticks in ticks_strategy(), window in window_strategy()) {
            let config = EngineConfig::default().with_window(window);
            let mut engine = Engine::new(config).unwrap();
            let samples = engine.process_batch(&ticks).unwrap();

            let mut previous_max = 0.0;
            for sample in &samples {
                prop_assert!((0.0..=1.0).contains(&sample.drawdown));
                prop_assert!(sample.max_drawdown >= previous_max);
                prop_assert!(sample.max_drawdown >= sample.drawdown);
                previous_max = sample.max_drawdown;
            }
        }

        #[test]
        fn prop_outputs_are_finite(ticks in ticks_strategy(), window in window_strategy()) {
            let mut engine = Engine::new(EngineConfig::default().with_window(window)).unwrap();
            for sample in engine.process_batch(&ticks).unwrap() {
                prop_assert!(sample.sharpe_ratio.is_finite());
                prop_assert!(sample.information_ratio.is_finite());
                prop_assert!(sample.rolling_volatility.is_finite());
                prop_assert!(sample.total_value.is_finite());
            }
        }
    }
}
