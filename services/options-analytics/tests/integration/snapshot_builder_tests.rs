use async_trait::async_trait;
use chrono::{Datelike, Weekday};
use options_analytics::config::PricingConfig;
use options_analytics::{
    AnalyticsError, AnalyticsResult, Candle, CandleInterval, MarketDataSource, OptionChainSnapshot, Provenance,
    SnapshotBuilder, SyntheticMarket, fetch_with_fallback,
};
use options_analytics::source::MAX_HISTORY_DAYS;
use rstest::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use crate::common::{NIFTY_SPOT, NIFTY_STEP, chain, fixed_now, init_test_env, row};

/// Test source answering every call the same way
struct StubSource {
    chain: Option<OptionChainSnapshot>,
    candles: Option<Vec<Candle>>,
    delay: Duration,
    calls: AtomicUsize,
    last_days: AtomicU32,
}

impl StubSource {
    fn failing() -> Self {
        Self {
            chain: None,
            candles: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_days: AtomicU32::new(0),
        }
    }

    fn serving(chain: OptionChainSnapshot, candles: Vec<Candle>) -> Self {
        Self {
            chain: Some(chain),
            candles: Some(candles),
            ..Self::failing()
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MarketDataSource for StubSource {
    fn name(&self) -> &str {
        "stub"
    }

    async fn fetch_chain(&self, _symbol: &str) -> AnalyticsResult<OptionChainSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.chain
            .clone()
            .ok_or_else(|| AnalyticsError::unavailable("stub has no chain"))
    }

    async fn fetch_candles(
        &self,
        _symbol: &str,
        _interval: CandleInterval,
        days: u32,
    ) -> AnalyticsResult<Vec<Candle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_days.store(days, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.candles
            .clone()
            .ok_or_else(|| AnalyticsError::unavailable("stub has no candles"))
    }
}

fn live_chain() -> OptionChainSnapshot {
    let mut snapshot = chain(vec![row(22_450.0, 10.0, 20.0), row(22_500.0, 30.0, 40.0)]);
    snapshot.provenance = Provenance::Live;
    snapshot
}

fn live_candles() -> Vec<Candle> {
    [22_400.0, 22_600.0]
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: fixed_now() + chrono::Duration::days(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 5_000.0,
        })
        .collect()
}

#[fixture]
fn builder() -> SnapshotBuilder {
    init_test_env();
    SnapshotBuilder::new(SyntheticMarket::seeded(7, 1, PricingConfig::default()), Duration::from_millis(100))
}

#[rstest]
#[tokio::test]
async fn live_chain_is_used_when_requested(builder: SnapshotBuilder) {
    let source = Arc::new(StubSource::serving(live_chain(), live_candles()));
    let builder = builder.with_live_source(source.clone());

    let snapshot = builder.build_chain("NIFTY", true).await;
    assert_eq!(snapshot.provenance, Provenance::Live);
    assert_eq!(snapshot.rows, live_chain().rows);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn live_source_skipped_unless_requested(builder: SnapshotBuilder) {
    let source = Arc::new(StubSource::serving(live_chain(), live_candles()));
    let builder = builder.with_live_source(source.clone());

    let snapshot = builder.build_chain("NIFTY", false).await;
    assert_eq!(snapshot.provenance, Provenance::Synthetic);
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn failing_source_falls_back(builder: SnapshotBuilder) {
    let builder = builder.with_live_source(Arc::new(StubSource::failing()));

    let snapshot = builder.build_chain("BANKNIFTY", true).await;
    assert_eq!(snapshot.provenance, Provenance::Synthetic);
    assert_eq!(snapshot.symbol, "BANKNIFTY");
    assert_eq!(snapshot.rows.len(), 21);

    let candles = builder.build_candles("BANKNIFTY", CandleInterval::OneDay, 5, true).await;
    assert_eq!(candles.provenance, Provenance::Synthetic);
    assert_eq!(candles.candles.len(), 5);
}

#[rstest]
#[tokio::test]
async fn slow_source_times_out_to_synthetic(builder: SnapshotBuilder) {
    let source = StubSource::serving(live_chain(), live_candles()).slow(Duration::from_secs(5));
    let builder = builder.with_live_source(Arc::new(source));

    let snapshot = builder.build_chain("NIFTY", true).await;
    assert_eq!(snapshot.provenance, Provenance::Synthetic);
}

#[rstest]
#[tokio::test]
async fn empty_live_chain_counts_as_failure(builder: SnapshotBuilder) {
    let source = StubSource::serving(chain(vec![]), vec![]);
    let builder = builder.with_live_source(Arc::new(source));

    assert_eq!(builder.build_chain("NIFTY", true).await.provenance, Provenance::Synthetic);
    let candles = builder.build_candles("NIFTY", CandleInterval::FiveMinutes, 1, true).await;
    assert_eq!(candles.provenance, Provenance::Synthetic);
    assert_eq!(candles.candles.len(), 75);
}

#[rstest]
#[tokio::test]
async fn oversized_history_request_is_capped(builder: SnapshotBuilder) {
    let failing = builder.with_live_source(Arc::new(StubSource::failing()));
    let series = failing.build_candles("NIFTY", CandleInterval::OneDay, u32::MAX, true).await;
    assert_eq!(series.provenance, Provenance::Synthetic);
    assert_eq!(series.candles.len(), MAX_HISTORY_DAYS as usize);

    let source = Arc::new(StubSource::serving(live_chain(), live_candles()));
    let live = SnapshotBuilder::new(SyntheticMarket::seeded(7, 1, PricingConfig::default()), Duration::from_millis(100))
        .with_live_source(source.clone());
    let series = live.build_candles("NIFTY", CandleInterval::OneDay, u32::MAX, true).await;
    assert_eq!(series.provenance, Provenance::Live);
    assert_eq!(source.last_days.load(Ordering::SeqCst), MAX_HISTORY_DAYS);
}

#[rstest]
#[tokio::test]
async fn trend_from_live_candles(builder: SnapshotBuilder) {
    let builder = builder.with_live_source(Arc::new(StubSource::serving(live_chain(), live_candles())));

    let reading = builder.build_trend("nifty", true).await;
    assert_eq!(reading.symbol, "NIFTY");
    assert_eq!(reading.current_price, 22_600.0);
    assert_eq!(reading.trend, options_analytics::TrendLabel::Bullish);
}

#[rstest]
#[case("NIFTY", 22_500.0)]
#[case("FINNIFTY", 21_000.0)]
#[case("SENSEX", 20_000.0)]
#[tokio::test]
async fn synthetic_trend_ends_on_reference_spot(builder: SnapshotBuilder, #[case] symbol: &str, #[case] spot: f64) {
    let builder = builder.with_live_source(Arc::new(StubSource::failing()));
    let reading = builder.build_trend(symbol, true).await;
    assert_eq!(reading.current_price, spot);
    assert!((0.0..=100.0).contains(&reading.rsi));
}

#[test]
fn synthetic_chain_shape() {
    let mut market = SyntheticMarket::seeded(42, 3, PricingConfig::default());
    let snapshot = market.option_chain("NIFTY", fixed_now());

    assert_eq!(snapshot.provenance, Provenance::Synthetic);
    assert_eq!(snapshot.spot_price, NIFTY_SPOT);
    assert_eq!(snapshot.strike_step, NIFTY_STEP);

    let expiries = snapshot.expiries();
    assert_eq!(expiries.len(), 3);
    assert!(expiries.iter().all(|e| e.weekday() == Weekday::Thu));

    for expiry in expiries {
        let rows = snapshot.for_expiry(expiry);
        assert_eq!(rows.len(), 21);
        assert_eq!(rows[10].strike, NIFTY_SPOT);
        assert!(rows.windows(2).all(|w| (w[1].strike - w[0].strike - NIFTY_STEP).abs() < 1e-9));

        for r in rows {
            assert!(r.call_open_interest >= 0.0 && r.put_open_interest >= 0.0);
            assert!(r.call_volume >= 0.0 && r.put_volume >= 0.0);
            assert!(r.call_last_price >= 0.05 && r.put_last_price >= 0.05);
            assert!((0.0..=0.8).contains(&r.call_implied_vol));
            assert!((0.0..=0.8).contains(&r.put_implied_vol));
            assert!((0.0..=1.0).contains(&r.call_delta));
            assert!((-1.0..=0.0).contains(&r.put_delta));
        }
    }
}

#[test]
fn seeded_generator_is_reproducible() {
    let pricing = PricingConfig::default();
    let a = SyntheticMarket::seeded(99, 2, pricing.clone()).option_chain("FINNIFTY", fixed_now());
    let b = SyntheticMarket::seeded(99, 2, pricing.clone()).option_chain("FINNIFTY", fixed_now());
    let c = SyntheticMarket::seeded(100, 2, pricing).option_chain("FINNIFTY", fixed_now());

    assert_eq!(a.rows, b.rows);
    assert_ne!(a.rows, c.rows);
}

#[tokio::test]
async fn fallback_combinator() {
    let ok = fetch_with_fallback("value", async { Ok::<_, AnalyticsError>(1) }, || 2).await;
    assert_eq!(ok, 1);

    let fallen = fetch_with_fallback("value", async { Err(AnalyticsError::unavailable("down")) }, || 2).await;
    assert_eq!(fallen, 2);
}
