//! Option chain and candle retrieval
//!
//! A [`SnapshotBuilder`] asks the live [`MarketDataSource`] first when one is
//! configured and requested, and falls back to [`SyntheticMarket`] on any
//! failure or timeout. Transport errors never reach analytics callers.
//!
//! [`SyntheticMarket`] is a test fixture generator, not market truth. Only
//! its shape is contractual: 21 strikes per expiry centred on spot, strikes
//! ascending, non-negative OI, volume and premium. Its numeric ranges are not.

use async_trait::async_trait;
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc, Weekday,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::config::{AnalyticsConfig, PricingConfig};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::greeks::{BlackScholes, DAYS_PER_YEAR, days_to_expiry};
use crate::indicators;
use crate::types::{
    Candle, CandleInterval, OptionChainSnapshot, OptionContractRow, OptionType, Provenance, TrendReading,
};
use crate::zerodha::ZerodhaSource;

/// Strikes generated on each side of spot
pub const STRIKES_PER_SIDE: usize = 10;
/// Longest candle history served, in trading days (Kite's daily-bar cap)
pub const MAX_HISTORY_DAYS: u32 = 2000;

/// IST is UTC+05:30
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;
/// NSE cash session, IST
const SESSION_OPEN: (u32, u32) = (9, 15);
const SESSION_CLOSE: (u32, u32) = (15, 30);
const SESSION_MINUTES: u32 = 375;

pub(crate) fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Reference levels for an underlying
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnderlyingProfile {
    /// Reference spot price
    pub spot: f64,
    /// Strike interval
    pub step: f64,
    /// Daily return volatility used for synthetic candles
    pub daily_volatility: f64,
}

impl UnderlyingProfile {
    /// Lookup by symbol; unknown symbols get a generic profile
    pub fn for_symbol(symbol: &str) -> Self {
        match symbol.trim().to_ascii_uppercase().as_str() {
            "NIFTY" | "NIFTY50" => Self {
                spot: 22_500.0,
                step: 50.0,
                daily_volatility: 0.01,
            },
            "BANKNIFTY" => Self {
                spot: 48_000.0,
                step: 100.0,
                daily_volatility: 0.015,
            },
            "FINNIFTY" => Self {
                spot: 21_000.0,
                step: 50.0,
                daily_volatility: 0.012,
            },
            _ => Self {
                spot: 20_000.0,
                step: 50.0,
                daily_volatility: 0.02,
            },
        }
    }
}

/// External market data provider
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Current option chain for an underlying
    async fn fetch_chain(&self, symbol: &str) -> AnalyticsResult<OptionChainSnapshot>;

    /// Historical OHLCV bars, oldest first
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        days: u32,
    ) -> AnalyticsResult<Vec<Candle>>;
}

/// Run `primary`; on error log it and return `fallback()` instead
pub async fn fetch_with_fallback<T, P, F>(what: &str, primary: P, fallback: F) -> T
where
    P: Future<Output = AnalyticsResult<T>>,
    F: FnOnce() -> T,
{
    match primary.await {
        Ok(value) => value,
        Err(e) => {
            warn!(what, error = %e, "Live fetch failed, falling back to sample data");
            fallback()
        }
    }
}

/// Historical bars with their origin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    pub symbol: String,
    pub interval: CandleInterval,
    pub candles: Vec<Candle>,
    pub provenance: Provenance,
}

/// Next `count` weekly Thursday expiries as of `now`.
/// On expiry day the current week rolls over once the session has closed.
pub fn weekly_expiries(now: DateTime<Utc>, count: usize) -> Vec<NaiveDate> {
    let local = now.with_timezone(&ist());
    let today = local.date_naive();
    let until_thursday =
        (Weekday::Thu.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    let closed = local.time() >= session_time(SESSION_CLOSE);
    let first_offset = if until_thursday == 0 && closed { 7 } else { until_thursday };

    (0..count)
        .map(|week| today + Duration::days(i64::from(first_offset) + 7 * week as i64))
        .collect()
}

fn session_time((hour, minute): (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Seeded generator of option chains and candles
pub struct SyntheticMarket<R: Rng = StdRng> {
    rng: R,
    expiries: usize,
    pricing: PricingConfig,
}

impl SyntheticMarket<StdRng> {
    /// Reproducible generator
    pub fn seeded(seed: u64, expiries: usize, pricing: PricingConfig) -> Self {
        Self::new(StdRng::seed_from_u64(seed), expiries, pricing)
    }

    /// Generator seeded from OS entropy
    pub fn from_entropy(expiries: usize, pricing: PricingConfig) -> Self {
        Self::new(StdRng::from_entropy(), expiries, pricing)
    }
}

impl<R: Rng> SyntheticMarket<R> {
    pub fn new(rng: R, expiries: usize, pricing: PricingConfig) -> Self {
        Self {
            rng,
            expiries: expiries.max(1),
            pricing,
        }
    }

    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        mean + std_dev * z
    }

    /// Synthetic chain: 21 strikes around the symbol's reference spot for
    /// each weekly expiry. Farther strikes draw OI and IV with wider spread.
    pub fn option_chain(&mut self, symbol: &str, now: DateTime<Utc>) -> OptionChainSnapshot {
        let profile = UnderlyingProfile::for_symbol(symbol);
        let spot = profile.spot;
        let expiries = weekly_expiries(now, self.expiries);

        let strikes: Vec<f64> = (0..=2 * STRIKES_PER_SIDE)
            .map(|i| spot + (i as f64 - STRIKES_PER_SIDE as f64) * profile.step)
            .collect();

        let mut rows = Vec::with_capacity(strikes.len() * expiries.len());
        for &strike in &strikes {
            let distance = (strike - spot).abs() / spot;
            let call = self.leg(distance);
            let put = self.leg(distance);

            for (week, &expiry) in expiries.iter().enumerate() {
                let decay = 0.7_f64.powi(week as i32);
                let volume_decay = 0.6_f64.powi(week as i32);
                let iv_decay = 0.95_f64.powi(week as i32);
                let time = days_to_expiry(expiry, now).max(0.25) / DAYS_PER_YEAR;

                let call_iv = call.iv * iv_decay;
                let put_iv = put.iv * iv_decay;
                let (call_price, call_delta) = self.premium(OptionType::Call, spot, strike, call_iv, time);
                let (put_price, put_delta) = self.premium(OptionType::Put, spot, strike, put_iv, time);

                rows.push(OptionContractRow {
                    strike,
                    expiry,
                    call_open_interest: (call.oi * decay).round(),
                    call_oi_change: call.oi_change,
                    call_volume: (call.volume * volume_decay).round(),
                    call_implied_vol: call_iv,
                    call_last_price: call_price,
                    call_delta,
                    put_open_interest: (put.oi * decay).round(),
                    put_oi_change: put.oi_change,
                    put_volume: (put.volume * volume_decay).round(),
                    put_implied_vol: put_iv,
                    put_last_price: put_price,
                    put_delta,
                });
            }
        }

        debug!(symbol, rows = rows.len(), spot, "generated synthetic chain");
        OptionChainSnapshot::new(symbol, spot, profile.step, rows, now, Provenance::Synthetic)
    }

    fn leg(&mut self, distance: f64) -> SyntheticLeg {
        let oi = self.normal(5_000.0, 2_000.0) * (1.0 + distance);
        let volume = self.normal(2_000.0, 1_000.0) * (1.0 - distance / 2.0);
        let iv_percent = (self.normal(30.0, 10.0) * (1.0 + distance / 2.0)).clamp(10.0, 80.0);
        let oi_change = self.rng.gen_range(-0.2..0.3);

        SyntheticLeg {
            oi: oi.max(0.0),
            volume: volume.max(0.0),
            iv: iv_percent / 100.0,
            oi_change,
        }
    }

    fn premium(&self, option_type: OptionType, spot: f64, strike: f64, iv: f64, time: f64) -> (f64, f64) {
        let PricingConfig {
            risk_free_rate,
            dividend_yield,
            ..
        } = self.pricing;
        let price = BlackScholes::price(option_type, spot, strike, risk_free_rate, iv, time, dividend_yield);
        let greeks = BlackScholes::greeks(option_type, spot, strike, risk_free_rate, iv, time, dividend_yield);
        (round2(price.max(0.05)), greeks.delta)
    }

    /// Synthetic OHLCV random walk, oldest first, ending on the symbol's
    /// reference spot. Daily bars skip weekends; intraday bars stay inside
    /// the 09:15-15:30 IST session.
    pub fn candles(
        &mut self,
        symbol: &str,
        interval: CandleInterval,
        days: u32,
        now: DateTime<Utc>,
    ) -> Vec<Candle> {
        let profile = UnderlyingProfile::for_symbol(symbol);
        let timestamps = session_timestamps(now, interval, days.clamp(1, MAX_HISTORY_DAYS));

        let step_volatility = if interval.is_intraday() {
            profile.daily_volatility * (f64::from(interval.minutes()) / f64::from(SESSION_MINUTES)).sqrt()
        } else {
            profile.daily_volatility
        };

        let mut price = profile.spot;
        let mut candles = Vec::with_capacity(timestamps.len());
        for (i, timestamp) in timestamps.into_iter().enumerate() {
            let volatility = step_volatility * (1.0 + 0.2 * (i as f64 / 10.0).sin());

            price *= 1.0 + self.normal(0.0, volatility);
            let open = price;
            let high = open * (1.0 + self.normal(0.0, volatility / 2.0).abs());
            let low = open * (1.0 - self.normal(0.0, volatility / 2.0).abs());
            let close = self.normal((high + low) / 2.0, (high - low) / 4.0).clamp(low, high);
            let volume = (self.normal(1_000_000.0, 500_000.0) * (1.0 + volatility * 10.0)).max(0.0);

            candles.push(Candle {
                timestamp,
                open,
                high,
                low,
                close,
                volume: volume.round(),
            });
            price = close;
        }

        // Anchor the walk on the reference spot
        if let Some(last_close) = candles.last().map(|c| c.close) {
            let scale = profile.spot / last_close;
            for candle in &mut candles {
                candle.open = round2(candle.open * scale);
                candle.high = round2(candle.high * scale);
                candle.low = round2(candle.low * scale);
                candle.close = round2(candle.close * scale);
            }
        }

        debug!(symbol, bars = candles.len(), "generated synthetic candles");
        candles
    }
}

struct SyntheticLeg {
    oi: f64,
    volume: f64,
    iv: f64,
    oi_change: f64,
}

/// Bar open times for the last `days` trading days, oldest first
fn session_timestamps(now: DateTime<Utc>, interval: CandleInterval, days: u32) -> Vec<DateTime<Utc>> {
    let offset = ist();
    let local = now.with_timezone(&offset);
    let mut day = Some(local.date_naive());
    if local.time() < session_time(SESSION_CLOSE) {
        day = day.and_then(|d| d.pred_opt());
    }

    let mut trading_days = Vec::with_capacity(days as usize);
    while trading_days.len() < days as usize {
        // Calendar exhausted
        let Some(current) = day else { break };
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            trading_days.push(current);
        }
        day = current.pred_opt();
    }
    trading_days.reverse();

    let to_utc = |date: NaiveDate, time: NaiveTime| {
        offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    };

    if !interval.is_intraday() {
        return trading_days
            .into_iter()
            .filter_map(|date| to_utc(date, session_time(SESSION_CLOSE)))
            .collect();
    }

    let bars_per_day = SESSION_MINUTES / interval.minutes();
    let open = session_time(SESSION_OPEN);
    trading_days
        .into_iter()
        .flat_map(|date| {
            (0..bars_per_day).filter_map(move |bar| {
                let time = open + Duration::minutes(i64::from(bar * interval.minutes()));
                to_utc(date, time)
            })
        })
        .collect()
}

/// Builds chains, candles and trend readings with live-then-synthetic policy
pub struct SnapshotBuilder {
    live: Option<Arc<dyn MarketDataSource>>,
    synthetic: Mutex<SyntheticMarket>,
    timeout: StdDuration,
}

impl SnapshotBuilder {
    pub fn new(synthetic: SyntheticMarket, timeout: StdDuration) -> Self {
        Self {
            live: None,
            synthetic: Mutex::new(synthetic),
            timeout,
        }
    }

    /// Attach a live source
    pub fn with_live_source(mut self, source: Arc<dyn MarketDataSource>) -> Self {
        info!(source = source.name(), "live market data source attached");
        self.live = Some(source);
        self
    }

    /// Builder wired from configuration; Kite credentials enable the live source
    pub fn from_config(config: &AnalyticsConfig) -> AnalyticsResult<Self> {
        let synthetic = match config.synthetic.seed {
            Some(seed) => SyntheticMarket::seeded(seed, config.synthetic.expiries, config.pricing.clone()),
            None => SyntheticMarket::from_entropy(config.synthetic.expiries, config.pricing.clone()),
        };
        let builder = Self::new(synthetic, config.live.timeout());

        match &config.zerodha {
            Some(settings) => {
                let source = ZerodhaSource::new(settings.clone(), config.pricing.clone())?;
                Ok(builder.with_live_source(Arc::new(source)))
            }
            None => {
                warn!("No Zerodha credentials provided. Using sample data.");
                Ok(builder)
            }
        }
    }

    pub fn has_live_source(&self) -> bool {
        self.live.is_some()
    }

    fn live_source(&self, use_live_source: bool) -> Option<&Arc<dyn MarketDataSource>> {
        self.live.as_ref().filter(|_| use_live_source)
    }

    async fn bounded<T>(&self, fetch: impl Future<Output = AnalyticsResult<T>>) -> AnalyticsResult<T> {
        tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| AnalyticsError::unavailable(format!("no response within {:?}", self.timeout)))?
    }

    /// Option chain for `symbol`; never fails
    pub async fn build_chain(&self, symbol: &str, use_live_source: bool) -> OptionChainSnapshot {
        let synthetic = || self.synthetic.lock().option_chain(symbol, Utc::now());

        let Some(source) = self.live_source(use_live_source) else {
            return synthetic();
        };

        let primary = self.bounded(async {
            let snapshot = source.fetch_chain(symbol).await?;
            if snapshot.is_empty() {
                return Err(AnalyticsError::unavailable(format!("{} returned an empty chain", source.name())));
            }
            info!(symbol, source = source.name(), rows = snapshot.rows.len(), "fetched live option chain");
            Ok(snapshot)
        });

        fetch_with_fallback("option chain", primary, synthetic).await
    }

    /// Historical candles for `symbol`; never fails
    pub async fn build_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        days: u32,
        use_live_source: bool,
    ) -> CandleSeries {
        let days = days.clamp(1, MAX_HISTORY_DAYS);
        let series = |candles, provenance| CandleSeries {
            symbol: symbol.to_ascii_uppercase(),
            interval,
            candles,
            provenance,
        };
        let synthetic = || {
            let candles = self.synthetic.lock().candles(symbol, interval, days, Utc::now());
            series(candles, Provenance::Synthetic)
        };

        let Some(source) = self.live_source(use_live_source) else {
            return synthetic();
        };

        let primary = self.bounded(async {
            let candles = source.fetch_candles(symbol, interval, days).await?;
            if candles.is_empty() {
                return Err(AnalyticsError::unavailable(format!("{} returned no candles", source.name())));
            }
            info!(symbol, source = source.name(), bars = candles.len(), "fetched live candles");
            Ok(series(candles, Provenance::Live))
        });

        fetch_with_fallback("candles", primary, synthetic).await
    }

    /// Daily trend reading over the last 30 sessions
    pub async fn build_trend(&self, symbol: &str, use_live_source: bool) -> TrendReading {
        let series = self
            .build_candles(symbol, CandleInterval::OneDay, 30, use_live_source)
            .await;

        match indicators::trend_reading(symbol, &series.candles) {
            Some(reading) => reading,
            None => {
                let candles = self.synthetic.lock().candles(symbol, CandleInterval::OneDay, 30, Utc::now());
                indicators::trend_reading(symbol, &candles).unwrap_or_else(|| flat_reading(symbol))
            }
        }
    }
}

/// Neutral reading at the reference spot
fn flat_reading(symbol: &str) -> TrendReading {
    TrendReading {
        symbol: symbol.to_ascii_uppercase(),
        current_price: UnderlyingProfile::for_symbol(symbol).spot,
        change: 0.0,
        change_percent: 0.0,
        trend: crate::types::TrendLabel::Neutral,
        rsi: 50.0,
        macd: 0.0,
        volume: 0.0,
        timestamp: Utc::now(),
    }
}
