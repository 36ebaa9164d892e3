//! Kite Connect market data source
//!
//! Option chains are assembled from the NFO instrument dump and a batched
//! quote call. Kite quotes carry no Greeks, so implied volatility is backed
//! out of the last traded premium and delta is computed from it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use reqwest::{Client, header};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{PricingConfig, ZerodhaSettings};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::greeks::{BlackScholes, DAYS_PER_YEAR, days_to_expiry};
use crate::source::{MAX_HISTORY_DAYS, MarketDataSource, STRIKES_PER_SIDE, ist};
use crate::types::{
    Candle, CandleInterval, OptionChainSnapshot, OptionContractRow, OptionType, Provenance,
};

/// Row of the Kite instrument dump
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentInfo {
    pub instrument_token: u32,
    pub exchange_token: u32,
    pub tradingsymbol: String,
    pub name: String,
    pub last_price: f64,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub expiry: Option<NaiveDate>,
    pub strike: f64,
    pub tick_size: f64,
    pub lot_size: u32,
    pub instrument_type: String,
    pub segment: String,
    pub exchange: String,
}

impl InstrumentInfo {
    fn option_type(&self) -> Option<OptionType> {
        self.instrument_type.parse().ok()
    }

    fn quote_key(&self) -> String {
        format!("{}:{}", self.exchange, self.tradingsymbol)
    }
}

/// Kite response envelope
#[derive(Debug, Deserialize)]
struct KiteResponse<T> {
    status: String,
    data: Option<T>,
    message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct KiteQuote {
    last_price: f64,
    volume: f64,
    oi: f64,
    oi_day_low: f64,
}

#[derive(Debug, Deserialize)]
struct HistoricalData {
    candles: Vec<Vec<Value>>,
}

/// Index quote key and historical-data token for an underlying
fn index_instrument(symbol: &str) -> Option<(&'static str, u32)> {
    match symbol {
        "NIFTY" => Some(("NSE:NIFTY 50", 256265)),
        "BANKNIFTY" => Some(("NSE:NIFTY BANK", 260105)),
        "FINNIFTY" => Some(("NSE:NIFTY FIN SERVICE", 257801)),
        _ => None,
    }
}

/// Live source backed by the Kite Connect REST API
pub struct ZerodhaSource {
    client: Client,
    base_url: String,
    pricing: PricingConfig,
    /// NFO option contracts keyed by underlying name
    instruments: RwLock<FxHashMap<String, Vec<InstrumentInfo>>>,
}

impl ZerodhaSource {
    pub fn new(settings: ZerodhaSettings, pricing: PricingConfig) -> AnalyticsResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert("X-Kite-Version", header::HeaderValue::from_static("3"));
        let auth = format!("token {}:{}", settings.api_key, settings.access_token);
        let auth = header::HeaderValue::from_str(&auth).map_err(|e| AnalyticsError::Configuration {
            message: format!("invalid Kite credentials: {e}"),
        })?;
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            pricing,
            instruments: RwLock::new(FxHashMap::default()),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> AnalyticsResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response: KiteResponse<T> = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status == "success" {
            if let Some(data) = response.data {
                return Ok(data);
            }
        }
        Err(AnalyticsError::unavailable(format!(
            "Kite {path} failed: {}",
            response.message.unwrap_or(response.status)
        )))
    }

    /// Download and cache the NFO option contracts
    pub async fn load_instruments(&self) -> AnalyticsResult<usize> {
        let url = format!("{}/instruments/NFO", self.base_url);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut by_name: FxHashMap<String, Vec<InstrumentInfo>> = FxHashMap::default();
        let mut reader = csv::Reader::from_reader(body.as_bytes());
        for record in reader.deserialize::<InstrumentInfo>() {
            let instrument = record?;
            if instrument.option_type().is_some() && instrument.expiry.is_some() {
                by_name.entry(instrument.name.clone()).or_default().push(instrument);
            }
        }

        let count = by_name.values().map(Vec::len).sum();
        *self.instruments.write().await = by_name;
        info!(count, "Loaded Kite option instruments");
        Ok(count)
    }

    async fn contracts(&self, symbol: &str) -> AnalyticsResult<Vec<InstrumentInfo>> {
        if self.instruments.read().await.is_empty() {
            self.load_instruments().await?;
        }
        self.instruments
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| AnalyticsError::unavailable(format!("no NFO options listed for {symbol}")))
    }

    async fn quotes(&self, keys: &[String]) -> AnalyticsResult<FxHashMap<String, KiteQuote>> {
        let query: Vec<(&str, String)> = keys.iter().map(|k| ("i", k.clone())).collect();
        self.get("/quote", &query).await
    }

    /// Last traded price of the underlying index
    pub async fn spot_price(&self, symbol: &str) -> AnalyticsResult<f64> {
        let (key, _) = index_instrument(symbol)
            .ok_or_else(|| AnalyticsError::unavailable(format!("no index quote for {symbol}")))?;
        let quotes = self.quotes(&[key.to_string()]).await?;
        quotes
            .get(key)
            .map(|q| q.last_price)
            .filter(|price| *price > 0.0)
            .ok_or_else(|| AnalyticsError::unavailable(format!("no spot price for {symbol}")))
    }

    fn leg(&self, option_type: OptionType, spot: f64, strike: f64, time: f64, quote: &KiteQuote) -> Leg {
        let PricingConfig {
            risk_free_rate,
            dividend_yield,
            default_volatility,
        } = self.pricing;

        let iv = BlackScholes::implied_volatility(
            option_type,
            spot,
            strike,
            risk_free_rate,
            time,
            quote.last_price,
            dividend_yield,
        )
        .unwrap_or(default_volatility);
        let delta = BlackScholes::greeks(option_type, spot, strike, risk_free_rate, iv, time, dividend_yield).delta;
        let oi_change = if quote.oi_day_low > 0.0 {
            (quote.oi - quote.oi_day_low) / quote.oi_day_low
        } else {
            0.0
        };

        Leg {
            open_interest: quote.oi,
            oi_change,
            volume: quote.volume,
            implied_vol: iv,
            last_price: quote.last_price,
            delta,
        }
    }
}

#[derive(Debug, Default)]
struct Leg {
    open_interest: f64,
    oi_change: f64,
    volume: f64,
    implied_vol: f64,
    last_price: f64,
    delta: f64,
}

/// Nearest expiry still trading at `now`
fn front_expiry(contracts: &[InstrumentInfo], now: DateTime<Utc>) -> Option<NaiveDate> {
    contracts
        .iter()
        .filter_map(|c| c.expiry)
        .filter(|&expiry| days_to_expiry(expiry, now) > 0.0)
        .min()
}

/// The `2 * STRIKES_PER_SIDE + 1` strikes closest to spot, ascending
fn strikes_around(contracts: &[&InstrumentInfo], spot: f64) -> Vec<f64> {
    let mut strikes: Vec<f64> = contracts.iter().map(|c| c.strike).collect();
    strikes.sort_by(f64::total_cmp);
    strikes.dedup();
    strikes.sort_by(|a, b| (a - spot).abs().total_cmp(&(b - spot).abs()));
    strikes.truncate(2 * STRIKES_PER_SIDE + 1);
    strikes.sort_by(f64::total_cmp);
    strikes
}

/// Start of a historical window ending at `to` and covering `days` trading days.
/// Calendar days are padded to cover weekends and holidays.
fn history_start(to: DateTime<FixedOffset>, days: u32) -> AnalyticsResult<DateTime<FixedOffset>> {
    let days = days.clamp(1, MAX_HISTORY_DAYS);
    Duration::try_days(i64::from(days) * 7 / 5 + 2)
        .and_then(|span| to.checked_sub_signed(span))
        .ok_or_else(|| AnalyticsError::invalid_input(format!("history of {days} days ending {to} is out of range")))
}

fn parse_candle(raw: &[Value]) -> Option<Candle> {
    let timestamp = DateTime::parse_from_str(raw.first()?.as_str()?, "%Y-%m-%dT%H:%M:%S%z").ok()?;
    let number = |i: usize| raw.get(i).and_then(Value::as_f64);
    Some(Candle {
        timestamp: timestamp.with_timezone(&Utc),
        open: number(1)?,
        high: number(2)?,
        low: number(3)?,
        close: number(4)?,
        volume: number(5).unwrap_or(0.0),
    })
}

#[async_trait]
impl MarketDataSource for ZerodhaSource {
    fn name(&self) -> &str {
        "zerodha"
    }

    async fn fetch_chain(&self, symbol: &str) -> AnalyticsResult<OptionChainSnapshot> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let now = Utc::now();
        let spot = self.spot_price(&symbol).await?;
        let contracts = self.contracts(&symbol).await?;

        let expiry = front_expiry(&contracts, now)
            .ok_or_else(|| AnalyticsError::unavailable(format!("no live expiry for {symbol}")))?;
        let listed: Vec<&InstrumentInfo> = contracts.iter().filter(|c| c.expiry == Some(expiry)).collect();
        let strikes = strikes_around(&listed, spot);

        let wanted: Vec<&InstrumentInfo> = listed
            .iter()
            .copied()
            .filter(|c| strikes.iter().any(|s| (s - c.strike).abs() < f64::EPSILON))
            .collect();
        let keys: Vec<String> = wanted.iter().map(|c| c.quote_key()).collect();
        let quotes = self.quotes(&keys).await?;
        debug!(symbol = %symbol, %expiry, quotes = quotes.len(), "fetched option quotes");

        let time = days_to_expiry(expiry, now) / DAYS_PER_YEAR;
        let rows = strikes
            .iter()
            .map(|&strike| {
                let leg = |option_type: OptionType| {
                    wanted
                        .iter()
                        .find(|c| c.option_type() == Some(option_type) && (c.strike - strike).abs() < f64::EPSILON)
                        .and_then(|c| quotes.get(&c.quote_key()))
                        .map(|quote| self.leg(option_type, spot, strike, time, quote))
                        .unwrap_or_default()
                };
                let call = leg(OptionType::Call);
                let put = leg(OptionType::Put);

                OptionContractRow {
                    strike,
                    expiry,
                    call_open_interest: call.open_interest,
                    call_oi_change: call.oi_change,
                    call_volume: call.volume,
                    call_implied_vol: call.implied_vol,
                    call_last_price: call.last_price,
                    call_delta: call.delta,
                    put_open_interest: put.open_interest,
                    put_oi_change: put.oi_change,
                    put_volume: put.volume,
                    put_implied_vol: put.implied_vol,
                    put_last_price: put.last_price,
                    put_delta: put.delta,
                }
            })
            .collect::<Vec<_>>();

        let step = strikes
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold(f64::INFINITY, f64::min);
        let step = if step.is_finite() { step } else { 0.0 };

        Ok(OptionChainSnapshot::new(symbol, spot, step, rows, now, Provenance::Live))
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        days: u32,
    ) -> AnalyticsResult<Vec<Candle>> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let (_, token) = index_instrument(&symbol)
            .ok_or_else(|| AnalyticsError::unavailable(format!("no historical token for {symbol}")))?;

        let to = Utc::now().with_timezone(&ist());
        let from = history_start(to, days)?;
        let format = "%Y-%m-%d %H:%M:%S";
        let query = [
            ("from", from.format(format).to_string()),
            ("to", to.format(format).to_string()),
        ];

        let path = format!("/instruments/historical/{token}/{}", interval.kite_name());
        let data: HistoricalData = self.get(&path, &query).await?;

        let candles: Vec<Candle> = data.candles.iter().filter_map(|raw| parse_candle(raw)).collect();
        if candles.len() < data.candles.len() {
            warn!(
                symbol = %symbol,
                skipped = data.candles.len() - candles.len(),
                "Skipped malformed Kite candles"
            );
        }
        Ok(candles)
    }
}
