//! Data model shared by the analytics components
//!
//! Every value here is built, consumed and dropped within a single analytics
//! request. Implied volatility is always a fraction (0.20 = 20%).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalyticsError;

/// Strikes closer than this are the same strike
pub const STRIKE_EPSILON: f64 = 1e-6;

/// Option type for derivatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    /// Call option - right to buy the underlying at strike price
    Call,
    /// Put option - right to sell the underlying at strike price
    Put,
}

impl OptionType {
    /// NSE contract suffix
    pub fn suffix(&self) -> &'static str {
        match self {
            OptionType::Call => "CE",
            OptionType::Put => "PE",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for OptionType {
    type Err = AnalyticsError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_uppercase().as_str() {
            "CE" | "CALL" | "C" => Ok(OptionType::Call),
            "PE" | "PUT" | "P" => Ok(OptionType::Put),
            _ => Err(AnalyticsError::InvalidOptionType {
                token: token.to_string(),
            }),
        }
    }
}

/// Where a snapshot or candle series came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Fetched from the configured market data source
    Live,
    /// Produced by the seeded fixture generator
    Synthetic,
}

/// One strike/expiry pair of an option chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContractRow {
    /// Strike price
    pub strike: f64,
    /// Expiry date
    pub expiry: NaiveDate,
    /// Call open interest
    pub call_open_interest: f64,
    /// Call open interest change over the session, as a fraction
    pub call_oi_change: f64,
    /// Call traded volume
    pub call_volume: f64,
    /// Call implied volatility (fraction)
    pub call_implied_vol: f64,
    /// Call last traded premium
    pub call_last_price: f64,
    /// Call delta
    pub call_delta: f64,
    /// Put open interest
    pub put_open_interest: f64,
    /// Put open interest change over the session, as a fraction
    pub put_oi_change: f64,
    /// Put traded volume
    pub put_volume: f64,
    /// Put implied volatility (fraction)
    pub put_implied_vol: f64,
    /// Put last traded premium
    pub put_last_price: f64,
    /// Put delta
    pub put_delta: f64,
}

impl OptionContractRow {
    /// Open interest on one side of the row
    pub fn open_interest(&self, side: OptionType) -> f64 {
        match side {
            OptionType::Call => self.call_open_interest,
            OptionType::Put => self.put_open_interest,
        }
    }

    /// Session OI change on one side of the row (fraction)
    pub fn oi_change(&self, side: OptionType) -> f64 {
        match side {
            OptionType::Call => self.call_oi_change,
            OptionType::Put => self.put_oi_change,
        }
    }

    /// Last traded premium on one side of the row
    pub fn last_price(&self, side: OptionType) -> f64 {
        match side {
            OptionType::Call => self.call_last_price,
            OptionType::Put => self.put_last_price,
        }
    }

    /// Delta on one side of the row
    pub fn delta(&self, side: OptionType) -> f64 {
        match side {
            OptionType::Call => self.call_delta,
            OptionType::Put => self.put_delta,
        }
    }
}

/// Option chain for one underlying at one point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChainSnapshot {
    /// Underlying symbol, upper case
    pub symbol: String,
    /// Underlying price the chain was built around
    pub spot_price: f64,
    /// Distance between adjacent strikes
    pub strike_step: f64,
    /// Rows ordered by expiry, then strike ascending
    pub rows: Vec<OptionContractRow>,
    /// When the chain was retrieved
    pub timestamp: DateTime<Utc>,
    /// Live or synthetic
    pub provenance: Provenance,
}

impl OptionChainSnapshot {
    /// Build a snapshot, ordering rows by expiry then strike
    pub fn new(
        symbol: impl Into<String>,
        spot_price: f64,
        strike_step: f64,
        mut rows: Vec<OptionContractRow>,
        timestamp: DateTime<Utc>,
        provenance: Provenance,
    ) -> Self {
        rows.sort_by(|a, b| {
            a.expiry
                .cmp(&b.expiry)
                .then_with(|| a.strike.total_cmp(&b.strike))
        });
        Self {
            symbol: symbol.into().to_ascii_uppercase(),
            spot_price,
            strike_step,
            rows,
            timestamp,
            provenance,
        }
    }

    /// True when the chain holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct strikes, ascending
    pub fn strikes(&self) -> Vec<f64> {
        let mut strikes: Vec<f64> = self.rows.iter().map(|r| r.strike).collect();
        strikes.sort_by(f64::total_cmp);
        strikes.dedup_by(|a, b| (*a - *b).abs() < STRIKE_EPSILON);
        strikes
    }

    /// Distinct expiries, ascending
    pub fn expiries(&self) -> Vec<NaiveDate> {
        let mut expiries: Vec<NaiveDate> = self.rows.iter().map(|r| r.expiry).collect();
        expiries.sort();
        expiries.dedup();
        expiries
    }

    /// Earliest expiry in the chain
    pub fn nearest_expiry(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.expiry).min()
    }

    /// Rows of a single expiry, strike ascending
    pub fn for_expiry(&self, expiry: NaiveDate) -> Vec<&OptionContractRow> {
        self.rows.iter().filter(|r| r.expiry == expiry).collect()
    }

    /// Rows of the nearest expiry
    pub fn front_month(&self) -> Vec<&OptionContractRow> {
        self.nearest_expiry()
            .map(|expiry| self.for_expiry(expiry))
            .unwrap_or_default()
    }

    /// Row for a strike in the nearest expiry
    pub fn row_at(&self, strike: f64) -> Option<&OptionContractRow> {
        let expiry = self.nearest_expiry()?;
        self.rows
            .iter()
            .find(|r| r.expiry == expiry && (r.strike - strike).abs() < STRIKE_EPSILON)
    }

    /// Strike closest to spot, lower strike on a tie
    pub fn atm_strike(&self) -> Option<f64> {
        self.strikes().into_iter().min_by(|a, b| {
            (a - self.spot_price)
                .abs()
                .total_cmp(&(b - self.spot_price).abs())
        })
    }
}

/// Coarse directional label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    /// Price rising
    Bullish,
    /// Price falling
    Bearish,
    /// No clear direction
    Neutral,
}

/// Snapshot of price action and momentum for an underlying
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReading {
    pub symbol: String,
    pub current_price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub trend: TrendLabel,
    pub rsi: f64,
    pub macd: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

/// An actionable option trade suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIdea {
    pub symbol: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub entry: f64,
    pub target: f64,
    pub stop_loss: f64,
    pub delta: f64,
    /// Session OI change in percent
    pub oi_change_percent: f64,
    pub rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Percent return if the target is hit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_return: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_reward_ratio: Option<f64>,
}

/// Black-Scholes valuation of a single contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionGreeksResult {
    pub symbol: String,
    pub strike: f64,
    pub expiry: NaiveDate,
    pub option_type: OptionType,
    pub spot: f64,
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    /// Daily time decay
    pub theta: f64,
    /// Price change per 1 vol point
    pub vega: f64,
    /// Price change per 1% rate change
    pub rho: f64,
    /// Volatility used, as a fraction
    pub implied_volatility: f64,
    pub days_to_expiry: f64,
}

/// One OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bar interval for historical data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleInterval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    OneDay,
}

impl CandleInterval {
    /// Bar length in minutes
    pub fn minutes(&self) -> u32 {
        match self {
            CandleInterval::OneMinute => 1,
            CandleInterval::FiveMinutes => 5,
            CandleInterval::FifteenMinutes => 15,
            CandleInterval::ThirtyMinutes => 30,
            CandleInterval::OneHour => 60,
            CandleInterval::OneDay => 24 * 60,
        }
    }

    /// Interval name used by Kite historical API
    pub fn kite_name(&self) -> &'static str {
        match self {
            CandleInterval::OneMinute => "minute",
            CandleInterval::FiveMinutes => "5minute",
            CandleInterval::FifteenMinutes => "15minute",
            CandleInterval::ThirtyMinutes => "30minute",
            CandleInterval::OneHour => "60minute",
            CandleInterval::OneDay => "day",
        }
    }

    pub fn is_intraday(&self) -> bool {
        !matches!(self, CandleInterval::OneDay)
    }
}

impl FromStr for CandleInterval {
    type Err = AnalyticsError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim() {
            "1m" => Ok(CandleInterval::OneMinute),
            "5m" => Ok(CandleInterval::FiveMinutes),
            "15m" => Ok(CandleInterval::FifteenMinutes),
            "30m" => Ok(CandleInterval::ThirtyMinutes),
            "1h" => Ok(CandleInterval::OneHour),
            "1d" => Ok(CandleInterval::OneDay),
            other => Err(AnalyticsError::invalid_input(format!(
                "unknown interval '{other}', expected one of 1m, 5m, 15m, 30m, 1h, 1d"
            ))),
        }
    }
}
