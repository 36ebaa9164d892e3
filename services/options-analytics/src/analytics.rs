//! Chain analytics: put-call ratio, max pain, OI support and resistance
//!
//! Everything here is a pure function of an [`OptionChainSnapshot`]. Rows that
//! share a strike across expiries are aggregated per strike.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::types::{OptionChainSnapshot, OptionType, STRIKE_EPSILON};

/// Default number of support and resistance levels
pub const DEFAULT_LEVELS: usize = 3;
/// PCR above which sentiment reads bullish
pub const BULLISH_PCR: f64 = 1.2;
/// PCR below which sentiment reads bearish
pub const BEARISH_PCR: f64 = 0.8;
/// Max pain within this fraction of price counts as near spot
const NEAR_SPOT_FRACTION: f64 = 0.01;

/// Sentiment implied by the OI put-call ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcrSentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl PcrSentiment {
    pub fn from_pcr(pcr: f64) -> Self {
        if pcr > BULLISH_PCR {
            Self::Bullish
        } else if pcr < BEARISH_PCR {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }
}

/// Put-call ratios for a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcrMetrics {
    pub oi_pcr: f64,
    pub volume_pcr: f64,
    pub sentiment: PcrSentiment,
    pub interpretation: String,
}

/// Where max pain sits relative to the current price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxPainBias {
    /// Within 1% of the current price
    NearSpot,
    /// Above the current price, potential upward pressure
    Above,
    /// Below the current price, potential downward pressure
    Below,
}

/// One-shot summary of a chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainAnalysis {
    pub symbol: String,
    pub current_price: f64,
    /// Listed strike closest to the chain's spot
    pub atm_strike: Option<f64>,
    pub pcr: f64,
    pub max_pain: Option<f64>,
    pub supports: Vec<f64>,
    pub resistances: Vec<f64>,
    pub sentiment: PcrSentiment,
    pub max_pain_bias: Option<MaxPainBias>,
    pub timestamp: DateTime<Utc>,
}

/// Per-strike OI, all vectors the same length as `strikes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OiProfile {
    pub symbol: String,
    pub strikes: Vec<f64>,
    pub call_oi: Vec<f64>,
    pub put_oi: Vec<f64>,
    pub call_oi_change_percent: Vec<f64>,
    pub put_oi_change_percent: Vec<f64>,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Total put OI over total call OI; 0 when there is no call OI
pub fn put_call_ratio(snapshot: &OptionChainSnapshot) -> f64 {
    let (puts, calls) = snapshot
        .rows
        .iter()
        .fold((0.0, 0.0), |(p, c), row| (p + row.put_open_interest, c + row.call_open_interest));
    ratio(puts, calls)
}

/// Contrarian reading of a PCR value
pub fn interpret_pcr(pcr: f64) -> &'static str {
    match pcr {
        x if x > 1.5 => "Extremely Bullish (Contrarian: Bearish)",
        x if x > 1.2 => "Bullish",
        x if x > 0.8 => "Neutral",
        x if x > 0.5 => "Bearish",
        _ => "Extremely Bearish (Contrarian: Bullish)",
    }
}

/// OI and volume put-call ratios with their interpretation
pub fn pcr_metrics(snapshot: &OptionChainSnapshot) -> PcrMetrics {
    let oi_pcr = put_call_ratio(snapshot);
    let (put_volume, call_volume) = snapshot
        .rows
        .iter()
        .fold((0.0, 0.0), |(p, c), row| (p + row.put_volume, c + row.call_volume));

    PcrMetrics {
        oi_pcr,
        volume_pcr: ratio(put_volume, call_volume),
        sentiment: PcrSentiment::from_pcr(oi_pcr),
        interpretation: interpret_pcr(oi_pcr).to_string(),
    }
}

/// Aggregate writer payout if the underlying settles at `settlement`
pub fn pain_at(snapshot: &OptionChainSnapshot, settlement: f64) -> f64 {
    snapshot.rows.iter().fold(0.0, |pain, row| {
        if row.strike < settlement {
            pain + row.call_open_interest * (settlement - row.strike)
        } else if row.strike > settlement {
            pain + row.put_open_interest * (row.strike - settlement)
        } else {
            pain
        }
    })
}

/// Pain at every distinct strike, ascending by strike
pub fn pain_curve(snapshot: &OptionChainSnapshot) -> Vec<(f64, f64)> {
    snapshot
        .strikes()
        .into_iter()
        .map(|strike| (strike, pain_at(snapshot, strike)))
        .collect()
}

/// Strike minimising aggregate pain; the lowest such strike on ties.
/// `None` for an empty chain.
pub fn max_pain(snapshot: &OptionChainSnapshot) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for (strike, pain) in pain_curve(snapshot) {
        match best {
            Some((_, lowest)) if pain >= lowest => {}
            _ => best = Some((strike, pain)),
        }
    }
    best.map(|(strike, _)| strike)
}

/// Per-strike sums of one side's OI and OI change
fn per_strike(snapshot: &OptionChainSnapshot, side: OptionType) -> Vec<(f64, f64, f64)> {
    let mut totals: Vec<(f64, f64, f64)> = Vec::new();
    for row in &snapshot.rows {
        let oi = row.open_interest(side);
        let change = row.oi_change(side);
        match totals
            .iter_mut()
            .find(|(strike, _, _)| (strike - row.strike).abs() < STRIKE_EPSILON)
        {
            Some(entry) => {
                entry.1 += oi;
                entry.2 += change;
            }
            None => totals.push((row.strike, oi, change)),
        }
    }
    totals.sort_by(|a, b| a.0.total_cmp(&b.0));
    totals
}

fn top_strikes(snapshot: &OptionChainSnapshot, side: OptionType, k: usize) -> Vec<f64> {
    let mut levels: Vec<(f64, f64)> = per_strike(snapshot, side)
        .into_iter()
        .map(|(strike, oi, _)| (strike, oi))
        .collect();
    levels.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.total_cmp(&b.0),
        other => other,
    });
    levels.into_iter().take(k).map(|(strike, _)| strike).collect()
}

/// The `k` highest put-OI strikes (supports) and call-OI strikes
/// (resistances), by descending OI with ties going to the lower strike
pub fn support_resistance(snapshot: &OptionChainSnapshot, k: usize) -> (Vec<f64>, Vec<f64>) {
    (
        top_strikes(snapshot, OptionType::Put, k),
        top_strikes(snapshot, OptionType::Call, k),
    )
}

/// Per-strike OI heat-map data
pub fn oi_profile(snapshot: &OptionChainSnapshot) -> OiProfile {
    let calls = per_strike(snapshot, OptionType::Call);
    let puts = per_strike(snapshot, OptionType::Put);

    OiProfile {
        symbol: snapshot.symbol.clone(),
        strikes: calls.iter().map(|c| c.0).collect(),
        call_oi: calls.iter().map(|c| c.1).collect(),
        put_oi: puts.iter().map(|p| p.1).collect(),
        call_oi_change_percent: calls.iter().map(|c| c.2 * 100.0).collect(),
        put_oi_change_percent: puts.iter().map(|p| p.2 * 100.0).collect(),
    }
}

fn max_pain_bias(max_pain: f64, current_price: f64) -> MaxPainBias {
    if current_price > 0.0 && (max_pain - current_price).abs() / current_price < NEAR_SPOT_FRACTION {
        MaxPainBias::NearSpot
    } else if max_pain > current_price {
        MaxPainBias::Above
    } else {
        MaxPainBias::Below
    }
}

/// Full chain summary at `current_price`
pub fn analyze_chain(snapshot: &OptionChainSnapshot, current_price: f64) -> ChainAnalysis {
    let pcr = put_call_ratio(snapshot);
    let max_pain = max_pain(snapshot);
    let (supports, resistances) = support_resistance(snapshot, DEFAULT_LEVELS);

    ChainAnalysis {
        symbol: snapshot.symbol.clone(),
        current_price,
        atm_strike: snapshot.atm_strike(),
        pcr,
        max_pain,
        supports,
        resistances,
        sentiment: PcrSentiment::from_pcr(pcr),
        max_pain_bias: max_pain.map(|strike| max_pain_bias(strike, current_price)),
        timestamp: snapshot.timestamp,
    }
}
