//! Shared fixtures and helpers for the options analytics test suites

#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use options_analytics::{OptionChainSnapshot, OptionContractRow, Provenance, TrendLabel, TrendReading};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize test logging once
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("options_analytics=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const NIFTY_SPOT: f64 = 22_500.0;
pub const NIFTY_STEP: f64 = 50.0;

/// Tolerances
pub const STANDARD_EPSILON: f64 = 1e-8;
pub const LOOSE_EPSILON: f64 = 1e-4;

/// Fixed evaluation instant: Monday 2026-10-19 11:30 IST
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap()
}

pub fn front_expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 22).unwrap()
}

/// Row with the given OI and neutral everything else
pub fn row(strike: f64, call_oi: f64, put_oi: f64) -> OptionContractRow {
    OptionContractRow {
        strike,
        expiry: front_expiry(),
        call_open_interest: call_oi,
        call_oi_change: 0.0,
        call_volume: 0.0,
        call_implied_vol: 0.2,
        call_last_price: 100.0,
        call_delta: 0.5,
        put_open_interest: put_oi,
        put_oi_change: 0.0,
        put_volume: 0.0,
        put_implied_vol: 0.2,
        put_last_price: 100.0,
        put_delta: -0.5,
    }
}

pub fn chain(rows: Vec<OptionContractRow>) -> OptionChainSnapshot {
    OptionChainSnapshot::new("NIFTY", NIFTY_SPOT, NIFTY_STEP, rows, fixed_now(), Provenance::Synthetic)
}

/// 21 NIFTY strikes centred on spot
pub fn nifty_strikes() -> Vec<f64> {
    (0..21).map(|i| NIFTY_SPOT + (i as f64 - 10.0) * NIFTY_STEP).collect()
}

/// NIFTY chain with the same call and put OI at every strike
pub fn flat_chain(oi: f64) -> OptionChainSnapshot {
    chain(nifty_strikes().into_iter().map(|s| row(s, oi, oi)).collect())
}

pub fn reading(trend: TrendLabel, price: f64) -> TrendReading {
    TrendReading {
        symbol: "NIFTY".to_string(),
        current_price: price,
        change: 0.0,
        change_percent: 0.0,
        trend,
        rsi: 50.0,
        macd: 0.0,
        volume: 0.0,
        timestamp: fixed_now() - Duration::minutes(5),
    }
}

/// Pain at `settlement` straight from the definition
pub fn brute_force_pain(snapshot: &OptionChainSnapshot, settlement: f64) -> f64 {
    let mut pain = 0.0;
    for row in &snapshot.rows {
        if row.strike < settlement {
            pain += row.call_open_interest * (settlement - row.strike);
        }
        if row.strike > settlement {
            pain += row.put_open_interest * (row.strike - settlement);
        }
    }
    pain
}
