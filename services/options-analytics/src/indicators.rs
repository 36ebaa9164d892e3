//! Momentum indicators and trend readings derived from candles

use tracing::debug;

use crate::types::{Candle, TrendLabel, TrendReading};

/// RSI lookback
pub const RSI_PERIOD: usize = 14;
/// MACD fast EMA period
pub const MACD_FAST: usize = 12;
/// MACD slow EMA period
pub const MACD_SLOW: usize = 26;
/// Absolute percentage move separating a directional label from neutral
pub const TREND_THRESHOLD_PERCENT: f64 = 0.2;

/// Relative strength index over the last `period` changes.
/// Returns 50 when there is not enough history.
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 50.0;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;

    for i in (prices.len() - period)..prices.len() {
        let change = prices[i] - prices[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses += change.abs();
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    }
}

/// Exponential moving average seeded with the first price
pub fn ema(prices: &[f64], period: usize) -> f64 {
    let Some((&first, rest)) = prices.split_first() else {
        return 0.0;
    };

    let multiplier = 2.0 / (period as f64 + 1.0);
    rest.iter()
        .fold(first, |ema, price| (price - ema) * multiplier + ema)
}

/// MACD line: fast EMA minus slow EMA
pub fn macd(prices: &[f64]) -> f64 {
    ema(prices, MACD_FAST) - ema(prices, MACD_SLOW)
}

/// Label a percentage move
pub fn classify_change(change_percent: f64) -> TrendLabel {
    if change_percent > TREND_THRESHOLD_PERCENT {
        TrendLabel::Bullish
    } else if change_percent < -TREND_THRESHOLD_PERCENT {
        TrendLabel::Bearish
    } else {
        TrendLabel::Neutral
    }
}

/// Build a trend reading from chronologically ordered candles.
///
/// The change is measured against the previous close, or against the open
/// when only one candle is available. `None` for an empty series.
pub fn trend_reading(symbol: &str, candles: &[Candle]) -> Option<TrendReading> {
    let last = candles.last()?;
    let reference = match candles.len() {
        1 => last.open,
        n => candles[n - 2].close,
    };

    let change = last.close - reference;
    let change_percent = if reference > 0.0 {
        change / reference * 100.0
    } else {
        0.0
    };

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let reading = TrendReading {
        symbol: symbol.to_ascii_uppercase(),
        current_price: last.close,
        change,
        change_percent,
        trend: classify_change(change_percent),
        rsi: rsi(&closes, RSI_PERIOD),
        macd: macd(&closes),
        volume: last.volume,
        timestamp: last.timestamp,
    };

    debug!(
        symbol = %reading.symbol,
        price = reading.current_price,
        change_percent = reading.change_percent,
        rsi = reading.rsi,
        "trend reading"
    );
    Some(reading)
}
