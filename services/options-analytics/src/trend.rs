//! Trend strength classification

use serde::{Deserialize, Serialize};

use crate::types::{TrendLabel, TrendReading};

/// RSI above which a bullish trend is flagged overbought
pub const OVERBOUGHT_RSI: f64 = 70.0;
/// RSI below which a bearish trend is flagged oversold
pub const OVERSOLD_RSI: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStrength {
    Overbought,
    Oversold,
    Strong,
    Neutral,
}

/// Classified reading with its advisory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAssessment {
    #[serde(flatten)]
    pub reading: TrendReading,
    pub strength: TrendStrength,
    pub recommendation: String,
}

/// Strength qualifier for a label and RSI
pub fn trend_strength(trend: TrendLabel, rsi: f64) -> TrendStrength {
    match trend {
        TrendLabel::Bullish if rsi > OVERBOUGHT_RSI => TrendStrength::Overbought,
        TrendLabel::Bullish => TrendStrength::Strong,
        TrendLabel::Bearish if rsi < OVERSOLD_RSI => TrendStrength::Oversold,
        TrendLabel::Bearish => TrendStrength::Strong,
        TrendLabel::Neutral => TrendStrength::Neutral,
    }
}

/// Advisory text; overbought and oversold override the direction
pub fn recommendation(trend: TrendLabel, strength: TrendStrength) -> &'static str {
    match (strength, trend) {
        (TrendStrength::Overbought, _) => "Caution: Market may be overbought",
        (TrendStrength::Oversold, _) => "Caution: Market may be oversold",
        (_, TrendLabel::Bullish) => "Consider bullish strategies",
        (_, TrendLabel::Bearish) => "Consider bearish strategies",
        (_, TrendLabel::Neutral) => "Consider neutral strategies",
    }
}

pub fn classify_trend(reading: TrendReading) -> TrendAssessment {
    let strength = trend_strength(reading.trend, reading.rsi);
    TrendAssessment {
        recommendation: recommendation(reading.trend, strength).to_string(),
        strength,
        reading,
    }
}
