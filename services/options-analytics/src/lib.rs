//! ShrivenQuant Options Analytics
//!
//! Option chain analytics for Indian index options:
//! - Option chain snapshots from Kite Connect, with a seeded synthetic fallback
//! - Put-call ratio, max pain and OI support/resistance
//! - Black-Scholes pricing, Greeks and implied volatility
//! - RSI/MACD trend readings and strength classification
//! - Heuristic trade ideas with entry, target and stop loss
//!
//! Implied volatility is a fraction (0.20 = 20%) throughout the crate.

pub mod analytics;
pub mod config;
pub mod error;
pub mod greeks;
pub mod ideas;
pub mod indicators;
pub mod source;
pub mod trend;
pub mod types;
pub mod zerodha;

pub use analytics::{
    ChainAnalysis, MaxPainBias, OiProfile, PcrMetrics, PcrSentiment, analyze_chain, max_pain, oi_profile,
    pain_curve, pcr_metrics, put_call_ratio, support_resistance,
};
pub use config::AnalyticsConfig;
pub use error::{AnalyticsError, AnalyticsResult};
pub use greeks::{BlackScholes, Greeks, GreeksCalculator, GreeksRequest};
pub use ideas::{enhance_ideas, generate_ideas};
pub use source::{
    CandleSeries, MarketDataSource, SnapshotBuilder, SyntheticMarket, UnderlyingProfile, fetch_with_fallback,
};
pub use trend::{TrendAssessment, TrendStrength, classify_trend};
pub use types::{
    Candle, CandleInterval, OptionChainSnapshot, OptionContractRow, OptionGreeksResult, OptionType, Provenance,
    TradeIdea, TrendLabel, TrendReading,
};
pub use zerodha::ZerodhaSource;
