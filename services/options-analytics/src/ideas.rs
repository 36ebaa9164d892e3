//! Trade idea generation
//!
//! Candidate pools are walked in a fixed order (bullish, bearish, support
//! backfill, resistance backfill) until the requested number of ideas is
//! collected. Pools are built on the front-month expiry.

use rand::Rng;
use tracing::debug;

use crate::analytics::{self, BEARISH_PCR, BULLISH_PCR, DEFAULT_LEVELS};
use crate::types::{OptionChainSnapshot, OptionContractRow, OptionType, TradeIdea, TrendLabel, TrendReading};

/// Hard cap on ideas per request
pub const MAX_IDEAS: usize = 5;
/// Ideas returned when the caller does not ask for a count
pub const DEFAULT_IDEAS: usize = 3;
/// Momentum candidates must sit within this fraction of the current price
pub const MOMENTUM_BAND: f64 = 0.05;
/// Profit target as a multiple of entry
pub const TARGET_MULTIPLIER: f64 = 1.3;
/// Stop loss as a multiple of entry
pub const STOP_MULTIPLIER: f64 = 0.8;

const CONFIDENCE_RANGE: std::ops::Range<f64> = 0.60..0.95;

fn idea(symbol: &str, row: &OptionContractRow, option_type: OptionType, rationale: &str) -> TradeIdea {
    let entry = row.last_price(option_type);
    TradeIdea {
        symbol: symbol.to_string(),
        option_type,
        strike: row.strike,
        entry,
        target: entry * TARGET_MULTIPLIER,
        stop_loss: entry * STOP_MULTIPLIER,
        delta: row.delta(option_type),
        oi_change_percent: row.oi_change(option_type) * 100.0,
        rationale: rationale.to_string(),
        confidence: None,
        expected_return: None,
        risk_reward_ratio: None,
    }
}

/// Accumulates ideas up to a count, skipping repeated contracts
struct Selection {
    ideas: Vec<TradeIdea>,
    count: usize,
}

impl Selection {
    fn is_full(&self) -> bool {
        self.ideas.len() >= self.count
    }

    fn push(&mut self, idea: TradeIdea) {
        let repeated = self
            .ideas
            .iter()
            .any(|i| i.option_type == idea.option_type && i.strike == idea.strike);
        if !repeated && !self.is_full() {
            self.ideas.push(idea);
        }
    }
}

/// Rows with the highest OI build-up on one side, near the current price
fn momentum_pool<'a>(
    rows: &[&'a OptionContractRow],
    side: OptionType,
    current_price: f64,
) -> Vec<&'a OptionContractRow> {
    let mut pool: Vec<&OptionContractRow> = rows
        .iter()
        .copied()
        .filter(|row| (row.strike - current_price).abs() / current_price <= MOMENTUM_BAND)
        .collect();
    // Stable, so equal OI changes keep strike order
    pool.sort_by(|a, b| b.oi_change(side).total_cmp(&a.oi_change(side)));
    pool
}

/// Up to `count` (clamped to 1..=5) trade ideas for a chain and trend.
/// Empty when no pool yields a candidate.
pub fn generate_ideas(snapshot: &OptionChainSnapshot, trend: &TrendReading, count: usize) -> Vec<TradeIdea> {
    let count = count.clamp(1, MAX_IDEAS);
    let current_price = trend.current_price;
    if !current_price.is_finite() || current_price <= 0.0 {
        return Vec::new();
    }

    let symbol = snapshot.symbol.as_str();
    let pcr = analytics::put_call_ratio(snapshot);
    let rows = snapshot.front_month();
    let mut selection = Selection {
        ideas: Vec::with_capacity(count),
        count,
    };

    if trend.trend == TrendLabel::Bullish || pcr > BULLISH_PCR {
        debug!(symbol, pcr, "bullish pool triggered");
        for row in momentum_pool(&rows, OptionType::Call, current_price) {
            if selection.is_full() {
                break;
            }
            selection.push(idea(symbol, row, OptionType::Call, "Bullish momentum with increasing Call OI"));
        }
    }

    if !selection.is_full() && (trend.trend == TrendLabel::Bearish || pcr < BEARISH_PCR) {
        debug!(symbol, pcr, "bearish pool triggered");
        for row in momentum_pool(&rows, OptionType::Put, current_price) {
            if selection.is_full() {
                break;
            }
            selection.push(idea(symbol, row, OptionType::Put, "Bearish momentum with increasing Put OI"));
        }
    }

    if !selection.is_full() {
        let (supports, resistances) = analytics::support_resistance(snapshot, DEFAULT_LEVELS);

        let near_supports = supports
            .into_iter()
            .filter(|&s| s < current_price && s > current_price * (1.0 - MOMENTUM_BAND));
        for support in near_supports {
            if selection.is_full() {
                break;
            }
            if let Some(row) = snapshot.row_at(support) {
                selection.push(idea(symbol, row, OptionType::Call, "Support level with potential bounce"));
            }
        }

        let near_resistances = resistances
            .into_iter()
            .filter(|&r| r > current_price && r < current_price * (1.0 + MOMENTUM_BAND));
        for resistance in near_resistances {
            if selection.is_full() {
                break;
            }
            if let Some(row) = snapshot.row_at(resistance) {
                selection.push(idea(symbol, row, OptionType::Put, "Resistance level with potential reversal"));
            }
        }
    }

    debug!(symbol, ideas = selection.ideas.len(), count, "trade ideas selected");
    selection.ideas.truncate(count);
    selection.ideas
}

/// Attach confidence, expected return and risk-reward to each idea.
/// Contracts, prices and order are left as they are.
pub fn enhance_ideas<R: Rng>(ideas: Vec<TradeIdea>, rng: &mut R) -> Vec<TradeIdea> {
    ideas
        .into_iter()
        .map(|mut idea| {
            let (expected_return, risk) = if idea.entry > 0.0 {
                (
                    (idea.target - idea.entry) / idea.entry * 100.0,
                    (idea.entry - idea.stop_loss) / idea.entry * 100.0,
                )
            } else {
                (0.0, 0.0)
            };

            idea.confidence = Some(rng.gen_range(CONFIDENCE_RANGE));
            idea.expected_return = Some(expected_return);
            idea.risk_reward_ratio = Some(if risk > 0.0 { expected_return / risk } else { 0.0 });
            idea
        })
        .collect()
}
