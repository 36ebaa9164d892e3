use approx::assert_relative_eq;
use options_analytics::ideas::{MAX_IDEAS, enhance_ideas, generate_ideas};
use options_analytics::{OptionChainSnapshot, OptionContractRow, OptionType, TrendLabel};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rstest::*;

use crate::common::{NIFTY_SPOT, chain, nifty_strikes, reading, row};

/// NIFTY chain with PCR 1.35 and call OI build-up rising towards spot
#[fixture]
fn put_heavy_nifty() -> OptionChainSnapshot {
    let strikes = nifty_strikes();
    let per_strike_calls = 100_000.0 / strikes.len() as f64;
    let per_strike_puts = 135_000.0 / strikes.len() as f64;

    chain(
        strikes
            .into_iter()
            .map(|strike| {
                let mut r = row(strike, per_strike_calls, per_strike_puts);
                r.call_oi_change = 0.5 - (strike - NIFTY_SPOT).abs() / 10_000.0;
                r.put_oi_change = 0.1;
                r
            })
            .collect(),
    )
}

#[rstest]
fn high_pcr_triggers_bullish_pool_on_neutral_trend(put_heavy_nifty: OptionChainSnapshot) {
    let ideas = generate_ideas(&put_heavy_nifty, &reading(TrendLabel::Neutral, NIFTY_SPOT), 3);

    assert_eq!(ideas.len(), 3);
    assert!(ideas.iter().all(|i| i.option_type == OptionType::Call));
    assert!(ideas.iter().all(|i| i.rationale == "Bullish momentum with increasing Call OI"));
    // Highest build-up at spot, then the nearer strike below it on the tie
    assert_eq!(ideas[0].strike, 22_500.0);
    assert_eq!(ideas[1].strike, 22_450.0);
    assert_eq!(ideas[2].strike, 22_550.0);
}

#[rstest]
#[case(TrendLabel::Bullish)]
#[case(TrendLabel::Bearish)]
#[case(TrendLabel::Neutral)]
fn pools_run_in_order(#[case] trend: TrendLabel) {
    // PCR 0.5 keeps the bearish pool live for every trend
    let rows: Vec<OptionContractRow> = nifty_strikes()
        .into_iter()
        .map(|strike| {
            let mut r = row(strike, 2_000.0, 1_000.0);
            r.call_oi_change = 0.2;
            r.put_oi_change = 0.3;
            r
        })
        .collect();
    let snapshot = chain(rows);
    let ideas = generate_ideas(&snapshot, &reading(trend, NIFTY_SPOT), MAX_IDEAS);

    assert_eq!(ideas.len(), MAX_IDEAS);
    let first = ideas[0].option_type;
    match trend {
        TrendLabel::Bullish => assert_eq!(first, OptionType::Call),
        _ => assert!(ideas.iter().all(|i| i.option_type == OptionType::Put)),
    }
}

#[test]
fn idea_prices_follow_entry() {
    let mut r = row(22_500.0, 1_000.0, 1_000.0);
    r.call_last_price = 150.0;
    r.call_oi_change = 0.12;
    r.call_delta = 0.52;
    let ideas = generate_ideas(&chain(vec![r]), &reading(TrendLabel::Bullish, NIFTY_SPOT), 1);

    let idea = &ideas[0];
    assert_eq!(idea.symbol, "NIFTY");
    assert_relative_eq!(idea.entry, 150.0);
    assert_relative_eq!(idea.target, 195.0, epsilon = 1e-9);
    assert_relative_eq!(idea.stop_loss, 120.0, epsilon = 1e-9);
    assert_relative_eq!(idea.delta, 0.52);
    assert_relative_eq!(idea.oi_change_percent, 12.0, epsilon = 1e-9);
    assert!(idea.confidence.is_none());
}

#[test]
fn enhancement_keeps_selection() {
    let snapshot = chain(
        nifty_strikes()
            .into_iter()
            .map(|s| {
                let mut r = row(s, 1_000.0, 1_000.0);
                r.call_oi_change = 0.1;
                r
            })
            .collect(),
    );
    let ideas = generate_ideas(&snapshot, &reading(TrendLabel::Bullish, NIFTY_SPOT), 4);
    let enhanced = enhance_ideas(ideas.clone(), &mut StdRng::seed_from_u64(11));

    assert_eq!(enhanced.len(), ideas.len());
    for (plain, rich) in ideas.iter().zip(&enhanced) {
        assert_eq!(plain.strike, rich.strike);
        assert_eq!(plain.option_type, rich.option_type);
        assert_eq!(plain.entry, rich.entry);
        assert!((0.60..0.95).contains(&rich.confidence.unwrap()));
        assert_relative_eq!(rich.expected_return.unwrap(), 30.0, epsilon = 1e-9);
        assert_relative_eq!(rich.risk_reward_ratio.unwrap(), 1.5, epsilon = 1e-9);
    }

    let again = enhance_ideas(ideas, &mut StdRng::seed_from_u64(11));
    assert_eq!(again, enhanced);
}

fn arbitrary_case() -> impl Strategy<Value = (OptionChainSnapshot, TrendLabel, usize, f64)> {
    let rows = prop::collection::vec((0u32..41, 0u32..10_000, 0u32..10_000, -0.2f64..0.3, -0.2f64..0.3), 0..60);
    let trend = prop_oneof![
        Just(TrendLabel::Bullish),
        Just(TrendLabel::Bearish),
        Just(TrendLabel::Neutral)
    ];
    (rows, trend, 0usize..12, 21_000.0f64..24_000.0).prop_map(|(legs, trend, count, price)| {
        let rows = legs
            .into_iter()
            .map(|(i, call_oi, put_oi, call_change, put_change)| {
                let mut r = row(21_500.0 + 50.0 * f64::from(i), f64::from(call_oi), f64::from(put_oi));
                r.call_oi_change = call_change;
                r.put_oi_change = put_change;
                r
            })
            .collect();
        (chain(rows), trend, count, price)
    })
}

proptest! {
    #[test]
    fn ideas_bounded_by_count_and_price_band((snapshot, trend, count, price) in arbitrary_case()) {
        let ideas = generate_ideas(&snapshot, &reading(trend, price), count);

        prop_assert!(ideas.len() <= count.clamp(1, MAX_IDEAS));
        for idea in &ideas {
            prop_assert!((idea.strike - price).abs() / price <= 0.05);
        }
        for (i, a) in ideas.iter().enumerate() {
            for b in &ideas[i + 1..] {
                prop_assert!(!(a.option_type == b.option_type && a.strike == b.strike));
            }
        }
    }
}
