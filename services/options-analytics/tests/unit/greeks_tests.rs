use approx::{assert_abs_diff_eq, assert_relative_eq};
use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use options_analytics::config::PricingConfig;
use options_analytics::{AnalyticsError, BlackScholes, GreeksCalculator, GreeksRequest, OptionType};
use rstest::*;

use crate::common::{LOOSE_EPSILON, STANDARD_EPSILON, fixed_now};

/// spot, strike, rate, volatility, time, dividend
#[fixture]
fn nifty_weekly_params() -> (f64, f64, f64, f64, f64, f64) {
    (22_500.0, 22_500.0, 0.05, 0.15, 7.0 / 365.0, 0.01)
}

#[fixture]
fn calculator() -> GreeksCalculator {
    GreeksCalculator::new(PricingConfig::default())
}

fn request(strike: f64, expiry: &str, option_type: &str) -> GreeksRequest {
    GreeksRequest {
        symbol: "NIFTY".to_string(),
        strike,
        expiry: expiry.to_string(),
        option_type: option_type.to_string(),
        spot: None,
        volatility: None,
    }
}

#[rstest]
#[case(0.20, 7.0 / 365.0)]
#[case(0.10, 1.0 / 365.0)]
fn atm_delta_near_half_without_carry(#[case] vol: f64, #[case] time: f64) {
    let call = BlackScholes::greeks(OptionType::Call, 22_500.0, 22_500.0, 0.0, vol, time, 0.0);
    let put = BlackScholes::greeks(OptionType::Put, 22_500.0, 22_500.0, 0.0, vol, time, 0.0);

    assert_abs_diff_eq!(call.delta, 0.5, epsilon = 0.01);
    assert_abs_diff_eq!(put.delta, -0.5, epsilon = 0.01);
    assert_abs_diff_eq!(call.delta - put.delta, 1.0, epsilon = STANDARD_EPSILON);
    assert_relative_eq!(call.gamma, put.gamma);
    assert_relative_eq!(call.vega, put.vega);
}

#[rstest]
#[case(22_000.0)]
#[case(22_500.0)]
#[case(23_000.0)]
fn put_call_parity(nifty_weekly_params: (f64, f64, f64, f64, f64, f64), #[case] strike: f64) {
    let (spot, _, rate, vol, time, dividend) = nifty_weekly_params;
    let call = BlackScholes::price(OptionType::Call, spot, strike, rate, vol, time, dividend);
    let put = BlackScholes::price(OptionType::Put, spot, strike, rate, vol, time, dividend);

    let forward_gap = spot * (-dividend * time).exp() - strike * (-rate * time).exp();
    assert_abs_diff_eq!(call - put, forward_gap, epsilon = LOOSE_EPSILON);
}

#[rstest]
fn greeks_signs(nifty_weekly_params: (f64, f64, f64, f64, f64, f64)) {
    let (spot, strike, rate, vol, time, dividend) = nifty_weekly_params;
    let call = BlackScholes::greeks(OptionType::Call, spot, strike, rate, vol, time, dividend);
    let put = BlackScholes::greeks(OptionType::Put, spot, strike, rate, vol, time, dividend);

    assert!(call.gamma > 0.0);
    assert!(call.vega > 0.0);
    assert!(call.theta < 0.0);
    assert!(put.theta < 0.0);
    assert!(call.rho > 0.0);
    assert!(put.rho < 0.0);
}

#[rstest]
fn vega_is_per_vol_point(nifty_weekly_params: (f64, f64, f64, f64, f64, f64)) {
    let (spot, strike, rate, vol, time, dividend) = nifty_weekly_params;
    let greeks = BlackScholes::greeks(OptionType::Call, spot, strike, rate, vol, time, dividend);
    let up = BlackScholes::price(OptionType::Call, spot, strike, rate, vol + 0.005, time, dividend);
    let down = BlackScholes::price(OptionType::Call, spot, strike, rate, vol - 0.005, time, dividend);

    assert_relative_eq!(greeks.vega, up - down, max_relative = 1e-3);
}

#[rstest]
fn past_expiry_is_rejected(calculator: GreeksCalculator) {
    let result = calculator.calculate(&request(22_500.0, "31-Dec-2020", "CE"), fixed_now());
    assert_matches!(result, Err(AnalyticsError::InvalidExpiry { expiry }) if expiry == "31-Dec-2020");
}

#[rstest]
fn expired_after_close_on_expiry_day(calculator: GreeksCalculator) {
    // 16:30 IST on expiry day
    let now = Utc.with_ymd_and_hms(2026, 10, 22, 11, 0, 0).unwrap();
    let result = calculator.calculate(&request(22_500.0, "2026-10-22", "PE"), now);
    assert_matches!(result, Err(AnalyticsError::InvalidExpiry { .. }));
}

#[rstest]
#[case("2026/10/29")]
#[case("29 Oct 2026")]
#[case("")]
fn unparseable_expiry(calculator: GreeksCalculator, #[case] expiry: &str) {
    let result = calculator.calculate(&request(22_500.0, expiry, "CE"), fixed_now());
    assert_matches!(result, Err(AnalyticsError::InvalidDateFormat { .. }));
}

#[rstest]
fn bad_option_type(calculator: GreeksCalculator) {
    let result = calculator.calculate(&request(22_500.0, "29-Oct-2026", "FUT"), fixed_now());
    assert_matches!(result, Err(AnalyticsError::InvalidOptionType { token }) if token == "FUT");
}

#[rstest]
fn non_positive_strike(calculator: GreeksCalculator) {
    let result = calculator.calculate(&request(0.0, "29-Oct-2026", "CE"), fixed_now());
    assert_matches!(result, Err(AnalyticsError::InvalidInput { .. }));
}

#[rstest]
fn defaults_and_percentage_volatility(calculator: GreeksCalculator) {
    let result = calculator
        .calculate(&request(22_500.0, "29-Oct-2026", "call"), fixed_now())
        .unwrap();
    assert_eq!(result.option_type, OptionType::Call);
    assert_eq!(result.spot, 22_500.0);
    assert_relative_eq!(result.implied_volatility, 0.20);
    // Monday 06:00 UTC to Thursday-week 10:00 UTC
    assert_relative_eq!(result.days_to_expiry, 10.0 + 4.0 / 24.0, epsilon = 1e-9);
    assert!(result.price > 0.0);

    let mut percent = request(22_500.0, "29-Oct-2026", "CE");
    percent.volatility = Some(20.0);
    percent.spot = Some(22_500.0);
    let from_percent = calculator.calculate(&percent, fixed_now()).unwrap();
    assert_relative_eq!(from_percent.price, result.price, epsilon = 1e-9);
}
