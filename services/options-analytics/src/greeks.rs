//! Black-Scholes pricing and Greeks with continuous dividend yield
//!
//! Volatility is a fraction throughout. Time is in years (days / 365).
//! Theta is reported per calendar day, vega per 1 vol point and rho per 1%
//! change in the risk-free rate.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PricingConfig;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::source::UnderlyingProfile;
use crate::types::{OptionGreeksResult, OptionType};

const SQRT_2PI: f64 = 2.5066282746310007;

/// Calendar days per year used to annualise time to expiry
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Accepted expiry formats, tried in order
const EXPIRY_FORMATS: [&str; 2] = ["%d-%b-%Y", "%Y-%m-%d"];

/// Index options settle at 15:30 IST, which is 10:00 UTC
const SETTLEMENT_HOUR_UTC: u32 = 10;

/// First-order Greeks
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    /// Rate of change of option price with respect to underlying price
    pub delta: f64,
    /// Rate of change of delta with respect to underlying price
    pub gamma: f64,
    /// Daily time decay
    pub theta: f64,
    /// Price change for a 1 vol point move
    pub vega: f64,
    /// Price change for a 1% rate move
    pub rho: f64,
}

/// Black-Scholes option pricing model implementation
#[derive(Debug)]
pub struct BlackScholes;

impl BlackScholes {
    /// Standard normal cumulative distribution function
    pub fn norm_cdf(x: f64) -> f64 {
        0.5 * (1.0 + libm::erf(x / std::f64::consts::SQRT_2))
    }

    /// Standard normal probability density function
    pub fn norm_pdf(x: f64) -> f64 {
        (-0.5 * x * x).exp() / SQRT_2PI
    }

    /// Calculate d1 parameter
    pub fn d1(s: f64, k: f64, r: f64, q: f64, sigma: f64, t: f64) -> f64 {
        ((s / k).ln() + (r - q + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt())
    }

    /// Calculate d2 parameter
    pub fn d2(s: f64, k: f64, r: f64, q: f64, sigma: f64, t: f64) -> f64 {
        Self::d1(s, k, r, q, sigma, t) - sigma * t.sqrt()
    }

    /// Black-Scholes option price; intrinsic value once time has run out
    pub fn price(
        option_type: OptionType,
        spot: f64,
        strike: f64,
        rate: f64,
        volatility: f64,
        time: f64,
        dividend: f64,
    ) -> f64 {
        if time <= 0.0 {
            return match option_type {
                OptionType::Call => (spot - strike).max(0.0),
                OptionType::Put => (strike - spot).max(0.0),
            };
        }

        let carry = (-dividend * time).exp();
        let discount = (-rate * time).exp();
        let d1 = Self::d1(spot, strike, rate, dividend, volatility, time);
        let d2 = d1 - volatility * time.sqrt();

        match option_type {
            OptionType::Call => {
                spot * carry * Self::norm_cdf(d1) - strike * discount * Self::norm_cdf(d2)
            }
            OptionType::Put => {
                strike * discount * Self::norm_cdf(-d2) - spot * carry * Self::norm_cdf(-d1)
            }
        }
    }

    /// First-order Greeks; all zero once time has run out
    pub fn greeks(
        option_type: OptionType,
        spot: f64,
        strike: f64,
        rate: f64,
        volatility: f64,
        time: f64,
        dividend: f64,
    ) -> Greeks {
        if time <= 0.0 {
            return Greeks::default();
        }

        let sqrt_t = time.sqrt();
        let carry = (-dividend * time).exp();
        let discount = (-rate * time).exp();
        let d1 = Self::d1(spot, strike, rate, dividend, volatility, time);
        let d2 = d1 - volatility * sqrt_t;
        let npd1 = Self::norm_pdf(d1);

        let delta = match option_type {
            OptionType::Call => carry * Self::norm_cdf(d1),
            OptionType::Put => -carry * Self::norm_cdf(-d1),
        };

        let gamma = carry * npd1 / (spot * volatility * sqrt_t);

        let decay = -spot * npd1 * volatility * carry / (2.0 * sqrt_t);
        let theta = match option_type {
            OptionType::Call => {
                decay - rate * strike * discount * Self::norm_cdf(d2)
                    + dividend * spot * carry * Self::norm_cdf(d1)
            }
            OptionType::Put => {
                decay + rate * strike * discount * Self::norm_cdf(-d2)
                    - dividend * spot * carry * Self::norm_cdf(-d1)
            }
        } / DAYS_PER_YEAR;

        let vega = spot * carry * npd1 * sqrt_t / 100.0;

        let rho = match option_type {
            OptionType::Call => strike * time * discount * Self::norm_cdf(d2) / 100.0,
            OptionType::Put => -strike * time * discount * Self::norm_cdf(-d2) / 100.0,
        };

        Greeks {
            delta,
            gamma,
            theta,
            vega,
            rho,
        }
    }

    /// Implied volatility by Newton-Raphson, falling back to bisection
    /// whenever a Newton step leaves the bracket
    pub fn implied_volatility(
        option_type: OptionType,
        spot: f64,
        strike: f64,
        rate: f64,
        time: f64,
        market_price: f64,
        dividend: f64,
    ) -> AnalyticsResult<f64> {
        if time <= 0.0 || market_price <= 0.0 || spot <= 0.0 || strike <= 0.0 {
            return Err(AnalyticsError::invalid_input(format!(
                "cannot back out volatility from price {market_price} with t={time}"
            )));
        }

        let tolerance = 1e-6;
        let (mut low, mut high) = (1e-4, 5.0);
        let mut vol = 0.2;

        for _ in 0..100 {
            let diff = Self::price(option_type, spot, strike, rate, vol, time, dividend) - market_price;
            if diff.abs() < tolerance {
                return Ok(vol);
            }
            if diff > 0.0 {
                high = vol;
            } else {
                low = vol;
            }

            // Vega is per vol point; undo the scaling for the Newton step
            let vega = Self::greeks(option_type, spot, strike, rate, vol, time, dividend).vega * 100.0;
            let newton = vol - diff / vega;
            vol = if vega > 1e-10 && newton > low && newton < high {
                newton
            } else {
                0.5 * (low + high)
            };
        }

        Err(AnalyticsError::invalid_input(format!(
            "implied volatility did not converge for price {market_price}"
        )))
    }
}

/// Normalise a volatility quoted either as a fraction or a percentage.
/// Values above 1.0 are taken as percentages.
pub fn volatility_fraction(value: f64) -> f64 {
    if value > 1.0 { value / 100.0 } else { value }
}

/// Parse an expiry in `DD-Mon-YYYY` or `YYYY-MM-DD` form
pub fn parse_expiry(input: &str) -> AnalyticsResult<NaiveDate> {
    let trimmed = input.trim();
    EXPIRY_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| AnalyticsError::InvalidDateFormat {
            input: input.to_string(),
        })
}

/// Settlement instant of an expiry date
pub fn expiry_instant(expiry: NaiveDate) -> DateTime<Utc> {
    let settlement = NaiveTime::from_hms_opt(SETTLEMENT_HOUR_UTC, 0, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&expiry.and_time(settlement))
}

/// Fractional days from `now` until settlement
pub fn days_to_expiry(expiry: NaiveDate, now: DateTime<Utc>) -> f64 {
    (expiry_instant(expiry) - now).num_milliseconds() as f64 / 86_400_000.0
}

/// A Greeks request as parsed from a user command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreeksRequest {
    pub symbol: String,
    pub strike: f64,
    /// `DD-Mon-YYYY` or `YYYY-MM-DD`
    pub expiry: String,
    /// CE/CALL/C or PE/PUT/P
    pub option_type: String,
    /// Defaults to the symbol's reference spot
    pub spot: Option<f64>,
    /// Fraction or percentage; defaults to the configured volatility
    pub volatility: Option<f64>,
}

/// Values a single contract from a [`GreeksRequest`]
#[derive(Debug, Clone)]
pub struct GreeksCalculator {
    pricing: PricingConfig,
}

impl GreeksCalculator {
    pub fn new(pricing: PricingConfig) -> Self {
        Self { pricing }
    }

    /// Price and Greeks for the requested contract as of `now`
    pub fn calculate(
        &self,
        request: &GreeksRequest,
        now: DateTime<Utc>,
    ) -> AnalyticsResult<OptionGreeksResult> {
        let option_type: OptionType = request.option_type.parse()?;
        let expiry = parse_expiry(&request.expiry)?;

        let days = days_to_expiry(expiry, now);
        if days <= 0.0 {
            return Err(AnalyticsError::InvalidExpiry {
                expiry: request.expiry.clone(),
            });
        }

        let spot = request
            .spot
            .unwrap_or_else(|| UnderlyingProfile::for_symbol(&request.symbol).spot);
        let volatility = volatility_fraction(request.volatility.unwrap_or(self.pricing.default_volatility));

        if !(request.strike > 0.0 && request.strike.is_finite()) {
            return Err(AnalyticsError::invalid_input(format!(
                "strike must be positive, got {}",
                request.strike
            )));
        }
        if !(spot > 0.0 && spot.is_finite()) {
            return Err(AnalyticsError::invalid_input(format!("spot must be positive, got {spot}")));
        }
        if !(volatility > 0.0 && volatility.is_finite()) {
            return Err(AnalyticsError::invalid_input(format!(
                "volatility must be positive, got {volatility}"
            )));
        }

        let time = days / DAYS_PER_YEAR;
        let rate = self.pricing.risk_free_rate;
        let dividend = self.pricing.dividend_yield;

        let price = BlackScholes::price(option_type, spot, request.strike, rate, volatility, time, dividend);
        let greeks = BlackScholes::greeks(option_type, spot, request.strike, rate, volatility, time, dividend);

        debug!(
            symbol = %request.symbol,
            strike = request.strike,
            %option_type,
            days,
            price,
            "valued contract"
        );

        Ok(OptionGreeksResult {
            symbol: request.symbol.to_ascii_uppercase(),
            strike: request.strike,
            expiry,
            option_type,
            spot,
            price,
            delta: greeks.delta,
            gamma: greeks.gamma,
            theta: greeks.theta,
            vega: greeks.vega,
            rho: greeks.rho,
            implied_volatility: volatility,
            days_to_expiry: days,
        })
    }
}
