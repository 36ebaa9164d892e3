//! Runtime configuration
//!
//! Layering, lowest precedence first: built-in defaults, optional TOML file,
//! `OPTIONS_ANALYTICS__*` environment variables, then the bare
//! `ZERODHA_API_KEY` / `ZERODHA_ACCESS_TOKEN` variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::{AnalyticsError, AnalyticsResult};

/// Environment prefix for layered settings
pub const ENV_PREFIX: &str = "OPTIONS_ANALYTICS";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Black-Scholes inputs
    pub pricing: PricingConfig,
    /// Live source behaviour
    pub live: LiveSourceConfig,
    /// Kite Connect credentials, absent when no live source is configured
    pub zerodha: Option<ZerodhaSettings>,
    /// Trade idea defaults
    pub ideas: IdeaConfig,
    /// Fixture generator settings
    pub synthetic: SyntheticConfig,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

/// Black-Scholes inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Annual risk-free rate, continuously compounded
    pub risk_free_rate: f64,
    /// Annual dividend yield, continuously compounded
    pub dividend_yield: f64,
    /// Volatility used when a request carries none (fraction)
    pub default_volatility: f64,
}

/// Live source behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSourceConfig {
    /// Prefer the live source over synthetic data
    pub enabled: bool,
    /// Upper bound on a single live fetch
    pub timeout_ms: u64,
}

/// Kite Connect credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZerodhaSettings {
    pub api_key: String,
    pub access_token: String,
    #[serde(default = "default_kite_url")]
    pub base_url: String,
}

/// Trade idea defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeaConfig {
    /// Ideas returned when the caller gives no count
    pub default_count: usize,
}

/// Fixture generator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Fixed seed for reproducible output; entropy when absent
    pub seed: Option<u64>,
    /// Weekly expiries generated per chain
    pub expiries: usize,
}

fn default_kite_url() -> String {
    "https://api.kite.trade".to_string()
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            pricing: PricingConfig::default(),
            live: LiveSourceConfig::default(),
            zerodha: None,
            ideas: IdeaConfig::default(),
            synthetic: SyntheticConfig::default(),
            log_filter: "options_analytics=info".to_string(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.05,
            dividend_yield: 0.01,
            default_volatility: 0.20,
        }
    }
}

impl Default for LiveSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 5_000,
        }
    }
}

impl Default for IdeaConfig {
    fn default() -> Self {
        Self {
            default_count: crate::ideas::DEFAULT_IDEAS,
        }
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: None,
            expiries: 2,
        }
    }
}

impl LiveSourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AnalyticsConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&str>) -> AnalyticsResult<Self> {
        dotenv::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AnalyticsError::Configuration {
                message: e.to_string(),
            })?;

        let mut config: AnalyticsConfig =
            settings
                .try_deserialize()
                .map_err(|e| AnalyticsError::Configuration {
                    message: e.to_string(),
                })?;

        config.apply_legacy_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Log the effective settings; call once a subscriber is installed
    pub fn log_summary(&self) {
        info!(
            live = self.live.enabled,
            zerodha = self.zerodha.is_some(),
            seed = ?self.synthetic.seed,
            expiries = self.synthetic.expiries,
            "configuration loaded"
        );
    }

    /// Pick up bare Kite credentials, the way deployments have always set them
    pub fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let api_key = lookup("ZERODHA_API_KEY").filter(|v| !v.is_empty());
        let access_token = lookup("ZERODHA_ACCESS_TOKEN").filter(|v| !v.is_empty());

        if let (Some(api_key), Some(access_token)) = (api_key, access_token) {
            let base_url = self
                .zerodha
                .as_ref()
                .map(|z| z.base_url.clone())
                .unwrap_or_else(default_kite_url);
            self.zerodha = Some(ZerodhaSettings {
                api_key,
                access_token,
                base_url,
            });
        }
    }

    /// Reject settings the analytics cannot run with
    pub fn validate(&self) -> AnalyticsResult<()> {
        let invalid = |message: String| Err(AnalyticsError::Configuration { message });

        let pricing = &self.pricing;
        if !pricing.risk_free_rate.is_finite() || pricing.risk_free_rate < 0.0 {
            return invalid(format!("risk_free_rate must be >= 0, got {}", pricing.risk_free_rate));
        }
        if !pricing.dividend_yield.is_finite() || pricing.dividend_yield < 0.0 {
            return invalid(format!("dividend_yield must be >= 0, got {}", pricing.dividend_yield));
        }
        if !pricing.default_volatility.is_finite() || pricing.default_volatility <= 0.0 {
            return invalid(format!(
                "default_volatility must be > 0, got {}",
                pricing.default_volatility
            ));
        }
        if self.live.timeout_ms == 0 {
            return invalid("live.timeout_ms must be > 0".to_string());
        }
        if self.synthetic.expiries == 0 {
            return invalid("synthetic.expiries must be >= 1".to_string());
        }
        if !(1..=crate::ideas::MAX_IDEAS).contains(&self.ideas.default_count) {
            return invalid(format!(
                "ideas.default_count must be within 1..={}, got {}",
                crate::ideas::MAX_IDEAS,
                self.ideas.default_count
            ));
        }
        Ok(())
    }
}
