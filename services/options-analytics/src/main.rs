//! ShrivenQuant Options Analytics CLI
//!
//! Prints option chain analytics as JSON for the reporting layer.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use options_analytics::{
    AnalyticsConfig, CandleInterval, GreeksCalculator, GreeksRequest, SnapshotBuilder, analytics, ideas,
    trend::classify_trend,
};

/// Options analytics for Indian index options
#[derive(Parser)]
#[clap(name = "options-analytics")]
#[clap(about = "Option chain analytics, Greeks and trade ideas for NSE index options")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[clap(long, global = true)]
    config: Option<String>,

    /// Query the live market data source, falling back to sample data
    #[clap(long, global = true)]
    live: bool,

    /// Seed for reproducible sample data
    #[clap(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Option chain snapshot
    Chain {
        /// Underlying symbol, e.g. NIFTY
        symbol: String,
    },

    /// Put-call ratios
    Pcr { symbol: String },

    /// Max pain strike and pain curve
    MaxPain { symbol: String },

    /// OI support and resistance levels
    Levels {
        symbol: String,

        /// Levels per side
        #[clap(long, default_value = "3")]
        k: usize,
    },

    /// Full chain analysis with OI profile
    Analyze { symbol: String },

    /// Black-Scholes price and Greeks for one contract
    Greeks {
        symbol: String,

        strike: f64,

        /// DD-Mon-YYYY or YYYY-MM-DD
        expiry: String,

        /// CE/CALL or PE/PUT
        option_type: String,

        /// Spot price, defaults to the symbol's reference level
        #[clap(long)]
        spot: Option<f64>,

        /// Implied volatility as a fraction or percentage
        #[clap(long)]
        volatility: Option<f64>,
    },

    /// Trend reading and strength
    Trend { symbol: String },

    /// Trade ideas
    Ideas {
        symbol: String,

        /// Number of ideas (1-5)
        #[clap(long)]
        count: Option<usize>,

        /// Attach confidence, expected return and risk-reward
        #[clap(long)]
        enhance: bool,
    },

    /// Historical candles
    Candles {
        symbol: String,

        /// 1m, 5m, 15m, 30m, 1h or 1d
        #[clap(long, default_value = "1d")]
        interval: String,

        #[clap(long, default_value = "5")]
        days: u32,
    },
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AnalyticsConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(seed) = cli.seed {
        config.synthetic.seed = Some(seed);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    config.log_summary();

    let builder = SnapshotBuilder::from_config(&config).context("Failed to initialise market data")?;
    let use_live = cli.live || config.live.enabled;
    info!(live = use_live, has_live_source = builder.has_live_source(), "options analytics ready");

    match cli.command {
        Commands::Chain { symbol } => {
            print(&builder.build_chain(&symbol, use_live).await)?;
        }
        Commands::Pcr { symbol } => {
            let snapshot = builder.build_chain(&symbol, use_live).await;
            print(&analytics::pcr_metrics(&snapshot))?;
        }
        Commands::MaxPain { symbol } => {
            let snapshot = builder.build_chain(&symbol, use_live).await;
            print(&json!({
                "symbol": snapshot.symbol,
                "max_pain": analytics::max_pain(&snapshot),
                "pain_curve": analytics::pain_curve(&snapshot),
            }))?;
        }
        Commands::Levels { symbol, k } => {
            let snapshot = builder.build_chain(&symbol, use_live).await;
            let (supports, resistances) = analytics::support_resistance(&snapshot, k);
            print(&json!({
                "symbol": snapshot.symbol,
                "supports": supports,
                "resistances": resistances,
            }))?;
        }
        Commands::Analyze { symbol } => {
            let snapshot = builder.build_chain(&symbol, use_live).await;
            let reading = builder.build_trend(&symbol, use_live).await;
            print(&json!({
                "analysis": analytics::analyze_chain(&snapshot, reading.current_price),
                "oi_profile": analytics::oi_profile(&snapshot),
            }))?;
        }
        Commands::Greeks {
            symbol,
            strike,
            expiry,
            option_type,
            spot,
            volatility,
        } => {
            let request = GreeksRequest {
                symbol,
                strike,
                expiry,
                option_type,
                spot,
                volatility,
            };
            let result = GreeksCalculator::new(config.pricing.clone())
                .calculate(&request, Utc::now())
                .context("Greeks request rejected")?;
            print(&result)?;
        }
        Commands::Trend { symbol } => {
            let reading = builder.build_trend(&symbol, use_live).await;
            print(&classify_trend(reading))?;
        }
        Commands::Ideas { symbol, count, enhance } => {
            let count = count.unwrap_or(config.ideas.default_count);
            let snapshot = builder.build_chain(&symbol, use_live).await;
            let reading = builder.build_trend(&symbol, use_live).await;

            let mut selected = ideas::generate_ideas(&snapshot, &reading, count);
            if enhance {
                let mut rng = match config.synthetic.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                selected = ideas::enhance_ideas(selected, &mut rng);
            }
            if selected.is_empty() {
                info!(symbol = %snapshot.symbol, "no trade ideas for current conditions");
            }
            print(&selected)?;
        }
        Commands::Candles { symbol, interval, days } => {
            let interval: CandleInterval = interval.parse().context("Invalid candle interval")?;
            print(&builder.build_candles(&symbol, interval, days, use_live).await)?;
        }
    }

    Ok(())
}
