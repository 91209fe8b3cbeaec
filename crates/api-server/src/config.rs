use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Server configuration, loaded from the environment with sane
/// defaults. Every analytical constant (EMA spans, capital, fees,
/// forecast window) is overridable rather than hard-coded.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,

    // Upstream market data
    pub polygon_api_key: String,
    pub polygon_rate_limit: usize,
    pub price_cache_ttl_secs: u64,

    // Signal generation
    pub ema_fast_span: usize,
    pub ema_slow_span: usize,
    pub ema_signal_span: usize,

    // Backtesting
    pub initial_capital: f64,
    pub fee_rate: f64,

    // Forecasting
    pub forecast_window: usize,
    pub forecast_horizon: usize,
    pub forecast_hidden_units: usize,
    pub forecast_epochs: usize,
    pub forecast_learning_rate: f64,

    // Sentiment
    pub sentiment_model_url: String,
    pub sentiment_timeout_secs: u64,
    pub sentiment_max_articles: usize,

    // Retry / timeouts
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub tool_timeout_secs: u64,

    // Defaults for conversational requests
    pub default_period: String,
    pub default_interval: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let polygon_api_key =
            env::var("POLYGON_API_KEY").context("POLYGON_API_KEY must be set")?;

        Ok(Self {
            bind_address: env_or("BIND_ADDRESS", "0.0.0.0:5001".to_string()),

            polygon_api_key,
            polygon_rate_limit: env_or("POLYGON_RATE_LIMIT", 500),
            price_cache_ttl_secs: env_or("PRICE_CACHE_TTL_SECS", 300),

            ema_fast_span: env_or("EMA_FAST_SPAN", 12),
            ema_slow_span: env_or("EMA_SLOW_SPAN", 26),
            ema_signal_span: env_or("EMA_SIGNAL_SPAN", 9),

            initial_capital: env_or("BACKTEST_INITIAL_CAPITAL", 10_000.0),
            fee_rate: env_or("BACKTEST_FEE_RATE", 0.001),

            forecast_window: env_or("FORECAST_WINDOW", 60),
            forecast_horizon: env_or("FORECAST_HORIZON", 7),
            forecast_hidden_units: env_or("FORECAST_HIDDEN_UNITS", 16),
            forecast_epochs: env_or("FORECAST_EPOCHS", 40),
            forecast_learning_rate: env_or("FORECAST_LEARNING_RATE", 0.02),

            sentiment_model_url: env_or(
                "SENTIMENT_MODEL_URL",
                "http://localhost:8003".to_string(),
            ),
            sentiment_timeout_secs: env_or("SENTIMENT_TIMEOUT_SECS", 10),
            sentiment_max_articles: env_or("SENTIMENT_MAX_ARTICLES", 15),

            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", 3),
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", 500),
            tool_timeout_secs: env_or("TOOL_TIMEOUT_SECS", 60),

            default_period: env_or("DEFAULT_PERIOD", "1y".to_string()),
            default_interval: env_or("DEFAULT_INTERVAL", "1d".to_string()),
        })
    }
}
