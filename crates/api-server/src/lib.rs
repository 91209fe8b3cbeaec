pub mod config;
pub mod routes;

#[cfg(test)]
mod routes_tests;

use agent_orchestrator::{Orchestrator, OrchestratorConfig};
use analysis_core::{AnalysisError, MarketDataProvider, RetryPolicy};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use backtest_engine::BacktestConfig;
use forecast_engine::{ForecastConfig, Forecaster};
use market_data::{PolygonProvider, PriceStore};
use sentiment_engine::{HttpScoringClient, SentimentConfig, SentimentEngine};
use serde_json::json;
use signal_engine::SignalConfig;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PriceStore>,
    pub forecaster: Arc<Forecaster>,
    pub sentiment: Arc<SentimentEngine>,
    pub orchestrator: Arc<Orchestrator>,
    pub signal_config: SignalConfig,
    pub backtest_config: BacktestConfig,
    pub default_period: String,
    pub default_interval: String,
}

impl AppState {
    /// Wire the component graph from configuration. The provider is
    /// shared by the price store and the sentiment engine; the
    /// orchestrator layers over all of it.
    pub fn from_parts(
        provider: Arc<dyn MarketDataProvider>,
        scorer: Arc<dyn sentiment_engine::SentimentScorer>,
        config: &ServerConfig,
    ) -> Self {
        let retry = RetryPolicy::new(
            config.retry_max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
            2.0,
        );

        let store = Arc::new(PriceStore::new(
            provider.clone(),
            Duration::from_secs(config.price_cache_ttl_secs),
        ));

        let forecaster = Arc::new(Forecaster::new(ForecastConfig {
            window: config.forecast_window,
            horizon: config.forecast_horizon,
            hidden_units: config.forecast_hidden_units,
            epochs: config.forecast_epochs,
            learning_rate: config.forecast_learning_rate,
            train_fraction: 0.9,
        }));

        let sentiment = Arc::new(SentimentEngine::new(
            provider,
            scorer,
            retry.clone(),
            SentimentConfig {
                max_articles: config.sentiment_max_articles,
                ..SentimentConfig::default()
            },
        ));

        let signal_config = SignalConfig {
            fast_span: config.ema_fast_span,
            slow_span: config.ema_slow_span,
            signal_span: config.ema_signal_span,
        };

        let backtest_config = BacktestConfig {
            initial_capital: config.initial_capital,
            fee_rate: config.fee_rate,
        };

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            forecaster.clone(),
            sentiment.clone(),
            OrchestratorConfig {
                signal_config: signal_config.clone(),
                backtest_config: backtest_config.clone(),
                retry,
                tool_timeout: Duration::from_secs(config.tool_timeout_secs),
                default_period: config.default_period.clone(),
                default_interval: config.default_interval.clone(),
            },
        ));

        Self {
            store,
            forecaster,
            sentiment,
            orchestrator,
            signal_config,
            backtest_config,
            default_period: config.default_period.clone(),
            default_interval: config.default_interval.clone(),
        }
    }
}

/// Domain errors mapped onto HTTP. Every failure body carries an
/// `error` string so the dashboard can render a message without
/// inspecting status codes.
pub struct AppError(pub AnalysisError);

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AnalysisError::DataUnavailable(_) | AnalysisError::NoArticlesFound(_) => {
                StatusCode::NOT_FOUND
            }
            AnalysisError::UpstreamRateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AnalysisError::InsufficientHistory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AnalysisError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AnalysisError::InvalidQuery(_) | AnalysisError::InvalidData(_) => {
                StatusCode::BAD_REQUEST
            }
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/stock/:ticker", get(routes::get_stock))
        .route("/api/signals/:ticker", get(routes::get_signals))
        .route("/api/backtest/:ticker", get(routes::get_backtest))
        .route("/api/predict/:ticker", get(routes::get_predict))
        .route("/api/sentiment/:ticker", get(routes::get_sentiment))
        .route("/api/agent/chat", post(routes::agent_chat))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let provider: Arc<dyn MarketDataProvider> = Arc::new(PolygonProvider::new(
        config.polygon_api_key.clone(),
        config.polygon_rate_limit,
    ));
    let scorer: Arc<dyn sentiment_engine::SentimentScorer> = Arc::new(HttpScoringClient::new(
        config.sentiment_model_url.clone(),
        Duration::from_secs(config.sentiment_timeout_secs),
    ));

    let state = AppState::from_parts(provider, scorer, &config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("API server listening on {}", config.bind_address);
    axum::serve(listener, app).await?;

    Ok(())
}
