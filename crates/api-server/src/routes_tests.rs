use analysis_core::{
    AnalysisError, AnalysisResult, Bar, MarketDataProvider, NewsArticle,
};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use sentiment_engine::{ScoredSentiment, SentimentScorer};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use crate::config::ServerConfig;
use crate::{build_router, AppState};

struct MockProvider;

fn trending_bars(n: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.7).sin() * 10.0 + i as f64 * 0.1;
            Bar {
                date: start + ChronoDuration::days(i as i64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000_000.0,
            }
        })
        .collect()
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn fetch_bars(
        &self,
        ticker: &str,
        _period: &str,
        _interval: &str,
    ) -> AnalysisResult<Vec<Bar>> {
        if ticker.eq_ignore_ascii_case("MISSING") {
            return Err(AnalysisError::DataUnavailable(format!(
                "unknown ticker {}",
                ticker
            )));
        }
        Ok(trending_bars(90))
    }

    async fn fetch_news(&self, ticker: &str, _limit: usize) -> AnalysisResult<Vec<NewsArticle>> {
        if ticker.eq_ignore_ascii_case("NONEWS") {
            return Ok(vec![]);
        }
        Ok(vec![NewsArticle {
            title: format!("{} rallies on strong guidance", ticker),
            description: Some("Shares jumped after the report.".to_string()),
            source: "wire".to_string(),
            url: "https://example.com/a".to_string(),
            published_utc: Utc::now(),
            tickers: vec![ticker.to_uppercase()],
        }])
    }
}

struct OkScorer;

#[async_trait]
impl SentimentScorer for OkScorer {
    async fn score(
        &self,
        _ticker: &str,
        _articles: &[NewsArticle],
    ) -> AnalysisResult<ScoredSentiment> {
        Ok(ScoredSentiment {
            score: 0.55,
            reasoning: "Guidance beat outweighs macro worries.".to_string(),
        })
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        polygon_api_key: "test-key".to_string(),
        polygon_rate_limit: 500,
        price_cache_ttl_secs: 300,
        ema_fast_span: 12,
        ema_slow_span: 26,
        ema_signal_span: 9,
        initial_capital: 10_000.0,
        fee_rate: 0.001,
        forecast_window: 20,
        forecast_horizon: 7,
        forecast_hidden_units: 8,
        forecast_epochs: 10,
        forecast_learning_rate: 0.02,
        sentiment_model_url: "http://localhost:8003".to_string(),
        sentiment_timeout_secs: 5,
        sentiment_max_articles: 15,
        retry_max_attempts: 2,
        retry_base_delay_ms: 1,
        tool_timeout_secs: 30,
        default_period: "1y".to_string(),
        default_interval: "1d".to_string(),
    }
}

fn test_router() -> axum::Router {
    let state = AppState::from_parts(
        Arc::new(MockProvider),
        Arc::new(OkScorer),
        &test_config(),
    );
    build_router(state)
}

async fn get_json(router: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn stock_endpoint_returns_aligned_arrays() {
    let (status, body) = get_json(test_router(), "/api/stock/AAPL?period=1y&interval=1d").await;

    assert_eq!(status, StatusCode::OK);
    let dates = body["dates"].as_array().unwrap();
    assert_eq!(dates.len(), 90);
    assert_eq!(body["close"].as_array().unwrap().len(), 90);
    assert_eq!(body["macd"].as_array().unwrap().len(), 90);
    assert_eq!(body["signal_line"].as_array().unwrap().len(), 90);
    assert_eq!(body["open"].as_array().unwrap().len(), 90);
}

#[tokio::test]
async fn unknown_ticker_yields_error_body() {
    let (status, body) = get_json(test_router(), "/api/stock/MISSING").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("MISSING"));
}

#[tokio::test]
async fn signals_endpoint_splits_buys_and_sells() {
    let (status, body) = get_json(test_router(), "/api/signals/AAPL").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["buy_signals"].is_array());
    assert!(body["sell_signals"].is_array());
    for event in body["buy_signals"].as_array().unwrap() {
        assert!(event["date"].is_string());
        assert!(event["price"].is_number());
    }
}

#[tokio::test]
async fn backtest_endpoint_has_the_binding_fields() {
    let (status, body) = get_json(test_router(), "/api/backtest/AAPL").await;

    assert_eq!(status, StatusCode::OK);
    for field in ["total_profit", "roi", "final_value", "win_rate", "trade_count"] {
        assert!(body.get(field).is_some(), "missing field {field}");
    }
}

#[tokio::test]
async fn predict_endpoint_returns_the_horizon() {
    let (status, body) = get_json(test_router(), "/api/predict/AAPL").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 7);
    assert_eq!(body["prediction_dates"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn sentiment_endpoint_reports_a_bounded_score() {
    let (status, body) = get_json(test_router(), "/api/sentiment/AAPL").await;

    assert_eq!(status, StatusCode::OK);
    let score = body["overall_sentiment"].as_f64().unwrap();
    assert!((-1.0..=1.0).contains(&score));
    assert_eq!(body["sentiment_label"], "Positive");
}

#[tokio::test]
async fn sentiment_without_articles_is_neutral_not_an_error() {
    let (status, body) = get_json(test_router(), "/api/sentiment/NONEWS").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sentiment_label"], "Neutral");
    assert_eq!(body["overall_sentiment"], 0.0);
}

#[tokio::test]
async fn chat_endpoint_answers_or_errors_in_json() {
    let router = test_router();
    let request = Request::builder()
        .method("POST")
        .uri("/api/agent/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"query": "news sentiment for AAPL"}"#))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["answer"].as_str().unwrap().contains("AAPL"));
}

#[tokio::test]
async fn chat_without_ticker_is_a_bad_request() {
    let router = test_router();
    let request = Request::builder()
        .method("POST")
        .uri("/api/agent/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"query": "how are markets doing"}"#))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}