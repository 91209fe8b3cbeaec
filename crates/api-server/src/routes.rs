use analysis_core::{AnalysisError, SentimentReport, SignalEvent, SignalKind};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{AppError, AppState};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub period: Option<String>,
    pub interval: Option<String>,
}

impl RangeParams {
    fn resolve(&self, state: &AppState) -> (String, String) {
        (
            self.period
                .clone()
                .unwrap_or_else(|| state.default_period.clone()),
            self.interval
                .clone()
                .unwrap_or_else(|| state.default_interval.clone()),
        )
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Price history plus chart-aligned indicator arrays.
pub async fn get_stock(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Value>, AppError> {
    let (period, interval) = params.resolve(&state);
    let series = state.store.get_series(&ticker, &period, &interval).await?;
    let (indicators, _) = signal_engine::compute_signals(&series, &state.signal_config);

    let dates: Vec<String> = series
        .bars
        .iter()
        .map(|b| b.date.format(DATE_FORMAT).to_string())
        .collect();

    Ok(Json(json!({
        "dates": dates,
        "close": series.bars.iter().map(|b| b.close).collect::<Vec<_>>(),
        "macd": indicators.macd,
        "signal_line": indicators.signal_line,
        "open": series.bars.iter().map(|b| b.open).collect::<Vec<_>>(),
        "high": series.bars.iter().map(|b| b.high).collect::<Vec<_>>(),
        "low": series.bars.iter().map(|b| b.low).collect::<Vec<_>>(),
    })))
}

fn event_json(event: &SignalEvent) -> Value {
    json!({
        "date": event.date.format(DATE_FORMAT).to_string(),
        "price": event.price,
    })
}

pub async fn get_signals(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Value>, AppError> {
    let (period, interval) = params.resolve(&state);
    let series = state.store.get_series(&ticker, &period, &interval).await?;
    let (_, events) = signal_engine::compute_signals(&series, &state.signal_config);

    let buy_signals: Vec<Value> = events
        .iter()
        .filter(|e| e.kind == SignalKind::Buy)
        .map(event_json)
        .collect();
    let sell_signals: Vec<Value> = events
        .iter()
        .filter(|e| e.kind == SignalKind::Sell)
        .map(event_json)
        .collect();

    Ok(Json(json!({
        "buy_signals": buy_signals,
        "sell_signals": sell_signals,
    })))
}

pub async fn get_backtest(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Value>, AppError> {
    let (period, interval) = params.resolve(&state);
    let series = state.store.get_series(&ticker, &period, &interval).await?;
    let (_, events) = signal_engine::compute_signals(&series, &state.signal_config);
    let report = backtest_engine::simulate(&events, &series, &state.backtest_config);

    Ok(Json(json!({
        "total_profit": report.total_profit,
        "roi": report.roi,
        "final_value": report.final_value,
        "win_rate": report.win_rate,
        "trade_count": report.trade_count,
    })))
}

/// Forecast always trains/serves on the full daily history.
pub async fn get_predict(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Value>, AppError> {
    let series = state.store.get_series(&ticker, "max", "1d").await?;
    let horizon = state.forecaster.config().horizon;
    let result = state.forecaster.forecast(&series, horizon).await?;

    Ok(Json(json!({
        "prediction_dates": result.prediction_dates,
        "predictions": result.predictions,
    })))
}

pub async fn get_sentiment(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<SentimentReport>, AppError> {
    match state.sentiment.analyze(&ticker).await {
        Ok(report) => Ok(Json(report)),
        // An empty news feed is a neutral reading, not a failure.
        Err(AnalysisError::NoArticlesFound(reason)) => Ok(Json(SentimentReport::neutral(
            format!("No recent articles found ({reason})."),
            0,
        ))),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

pub async fn agent_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, AppError> {
    let reply = state.orchestrator.chat(&request.query).await?;
    tracing::debug!(
        "Agent trace: {}",
        serde_json::to_string(&reply.trace).unwrap_or_default()
    );
    Ok(Json(json!({ "answer": reply.answer })))
}
