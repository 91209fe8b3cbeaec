pub mod planner;
pub mod tool;


pub use planner::{extract_ticker, plan, Plan};
pub use tool::{ToolKind, ToolRecord};

use analysis_core::{AnalysisError, AnalysisResult, PriceSeries, RetryPolicy, SentimentReport};
use backtest_engine::BacktestConfig;
use forecast_engine::Forecaster;
use market_data::PriceStore;
use sentiment_engine::SentimentEngine;
use serde_json::json;
use signal_engine::SignalConfig;
use std::sync::Arc;
use std::time::Duration;

/// Request lifecycle. `Failed` is reachable from every other state;
/// the loop never returns to `Planning` once execution starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Planning,
    Executing,
    Synthesizing,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub signal_config: SignalConfig,
    pub backtest_config: BacktestConfig,
    pub retry: RetryPolicy,
    /// Upper bound on any single tool, so one slow tool cannot stall
    /// the rest of the request.
    pub tool_timeout: Duration,
    pub default_period: String,
    pub default_interval: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            signal_config: SignalConfig::default(),
            backtest_config: BacktestConfig::default(),
            retry: RetryPolicy::default(),
            tool_timeout: Duration::from_secs(60),
            default_period: "1y".to_string(),
            default_interval: "1d".to_string(),
        }
    }
}

/// Synthesized response plus the trace it was built from.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub answer: String,
    pub trace: Vec<ToolRecord>,
}

/// Top-level control loop: plans a tool sequence for a conversational
/// query, executes it with per-tool retry and timeout bounds, and
/// synthesizes one answer from whatever succeeded. Direct API requests
/// bypass this entirely and call the components themselves.
pub struct Orchestrator {
    store: Arc<PriceStore>,
    forecaster: Arc<Forecaster>,
    sentiment: Arc<SentimentEngine>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<PriceStore>,
        forecaster: Arc<Forecaster>,
        sentiment: Arc<SentimentEngine>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            forecaster,
            sentiment,
            config,
        }
    }

    pub async fn chat(&self, query: &str) -> AnalysisResult<AgentReply> {
        let mut phase = Phase::Planning;
        tracing::debug!("Phase: {:?}", phase);

        let plan = match planner::plan(query) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!("Planning failed: {}", err);
                return Err(err);
            }
        };
        tracing::info!("Planned tools for {}: {:?}", plan.ticker, plan.tools);

        phase = Phase::Executing;
        tracing::debug!("Phase: {:?}", phase);
        let trace = self.execute(&plan).await;

        phase = Phase::Synthesizing;
        tracing::debug!("Phase: {:?}", phase);
        if trace.iter().all(|r| !r.succeeded()) {
            phase = Phase::Failed;
            tracing::warn!("Phase: {:?} — every planned tool failed", phase);
            return Err(AnalysisError::DataUnavailable(format!(
                "every planned tool failed for {}",
                plan.ticker
            )));
        }

        let answer = self.synthesize(&plan, &trace);
        phase = Phase::Done;
        tracing::debug!("Phase: {:?}", phase);

        Ok(AgentReply { answer, trace })
    }

    /// Run the planned tools. The price series is fetched once and
    /// shared; the forecast and sentiment tools run concurrently since
    /// neither blocks on the other. Failures are recorded per tool and
    /// never abort the sweep.
    async fn execute(&self, plan: &Plan) -> Vec<ToolRecord> {
        let ticker = plan.ticker.as_str();
        let period = self.config.default_period.as_str();
        let interval = self.config.default_interval.as_str();
        let input = format!("{}:{}:{}", ticker, period, interval);

        let needs_series = plan.tools.iter().any(|t| {
            matches!(
                t,
                ToolKind::PriceData | ToolKind::Signals | ToolKind::Backtest | ToolKind::Forecast
            )
        });

        let series: Result<Arc<PriceSeries>, String> = if needs_series {
            self.fetch_series(ticker, period, interval).await
        } else {
            Err("series not requested".to_string())
        };

        let wants = |tool: ToolKind| plan.tools.contains(&tool);

        let (forecast_outcome, sentiment_outcome) = tokio::join!(
            async {
                if !wants(ToolKind::Forecast) {
                    return None;
                }
                let series = match &series {
                    Ok(series) => series.clone(),
                    Err(reason) => return Some(Err(reason.clone())),
                };
                let horizon = self.forecaster.config().horizon;
                let attempt = self.config.retry.run(|| self.forecaster.forecast(&series, horizon));
                match tokio::time::timeout(self.config.tool_timeout, attempt).await {
                    Ok(Ok(result)) => Some(Ok(result)),
                    Ok(Err(err)) => Some(Err(err.to_string())),
                    Err(_) => Some(Err(format!(
                        "forecast timed out after {:?}",
                        self.config.tool_timeout
                    ))),
                }
            },
            async {
                if !wants(ToolKind::Sentiment) {
                    return None;
                }
                match tokio::time::timeout(self.config.tool_timeout, self.sentiment.analyze(ticker))
                    .await
                {
                    Ok(Ok(report)) => Some(Ok(report)),
                    // Missing articles degrade to a neutral reading
                    // rather than failing the tool.
                    Ok(Err(AnalysisError::NoArticlesFound(reason))) => {
                        Some(Ok(SentimentReport::neutral(
                            format!("No recent articles found ({reason})."),
                            0,
                        )))
                    }
                    Ok(Err(err)) => Some(Err(err.to_string())),
                    Err(_) => Some(Err(format!(
                        "sentiment timed out after {:?}",
                        self.config.tool_timeout
                    ))),
                }
            },
        );

        // Signals and backtest are pure computations over the shared
        // series; evaluate them after the awaits so every tool's record
        // lands in plan order.
        let mut records = Vec::with_capacity(plan.tools.len());
        for &tool in &plan.tools {
            let record = match tool {
                ToolKind::PriceData => match &series {
                    Ok(series) => ToolRecord::ok(
                        tool,
                        input.as_str(),
                        json!({
                            "bars": series.len(),
                            "first_date": series.bars.first().map(|b| b.date.to_rfc3339()),
                            "last_date": series.last_bar().map(|b| b.date.to_rfc3339()),
                            "last_close": series.last_bar().map(|b| b.close),
                        }),
                    ),
                    Err(reason) => ToolRecord::failed(tool, input.as_str(), reason.clone()),
                },
                ToolKind::Signals => match &series {
                    Ok(series) => {
                        let (_, events) =
                            signal_engine::compute_signals(series, &self.config.signal_config);
                        ToolRecord::ok(
                            tool,
                            input.as_str(),
                            serde_json::to_value(&events).unwrap_or_default(),
                        )
                    }
                    Err(reason) => ToolRecord::failed(tool, input.as_str(), reason.clone()),
                },
                ToolKind::Backtest => match &series {
                    Ok(series) => {
                        let (_, events) =
                            signal_engine::compute_signals(series, &self.config.signal_config);
                        let report = backtest_engine::simulate(
                            &events,
                            series,
                            &self.config.backtest_config,
                        );
                        ToolRecord::ok(
                            tool,
                            input.as_str(),
                            json!({
                                "total_profit": report.total_profit,
                                "roi": report.roi,
                                "final_value": report.final_value,
                                "win_rate": report.win_rate,
                                "trade_count": report.trade_count,
                            }),
                        )
                    }
                    Err(reason) => ToolRecord::failed(tool, input.as_str(), reason.clone()),
                },
                ToolKind::Forecast => match &forecast_outcome {
                    Some(Ok(result)) => ToolRecord::ok(
                        tool,
                        input.as_str(),
                        serde_json::to_value(result).unwrap_or_default(),
                    ),
                    Some(Err(reason)) => ToolRecord::failed(tool, input.as_str(), reason.clone()),
                    None => ToolRecord::failed(tool, input.as_str(), "not executed"),
                },
                ToolKind::Sentiment => match &sentiment_outcome {
                    Some(Ok(report)) => ToolRecord::ok(
                        tool,
                        input.as_str(),
                        serde_json::to_value(report).unwrap_or_default(),
                    ),
                    Some(Err(reason)) => ToolRecord::failed(tool, input.as_str(), reason.clone()),
                    None => ToolRecord::failed(tool, input.as_str(), "not executed"),
                },
            };

            if let Some(err) = &record.error {
                tracing::warn!("Tool {} failed: {}", record.tool, err);
            }
            records.push(record);
        }

        records
    }

    async fn fetch_series(
        &self,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> Result<Arc<PriceSeries>, String> {
        let attempt = self
            .config
            .retry
            .run(|| self.store.get_series(ticker, period, interval));
        match tokio::time::timeout(self.config.tool_timeout, attempt).await {
            Ok(Ok(series)) => Ok(series),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "price fetch timed out after {:?}",
                self.config.tool_timeout
            )),
        }
    }

    /// Merge the successful tool outputs into one readable answer.
    fn synthesize(&self, plan: &Plan, trace: &[ToolRecord]) -> String {
        let mut parts = vec![format!("Here's what I found for {}:", plan.ticker)];

        for record in trace.iter().filter(|r| r.succeeded()) {
            let output = record.output.as_ref().cloned().unwrap_or_default();
            match record.tool {
                ToolKind::PriceData => {
                    let bars = output.get("bars").and_then(|v| v.as_u64()).unwrap_or(0);
                    let last_close = output
                        .get("last_close")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(f64::NAN);
                    parts.push(format!(
                        "Price history: {} bars on record, last close {:.2}.",
                        bars, last_close
                    ));
                }
                ToolKind::Signals => {
                    let events = output.as_array().cloned().unwrap_or_default();
                    let buys = events
                        .iter()
                        .filter(|e| e.get("kind").and_then(|k| k.as_str()) == Some("buy"))
                        .count();
                    let sells = events.len() - buys;
                    let latest = events.last().and_then(|e| {
                        let kind = e.get("kind")?.as_str()?;
                        let date = e.get("date")?.as_str()?;
                        Some(format!(" Latest crossover: {} on {}.", kind, &date[..10]))
                    });
                    parts.push(format!(
                        "MACD crossovers: {} buy and {} sell signals.{}",
                        buys,
                        sells,
                        latest.unwrap_or_default()
                    ));
                }
                ToolKind::Backtest => {
                    let roi = output.get("roi").and_then(|v| v.as_f64()).unwrap_or(0.0);
                    let final_value = output
                        .get("final_value")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.0);
                    let win_rate = output
                        .get("win_rate")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.0);
                    let trades = output
                        .get("trade_count")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    parts.push(format!(
                        "Backtesting that strategy on {:.2} starting capital ends at {:.2} \
                         (ROI {:.1}%), {} closed trades, win rate {:.0}%.",
                        self.config.backtest_config.initial_capital,
                        final_value,
                        roi,
                        trades,
                        win_rate
                    ));
                }
                ToolKind::Forecast => {
                    let predictions: Vec<f64> = output
                        .get("predictions")
                        .and_then(|v| v.as_array())
                        .map(|a| a.iter().filter_map(|v| v.as_f64()).collect())
                        .unwrap_or_default();
                    if let (Some(first), Some(last)) = (predictions.first(), predictions.last()) {
                        parts.push(format!(
                            "Model forecast for the next {} days: starting near {:.2}, ending \
                             near {:.2}.",
                            predictions.len(),
                            first,
                            last
                        ));
                    }
                }
                ToolKind::Sentiment => {
                    let label = output
                        .get("sentiment_label")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Neutral");
                    let score = output
                        .get("overall_sentiment")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.0);
                    let reasoning = output
                        .get("reasoning")
                        .and_then(|v| v.as_str())
                        .unwrap_or("");
                    parts.push(format!(
                        "News sentiment: {} ({:+.2}). {}",
                        label, score, reasoning
                    ));
                }
            }
        }

        let failures: Vec<&ToolRecord> = trace.iter().filter(|r| !r.succeeded()).collect();
        if !failures.is_empty() {
            let names: Vec<&str> = failures.iter().map(|r| r.tool.name()).collect();
            parts.push(format!(
                "(Skipped in this answer because they failed: {}.)",
                names.join(", ")
            ));
        }

        parts.join("\n")
    }
}
