use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A cleaned, chronological price history for one (ticker, period, interval).
/// Immutable once handed to a caller within a cache epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub period: String,
    pub interval: String,
    pub bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Indicator arrays aligned 1:1 with the bars they were computed from.
/// Warm-up entries are seeded EMA values, never omitted, so charting
/// stays index-aligned with the date axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub macd: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub ema_fast: Vec<f64>,
    pub ema_slow: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Buy,
    Sell,
}

/// A discrete crossover event derived deterministically from indicators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub date: DateTime<Utc>,
    pub price: f64,
    pub kind: SignalKind,
}

/// A closed round trip in the backtest: a buy eventually matched by a
/// sell (or by series end, in which case `exit_*` carries the
/// mark-to-market values).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub entry_date: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_date: DateTime<Utc>,
    pub exit_price: f64,
    pub quantity: f64,
    pub fee: f64,
    pub profit: f64,
}

/// Result of replaying signal events against a synthetic account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub total_profit: f64,
    pub roi: f64,
    pub final_value: f64,
    pub win_rate: f64,
    pub trade_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub trades: Vec<Trade>,
}

/// Multi-step price forecast. `predictions` has exactly the requested
/// horizon length; dates are the calendar days following the last bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub prediction_dates: Vec<String>,
    pub predictions: Vec<f64>,
}

/// Fused news sentiment for one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentReport {
    pub overall_sentiment: f64,
    pub sentiment_label: String,
    pub reasoning: String,
    pub article_count: usize,
}

impl SentimentReport {
    /// Neutral report used when no articles exist or the scoring model
    /// stays unreachable after retries.
    pub fn neutral(reasoning: impl Into<String>, article_count: usize) -> Self {
        Self {
            overall_sentiment: 0.0,
            sentiment_label: "Neutral".to_string(),
            reasoning: reasoning.into(),
            article_count,
        }
    }
}

/// News article as returned by the upstream feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub description: Option<String>,
    pub source: String,
    pub url: String,
    pub published_utc: DateTime<Utc>,
    #[serde(default)]
    pub tickers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_report_is_labelled_neutral() {
        let report = SentimentReport::neutral("no articles", 0);
        assert_eq!(report.overall_sentiment, 0.0);
        assert_eq!(report.sentiment_label, "Neutral");
        assert_eq!(report.article_count, 0);
    }

    #[test]
    fn backtest_report_omits_empty_trades_on_the_wire() {
        let report = BacktestReport {
            total_profit: 0.0,
            roi: 0.0,
            final_value: 10_000.0,
            win_rate: 0.0,
            trade_count: 0,
            trades: vec![],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("trades").is_none());
        assert!(json.get("final_value").is_some());
    }
}
