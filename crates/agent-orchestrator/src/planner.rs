use analysis_core::{AnalysisError, AnalysisResult};

use crate::tool::ToolKind;

/// Ordered tool selection for one query, fixed before execution starts.
/// Single planning pass: the plan is never revised mid-execution.
#[derive(Debug, Clone)]
pub struct Plan {
    pub ticker: String,
    pub tools: Vec<ToolKind>,
}

/// Words that look like tickers but never are.
const STOP_WORDS: &[&str] = &[
    "A", "I", "AI", "AND", "BUY", "DO", "EMA", "ETF", "FOR", "HOW", "IS", "IT", "MACD", "NEWS",
    "OF", "OK", "OR", "P", "PE", "ROI", "SELL", "THE", "TO", "USD", "VS", "WHAT", "WHY",
];

fn looks_like_ticker(token: &str) -> bool {
    let len = token.len();
    (1..=5).contains(&len)
        && token.chars().all(|c| c.is_ascii_uppercase())
        && !STOP_WORDS.contains(&token)
}

/// Pull a ticker out of free text: `$SYM` wins, otherwise the first
/// all-uppercase token that is not a known stop word.
pub fn extract_ticker(query: &str) -> Option<String> {
    let tokens: Vec<&str> = query
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '$'))
        .filter(|t| !t.is_empty())
        .collect();

    for token in &tokens {
        if let Some(sym) = token.strip_prefix('$') {
            if !sym.is_empty() && sym.chars().all(|c| c.is_ascii_alphabetic()) {
                return Some(sym.to_uppercase());
            }
        }
    }

    tokens
        .iter()
        .find(|t| looks_like_ticker(t))
        .map(|t| t.to_string())
}

/// Map a conversational query onto an ordered subset of the tool set.
/// Specific asks select specific tools; generic analysis questions plan
/// the full sweep.
pub fn plan(query: &str) -> AnalysisResult<Plan> {
    let ticker = extract_ticker(query).ok_or_else(|| {
        AnalysisError::InvalidQuery(
            "could not find a ticker symbol in the query; mention one like $AAPL".to_string(),
        )
    })?;

    let lower = query.to_lowercase();
    let mut tools = Vec::new();
    let mut add = |tool: ToolKind, tools: &mut Vec<ToolKind>| {
        if !tools.contains(&tool) {
            tools.push(tool);
        }
    };

    if lower.contains("price") || lower.contains("chart") || lower.contains("history") {
        add(ToolKind::PriceData, &mut tools);
    }
    if lower.contains("signal") || lower.contains("macd") || lower.contains("crossover") {
        add(ToolKind::Signals, &mut tools);
    }
    if lower.contains("backtest")
        || lower.contains("performance")
        || lower.contains("profit")
        || lower.contains("return")
        || lower.contains("win rate")
    {
        add(ToolKind::Signals, &mut tools);
        add(ToolKind::Backtest, &mut tools);
    }
    if lower.contains("predict") || lower.contains("forecast") || lower.contains("next week") {
        add(ToolKind::Forecast, &mut tools);
    }
    if lower.contains("sentiment") || lower.contains("news") || lower.contains("headline") {
        add(ToolKind::Sentiment, &mut tools);
    }

    // Nothing specific asked: run the whole analysis sweep.
    if tools.is_empty() {
        tools = vec![
            ToolKind::PriceData,
            ToolKind::Signals,
            ToolKind::Backtest,
            ToolKind::Forecast,
            ToolKind::Sentiment,
        ];
    }

    Ok(Plan { ticker, tools })
}
