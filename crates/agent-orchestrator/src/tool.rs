use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of capabilities the orchestrator can plan over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    PriceData,
    Signals,
    Backtest,
    Forecast,
    Sentiment,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::PriceData => "price_data",
            ToolKind::Signals => "signals",
            ToolKind::Backtest => "backtest",
            ToolKind::Forecast => "forecast",
            ToolKind::Sentiment => "sentiment",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of the per-request trace: which tool ran, with what input,
/// and what came back. Used for synthesis and observability only, then
/// discarded with the response.
#[derive(Debug, Clone, Serialize)]
pub struct ToolRecord {
    pub tool: ToolKind,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolRecord {
    pub fn ok(tool: ToolKind, input: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            tool,
            input: input.into(),
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(tool: ToolKind, input: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool,
            input: input.into(),
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
