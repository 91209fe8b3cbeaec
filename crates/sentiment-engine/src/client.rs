use analysis_core::{AnalysisError, AnalysisResult, NewsArticle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SCORING_INSTRUCTION: &str = "Weigh the headlines against each other, including \
conflicting ones, and produce a single aggregate sentiment score between -1 (strongly \
negative) and 1 (strongly positive) for the ticker, with a short rationale.";

/// One fused score for a batch of headlines, as produced by the
/// text-understanding backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSentiment {
    pub score: f64,
    pub reasoning: String,
}

/// Boundary to the text-understanding model. The HTTP client is the
/// production implementation; tests swap in mocks.
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, ticker: &str, articles: &[NewsArticle]) -> AnalysisResult<ScoredSentiment>;
}

#[derive(Debug, Clone, Serialize)]
struct ScoreRequest {
    ticker: String,
    instruction: &'static str,
    headlines: Vec<String>,
    descriptions: Vec<Option<String>>,
}

/// HTTP client for the news-scoring service. Any unreachable backend,
/// non-success status or unparseable body surfaces as `ModelUnavailable`
/// so the engine's bounded retry can take over.
#[derive(Clone)]
pub struct HttpScoringClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpScoringClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, base_url }
    }
}

#[async_trait]
impl SentimentScorer for HttpScoringClient {
    async fn score(
        &self,
        ticker: &str,
        articles: &[NewsArticle],
    ) -> AnalysisResult<ScoredSentiment> {
        let request = ScoreRequest {
            ticker: ticker.to_string(),
            instruction: SCORING_INSTRUCTION,
            headlines: articles.iter().map(|a| a.title.clone()).collect(),
            descriptions: articles.iter().map(|a| a.description.clone()).collect(),
        };

        let response = self
            .client
            .post(format!("{}/score-news", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::ModelUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AnalysisError::ModelUnavailable(format!(
                "scoring backend returned {}",
                response.status()
            )));
        }

        response
            .json::<ScoredSentiment>()
            .await
            .map_err(|e| AnalysisError::ModelUnavailable(format!("malformed response: {e}")))
    }
}
