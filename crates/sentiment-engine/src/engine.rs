use analysis_core::{
    AnalysisError, AnalysisResult, MarketDataProvider, RetryPolicy, SentimentReport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::client::SentimentScorer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentConfig {
    /// How many recent headlines to fuse.
    pub max_articles: usize,
    pub positive_threshold: f64,
    pub negative_threshold: f64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            max_articles: 15,
            positive_threshold: 0.1,
            negative_threshold: -0.1,
        }
    }
}

/// Fuses recent headlines for a ticker into one bounded sentiment score
/// with a rationale. The scoring model is retried with backoff; if it
/// stays unreachable the engine degrades to a neutral report instead of
/// failing the request.
pub struct SentimentEngine {
    provider: Arc<dyn MarketDataProvider>,
    scorer: Arc<dyn SentimentScorer>,
    retry: RetryPolicy,
    config: SentimentConfig,
}

impl SentimentEngine {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        scorer: Arc<dyn SentimentScorer>,
        retry: RetryPolicy,
        config: SentimentConfig,
    ) -> Self {
        Self {
            provider,
            scorer,
            retry,
            config,
        }
    }

    pub async fn analyze(&self, ticker: &str) -> AnalysisResult<SentimentReport> {
        let articles = self
            .provider
            .fetch_news(ticker, self.config.max_articles)
            .await?;

        if articles.is_empty() {
            return Err(AnalysisError::NoArticlesFound(format!(
                "no recent headlines for {}",
                ticker
            )));
        }

        let count = articles.len();
        tracing::info!("Scoring {} headlines for {}", count, ticker);

        let scored = self
            .retry
            .run(|| self.scorer.score(ticker, &articles))
            .await;

        match scored {
            Ok(scored) => {
                let score = scored.score.clamp(-1.0, 1.0);
                Ok(SentimentReport {
                    overall_sentiment: score,
                    sentiment_label: self.label_for(score).to_string(),
                    reasoning: scored.reasoning,
                    article_count: count,
                })
            }
            Err(AnalysisError::ModelUnavailable(reason)) => {
                tracing::warn!(
                    "Sentiment model unavailable for {} after retries, degrading to neutral: {}",
                    ticker,
                    reason
                );
                Ok(SentimentReport::neutral(
                    format!(
                        "Sentiment model was unavailable ({reason}); defaulting to a neutral \
                         reading over {count} articles."
                    ),
                    count,
                ))
            }
            Err(other) => Err(other),
        }
    }

    fn label_for(&self, score: f64) -> &'static str {
        if score > self.config.positive_threshold {
            "Positive"
        } else if score < self.config.negative_threshold {
            "Negative"
        } else {
            "Neutral"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScoredSentiment;
    use analysis_core::{Bar, NewsArticle};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn article(title: &str) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            description: None,
            source: "wire".to_string(),
            url: "https://example.com".to_string(),
            published_utc: Utc::now(),
            tickers: vec!["AAPL".to_string()],
        }
    }

    struct FixedProvider {
        articles: Vec<NewsArticle>,
    }

    #[async_trait]
    impl MarketDataProvider for FixedProvider {
        async fn fetch_bars(
            &self,
            _ticker: &str,
            _period: &str,
            _interval: &str,
        ) -> AnalysisResult<Vec<Bar>> {
            Ok(vec![])
        }

        async fn fetch_news(
            &self,
            _ticker: &str,
            limit: usize,
        ) -> AnalysisResult<Vec<NewsArticle>> {
            Ok(self.articles.iter().take(limit).cloned().collect())
        }
    }

    struct FixedScorer {
        score: f64,
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl FixedScorer {
        fn new(score: f64) -> Self {
            Self {
                score,
                calls: AtomicUsize::new(0),
                fail_first: 0,
            }
        }

        fn failing_first(score: f64, failures: usize) -> Self {
            Self {
                score,
                calls: AtomicUsize::new(0),
                fail_first: failures,
            }
        }
    }

    #[async_trait]
    impl SentimentScorer for FixedScorer {
        async fn score(
            &self,
            _ticker: &str,
            _articles: &[NewsArticle],
        ) -> AnalysisResult<ScoredSentiment> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(AnalysisError::ModelUnavailable("refused".into()));
            }
            Ok(ScoredSentiment {
                score: self.score,
                reasoning: "headlines lean one way".to_string(),
            })
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), 1.0)
    }

    fn engine_with(
        articles: Vec<NewsArticle>,
        scorer: Arc<FixedScorer>,
    ) -> SentimentEngine {
        SentimentEngine::new(
            Arc::new(FixedProvider { articles }),
            scorer,
            fast_retry(),
            SentimentConfig::default(),
        )
    }

    #[tokio::test]
    async fn positive_score_is_labelled_positive() {
        let scorer = Arc::new(FixedScorer::new(0.6));
        let engine = engine_with(vec![article("beats estimates")], scorer);

        let report = engine.analyze("AAPL").await.unwrap();

        assert_eq!(report.sentiment_label, "Positive");
        assert_eq!(report.overall_sentiment, 0.6);
        assert_eq!(report.article_count, 1);
    }

    #[tokio::test]
    async fn scores_near_zero_are_neutral() {
        let scorer = Arc::new(FixedScorer::new(0.05));
        let engine = engine_with(vec![article("mixed quarter")], scorer);

        let report = engine.analyze("AAPL").await.unwrap();

        assert_eq!(report.sentiment_label, "Neutral");
    }

    #[tokio::test]
    async fn out_of_range_scores_are_clamped() {
        let scorer = Arc::new(FixedScorer::new(3.5));
        let engine = engine_with(vec![article("moonshot")], scorer);

        let report = engine.analyze("AAPL").await.unwrap();

        assert_eq!(report.overall_sentiment, 1.0);

        let scorer = Arc::new(FixedScorer::new(-2.0));
        let engine = engine_with(vec![article("collapse")], scorer);
        let report = engine.analyze("AAPL").await.unwrap();
        assert_eq!(report.overall_sentiment, -1.0);
        assert_eq!(report.sentiment_label, "Negative");
    }

    #[tokio::test]
    async fn zero_articles_is_no_articles_found() {
        let scorer = Arc::new(FixedScorer::new(0.5));
        let engine = engine_with(vec![], scorer);

        let result = engine.analyze("AAPL").await;

        assert!(matches!(result, Err(AnalysisError::NoArticlesFound(_))));
    }

    #[tokio::test]
    async fn transient_model_failures_are_retried() {
        let scorer = Arc::new(FixedScorer::failing_first(0.4, 2));
        let engine = engine_with(vec![article("recovers")], scorer.clone());

        let report = engine.analyze("AAPL").await.unwrap();

        assert_eq!(report.overall_sentiment, 0.4);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_degrade_to_neutral() {
        let scorer = Arc::new(FixedScorer::failing_first(0.4, 99));
        let engine = engine_with(vec![article("a"), article("b")], scorer.clone());

        let report = engine.analyze("AAPL").await.unwrap();

        assert_eq!(report.overall_sentiment, 0.0);
        assert_eq!(report.sentiment_label, "Neutral");
        assert!(report.reasoning.contains("unavailable"));
        assert_eq!(report.article_count, 2);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 3);
    }
}
