use async_trait::async_trait;

use crate::{AnalysisResult, Bar, NewsArticle};

/// Upstream market-data source: historical bars plus recent headlines.
/// The HTTP implementation lives in the market-data crate; tests inject
/// mocks to count upstream calls.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_bars(
        &self,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> AnalysisResult<Vec<Bar>>;

    async fn fetch_news(&self, ticker: &str, limit: usize) -> AnalysisResult<Vec<NewsArticle>>;
}
