use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AnalysisError {
    #[error("No data available: {0}")]
    DataUnavailable(String),

    #[error("Upstream rate limited: {0}")]
    UpstreamRateLimited(String),

    #[error("Insufficient history: need at least {required} bars, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("No recent articles found: {0}")]
    NoArticlesFound(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl AnalysisError {
    /// Whether a bounded retry with backoff is worth attempting.
    /// Rate limits and unreachable model backends are transient; bad
    /// tickers, short histories and empty news feeds are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::UpstreamRateLimited(_) | AnalysisError::ModelUnavailable(_)
        )
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
