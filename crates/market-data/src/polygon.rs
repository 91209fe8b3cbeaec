use analysis_core::{AnalysisError, AnalysisResult, Bar, MarketDataProvider, NewsArticle};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let wait_until = ts.front().unwrap().checked_add(self.window).unwrap();
            let sleep_dur = wait_until.duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for upstream slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// HTTP client for the Polygon aggregates and news endpoints.
#[derive(Clone)]
pub struct PolygonProvider {
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
    retry_429_wait: Duration,
}

impl PolygonProvider {
    pub fn new(api_key: String, requests_per_minute: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            rate_limiter: RateLimiter::new(requests_per_minute, Duration::from_secs(60)),
            retry_429_wait: Duration::from_secs(15),
        }
    }

    /// Send a request with rate limiting and bounded 429 retry. A 429
    /// surviving all retries surfaces as `UpstreamRateLimited` so the
    /// caller-side retry policy can take over.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> AnalysisResult<reqwest::Response> {
        let request = builder
            .build()
            .map_err(|e| AnalysisError::DataUnavailable(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| AnalysisError::DataUnavailable("cannot clone request".into()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| AnalysisError::DataUnavailable(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            tracing::warn!(
                "Upstream 429, waiting {:?} before retry {}/3",
                self.retry_429_wait,
                attempt + 1
            );
            tokio::time::sleep(self.retry_429_wait).await;
        }

        Err(AnalysisError::UpstreamRateLimited(
            "throttled by upstream after 3 retries".into(),
        ))
    }

    fn days_for_period(period: &str) -> i64 {
        match period {
            "1mo" => 31,
            "3mo" => 93,
            "6mo" => 186,
            "1y" => 365,
            "2y" => 730,
            "5y" => 1826,
            "max" => 7300,
            _ => 365,
        }
    }

    fn range_for_interval(interval: &str) -> (u32, &'static str) {
        match interval {
            "1h" => (1, "hour"),
            "1wk" => (1, "week"),
            _ => (1, "day"),
        }
    }
}

#[async_trait]
impl MarketDataProvider for PolygonProvider {
    async fn fetch_bars(
        &self,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> AnalysisResult<Vec<Bar>> {
        let (multiplier, timespan) = Self::range_for_interval(interval);
        let to = Utc::now();
        let from = to - ChronoDuration::days(Self::days_for_period(period));

        let url = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            BASE_URL,
            ticker,
            multiplier,
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        if response.status().as_u16() == 404 {
            return Err(AnalysisError::DataUnavailable(format!(
                "unknown ticker {}",
                ticker
            )));
        }
        if !response.status().is_success() {
            return Err(AnalysisError::DataUnavailable(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let agg: AggregateResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::DataUnavailable(e.to_string()))?;

        let bars: Vec<Bar> = agg
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                DateTime::from_timestamp_millis(r.t).map(|date| Bar {
                    date,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                })
            })
            .collect();

        if bars.is_empty() {
            return Err(AnalysisError::DataUnavailable(format!(
                "upstream returned no bars for {}",
                ticker
            )));
        }

        Ok(bars)
    }

    async fn fetch_news(&self, ticker: &str, limit: usize) -> AnalysisResult<Vec<NewsArticle>> {
        let url = format!("{}/v2/reference/news", BASE_URL);

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.clone()),
                ("ticker", ticker.to_string()),
                ("limit", limit.to_string()),
                ("sort", "published_utc".to_string()),
                ("order", "desc".to_string()),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(AnalysisError::DataUnavailable(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let news: NewsResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::DataUnavailable(e.to_string()))?;

        Ok(news
            .results
            .unwrap_or_default()
            .into_iter()
            .map(|r| NewsArticle {
                title: r.title,
                description: r.description,
                source: r.publisher.map(|p| p.name).unwrap_or_default(),
                url: r.article_url,
                published_utc: DateTime::parse_from_rfc3339(&r.published_utc)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                tickers: r.tickers.unwrap_or_default(),
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct AggregateResponse {
    results: Option<Vec<AggregateBar>>,
}

#[derive(Deserialize)]
struct AggregateBar {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[derive(Deserialize)]
struct NewsResponse {
    results: Option<Vec<NewsItem>>,
}

#[derive(Deserialize)]
struct NewsItem {
    title: String,
    description: Option<String>,
    article_url: String,
    published_utc: String,
    publisher: Option<Publisher>,
    tickers: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct Publisher {
    name: String,
}
