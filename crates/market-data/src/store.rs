use analysis_core::{AnalysisError, AnalysisResult, Bar, MarketDataProvider, PriceSeries};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

type SeriesKey = (String, String, String);
type FetchOutcome = AnalysisResult<Arc<PriceSeries>>;

struct CacheEntry {
    series: Arc<PriceSeries>,
    fetched_at: Instant,
}

/// TTL cache over the upstream provider with single-flight fetch
/// semantics: concurrent lookups for the same (ticker, period, interval)
/// collapse into one upstream call, and every waiter observes the same
/// series or the same failure.
pub struct PriceStore {
    provider: Arc<dyn MarketDataProvider>,
    cache: DashMap<SeriesKey, CacheEntry>,
    inflight: DashMap<SeriesKey, Arc<OnceCell<FetchOutcome>>>,
    ttl: Duration,
}

impl PriceStore {
    pub fn new(provider: Arc<dyn MarketDataProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            cache: DashMap::new(),
            inflight: DashMap::new(),
            ttl,
        }
    }

    pub async fn get_series(
        &self,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> FetchOutcome {
        let key: SeriesKey = (
            ticker.to_uppercase(),
            period.to_string(),
            interval.to_string(),
        );

        if let Some(entry) = self.cache.get(&key) {
            if entry.fetched_at.elapsed() < self.ttl {
                tracing::debug!("Cache hit for {}:{}:{}", key.0, key.1, key.2);
                return Ok(entry.series.clone());
            }
        }

        let cell = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = cell
            .get_or_init(|| async {
                // Re-check under the flight guard: another caller may have
                // refreshed the entry while this one queued.
                if let Some(entry) = self.cache.get(&key) {
                    if entry.fetched_at.elapsed() < self.ttl {
                        return Ok(entry.series.clone());
                    }
                }

                tracing::info!("Fetching fresh data for {}:{}:{}", key.0, key.1, key.2);
                match self.provider.fetch_bars(&key.0, &key.1, &key.2).await {
                    Ok(raw) => {
                        let bars = clean_bars(raw);
                        if bars.is_empty() {
                            return Err(AnalysisError::DataUnavailable(format!(
                                "no usable rows for {}",
                                key.0
                            )));
                        }
                        let series = Arc::new(PriceSeries {
                            ticker: key.0.clone(),
                            period: key.1.clone(),
                            interval: key.2.clone(),
                            bars,
                        });
                        self.cache.insert(
                            key.clone(),
                            CacheEntry {
                                series: series.clone(),
                                fetched_at: Instant::now(),
                            },
                        );
                        Ok(series)
                    }
                    Err(err) => Err(err),
                }
            })
            .await
            .clone();

        // Drop the flight record so a later miss (or a failure) starts a
        // fresh upstream call instead of replaying this outcome forever.
        self.inflight.remove(&key);

        outcome
    }
}

/// Drop rows with a non-finite or non-positive close, coalesce duplicate
/// dates keeping the last, and sort ascending.
fn clean_bars(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.retain(|b| b.close.is_finite() && b.close > 0.0);
    bars.sort_by_key(|b| b.date);

    let mut cleaned: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match cleaned.last() {
            Some(last) if last.date == bar.date => {
                *cleaned.last_mut().unwrap() = bar;
            }
            _ => cleaned.push(bar),
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::NewsArticle;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            date: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000_000.0,
        }
    }

    struct CountingProvider {
        fetches: AtomicUsize,
        fail: bool,
    }

    impl CountingProvider {
        fn new(fail: bool) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for CountingProvider {
        async fn fetch_bars(
            &self,
            ticker: &str,
            _period: &str,
            _interval: &str,
        ) -> AnalysisResult<Vec<Bar>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            // Give concurrent lookups time to pile onto the same flight.
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(AnalysisError::DataUnavailable(ticker.to_string()));
            }
            Ok(vec![bar(1, 100.0), bar(2, 101.0), bar(3, 102.0)])
        }

        async fn fetch_news(
            &self,
            _ticker: &str,
            _limit: usize,
        ) -> AnalysisResult<Vec<NewsArticle>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn concurrent_misses_trigger_one_upstream_fetch() {
        let provider = Arc::new(CountingProvider::new(false));
        let store = Arc::new(PriceStore::new(
            provider.clone(),
            Duration::from_secs(300),
        ));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.get_series("AAPL", "1y", "1d").await
            }));
        }

        for handle in handles {
            let series = handle.await.unwrap().unwrap();
            assert_eq!(series.len(), 3);
        }

        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_waiters_share_the_same_failure() {
        let provider = Arc::new(CountingProvider::new(true));
        let store = Arc::new(PriceStore::new(
            provider.clone(),
            Duration::from_secs(300),
        ));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.get_series("AAPL", "1y", "1d").await
            }));
        }

        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(AnalysisError::DataUnavailable(_))
            ));
        }

        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hit_within_ttl_skips_upstream() {
        let provider = Arc::new(CountingProvider::new(false));
        let store = PriceStore::new(provider.clone(), Duration::from_secs(300));

        store.get_series("MSFT", "1y", "1d").await.unwrap();
        store.get_series("MSFT", "1y", "1d").await.unwrap();
        store.get_series("msft", "1y", "1d").await.unwrap();

        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_refetches() {
        let provider = Arc::new(CountingProvider::new(false));
        let store = PriceStore::new(provider.clone(), Duration::ZERO);

        store.get_series("MSFT", "1y", "1d").await.unwrap();
        store.get_series("MSFT", "1y", "1d").await.unwrap();

        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cleaning_drops_bad_rows_and_coalesces_duplicates() {
        let mut rows = vec![bar(3, 103.0), bar(1, 100.0), bar(2, f64::NAN), bar(2, -5.0)];
        rows.push(bar(1, 99.0)); // duplicate date, later row wins

        let cleaned = clean_bars(rows);

        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].close, 99.0);
        assert_eq!(cleaned[1].close, 103.0);
        assert!(cleaned.windows(2).all(|w| w[0].date < w[1].date));
    }
}
