use analysis_core::{AnalysisError, AnalysisResult, ForecastResult, PriceSeries};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::model::RecurrentNet;
use crate::scaler::MinMaxScaler;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Lookback window length fed to the network.
    pub window: usize,
    /// Default forecast horizon in steps.
    pub horizon: usize,
    pub hidden_units: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Fraction of the series used for training; the tail is held out
    /// for validation loss reporting.
    pub train_fraction: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            window: 60,
            horizon: 7,
            hidden_units: 16,
            epochs: 40,
            learning_rate: 0.02,
            train_fraction: 0.9,
        }
    }
}

/// Identity of the series a model was trained on. A changed fingerprint
/// (new bars, different range) invalidates the cached model, so a stale
/// price series can never silently serve a stale forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Fingerprint {
    bars: usize,
    last_date: DateTime<Utc>,
}

struct TrainedModel {
    net: RecurrentNet,
    scaler: MinMaxScaler,
    fingerprint: Fingerprint,
}

/// Short-horizon price forecaster with a per-ticker trained-model
/// registry. At most one training run per ticker is in flight at a
/// time; concurrent requesters wait on it and reuse the result.
pub struct Forecaster {
    config: ForecastConfig,
    registry: DashMap<String, Arc<TrainedModel>>,
    training: DashMap<String, Arc<Mutex<()>>>,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self {
            config,
            registry: DashMap::new(),
            training: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Autoregressive multi-step forecast. Seeds with the last `window`
    /// known closes and feeds each prediction back as input for the
    /// next step, de-normalizing before returning.
    pub async fn forecast(
        &self,
        series: &PriceSeries,
        horizon: usize,
    ) -> AnalysisResult<ForecastResult> {
        let closes = series.closes();
        let required = self.config.window + 1;
        if closes.len() < required {
            return Err(AnalysisError::InsufficientHistory {
                required,
                available: closes.len(),
            });
        }

        let last_date = series.last_bar().expect("non-empty series").date;
        let fingerprint = Fingerprint {
            bars: closes.len(),
            last_date,
        };

        let model = self.model_for(&series.ticker, &closes, fingerprint).await?;

        let mut window: Vec<f64> = closes[closes.len() - self.config.window..]
            .iter()
            .map(|&v| model.scaler.transform(v))
            .collect();

        let mut predictions = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let next = model.net.predict(&window);
            predictions.push(model.scaler.invert(next));
            window.remove(0);
            window.push(next);
        }

        let prediction_dates = (1..=horizon as i64)
            .map(|i| (last_date + Duration::days(i)).format("%Y-%m-%d").to_string())
            .collect();

        Ok(ForecastResult {
            prediction_dates,
            predictions,
        })
    }

    /// Fetch the cached model for this ticker, or train one under the
    /// per-ticker flight lock.
    async fn model_for(
        &self,
        ticker: &str,
        closes: &[f64],
        fingerprint: Fingerprint,
    ) -> AnalysisResult<Arc<TrainedModel>> {
        if let Some(existing) = self.registry.get(ticker) {
            if existing.fingerprint == fingerprint {
                return Ok(existing.clone());
            }
        }

        let lock = self
            .training
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A concurrent requester may have finished training while this
        // one waited on the lock.
        if let Some(existing) = self.registry.get(ticker) {
            if existing.fingerprint == fingerprint {
                return Ok(existing.clone());
            }
        }

        tracing::info!(
            "Training forecast model for {} over {} bars",
            ticker,
            closes.len()
        );

        let config = self.config.clone();
        let owned_closes = closes.to_vec();
        let seed = seed_for(ticker, &fingerprint);

        let model = tokio::task::spawn_blocking(move || {
            train_model(&owned_closes, &config, fingerprint, seed)
        })
        .await
        .map_err(|e| AnalysisError::ModelUnavailable(format!("training task failed: {e}")))?;

        let model = Arc::new(model);
        self.registry.insert(ticker.to_string(), model.clone());
        Ok(model)
    }
}

fn seed_for(ticker: &str, fingerprint: &Fingerprint) -> u64 {
    let mut hasher = DefaultHasher::new();
    ticker.hash(&mut hasher);
    fingerprint.hash(&mut hasher);
    hasher.finish()
}

fn train_model(
    closes: &[f64],
    config: &ForecastConfig,
    fingerprint: Fingerprint,
    seed: u64,
) -> TrainedModel {
    let window = config.window;
    let n = closes.len();

    // Scaler statistics come from the training slice only.
    let n_train = ((n as f64 * config.train_fraction) as usize)
        .max(window + 1)
        .min(n);
    let scaler = MinMaxScaler::fit(&closes[..n_train]);
    let normalized = scaler.transform_all(closes);

    let mut train_inputs = Vec::new();
    let mut train_targets = Vec::new();
    let mut val_inputs = Vec::new();
    let mut val_targets = Vec::new();

    for i in 0..n - window {
        let input = normalized[i..i + window].to_vec();
        let target = normalized[i + window];
        if i + window < n_train {
            train_inputs.push(input);
            train_targets.push(target);
        } else {
            val_inputs.push(input);
            val_targets.push(target);
        }
    }

    let mut net = RecurrentNet::new(config.hidden_units, seed);
    let train_loss = net.fit(
        &train_inputs,
        &train_targets,
        config.epochs,
        config.learning_rate,
    );
    let val_loss = net.evaluate(&val_inputs, &val_targets);

    tracing::info!(
        "Model trained: {} train windows, {} val windows, train loss {:.6}, val loss {:.6}",
        train_inputs.len(),
        val_inputs.len(),
        train_loss,
        val_loss
    );

    TrainedModel {
        net,
        scaler,
        fingerprint,
    }
}
