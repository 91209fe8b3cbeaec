use analysis_core::{IndicatorSeries, PriceSeries, SignalEvent, SignalKind};
use serde::{Deserialize, Serialize};

use crate::indicators::macd_series;

/// EMA spans for the crossover rule. Industry defaults, overridable
/// through configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub fast_span: usize,
    pub slow_span: usize,
    pub signal_span: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            fast_span: 12,
            slow_span: 26,
            signal_span: 9,
        }
    }
}

/// Compute MACD indicators over the series and derive buy/sell crossover
/// events. Events come out in date order; consecutive same-kind
/// crossovers are all emitted — matching unmatched pairs is the backtest
/// simulator's concern, not the generator's.
///
/// The first `slow_span` bars are excluded from crossover evaluation so
/// warm-up transients in the slow EMA cannot produce spurious signals,
/// but their indicator values stay in the returned arrays for charting.
pub fn compute_signals(
    series: &PriceSeries,
    config: &SignalConfig,
) -> (IndicatorSeries, Vec<SignalEvent>) {
    let closes = series.closes();
    let indicators = macd_series(
        &closes,
        config.fast_span,
        config.slow_span,
        config.signal_span,
    );

    let mut events = Vec::new();
    let start = config.slow_span.max(1);

    for i in start..series.bars.len() {
        let prev_macd = indicators.macd[i - 1];
        let prev_signal = indicators.signal_line[i - 1];
        let macd = indicators.macd[i];
        let signal = indicators.signal_line[i];

        let kind = if prev_macd <= prev_signal && macd > signal {
            Some(SignalKind::Buy)
        } else if prev_macd >= prev_signal && macd < signal {
            Some(SignalKind::Sell)
        } else {
            None
        };

        if let Some(kind) = kind {
            events.push(SignalEvent {
                date: series.bars[i].date,
                price: series.bars[i].close,
                kind,
            });
        }
    }

    tracing::debug!(
        "Generated {} signal events over {} bars for {}",
        events.len(),
        series.bars.len(),
        series.ticker
    );

    (indicators, events)
}
