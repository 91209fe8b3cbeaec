use analysis_core::{BacktestReport, PriceSeries, SignalEvent, SignalKind, Trade};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Fraction of notional charged per transaction, e.g. 0.001 = 0.1%.
    pub fee_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            fee_rate: 0.001,
        }
    }
}

struct OpenPosition {
    entry_date: DateTime<Utc>,
    entry_price: f64,
    quantity: f64,
    committed: f64,
    fee: f64,
}

/// Replay signal events against a synthetic account. Single open
/// position at a time: a buy while holding is a no-op, a sell while flat
/// is ignored. A position still open at series end is marked-to-market
/// at the last close for final value but excluded from the win-rate
/// denominator.
pub fn simulate(
    signals: &[SignalEvent],
    series: &PriceSeries,
    config: &BacktestConfig,
) -> BacktestReport {
    let mut capital = config.initial_capital;
    let mut position: Option<OpenPosition> = None;
    let mut trades: Vec<Trade> = Vec::new();

    for event in signals {
        match event.kind {
            SignalKind::Buy => {
                if position.is_none() && event.price > 0.0 {
                    let fee = config.fee_rate * capital;
                    let quantity = (capital - fee) / event.price;
                    position = Some(OpenPosition {
                        entry_date: event.date,
                        entry_price: event.price,
                        quantity,
                        committed: capital,
                        fee,
                    });
                    capital = 0.0;
                }
            }
            SignalKind::Sell => {
                if let Some(open) = position.take() {
                    let proceeds = open.quantity * event.price * (1.0 - config.fee_rate);
                    let exit_fee = open.quantity * event.price * config.fee_rate;
                    let profit = proceeds - open.committed;
                    trades.push(Trade {
                        entry_date: open.entry_date,
                        entry_price: open.entry_price,
                        exit_date: event.date,
                        exit_price: event.price,
                        quantity: open.quantity,
                        fee: open.fee + exit_fee,
                        profit,
                    });
                    capital = proceeds;
                }
            }
        }
    }

    // Mark any open position to the last close.
    let final_value = match (&position, series.last_bar()) {
        (Some(open), Some(last)) => capital + open.quantity * last.close,
        _ => capital,
    };

    let closed = trades.len();
    let wins = trades.iter().filter(|t| t.profit > 0.0).count();
    let win_rate = if closed > 0 {
        wins as f64 / closed as f64 * 100.0
    } else {
        0.0
    };

    let total_profit = final_value - config.initial_capital;
    let roi = if config.initial_capital > 0.0 {
        total_profit / config.initial_capital * 100.0
    } else {
        0.0
    };

    tracing::debug!(
        "Backtest for {}: {} closed trades, final value {:.2}",
        series.ticker,
        closed,
        final_value
    );

    BacktestReport {
        total_profit,
        roi,
        final_value,
        win_rate,
        trade_count: closed,
        trades,
    }
}
