use analysis_core::IndicatorSeries;

/// Exponential moving average over `span` periods, smoothing factor
/// 2 / (span + 1), seeded with the first value. Output is the same
/// length as the input so indicator arrays stay aligned with dates.
pub fn ema(data: &[f64], span: usize) -> Vec<f64> {
    if data.is_empty() || span == 0 {
        return vec![];
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut result = Vec::with_capacity(data.len());
    result.push(data[0]);

    for i in 1..data.len() {
        let prev = result[i - 1];
        result.push(alpha * data[i] + (1.0 - alpha) * prev);
    }

    result
}

/// MACD line, signal line and the underlying EMAs, all aligned to the
/// input closes.
pub fn macd_series(
    closes: &[f64],
    fast_span: usize,
    slow_span: usize,
    signal_span: usize,
) -> IndicatorSeries {
    let ema_fast = ema(closes, fast_span);
    let ema_slow = ema(closes, slow_span);

    let macd: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(fast, slow)| fast - slow)
        .collect();

    let signal_line = ema(&macd, signal_span);

    IndicatorSeries {
        macd,
        signal_line,
        ema_fast,
        ema_slow,
    }
}
