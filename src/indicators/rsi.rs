/// Calculate the latest Relative Strength Index (RSI) value.
///
/// Smoothed with an exponential average of gains and losses using
/// `alpha = 1 / period` (Wilder form), seeded with the first change. A small
/// epsilon keeps the gain ratio finite when the lookback contains no downward
/// movement, so the oscillator saturates near 100 instead of dividing by zero.
///
/// Values:
/// - RSI > 70: overbought
/// - RSI < 30: oversold
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let alpha = 1.0 / period as f64;
    let mut avg_gain = (prices[1] - prices[0]).max(0.0);
    let mut avg_loss = (prices[0] - prices[1]).max(0.0);

    for window in prices[1..].windows(2) {
        let change = window[1] - window[0];
        avg_gain = (change.max(0.0) - avg_gain) * alpha + avg_gain;
        avg_loss = ((-change).max(0.0) - avg_loss) * alpha + avg_loss;
    }

    let rs = avg_gain / (avg_loss + 1e-12);
    Some(100.0 - (100.0 / (1.0 + rs)))
}
