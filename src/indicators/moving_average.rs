/// Calculate the full Exponential Moving Average series.
///
/// Recursive form with `alpha = 2 / (period + 1)`, seeded with the first
/// value. Returns one EMA value per input value, so callers can compare the
/// latest tick against the one before it (crossover detection).
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = values[0];
    out.push(ema);

    for value in &values[1..] {
        ema = (value - ema) * alpha + ema;
        out.push(ema);
    }

    out
}
