//! Quantization of order values to exchange tick/lot rules.
//!
//! Rounding always truncates, so a rounded order never exceeds the
//! risk-sized target. Pure functions of their inputs.

use crate::models::MarketSpec;

/// Round price and amount down to the market's decimal places.
///
/// A missing precision leaves that field unchanged.
pub fn quantize(market: &MarketSpec, price: f64, amount: f64) -> (f64, f64) {
    let price = match market.precision.price {
        Some(decimals) => truncate_to_decimals(price, decimals),
        None => price,
    };
    let amount = match market.precision.amount {
        Some(decimals) => truncate_to_decimals(amount, decimals),
        None => amount,
    };
    (price, amount)
}

fn truncate_to_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).floor() / factor
}

/// Check the exchange's minimum amount and minimum cost (price * amount).
///
/// Absent limits are unconstrained.
pub fn meets_min_limits(market: &MarketSpec, price: f64, amount: f64) -> bool {
    if let Some(min_amount) = market.limits.min_amount {
        if amount < min_amount {
            return false;
        }
    }
    if let Some(min_cost) = market.limits.min_cost {
        if price * amount < min_cost {
            return false;
        }
    }
    true
}
