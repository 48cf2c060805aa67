// Technical indicators module
// Implements the EMA and RSI used by the trend-following strategy

pub mod moving_average;
pub mod rsi;

pub use moving_average::ema_series;
pub use rsi::calculate_rsi;
