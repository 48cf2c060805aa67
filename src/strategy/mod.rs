// Trading strategy module
pub mod ema_rsi;

pub use ema_rsi::{EmaRsiStrategy, StrategyParams};

use thiserror::Error;

use crate::models::{Candle, Signal};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("insufficient data: {have} candles, need {need}")]
    InsufficientData { have: usize, need: usize },
}

/// The signal for the latest tick, plus the values it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub signal: Signal,
    /// Closing price of the latest candle, the reference price for sizing
    pub close: f64,
    pub fast: f64,
    pub slow: f64,
    pub oscillator: f64,
}

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Evaluate the latest tick of an ordered candle series.
    ///
    /// `in_position` gates which signals may fire: entries only from flat,
    /// exits only while holding.
    fn evaluate(&self, candles: &[Candle], in_position: bool)
        -> Result<Evaluation, StrategyError>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required before this strategy can decide anything
    fn min_candles(&self) -> usize;
}
