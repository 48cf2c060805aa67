use serde::Deserialize;

use super::{Evaluation, Strategy, StrategyError};
use crate::indicators::{calculate_rsi, ema_series};
use crate::models::{Candle, Signal};

/// Parameters for the EMA crossover + RSI gate strategy
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyParams {
    #[serde(default = "default_fast_ema")]
    pub fast_ema: usize,
    #[serde(default = "default_slow_ema")]
    pub slow_ema: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_entry")]
    pub rsi_entry: f64,
    #[serde(default = "default_rsi_exit")]
    pub rsi_exit: f64,
}

fn default_fast_ema() -> usize {
    20
}
fn default_slow_ema() -> usize {
    50
}
fn default_rsi_period() -> usize {
    14
}
fn default_rsi_entry() -> f64 {
    52.0
}
fn default_rsi_exit() -> f64 {
    48.0
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            fast_ema: 20,
            slow_ema: 50,
            rsi_period: 14,
            rsi_entry: 52.0,
            rsi_exit: 48.0,
        }
    }
}

/// Trend-following long-only strategy.
///
/// Enters when the fast EMA crosses above the slow EMA while RSI confirms
/// momentum at or above the entry threshold; exits on the opposite cross or
/// when RSI falls to the exit threshold. Crosses are evaluated strictly
/// between the latest tick and the one immediately before it.
#[derive(Debug, Clone)]
pub struct EmaRsiStrategy {
    params: StrategyParams,
}

impl EmaRsiStrategy {
    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }
}

impl Default for EmaRsiStrategy {
    fn default() -> Self {
        Self::new(StrategyParams::default())
    }
}

impl Strategy for EmaRsiStrategy {
    fn evaluate(
        &self,
        candles: &[Candle],
        in_position: bool,
    ) -> Result<Evaluation, StrategyError> {
        let need = self.min_candles();
        let have = candles.len();
        if have < need {
            return Err(StrategyError::InsufficientData { have, need });
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast = ema_series(&closes, self.params.fast_ema);
        let slow = ema_series(&closes, self.params.slow_ema);
        let rsi = calculate_rsi(&closes, self.params.rsi_period)
            .ok_or(StrategyError::InsufficientData { have, need })?;

        let n = closes.len();
        let cross_up = fast[n - 1] > slow[n - 1] && fast[n - 2] <= slow[n - 2];
        let cross_down = fast[n - 1] < slow[n - 1] && fast[n - 2] >= slow[n - 2];

        let signal = if !in_position && cross_up && rsi >= self.params.rsi_entry {
            Signal::EnterLong
        } else if in_position && (cross_down || rsi <= self.params.rsi_exit) {
            Signal::ExitLong
        } else {
            Signal::Hold
        };

        Ok(Evaluation {
            signal,
            close: closes[n - 1],
            fast: fast[n - 1],
            slow: slow[n - 1],
            oscillator: rsi,
        })
    }

    fn name(&self) -> &str {
        "EmaRsiStrategy"
    }

    fn min_candles(&self) -> usize {
        self.params.slow_ema.max(self.params.rsi_period) + 2
    }
}
