// Exchange connectivity module
pub mod okx;

pub use okx::OkxClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Candle, OrderIntent};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("rate limited by exchange")]
    RateLimited,
    #[error("order rejected by exchange: code {code}: {message}")]
    Rejected { code: String, message: String },
    #[error("unexpected exchange response: {0}")]
    Malformed(String),
    #[error("missing credential {0} in environment")]
    MissingCredential(&'static str),
}

impl ExchangeError {
    /// Transient conditions are worth retrying on the next tick; everything
    /// else needs operator attention.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Network(_) | ExchangeError::RateLimited)
    }
}

/// Confirmation of an accepted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub client_order_id: String,
    /// True when the order was simulated rather than sent to the exchange
    pub paper: bool,
}

/// Capability surface the execution core consumes.
///
/// Implementations must honor the intent's `client_order_id` as an
/// idempotency token: resubmitting the same id must not double-fill.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Fetch up to `limit` candles, oldest first, strictly increasing timestamps.
    async fn fetch_candles(
        &self,
        inst_id: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Free (available) balance for one currency.
    async fn fetch_free_balance(&self, ccy: &str) -> Result<f64, ExchangeError>;

    /// Submit an order; a paper-mode implementation returns a synthetic
    /// confirmation of the same shape as a live one.
    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderAck, ExchangeError>;
}
