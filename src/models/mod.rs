use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One OHLCV candlestick.
///
/// Candle sequences handed to the strategy are ordered oldest-first with
/// strictly increasing timestamps; deduplication is the data source's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Trading signal derived from the latest tick
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Hold,
    EnterLong,
    ExitLong,
}

/// Per-symbol exchange metadata: quantization rules and order minimums.
///
/// Loaded once per run from the market catalog and immutable afterwards.
/// The catalog file is produced by the `sync-markets` subcommand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSpec {
    pub symbol: String,
    /// Exchange instrument id, e.g. "BTC-USDT-SWAP"
    pub id: String,
    pub base: String,
    pub quote: String,
    pub contract_size: Option<f64>,
    #[serde(default)]
    pub precision: MarketPrecision,
    #[serde(default)]
    pub limits: MarketLimits,
}

/// Decimal places for price and amount; `None` means unconstrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketPrecision {
    pub price: Option<u32>,
    pub amount: Option<u32>,
}

/// Exchange-imposed minimums; `None` means unconstrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketLimits {
    pub min_amount: Option<f64>,
    pub min_cost: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

/// One order to be submitted to the exchange.
///
/// Constructed fresh per tick and never persisted. `client_order_id` is the
/// idempotency token: the exchange must not create duplicate fills when the
/// same id is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub amount: f64,
    pub price: Option<f64>,
    pub client_order_id: String,
    pub reduce_only: bool,
    pub td_mode: String,
    pub pos_side: Option<String>,
    pub post_only: bool,
}

/// Generate a fresh client order id, unique per submission attempt.
///
/// Alphanumeric only; OKX caps client-supplied ids at 32 characters.
pub fn new_client_order_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("tb{}", &hex[..24])
}
