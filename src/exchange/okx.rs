use std::num::NonZeroU32;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tokio::time::sleep;

use super::{ExchangeClient, ExchangeError, OrderAck};
use crate::models::{Candle, OrderIntent, OrderType};

type HmacSha256 = Hmac<Sha256>;

const OKX_API_BASE: &str = "https://www.okx.com";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const REQUESTS_PER_SECOND: u32 = 10;
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

/// API credentials for private endpoints.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
}

/// OKX v5 REST client.
///
/// Public market data needs no credentials; balance and order endpoints are
/// HMAC-SHA256 signed. In paper mode `submit_order` never reaches the
/// network and returns a synthetic confirmation instead, so the caller's
/// state transitions are identical in simulated and live runs.
pub struct OkxClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    /// Demo-trading flag: private requests carry the x-simulated-trading header
    simulated: bool,
    paper: bool,
    limiter: DefaultDirectRateLimiter,
}

impl OkxClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<Credentials>,
        simulated: bool,
        paper: bool,
    ) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let quota = Quota::per_second(
            NonZeroU32::new(REQUESTS_PER_SECOND).expect("static nonzero quota"),
        );

        Ok(Self {
            http,
            base_url: base_url.into(),
            credentials,
            simulated,
            paper,
            limiter: RateLimiter::direct(quota),
        })
    }

    /// Build a client from `OKX_API_KEY` / `OKX_SECRET_KEY` / `OKX_PASSPHRASE`
    /// and the `OKX_TESTNET` flag (defaults to demo trading).
    pub fn from_env(paper: bool) -> Result<Self, ExchangeError> {
        let credentials = match (
            std::env::var("OKX_API_KEY"),
            std::env::var("OKX_SECRET_KEY"),
        ) {
            (Ok(api_key), Ok(secret_key)) => Some(Credentials {
                api_key,
                secret_key,
                passphrase: std::env::var("OKX_PASSPHRASE").unwrap_or_default(),
            }),
            _ => None,
        };

        let simulated = std::env::var("OKX_TESTNET")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true);
        if simulated {
            tracing::info!("Using OKX demo trading mode");
        }

        Self::new(OKX_API_BASE, credentials, simulated, paper)
    }

    fn credentials(&self) -> Result<&Credentials, ExchangeError> {
        self.credentials
            .as_ref()
            .ok_or(ExchangeError::MissingCredential("OKX_API_KEY"))
    }

    fn sign(creds: &Credentials, timestamp: &str, method: &str, path: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(creds.secret_key.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(format!("{timestamp}{method}{path}{body}").as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    fn auth_headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<Vec<(&'static str, String)>, ExchangeError> {
        let creds = self.credentials()?;
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        let signature = Self::sign(creds, &timestamp, method, path, body);

        let mut headers = vec![
            ("OK-ACCESS-KEY", creds.api_key.clone()),
            ("OK-ACCESS-SIGN", signature),
            ("OK-ACCESS-TIMESTAMP", timestamp),
            ("OK-ACCESS-PASSPHRASE", creds.passphrase.clone()),
        ];
        if self.simulated {
            headers.push(("x-simulated-trading", "1".to_string()));
        }
        Ok(headers)
    }

    async fn get_public<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<OkxResponse<T>, ExchangeError> {
        self.limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self.http.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExchangeError::RateLimited);
        }
        Ok(response.json().await?)
    }

    async fn get_private<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<OkxResponse<T>, ExchangeError> {
        self.limiter.until_ready().await;
        let headers = self.auth_headers("GET", path_and_query, "")?;
        let url = format!("{}{}", self.base_url, path_and_query);

        let mut request = self.http.get(&url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExchangeError::RateLimited);
        }
        Ok(response.json().await?)
    }

    async fn post_private<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<OkxResponse<T>, ExchangeError> {
        self.limiter.until_ready().await;
        let raw_body = body.to_string();
        let headers = self.auth_headers("POST", path, &raw_body)?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.body(raw_body).send().await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExchangeError::RateLimited);
        }
        Ok(response.json().await?)
    }

    /// Fetch candles once, without retry logic.
    async fn fetch_candles_once(
        &self,
        inst_id: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let path = format!(
            "/api/v5/market/candles?instId={}&bar={}&limit={}",
            inst_id,
            okx_bar(timeframe),
            limit
        );
        let response: OkxResponse<Vec<String>> = self.get_public(&path).await?;
        if response.code != "0" {
            return Err(ExchangeError::Malformed(format!(
                "candles request failed: code {}: {}",
                response.code, response.msg
            )));
        }

        // OKX returns newest first; the core wants oldest first
        let mut candles = Vec::with_capacity(response.data.len());
        for row in response.data.iter().rev() {
            candles.push(parse_candle_row(row)?);
        }
        Ok(candles)
    }

    /// Latest traded price, used by the manual order subcommand for market
    /// orders placed without an explicit reference price.
    pub async fn fetch_last_price(&self, inst_id: &str) -> Result<f64, ExchangeError> {
        let path = format!("/api/v5/market/ticker?instId={inst_id}");
        let response: OkxResponse<TickerData> = self.get_public(&path).await?;
        if response.code != "0" {
            return Err(ExchangeError::Malformed(format!(
                "ticker request failed: code {}: {}",
                response.code, response.msg
            )));
        }
        let ticker = response
            .data
            .first()
            .ok_or_else(|| ExchangeError::Malformed("empty ticker response".to_string()))?;
        ticker
            .last
            .parse()
            .map_err(|_| ExchangeError::Malformed(format!("bad last price: {}", ticker.last)))
    }

    /// Download instrument metadata for the `sync-markets` subcommand.
    pub async fn fetch_instruments(
        &self,
        inst_type: &str,
    ) -> Result<Vec<OkxInstrument>, ExchangeError> {
        let path = format!("/api/v5/public/instruments?instType={inst_type}");
        let response: OkxResponse<OkxInstrument> = self.get_public(&path).await?;
        if response.code != "0" {
            return Err(ExchangeError::Malformed(format!(
                "instruments request failed: code {}: {}",
                response.code, response.msg
            )));
        }
        Ok(response.data)
    }
}

#[async_trait::async_trait]
impl ExchangeClient for OkxClient {
    async fn fetch_candles(
        &self,
        inst_id: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.fetch_candles_once(inst_id, timeframe, limit).await {
                Ok(candles) => {
                    if attempt > 1 {
                        tracing::info!(
                            "Fetched {} candles after {} attempts",
                            candles.len(),
                            attempt
                        );
                    }
                    return Ok(candles);
                }
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                    tracing::warn!(
                        "Candle fetch attempt {}/{} failed: {}. Retrying in {}ms...",
                        attempt,
                        MAX_RETRIES,
                        e,
                        backoff_ms
                    );
                    last_error = Some(e);
                    sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(ExchangeError::RateLimited))
    }

    async fn fetch_free_balance(&self, ccy: &str) -> Result<f64, ExchangeError> {
        let path = format!("/api/v5/account/balance?ccy={ccy}");
        let response: OkxResponse<BalanceData> = self.get_private(&path).await?;
        if response.code != "0" {
            return Err(ExchangeError::Malformed(format!(
                "balance request failed: code {}: {}",
                response.code, response.msg
            )));
        }

        let free = response
            .data
            .first()
            .and_then(|account| account.details.iter().find(|d| d.ccy == ccy))
            .and_then(|d| d.avail_bal.parse::<f64>().ok())
            .unwrap_or(0.0);
        Ok(free)
    }

    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderAck, ExchangeError> {
        if self.paper {
            tracing::info!(
                "[paper] {} {} {} amount={} price={:?} reduce_only={}",
                intent.side.as_str(),
                intent.order_type.as_str(),
                intent.symbol,
                intent.amount,
                intent.price,
                intent.reduce_only
            );
            return Ok(OrderAck {
                order_id: format!("paper-{}", intent.client_order_id),
                client_order_id: intent.client_order_id.clone(),
                paper: true,
            });
        }

        let mut body = serde_json::json!({
            "instId": intent.symbol,
            "tdMode": intent.td_mode,
            "clOrdId": intent.client_order_id,
            "side": intent.side.as_str(),
            "ordType": intent.order_type.as_str(),
            "sz": intent.amount.to_string(),
        });
        if let Some(price) = intent.price {
            body["px"] = serde_json::Value::String(price.to_string());
        }
        if intent.reduce_only {
            body["reduceOnly"] = serde_json::Value::Bool(true);
        }
        if let Some(pos_side) = &intent.pos_side {
            body["posSide"] = serde_json::Value::String(pos_side.clone());
        }
        if intent.post_only && intent.order_type == OrderType::Limit {
            body["ordType"] = serde_json::Value::String("post_only".to_string());
        }

        let response: OkxResponse<OrderData> =
            self.post_private("/api/v5/trade/order", &body).await?;

        let placed = response.data.first();
        let s_code = placed.map(|d| d.s_code.as_str()).unwrap_or(&response.code);
        if response.code != "0" || s_code != "0" {
            let message = placed
                .map(|d| d.s_msg.clone())
                .filter(|m| !m.is_empty())
                .unwrap_or(response.msg);
            return Err(ExchangeError::Rejected {
                code: s_code.to_string(),
                message,
            });
        }

        let placed = placed
            .ok_or_else(|| ExchangeError::Malformed("order accepted with empty data".to_string()))?;
        Ok(OrderAck {
            order_id: placed.ord_id.clone(),
            client_order_id: placed.cl_ord_id.clone(),
            paper: false,
        })
    }
}

/// Map a timeframe like "5m"/"1h"/"1d" to OKX's bar parameter.
fn okx_bar(timeframe: &str) -> String {
    match timeframe.chars().last() {
        Some('h') | Some('d') | Some('w') => timeframe.to_uppercase(),
        _ => timeframe.to_string(),
    }
}

fn parse_candle_row(row: &[String]) -> Result<Candle, ExchangeError> {
    if row.len() < 6 {
        return Err(ExchangeError::Malformed(format!(
            "candle row has {} fields, expected at least 6",
            row.len()
        )));
    }
    let millis: i64 = row[0]
        .parse()
        .map_err(|_| ExchangeError::Malformed(format!("bad candle timestamp: {}", row[0])))?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| ExchangeError::Malformed(format!("candle timestamp out of range: {millis}")))?;

    let field = |i: usize| -> Result<f64, ExchangeError> {
        row[i]
            .parse()
            .map_err(|_| ExchangeError::Malformed(format!("bad candle field: {}", row[i])))
    };

    Ok(Candle {
        timestamp,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

#[derive(Debug, Deserialize)]
struct OkxResponse<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    last: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceData {
    details: Vec<BalanceDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceDetail {
    ccy: String,
    avail_bal: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderData {
    #[serde(default)]
    ord_id: String,
    #[serde(default)]
    cl_ord_id: String,
    #[serde(default)]
    s_code: String,
    #[serde(default)]
    s_msg: String,
}

/// Raw instrument row from /api/v5/public/instruments.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxInstrument {
    pub inst_id: String,
    #[serde(default)]
    pub uly: String,
    #[serde(default)]
    pub settle_ccy: String,
    #[serde(default)]
    pub ct_val: String,
    #[serde(default)]
    pub tick_sz: String,
    #[serde(default)]
    pub lot_sz: String,
    #[serde(default)]
    pub min_sz: String,
    #[serde(default)]
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{new_client_order_id, Side};

    fn paper_client(base_url: &str) -> OkxClient {
        OkxClient::new(base_url, None, true, true).unwrap()
    }

    fn live_client(base_url: &str) -> OkxClient {
        OkxClient::new(
            base_url,
            Some(Credentials {
                api_key: "key".to_string(),
                secret_key: "secret".to_string(),
                passphrase: "pass".to_string(),
            }),
            true,
            false,
        )
        .unwrap()
    }

    fn market_intent() -> OrderIntent {
        OrderIntent {
            symbol: "BTC-USDT-SWAP".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            amount: 0.002,
            price: None,
            client_order_id: new_client_order_id(),
            reduce_only: false,
            td_mode: "cross".to_string(),
            pos_side: None,
            post_only: false,
        }
    }

    #[test]
    fn test_okx_bar_mapping() {
        assert_eq!(okx_bar("5m"), "5m");
        assert_eq!(okx_bar("1h"), "1H");
        assert_eq!(okx_bar("1d"), "1D");
    }

    #[test]
    fn test_signature_is_deterministic() {
        let creds = Credentials {
            api_key: "k".to_string(),
            secret_key: "s".to_string(),
            passphrase: "p".to_string(),
        };
        let a = OkxClient::sign(&creds, "2024-01-01T00:00:00.000Z", "GET", "/api", "");
        let b = OkxClient::sign(&creds, "2024-01-01T00:00:00.000Z", "GET", "/api", "");
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_candles_parses_and_reorders() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{
            "code": "0",
            "msg": "",
            "data": [
                ["1700000600000", "101", "103", "100", "102", "20", "0", "0", "1"],
                ["1700000300000", "100", "102", "99", "101", "10", "0", "0", "1"]
            ]
        }"#;
        let _mock = server
            .mock("GET", "/api/v5/market/candles")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = paper_client(&server.url());
        let candles = client.fetch_candles("BTC-USDT-SWAP", "5m", 2).await.unwrap();

        assert_eq!(candles.len(), 2);
        // Oldest first after the reorder
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert_eq!(candles[0].close, 101.0);
        assert_eq!(candles[1].close, 102.0);
        assert_eq!(candles[1].volume, 20.0);
    }

    #[tokio::test]
    async fn test_fetch_free_balance_parses_detail() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{
            "code": "0",
            "msg": "",
            "data": [{"details": [
                {"ccy": "BTC", "availBal": "0.5"},
                {"ccy": "USDT", "availBal": "1234.5"}
            ]}]
        }"#;
        let _mock = server
            .mock("GET", "/api/v5/account/balance")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = live_client(&server.url());
        let free = client.fetch_free_balance("USDT").await.unwrap();
        assert_eq!(free, 1234.5);
    }

    #[tokio::test]
    async fn test_fetch_free_balance_missing_ccy_is_zero() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{"code": "0", "msg": "", "data": [{"details": []}]}"#;
        let _mock = server
            .mock("GET", "/api/v5/account/balance")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = live_client(&server.url());
        assert_eq!(client.fetch_free_balance("USDT").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_balance_without_credentials_fails() {
        let client = paper_client("http://127.0.0.1:1");
        let err = client.fetch_free_balance("USDT").await.unwrap_err();
        assert!(matches!(err, ExchangeError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn test_paper_submit_never_touches_network() {
        // Unroutable base url: a network call would error out
        let client = paper_client("http://127.0.0.1:1");
        let intent = market_intent();

        let ack = client.submit_order(&intent).await.unwrap();
        assert!(ack.paper);
        assert_eq!(ack.client_order_id, intent.client_order_id);
        assert_eq!(ack.order_id, format!("paper-{}", intent.client_order_id));
    }

    #[tokio::test]
    async fn test_live_submit_parses_confirmation() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{
            "code": "0",
            "msg": "",
            "data": [{"ordId": "123456", "clOrdId": "tbabc", "sCode": "0", "sMsg": ""}]
        }"#;
        let _mock = server
            .mock("POST", "/api/v5/trade/order")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = live_client(&server.url());
        let ack = client.submit_order(&market_intent()).await.unwrap();
        assert!(!ack.paper);
        assert_eq!(ack.order_id, "123456");
    }

    #[tokio::test]
    async fn test_live_submit_surfaces_rejection() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{
            "code": "1",
            "msg": "Operation failed.",
            "data": [{"ordId": "", "clOrdId": "tbabc", "sCode": "51121", "sMsg": "Order quantity must be a multiple of the lot size."}]
        }"#;
        let _mock = server
            .mock("POST", "/api/v5/trade/order")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = live_client(&server.url());
        let err = client.submit_order(&market_intent()).await.unwrap_err();
        match err {
            ExchangeError::Rejected { code, message } => {
                assert_eq!(code, "51121");
                assert!(message.contains("lot size"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_status_maps_to_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v5/market/ticker")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = paper_client(&server.url());
        let err = client.fetch_last_price("BTC-USDT-SWAP").await.unwrap_err();
        assert!(matches!(err, ExchangeError::RateLimited));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_instruments_parses_rows() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{
            "code": "0",
            "msg": "",
            "data": [{
                "instId": "BTC-USDT-SWAP",
                "uly": "BTC-USDT",
                "settleCcy": "USDT",
                "ctVal": "0.01",
                "tickSz": "0.1",
                "lotSz": "0.001",
                "minSz": "0.001",
                "state": "live"
            }]
        }"#;
        let _mock = server
            .mock("GET", "/api/v5/public/instruments")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = paper_client(&server.url());
        let instruments = client.fetch_instruments("SWAP").await.unwrap();
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].inst_id, "BTC-USDT-SWAP");
        assert_eq!(instruments[0].lot_sz, "0.001");
    }
}
