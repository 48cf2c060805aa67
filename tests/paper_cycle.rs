//! End-to-end paper run: two ticks through the real strategy, a scripted
//! exchange, and the file-backed state store. The first tick enters on a
//! fast/slow crossover, the second exits on the reversal, and the durable
//! record tracks both transitions.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use trendbot::config::AppConfig;
use trendbot::exchange::{ExchangeClient, ExchangeError, OrderAck};
use trendbot::execution::{Orchestrator, TickOutcome};
use trendbot::models::{
    Candle, MarketLimits, MarketPrecision, MarketSpec, OrderIntent, Side,
};
use trendbot::risk::RiskManager;
use trendbot::state::{FileStateStore, PositionState, StateStore};
use trendbot::strategy::{EmaRsiStrategy, Strategy, StrategyParams};

const SYMBOL: &str = "BTC/USDT:USDT";
const TIMEFRAME: &str = "5m";

/// Serves one pre-scripted candle series per tick and records every order.
struct ScriptedExchange {
    series: Mutex<VecDeque<Vec<Candle>>>,
    orders: Mutex<Vec<OrderIntent>>,
}

impl ScriptedExchange {
    fn new(series: Vec<Vec<Candle>>) -> Self {
        Self {
            series: Mutex::new(series.into()),
            orders: Mutex::new(Vec::new()),
        }
    }

    fn orders(&self) -> Vec<OrderIntent> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    async fn fetch_candles(
        &self,
        _inst_id: &str,
        _timeframe: &str,
        _limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        Ok(self
            .series
            .lock()
            .unwrap()
            .pop_front()
            .expect("test script ran out of candle series"))
    }

    async fn fetch_free_balance(&self, _ccy: &str) -> Result<f64, ExchangeError> {
        Ok(1000.0)
    }

    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderAck, ExchangeError> {
        self.orders.lock().unwrap().push(intent.clone());
        Ok(OrderAck {
            order_id: format!("paper-{}", intent.client_order_id),
            client_order_id: intent.client_order_id.clone(),
            paper: true,
        })
    }
}

fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: start + Duration::minutes(5 * i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 500.0,
        })
        .collect()
}

fn test_config() -> AppConfig {
    serde_json::from_value(serde_json::json!({
        "symbol": SYMBOL,
        "timeframe": TIMEFRAME,
        "risk": {
            "max_position_notional": 10_000.0,
            "max_order_notional": 200.0,
            "order_fraction_of_balance": 0.1
        },
        "strategy": {
            "fast_ema": 2,
            "slow_ema": 5,
            "rsi_period": 14,
            "rsi_entry": 52.0,
            "rsi_exit": 48.0
        }
    }))
    .unwrap()
}

fn test_market() -> MarketSpec {
    MarketSpec {
        symbol: SYMBOL.to_string(),
        id: "BTC-USDT-SWAP".to_string(),
        base: "BTC".to_string(),
        quote: "USDT".to_string(),
        contract_size: None,
        precision: MarketPrecision {
            price: Some(1),
            amount: Some(3),
        },
        limits: MarketLimits {
            min_amount: Some(0.001),
            min_cost: None,
        },
    }
}

#[tokio::test]
async fn test_full_paper_cycle_enter_then_exit() {
    // Tick 1: slow decline then a violent rally -> fast EMA crosses above slow
    let mut entry_closes: Vec<f64> = (0..30).map(|i| 110.0 - 0.3 * i as f64).collect();
    entry_closes.push(160.0);

    // Tick 2: the rally collapses -> fast EMA crosses back under slow
    let mut exit_closes = entry_closes.clone();
    exit_closes.push(60.0);

    let exchange = ScriptedExchange::new(vec![
        candles_from_closes(&entry_closes),
        candles_from_closes(&exit_closes),
    ]);

    let cfg = test_config();
    let state_dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(state_dir.path()).unwrap();
    let strategy: Box<dyn Strategy> = Box::new(EmaRsiStrategy::new(StrategyParams {
        fast_ema: 2,
        slow_ema: 5,
        rsi_period: 14,
        rsi_entry: 52.0,
        rsi_exit: 48.0,
    }));
    let risk = RiskManager::new(cfg.risk.clone());
    let orchestrator = Orchestrator::new(exchange, store, strategy, risk, test_market(), cfg);

    // --- Tick 1: entry ---
    let outcome = orchestrator.run_tick().await.unwrap();
    let entry_amount = match outcome {
        TickOutcome::Entered { amount, .. } => amount,
        other => panic!("expected entry on tick 1, got {other:?}"),
    };
    // 1000 free * 0.1 = 100 USDT at 160 -> 0.625, already on the lot grid
    assert_eq!(entry_amount, 0.625);

    let state = orchestrator.store().load(SYMBOL, TIMEFRAME).unwrap();
    assert_eq!(state, PositionState::open(0.625));
    assert!(state.is_consistent());

    // --- Tick 2: exit ---
    let outcome = orchestrator.run_tick().await.unwrap();
    match outcome {
        TickOutcome::Exited { amount, .. } => assert_eq!(amount, 0.625),
        other => panic!("expected exit on tick 2, got {other:?}"),
    }

    let state = orchestrator.store().load(SYMBOL, TIMEFRAME).unwrap();
    assert_eq!(state, PositionState::flat());
    assert!(state.is_consistent());

    // --- Orders: one entry, one reduce-only exit, fresh idempotency tokens ---
    let orders = orchestrator.exchange().orders();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].side, Side::Buy);
    assert!(!orders[0].reduce_only);
    assert_eq!(orders[1].side, Side::Sell);
    assert!(orders[1].reduce_only);
    assert_eq!(orders[1].amount, 0.625);
    assert_ne!(orders[0].client_order_id, orders[1].client_order_id);

    // --- The record on disk is plain JSON an operator can inspect ---
    let raw = std::fs::read_to_string(state_dir.path().join("btc-usdt-usdt_5m.json")).unwrap();
    assert!(raw.contains("\"in_position\": false"));
}

#[tokio::test]
async fn test_short_history_makes_no_decision() {
    let exchange = ScriptedExchange::new(vec![candles_from_closes(&[100.0, 101.0, 102.0])]);
    let cfg = test_config();
    let state_dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(state_dir.path()).unwrap();
    let strategy: Box<dyn Strategy> =
        Box::new(EmaRsiStrategy::new(cfg.strategy.clone()));
    let risk = RiskManager::new(cfg.risk.clone());
    let orchestrator = Orchestrator::new(exchange, store, strategy, risk, test_market(), cfg);

    let outcome = orchestrator.run_tick().await.unwrap();
    assert!(matches!(outcome, TickOutcome::InsufficientData { .. }));

    assert!(orchestrator.exchange().orders().is_empty());
    assert_eq!(
        orchestrator.store().load(SYMBOL, TIMEFRAME).unwrap(),
        PositionState::flat()
    );
}
