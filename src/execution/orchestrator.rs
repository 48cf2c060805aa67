use thiserror::Error;

use crate::config::AppConfig;
use crate::exchange::{ExchangeClient, ExchangeError};
use crate::models::{new_client_order_id, MarketSpec, OrderIntent, OrderType, Side, Signal};
use crate::precision;
use crate::risk::RiskManager;
use crate::state::{PositionState, StateStore, StorageError};
use crate::strategy::{Evaluation, Strategy, StrategyError};

/// Why a tick decided against placing an order. These are decisions, not
/// errors: the tick ended cleanly.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoCapitalAvailable,
    RiskCapExceeded { notional: f64, budget: f64 },
    BelowExchangeMinimum { price: f64, amount: f64 },
}

/// What one tick did, reported so an operator can audit every outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Hold(Evaluation),
    InsufficientData { have: usize, need: usize },
    Entered { amount: f64, price: f64, order_id: String },
    Exited { amount: f64, price: f64, order_id: String },
    Skipped(SkipReason),
    /// Exit was requested while the record said "in position, amount 0":
    /// the record was reset to flat and no order was placed
    Healed { previous: PositionState },
}

#[derive(Debug, Error)]
pub enum TickError {
    #[error("market data unavailable: {0}")]
    DataUnavailable(#[source] ExchangeError),
    #[error("position state store failed: {0}")]
    Storage(#[from] StorageError),
    #[error("order submission failed: {0}")]
    Submission(#[source] ExchangeError),
    /// The exchange confirmed the order but the new state could not be
    /// recorded: the durable record no longer reflects exchange reality.
    #[error(
        "order {order_id} confirmed but persisting {intended:?} failed: {source}; \
         local position record is OUT OF SYNC with the exchange"
    )]
    StateDesync {
        order_id: String,
        intended: PositionState,
        #[source]
        source: StorageError,
    },
}

/// Drives one (symbol, timeframe) pair through the
/// signal -> decision -> sized order -> persisted state pipeline.
///
/// All collaborators are injected; the orchestrator owns no ambient state.
/// Within a tick the ordering is fixed: candle fetch happens before signal
/// evaluation, evaluation before order submission, submission before state
/// persistence.
pub struct Orchestrator<E: ExchangeClient, S: StateStore> {
    exchange: E,
    store: S,
    strategy: Box<dyn Strategy>,
    risk: RiskManager,
    market: MarketSpec,
    cfg: AppConfig,
}

impl<E: ExchangeClient, S: StateStore> Orchestrator<E, S> {
    pub fn new(
        exchange: E,
        store: S,
        strategy: Box<dyn Strategy>,
        risk: RiskManager,
        market: MarketSpec,
        cfg: AppConfig,
    ) -> Self {
        Self {
            exchange,
            store,
            strategy,
            risk,
            market,
            cfg,
        }
    }

    /// Run one tick. At most one order is submitted.
    pub async fn run_tick(&self) -> Result<TickOutcome, TickError> {
        let state = self.store.load(&self.cfg.symbol, &self.cfg.timeframe)?;

        let candles = self
            .exchange
            .fetch_candles(&self.market.id, &self.cfg.timeframe, self.cfg.candle_limit)
            .await
            .map_err(TickError::DataUnavailable)?;

        let eval = match self.strategy.evaluate(&candles, state.in_position) {
            Ok(eval) => eval,
            Err(StrategyError::InsufficientData { have, need }) => {
                return Ok(TickOutcome::InsufficientData { have, need });
            }
        };

        match eval.signal {
            Signal::Hold => Ok(TickOutcome::Hold(eval)),
            Signal::EnterLong if !state.in_position => self.enter(&eval).await,
            Signal::ExitLong if state.in_position => self.exit(&eval, &state).await,
            // The evaluator gates signals on the position flag; a mismatch
            // here means nothing actionable, so treat it as a hold
            _ => Ok(TickOutcome::Hold(eval)),
        }
    }

    async fn enter(&self, eval: &Evaluation) -> Result<TickOutcome, TickError> {
        let free = self
            .exchange
            .fetch_free_balance(self.cfg.quote_ccy())
            .await
            .map_err(TickError::DataUnavailable)?;

        let notional = self.risk.order_notional(free);
        if notional <= 0.0 {
            return Ok(TickOutcome::Skipped(SkipReason::NoCapitalAvailable));
        }
        // Single position per pair, so the current exposure is zero
        if !self.risk.can_increase(0.0, notional) {
            return Ok(TickOutcome::Skipped(SkipReason::RiskCapExceeded {
                notional,
                budget: self.cfg.risk.max_position_notional,
            }));
        }

        let amount = notional / eval.close;
        let (price, amount) = precision::quantize(&self.market, eval.close, amount);
        if !precision::meets_min_limits(&self.market, price, amount) {
            return Ok(TickOutcome::Skipped(SkipReason::BelowExchangeMinimum {
                price,
                amount,
            }));
        }

        let intent = OrderIntent {
            symbol: self.market.id.clone(),
            side: Side::Buy,
            order_type: OrderType::Market,
            amount,
            price: None,
            client_order_id: new_client_order_id(),
            reduce_only: false,
            td_mode: self.cfg.td_mode.clone(),
            pos_side: self.cfg.pos_side.clone(),
            post_only: false,
        };

        tracing::info!(
            "BUY {} market amount={} price_ref={} paper={}",
            self.cfg.symbol,
            amount,
            price,
            self.cfg.paper
        );
        let ack = self
            .exchange
            .submit_order(&intent)
            .await
            .map_err(TickError::Submission)?;

        let next = PositionState::open(amount);
        match self.store.save(&self.cfg.symbol, &self.cfg.timeframe, &next) {
            Ok(()) => Ok(TickOutcome::Entered {
                amount,
                price,
                order_id: ack.order_id,
            }),
            Err(source) => Err(TickError::StateDesync {
                order_id: ack.order_id,
                intended: next,
                source,
            }),
        }
    }

    async fn exit(
        &self,
        eval: &Evaluation,
        state: &PositionState,
    ) -> Result<TickOutcome, TickError> {
        if state.last_amount <= 0.0 {
            // Corrupt record: flagged in position with nothing to exit.
            // Reset to flat and surface it; do not place an order.
            let previous = state.clone();
            self.store
                .save(&self.cfg.symbol, &self.cfg.timeframe, &PositionState::flat())?;
            return Ok(TickOutcome::Healed { previous });
        }

        let amount = state.last_amount;
        let intent = OrderIntent {
            symbol: self.market.id.clone(),
            side: Side::Sell,
            order_type: OrderType::Market,
            amount,
            price: None,
            client_order_id: new_client_order_id(),
            reduce_only: true,
            td_mode: self.cfg.td_mode.clone(),
            pos_side: self.cfg.pos_side.clone(),
            post_only: false,
        };

        tracing::info!(
            "SELL (reduce) {} market amount={} price_ref={} paper={}",
            self.cfg.symbol,
            amount,
            eval.close,
            self.cfg.paper
        );
        let ack = self
            .exchange
            .submit_order(&intent)
            .await
            .map_err(TickError::Submission)?;

        let next = PositionState::flat();
        match self.store.save(&self.cfg.symbol, &self.cfg.timeframe, &next) {
            Ok(()) => Ok(TickOutcome::Exited {
                amount,
                price: eval.close,
                order_id: ack.order_id,
            }),
            Err(source) => Err(TickError::StateDesync {
                order_id: ack.order_id,
                intended: next,
                source,
            }),
        }
    }

    /// The injected store, for post-run inspection.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The injected exchange, for post-run inspection.
    pub fn exchange(&self) -> &E {
        &self.exchange
    }
}
