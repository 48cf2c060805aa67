//! Drives the orchestrator at a fixed cadence.
//!
//! Each tick is isolated: whatever a tick returns is classified and logged,
//! and the loop moves on. Only Ctrl-C ends the loop, and only between ticks,
//! never mid-order.

use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::exchange::ExchangeClient;
use crate::execution::{Orchestrator, SkipReason, TickError, TickOutcome};
use crate::state::StateStore;

/// Floor on the polling interval, to avoid hammering the exchange.
pub const MIN_INTERVAL_SECS: u64 = 5;

/// Clamp a configured interval to the enforced floor.
pub fn effective_interval(interval_secs: u64) -> u64 {
    interval_secs.max(MIN_INTERVAL_SECS)
}

/// Run the tick loop until Ctrl-C.
pub async fn run_loop<E: ExchangeClient, S: StateStore>(
    orchestrator: &Orchestrator<E, S>,
    interval_secs: u64,
) {
    let every = effective_interval(interval_secs);
    if every != interval_secs {
        tracing::warn!(
            "interval {}s is below the floor, using {}s",
            interval_secs,
            every
        );
    }

    let mut ticker = interval(Duration::from_secs(every));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!("Tick loop starting, every {}s. Press Ctrl+C to stop.", every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, stopping between ticks");
                return;
            }
        }

        let result = orchestrator.run_tick().await;
        report_tick(&result);
    }
}

/// Log one tick's result so every outcome is auditable afterwards.
pub fn report_tick(result: &Result<TickOutcome, TickError>) {
    match result {
        Ok(TickOutcome::Hold(eval)) => {
            tracing::info!(
                "No action. rsi={:.2} fast={:.2} slow={:.2} close={}",
                eval.oscillator,
                eval.fast,
                eval.slow,
                eval.close
            );
        }
        Ok(TickOutcome::InsufficientData { have, need }) => {
            tracing::warn!("Not enough candles to evaluate ({have}/{need})");
        }
        Ok(TickOutcome::Entered { amount, price, order_id }) => {
            tracing::info!("Entered long: amount={amount} price_ref={price} order={order_id}");
        }
        Ok(TickOutcome::Exited { amount, price, order_id }) => {
            tracing::info!("Exited long: amount={amount} price_ref={price} order={order_id}");
        }
        Ok(TickOutcome::Skipped(reason)) => match reason {
            SkipReason::NoCapitalAvailable => {
                tracing::warn!("Skip entry: no free balance to allocate");
            }
            SkipReason::RiskCapExceeded { notional, budget } => {
                tracing::warn!(
                    "Skip entry: notional {notional} would exceed position budget {budget}"
                );
            }
            SkipReason::BelowExchangeMinimum { price, amount } => {
                tracing::warn!(
                    "Skip entry: quantized order (price={price}, amount={amount}) \
                     under exchange minimums"
                );
            }
        },
        Ok(TickOutcome::Healed { previous }) => {
            tracing::error!(
                "State inconsistency: exit requested with recorded amount {} while flagged \
                 in-position; record reset to flat, no order placed",
                previous.last_amount
            );
        }
        Err(err @ TickError::StateDesync { .. }) => {
            tracing::error!("STATE OUT OF SYNC: {err}");
        }
        Err(err @ TickError::DataUnavailable(_)) => {
            tracing::warn!("Tick aborted: {err}");
        }
        Err(err) => {
            tracing::error!("Tick failed: {err}");
        }
    }
}
