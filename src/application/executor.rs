//! Two-leg trade execution.
//!
//! Drives an approved opportunity through the execution state machine:
//!
//! ```text
//! Created -> LegsSubmitted -> BothFilled
//!                          -> OneLegFailed -> Unwinding -> Unwound
//!                                                       -> UnwindFailed
//! ```
//!
//! There is no cross-venue atomicity. Both legs are submitted concurrently
//! to minimize the window in which prices can move against the second leg,
//! and any one-sided position left by a partial failure is flattened with a
//! compensating market order. An unwind fill is accepted even at a loss:
//! correctness here means bounding risk, not profit.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use super::breaker::BreakerRegistry;
use super::orders::{AwaitOutcome, OrderManager};
use super::scanner::FeeSchedule;
use crate::domain::{
    AttemptId, AttemptStatus, Opportunity, OrderId, OrderKind, OrderRecord, OrderSide, OrderSpec,
    TradeAttempt, TradeOutcome, VenueId,
};
use crate::error::{ExecutionError, VenueError};
use crate::port::venue::OrderGateway;

/// Gateways for every venue the executor may trade on.
pub type GatewayMap = HashMap<VenueId, Arc<dyn OrderGateway>>;

/// Executes approved opportunities as matched two-leg trades.
pub struct TradeExecutor {
    gateways: GatewayMap,
    orders: Arc<OrderManager>,
    breakers: Arc<BreakerRegistry>,
    fees: FeeSchedule,
}

impl TradeExecutor {
    /// Create an executor over the given venue gateways.
    #[must_use]
    pub fn new(
        gateways: GatewayMap,
        orders: Arc<OrderManager>,
        breakers: Arc<BreakerRegistry>,
        fees: FeeSchedule,
    ) -> Self {
        Self {
            gateways,
            orders,
            breakers,
            fees,
        }
    }

    /// Execute one approved opportunity to a terminal outcome.
    ///
    /// Always returns an outcome; every venue-side fault is translated into
    /// the recovery path the state machine defines for it. The realized PnL
    /// in the outcome covers all fills, unwind losses, and fees, and is
    /// reported by the caller to the PnL tracker exactly once.
    pub async fn execute(&self, opportunity: &Opportunity) -> TradeOutcome {
        let mut attempt = TradeAttempt::new(AttemptId::new(), opportunity.symbol().clone());
        info!(
            attempt_id = %attempt.id,
            symbol = %opportunity.symbol(),
            buy_venue = %opportunity.buy_venue(),
            sell_venue = %opportunity.sell_venue(),
            size = %opportunity.trade_size(),
            "Executing trade attempt"
        );

        let Some(buy_gateway) = self.gateways.get(opportunity.buy_venue()).cloned() else {
            error!(venue = %opportunity.buy_venue(), "No gateway registered for buy venue");
            return self.outcome(&mut attempt, opportunity, AttemptStatus::Aborted, &[]);
        };
        let Some(sell_gateway) = self.gateways.get(opportunity.sell_venue()).cloned() else {
            error!(venue = %opportunity.sell_venue(), "No gateway registered for sell venue");
            return self.outcome(&mut attempt, opportunity, AttemptStatus::Aborted, &[]);
        };

        // Acquire both breakers before touching either venue. A HalfOpen
        // venue admits this attempt as its single trial call.
        if !self.breakers.try_acquire(opportunity.buy_venue()) {
            let gate = VenueError::CircuitOpen {
                venue: opportunity.buy_venue().to_string(),
            };
            warn!(error = %gate, "Aborting attempt");
            return self.outcome(&mut attempt, opportunity, AttemptStatus::Aborted, &[]);
        }
        if !self.breakers.try_acquire(opportunity.sell_venue()) {
            let gate = VenueError::CircuitOpen {
                venue: opportunity.sell_venue().to_string(),
            };
            warn!(error = %gate, "Aborting attempt");
            self.breakers.release(opportunity.buy_venue());
            return self.outcome(&mut attempt, opportunity, AttemptStatus::Aborted, &[]);
        }

        let buy_spec = leg_spec(opportunity, OrderSide::Buy, &attempt.id);
        let sell_spec = leg_spec(opportunity, OrderSide::Sell, &attempt.id);

        // Created -> LegsSubmitted: both legs concurrently, best effort.
        let (buy_submit, sell_submit) = tokio::join!(
            self.orders.submit(buy_gateway.as_ref(), buy_spec),
            self.orders.submit(sell_gateway.as_ref(), sell_spec),
        );
        self.note_submit(opportunity.buy_venue(), &buy_submit);
        self.note_submit(opportunity.sell_venue(), &sell_submit);

        match (buy_submit, sell_submit) {
            (Ok(buy_id), Ok(sell_id)) => {
                attempt.buy_order = Some(buy_id.clone());
                attempt.sell_order = Some(sell_id.clone());
                self.run_both_legs(&mut attempt, opportunity, &buy_gateway, buy_id, &sell_gateway, sell_id)
                    .await
            }
            (Ok(buy_id), Err(err)) => {
                let fault = ExecutionError::LegFailed {
                    venue: opportunity.sell_venue().to_string(),
                    reason: err.to_string(),
                };
                warn!(attempt_id = %attempt.id, error = %fault, "Sell leg submission failed");
                attempt.buy_order = Some(buy_id.clone());
                self.resolve_lone_leg(&mut attempt, opportunity, &buy_gateway, buy_id)
                    .await
            }
            (Err(err), Ok(sell_id)) => {
                let fault = ExecutionError::LegFailed {
                    venue: opportunity.buy_venue().to_string(),
                    reason: err.to_string(),
                };
                warn!(attempt_id = %attempt.id, error = %fault, "Buy leg submission failed");
                attempt.sell_order = Some(sell_id.clone());
                self.resolve_lone_leg(&mut attempt, opportunity, &sell_gateway, sell_id)
                    .await
            }
            (Err(buy_err), Err(sell_err)) => {
                warn!(
                    attempt_id = %attempt.id,
                    buy_error = %buy_err,
                    sell_error = %sell_err,
                    "Both leg submissions failed"
                );
                self.outcome(&mut attempt, opportunity, AttemptStatus::Aborted, &[])
            }
        }
    }

    /// Both legs live: wait them out and reconcile.
    async fn run_both_legs(
        &self,
        attempt: &mut TradeAttempt,
        opportunity: &Opportunity,
        buy_gateway: &Arc<dyn OrderGateway>,
        buy_id: OrderId,
        sell_gateway: &Arc<dyn OrderGateway>,
        sell_id: OrderId,
    ) -> TradeOutcome {
        let (buy_wait, sell_wait) = tokio::join!(
            self.orders.await_terminal(buy_gateway.as_ref(), &buy_id),
            self.orders.await_terminal(sell_gateway.as_ref(), &sell_id),
        );

        let buy = self.note_wait(opportunity.buy_venue(), buy_wait);
        let sell = self.note_wait(opportunity.sell_venue(), sell_wait);
        let (Some(buy), Some(sell)) = (buy, sell) else {
            // Untracked orders cannot happen for ids we just submitted;
            // treat defensively as an aborted attempt with no position.
            return self.outcome(attempt, opportunity, AttemptStatus::Aborted, &[]);
        };

        if buy.is_fully_filled() && sell.is_fully_filled() {
            info!(attempt_id = %attempt.id, "Both legs filled");
            return self.outcome(attempt, opportunity, AttemptStatus::BothFilled, &[buy, sell]);
        }

        let imbalance = buy.filled_quantity - sell.filled_quantity;
        if imbalance == Decimal::ZERO {
            // Equal fills on both sides leave no exposure. Matched partials
            // realize PnL on the matched quantity; zero fills realize none.
            let status = if buy.filled_quantity > Decimal::ZERO {
                AttemptStatus::BothFilled
            } else {
                AttemptStatus::Aborted
            };
            info!(attempt_id = %attempt.id, status = %status, "Legs closed flat");
            return self.outcome(attempt, opportunity, status, &[buy, sell]);
        }

        warn!(
            attempt_id = %attempt.id,
            buy_filled = %buy.filled_quantity,
            sell_filled = %sell.filled_quantity,
            "One leg failed, unwinding imbalance"
        );
        attempt.status = AttemptStatus::OneLegFailed;
        self.unwind(attempt, opportunity, imbalance, vec![buy, sell])
            .await
    }

    /// Only one leg was ever submitted: cancel it, and unwind whatever
    /// filled before the cancel took effect.
    async fn resolve_lone_leg(
        &self,
        attempt: &mut TradeAttempt,
        opportunity: &Opportunity,
        gateway: &Arc<dyn OrderGateway>,
        order_id: OrderId,
    ) -> TradeOutcome {
        attempt.status = AttemptStatus::OneLegFailed;

        let venue = gateway.venue().clone();
        if let Err(err) = gateway.cancel_order(&order_id).await {
            warn!(order_id = %order_id, error = %err, "Cancel of lone leg failed");
            self.breakers.record_failure(&venue);
        }

        let wait = self.orders.await_terminal(gateway.as_ref(), &order_id).await;
        let Some(record) = self.note_wait(&venue, wait) else {
            return self.outcome(attempt, opportunity, AttemptStatus::Aborted, &[]);
        };

        if record.filled_quantity == Decimal::ZERO {
            info!(attempt_id = %attempt.id, "Lone leg cancelled unfilled");
            return self.outcome(attempt, opportunity, AttemptStatus::Aborted, &[record]);
        }

        let imbalance = match record.spec.side {
            OrderSide::Buy => record.filled_quantity,
            OrderSide::Sell => -record.filled_quantity,
        };
        warn!(
            attempt_id = %attempt.id,
            filled = %record.filled_quantity,
            "Lone leg filled before cancel, unwinding"
        );
        self.unwind(attempt, opportunity, imbalance, vec![record])
            .await
    }

    /// OneLegFailed -> Unwinding: flatten the imbalanced quantity with a
    /// compensating market order on the venue of the over-filled leg.
    async fn unwind(
        &self,
        attempt: &mut TradeAttempt,
        opportunity: &Opportunity,
        imbalance: Decimal,
        mut legs: Vec<OrderRecord>,
    ) -> TradeOutcome {
        attempt.status = AttemptStatus::Unwinding;

        // Positive imbalance: long on the buy venue, sell it off there.
        // Negative: short on the sell venue, buy it back there.
        let (venue, side) = if imbalance > Decimal::ZERO {
            (opportunity.buy_venue().clone(), OrderSide::Sell)
        } else {
            (opportunity.sell_venue().clone(), OrderSide::Buy)
        };
        let quantity = imbalance.abs();

        let Some(gateway) = self.gateways.get(&venue).cloned() else {
            error!(venue = %venue, "No gateway for unwind venue");
            return self.unwind_failed(attempt, opportunity, &venue, &legs);
        };

        let spec = OrderSpec {
            venue: venue.clone(),
            symbol: opportunity.symbol().clone(),
            side,
            kind: OrderKind::Market,
            quantity,
            limit_price: None,
            attempt_id: attempt.id.clone(),
        };
        info!(
            attempt_id = %attempt.id,
            venue = %venue,
            side = %side,
            quantity = %quantity,
            "Submitting compensating order"
        );

        let unwind_id = match self.orders.submit(gateway.as_ref(), spec).await {
            Ok(id) => {
                self.breakers.record_success(&venue);
                id
            }
            Err(err) => {
                error!(attempt_id = %attempt.id, error = %err, "Compensating order submission failed");
                self.breakers.record_failure(&venue);
                return self.unwind_failed(attempt, opportunity, &venue, &legs);
            }
        };

        let wait = self.orders.await_terminal(gateway.as_ref(), &unwind_id).await;
        let Some(record) = self.note_wait(&venue, wait) else {
            return self.unwind_failed(attempt, opportunity, &venue, &legs);
        };

        if record.is_fully_filled() {
            info!(attempt_id = %attempt.id, "Unwind complete, exposure flat");
            legs.push(record);
            return self.outcome(attempt, opportunity, AttemptStatus::Unwound, &legs);
        }

        error!(
            attempt_id = %attempt.id,
            unwind_status = %record.status,
            unwind_filled = %record.filled_quantity,
            "Compensating order did not fill"
        );
        legs.push(record);
        self.unwind_failed(attempt, opportunity, &venue, &legs)
    }

    /// Unwinding -> UnwindFailed: fatal for the venue, which is forced
    /// Open for manual intervention; other venues keep running.
    fn unwind_failed(
        &self,
        attempt: &mut TradeAttempt,
        opportunity: &Opportunity,
        venue: &VenueId,
        legs: &[OrderRecord],
    ) -> TradeOutcome {
        self.breakers.force_open(venue);
        let fault = ExecutionError::UnwindFailed {
            venue: venue.to_string(),
            reason: "compensating order did not complete".to_string(),
        };
        error!(
            attempt_id = %attempt.id,
            error = %fault,
            "UNWIND FAILED: position requires manual intervention"
        );
        self.outcome(attempt, opportunity, AttemptStatus::UnwindFailed, legs)
    }

    fn outcome(
        &self,
        attempt: &mut TradeAttempt,
        opportunity: &Opportunity,
        status: AttemptStatus,
        legs: &[OrderRecord],
    ) -> TradeOutcome {
        attempt.status = status;
        let pnl = realized_pnl(legs, &self.fees);
        info!(
            attempt_id = %attempt.id,
            status = %status,
            pnl = %pnl,
            "Trade attempt closed"
        );
        TradeOutcome {
            attempt_id: attempt.id.clone(),
            symbol: opportunity.symbol().clone(),
            buy_venue: opportunity.buy_venue().clone(),
            sell_venue: opportunity.sell_venue().clone(),
            status,
            pnl,
            closed_at: Utc::now(),
        }
    }

    fn note_submit(&self, venue: &VenueId, result: &crate::error::Result<OrderId>) {
        match result {
            Ok(_) => self.breakers.record_success(venue),
            Err(_) => self.breakers.record_failure(venue),
        }
    }

    /// Record breaker signals from an awaited order and unwrap its record.
    fn note_wait(&self, venue: &VenueId, wait: Option<AwaitOutcome>) -> Option<OrderRecord> {
        let wait = wait?;
        for _ in 0..wait.venue_errors {
            self.breakers.record_failure(venue);
        }
        if wait.timed_out {
            // An order timeout counts as a venue call failure.
            self.breakers.record_failure(venue);
        }
        Some(wait.record)
    }
}

fn leg_spec(opportunity: &Opportunity, side: OrderSide, attempt_id: &AttemptId) -> OrderSpec {
    let (venue, price) = match side {
        OrderSide::Buy => (opportunity.buy_venue().clone(), opportunity.buy_price()),
        OrderSide::Sell => (opportunity.sell_venue().clone(), opportunity.sell_price()),
    };
    OrderSpec {
        venue,
        symbol: opportunity.symbol().clone(),
        side,
        kind: OrderKind::Limit,
        quantity: opportunity.trade_size(),
        limit_price: Some(price),
        attempt_id: attempt_id.clone(),
    }
}

/// Realized PnL over a set of leg records, fees included.
///
/// Buys cost `qty * price * (1 + fee)`, sells return
/// `qty * price * (1 - fee)`; the venue's taker fee applies per leg.
fn realized_pnl(legs: &[OrderRecord], fees: &FeeSchedule) -> Decimal {
    let mut pnl = Decimal::ZERO;
    for leg in legs {
        let notional = leg.filled_notional();
        if notional == Decimal::ZERO {
            continue;
        }
        let fee = fees.taker_fee(&leg.spec.venue);
        match leg.spec.side {
            OrderSide::Buy => pnl -= notional * (Decimal::ONE + fee),
            OrderSide::Sell => pnl += notional * (Decimal::ONE - fee),
        }
    }
    pnl
}
