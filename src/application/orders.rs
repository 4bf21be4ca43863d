//! Order lifecycle tracking and reconciliation.
//!
//! The order manager owns every [`OrderRecord`] from submission to terminal
//! status. Venue-reported updates are applied idempotently: a duplicate or
//! late report may only move an order to an equal-or-later lifecycle rank,
//! and a terminal order never changes again. Orders that produce no terminal
//! status within the configured wait are cancelled and treated as failed
//! once the cancellation (or a fill that beat it) is confirmed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{OrderId, OrderKind, OrderRecord, OrderSpec, OrderStatus, VenueId};
use crate::error::{Result, VenueError};
use crate::port::venue::{OrderGateway, OrderStatusReport};

/// Per-order timing policy.
#[derive(Debug, Clone)]
pub struct OrderPolicy {
    /// Maximum wait for a terminal status before cancelling.
    pub max_wait: Duration,
    /// Interval between status polls.
    pub status_poll: Duration,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(10),
            status_poll: Duration::from_millis(250),
        }
    }
}

/// Result of waiting an order out to its terminal status.
#[derive(Debug, Clone)]
pub struct AwaitOutcome {
    /// The final record. Always terminal when returned from
    /// [`OrderManager::await_terminal`].
    pub record: OrderRecord,
    /// Venue call failures observed while polling; the caller feeds these
    /// to the venue's circuit breaker.
    pub venue_errors: u32,
    /// True if the managed wait expired and a cancel was issued.
    pub timed_out: bool,
}

/// Tracks every order placed by the engine.
pub struct OrderManager {
    records: RwLock<HashMap<OrderId, OrderRecord>>,
    policy: OrderPolicy,
}

impl OrderManager {
    /// Create a manager with the given timing policy.
    #[must_use]
    pub fn new(policy: OrderPolicy) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Place an order through `gateway` and start tracking it.
    ///
    /// The record starts as Open: a successful placement means the venue
    /// acknowledged the order.
    pub async fn submit(&self, gateway: &dyn OrderGateway, spec: OrderSpec) -> Result<OrderId> {
        let order_id = gateway.place_order(&spec).await?;
        let mut record = OrderRecord::new(order_id.clone(), spec, Utc::now());
        record.status = OrderStatus::Open;

        info!(
            order_id = %order_id,
            venue = %record.spec.venue,
            side = %record.spec.side,
            quantity = %record.spec.quantity,
            "Order placed"
        );
        self.records.write().insert(order_id.clone(), record);
        Ok(order_id)
    }

    /// Get a copy of an order's record.
    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<OrderRecord> {
        self.records.read().get(order_id).cloned()
    }

    /// Apply a venue-reported status update.
    ///
    /// Later-or-equal state wins; terminal records never regress. Returns
    /// the record after application, or `None` for unknown orders.
    pub fn apply_report(&self, report: &OrderStatusReport) -> Option<OrderRecord> {
        let mut records = self.records.write();
        let record = records.get_mut(&report.order_id)?;

        if record.status.is_terminal() {
            return Some(record.clone());
        }
        if report.status.rank() < record.status.rank() {
            debug!(
                order_id = %report.order_id,
                current = %record.status,
                reported = %report.status,
                "Ignoring regressive status report"
            );
            return Some(record.clone());
        }

        if record.status != report.status {
            debug!(
                order_id = %report.order_id,
                from = %record.status,
                to = %report.status,
                "Order status changed"
            );
        }
        record.status = report.status;
        record.filled_quantity = record.filled_quantity.max(report.filled_quantity);
        if report.avg_fill_price.is_some() {
            record.avg_fill_price = report.avg_fill_price;
        }
        record.last_updated = Utc::now();
        Some(record.clone())
    }

    /// Poll an order until it reaches a terminal status.
    ///
    /// If no terminal status arrives within `max_wait`, a cancel request is
    /// issued and polling continues until the cancellation (or a fill that
    /// raced it) is confirmed. If even that confirmation window expires, the
    /// order is locally marked Failed so the executor can proceed; whatever
    /// the venue eventually reports is superseded by the terminal rule.
    ///
    /// Returns `None` for orders this manager is not tracking.
    pub async fn await_terminal(
        &self,
        gateway: &dyn OrderGateway,
        order_id: &OrderId,
    ) -> Option<AwaitOutcome> {
        self.get(order_id)?;

        let mut venue_errors = 0u32;
        let deadline = Instant::now() + self.policy.max_wait;

        loop {
            if let Some(record) = self.poll_once(gateway, order_id, &mut venue_errors).await {
                if record.status.is_terminal() {
                    return Some(AwaitOutcome {
                        record,
                        venue_errors,
                        timed_out: false,
                    });
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.policy.status_poll).await;
        }

        // Timed out: cancel, then wait for the cancel (or a racing fill)
        // to confirm.
        let timeout = VenueError::OrderTimeout {
            order_id: order_id.to_string(),
            waited_ms: self.policy.max_wait.as_millis() as u64,
        };
        warn!(error = %timeout, "Order timed out, cancelling");
        if let Err(err) = gateway.cancel_order(order_id).await {
            warn!(order_id = %order_id, error = %err, "Cancel request failed");
            venue_errors += 1;
        }

        let confirm_deadline = Instant::now() + self.policy.max_wait;
        while Instant::now() < confirm_deadline {
            if let Some(record) = self.poll_once(gateway, order_id, &mut venue_errors).await {
                if record.status.is_terminal() {
                    return Some(AwaitOutcome {
                        record,
                        venue_errors,
                        timed_out: true,
                    });
                }
            }
            tokio::time::sleep(self.policy.status_poll).await;
        }

        // No confirmation either way; fail the order locally so the caller
        // is never left with an order of unknown state.
        let record = self.force_fail(order_id)?;
        Some(AwaitOutcome {
            record,
            venue_errors,
            timed_out: true,
        })
    }

    /// Request cancellation of every non-terminal order.
    ///
    /// Used when the kill switch engages. Compensating (market) orders are
    /// exempt: aborting them would leave unhedged exposure, so in-flight
    /// unwinds always run to completion. Cancel failures are logged and
    /// returned as (venue, error) pairs for breaker accounting; they do not
    /// stop the sweep.
    pub async fn cancel_all_open(
        &self,
        gateways: &HashMap<VenueId, Arc<dyn OrderGateway>>,
    ) -> Vec<(VenueId, crate::error::Error)> {
        let open: Vec<OrderRecord> = {
            let records = self.records.read();
            records
                .values()
                .filter(|record| {
                    !record.status.is_terminal() && record.spec.kind != OrderKind::Market
                })
                .cloned()
                .collect()
        };

        let mut failures = Vec::new();
        for record in open {
            let venue = record.spec.venue.clone();
            let Some(gateway) = gateways.get(&venue) else {
                warn!(order_id = %record.id, venue = %venue, "No gateway for venue, cannot cancel");
                continue;
            };
            info!(order_id = %record.id, venue = %venue, "Cancelling open order");
            if let Err(err) = gateway.cancel_order(&record.id).await {
                warn!(order_id = %record.id, error = %err, "Cancel failed");
                failures.push((venue, err));
            }
        }
        failures
    }

    /// Orders that have not reached a terminal status.
    #[must_use]
    pub fn open_orders(&self) -> Vec<OrderRecord> {
        self.records
            .read()
            .values()
            .filter(|record| !record.status.is_terminal())
            .cloned()
            .collect()
    }

    async fn poll_once(
        &self,
        gateway: &dyn OrderGateway,
        order_id: &OrderId,
        venue_errors: &mut u32,
    ) -> Option<OrderRecord> {
        match gateway.fetch_order_status(order_id).await {
            Ok(report) => self.apply_report(&report),
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "Status poll failed");
                *venue_errors += 1;
                None
            }
        }
    }

    fn force_fail(&self, order_id: &OrderId) -> Option<OrderRecord> {
        let mut records = self.records.write();
        let record = records.get_mut(order_id)?;
        if !record.status.is_terminal() {
            record.status = OrderStatus::Failed;
            record.last_updated = Utc::now();
        }
        Some(record.clone())
    }
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new(OrderPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AttemptId, OrderKind, OrderSide, Symbol};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn spec() -> OrderSpec {
        OrderSpec {
            venue: VenueId::new("kraken"),
            symbol: Symbol::new("BTC/USDT"),
            side: OrderSide::Buy,
            kind: OrderKind::Limit,
            quantity: dec!(1),
            limit_price: Some(dec!(100)),
            attempt_id: AttemptId::new(),
        }
    }

    fn track(manager: &OrderManager, id: &str) {
        let mut record = OrderRecord::new(OrderId::new(id), spec(), Utc::now());
        record.status = OrderStatus::Open;
        manager.records.write().insert(OrderId::new(id), record);
    }

    fn report(id: &str, status: OrderStatus, filled: Decimal) -> OrderStatusReport {
        OrderStatusReport {
            order_id: OrderId::new(id),
            status,
            filled_quantity: filled,
            avg_fill_price: if filled > Decimal::ZERO {
                Some(dec!(100))
            } else {
                None
            },
        }
    }

    #[test]
    fn applies_progressive_updates() {
        let manager = OrderManager::default();
        track(&manager, "o-1");

        let record = manager
            .apply_report(&report("o-1", OrderStatus::PartiallyFilled, dec!(0.4)))
            .unwrap();
        assert_eq!(record.status, OrderStatus::PartiallyFilled);
        assert_eq!(record.filled_quantity, dec!(0.4));

        let record = manager
            .apply_report(&report("o-1", OrderStatus::Filled, dec!(1)))
            .unwrap();
        assert_eq!(record.status, OrderStatus::Filled);
        assert_eq!(record.filled_quantity, dec!(1));
    }

    #[test]
    fn ignores_regressive_updates() {
        let manager = OrderManager::default();
        track(&manager, "o-1");

        manager.apply_report(&report("o-1", OrderStatus::PartiallyFilled, dec!(0.4)));
        let record = manager
            .apply_report(&report("o-1", OrderStatus::Open, Decimal::ZERO))
            .unwrap();

        assert_eq!(record.status, OrderStatus::PartiallyFilled);
        assert_eq!(record.filled_quantity, dec!(0.4));
    }

    #[test]
    fn terminal_status_never_regresses() {
        let manager = OrderManager::default();
        track(&manager, "o-1");

        manager.apply_report(&report("o-1", OrderStatus::Filled, dec!(1)));
        let record = manager
            .apply_report(&report("o-1", OrderStatus::Cancelled, dec!(1)))
            .unwrap();

        assert_eq!(record.status, OrderStatus::Filled);
    }

    #[test]
    fn duplicate_terminal_report_is_idempotent() {
        let manager = OrderManager::default();
        track(&manager, "o-1");

        manager.apply_report(&report("o-1", OrderStatus::Filled, dec!(1)));
        let record = manager
            .apply_report(&report("o-1", OrderStatus::Filled, dec!(1)))
            .unwrap();

        assert_eq!(record.status, OrderStatus::Filled);
        assert_eq!(record.filled_quantity, dec!(1));
    }

    #[test]
    fn unknown_order_returns_none() {
        let manager = OrderManager::default();
        assert!(manager
            .apply_report(&report("nope", OrderStatus::Open, Decimal::ZERO))
            .is_none());
    }

    #[test]
    fn open_orders_excludes_terminal() {
        let manager = OrderManager::default();
        track(&manager, "o-1");
        track(&manager, "o-2");

        manager.apply_report(&report("o-1", OrderStatus::Filled, dec!(1)));

        let open = manager.open_orders();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id.as_str(), "o-2");
    }
}
