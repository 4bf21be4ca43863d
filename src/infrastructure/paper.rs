//! Paper trading venue: simulated fills and a deterministic quote feed.
//!
//! Paper mode swaps the order gateway for [`PaperGateway`], a simulated
//! fill responder, while exercising exactly the same execution state
//! machine as live trading. [`PaperFeed`] provides a deterministic cycling
//! quote stream so the whole engine can run with no external connectivity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::{
    BookSnapshot, OrderId, OrderKind, OrderSpec, OrderStatus, Price, Quantity, Quote, Symbol,
    VenueId,
};
use crate::error::{Result, VenueError};
use crate::port::venue::{MarketDataStream, MarketEvent, OrderGateway, OrderStatusReport};

/// Simulated order gateway that fills orders instantly.
///
/// Limit orders fill at their limit price; market orders fill at the
/// venue's current mark price for the symbol, which the engine keeps in
/// sync with the market data it routes. Order ids are prefixed `paper-` so
/// simulated activity is unmistakable in logs and ledgers.
pub struct PaperGateway {
    venue: VenueId,
    sequence: AtomicU64,
    orders: Mutex<HashMap<OrderId, OrderStatusReport>>,
    marks: Mutex<HashMap<Symbol, Price>>,
}

impl PaperGateway {
    /// Create a paper gateway for one venue.
    #[must_use]
    pub fn new(venue: VenueId) -> Self {
        Self {
            venue,
            sequence: AtomicU64::new(1),
            orders: Mutex::new(HashMap::new()),
            marks: Mutex::new(HashMap::new()),
        }
    }

    /// Update the mark price market orders fill at.
    pub fn set_mark(&self, symbol: Symbol, price: Price) {
        self.marks.lock().insert(symbol, price);
    }

    fn fill_price(&self, spec: &OrderSpec) -> Option<Price> {
        match spec.kind {
            OrderKind::Limit => spec.limit_price,
            OrderKind::Market => self.marks.lock().get(&spec.symbol).copied(),
        }
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn place_order(&self, spec: &OrderSpec) -> Result<OrderId> {
        let Some(price) = self.fill_price(spec) else {
            return Err(VenueError::Rejected(format!(
                "no mark price for {} on paper venue {}",
                spec.symbol, self.venue,
            ))
            .into());
        };

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let order_id = OrderId::new(format!("paper-{}-{}", spec.side, seq));

        info!(
            order_id = %order_id,
            venue = %self.venue,
            side = %spec.side,
            quantity = %spec.quantity,
            price = %price,
            "[PAPER] Order filled"
        );
        self.orders.lock().insert(
            order_id.clone(),
            OrderStatusReport {
                order_id: order_id.clone(),
                status: OrderStatus::Filled,
                filled_quantity: spec.quantity,
                avg_fill_price: Some(price),
            },
        );
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<()> {
        let mut orders = self.orders.lock();
        let report = orders
            .get_mut(order_id)
            .ok_or_else(|| VenueError::UnknownOrder(order_id.to_string()))?;
        // Instant fills mean cancels always lose the race; the order's
        // terminal status stands.
        debug!(order_id = %order_id, status = %report.status, "[PAPER] Cancel after terminal status");
        Ok(())
    }

    async fn fetch_order_status(&self, order_id: &OrderId) -> Result<OrderStatusReport> {
        self.orders
            .lock()
            .get(order_id)
            .cloned()
            .ok_or_else(|| VenueError::UnknownOrder(order_id.to_string()).into())
    }

    fn venue(&self) -> &VenueId {
        &self.venue
    }
}

/// A deterministic market data stream cycling through scripted quotes.
///
/// Each call to `next_event` sleeps for the configured interval, then
/// emits the next (bid, ask) pair stamped with the current wall clock so
/// the store always sees strictly increasing timestamps.
pub struct PaperFeed {
    venue: VenueId,
    symbol: Symbol,
    quotes: Vec<(Price, Price)>,
    size: Quantity,
    interval: Duration,
    index: usize,
}

impl PaperFeed {
    /// Create a cycling feed over `(bid, ask)` pairs.
    #[must_use]
    pub fn new(
        venue: VenueId,
        symbol: Symbol,
        quotes: Vec<(Price, Price)>,
        size: Quantity,
        interval: Duration,
    ) -> Self {
        Self {
            venue,
            symbol,
            quotes,
            size,
            interval,
            index: 0,
        }
    }
}

#[async_trait]
impl MarketDataStream for PaperFeed {
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&mut self, _symbols: &[Symbol]) -> Result<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        if self.quotes.is_empty() {
            return std::future::pending().await;
        }
        tokio::time::sleep(self.interval).await;

        let (bid, ask) = self.quotes[self.index % self.quotes.len()];
        self.index += 1;

        Some(MarketEvent::Snapshot(BookSnapshot::new(
            self.venue.clone(),
            self.symbol.clone(),
            Quote::new(bid, self.size),
            Quote::new(ask, self.size),
            Utc::now(),
        )))
    }

    fn venue(&self) -> &VenueId {
        &self.venue
    }
}

/// Mid price of a snapshot, used to keep paper marks in sync with data.
#[must_use]
pub fn mid_price(snapshot: &BookSnapshot) -> Price {
    (snapshot.best_bid().price() + snapshot.best_ask().price()) / Decimal::TWO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AttemptId;
    use rust_decimal_macros::dec;

    fn spec(kind: OrderKind, price: Option<Price>) -> OrderSpec {
        OrderSpec {
            venue: VenueId::new("paper"),
            symbol: Symbol::new("BTC/USDT"),
            side: crate::domain::OrderSide::Buy,
            kind,
            quantity: dec!(1),
            limit_price: price,
            attempt_id: AttemptId::new(),
        }
    }

    #[tokio::test]
    async fn limit_orders_fill_at_limit_price() {
        let gateway = PaperGateway::new(VenueId::new("paper"));
        let id = gateway
            .place_order(&spec(OrderKind::Limit, Some(dec!(100))))
            .await
            .unwrap();
        assert!(id.as_str().starts_with("paper-buy-"));

        let report = gateway.fetch_order_status(&id).await.unwrap();
        assert_eq!(report.status, OrderStatus::Filled);
        assert_eq!(report.filled_quantity, dec!(1));
        assert_eq!(report.avg_fill_price, Some(dec!(100)));
    }

    #[tokio::test]
    async fn market_orders_fill_at_mark() {
        let gateway = PaperGateway::new(VenueId::new("paper"));
        gateway.set_mark(Symbol::new("BTC/USDT"), dec!(99.5));

        let id = gateway
            .place_order(&spec(OrderKind::Market, None))
            .await
            .unwrap();
        let report = gateway.fetch_order_status(&id).await.unwrap();
        assert_eq!(report.avg_fill_price, Some(dec!(99.5)));
    }

    #[tokio::test]
    async fn market_order_without_mark_is_rejected() {
        let gateway = PaperGateway::new(VenueId::new("paper"));
        assert!(gateway
            .place_order(&spec(OrderKind::Market, None))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn feed_cycles_through_quotes() {
        let mut feed = PaperFeed::new(
            VenueId::new("paper"),
            Symbol::new("BTC/USDT"),
            vec![(dec!(100), dec!(100.5)), (dec!(101), dec!(101.5))],
            dec!(1),
            Duration::from_millis(1),
        );

        let first = feed.next_event().await.unwrap();
        let second = feed.next_event().await.unwrap();
        let third = feed.next_event().await.unwrap();

        let bid = |event: &MarketEvent| event.snapshot().unwrap().best_bid().price();
        assert_eq!(bid(&first), dec!(100));
        assert_eq!(bid(&second), dec!(101));
        assert_eq!(bid(&third), dec!(100));
    }
}
