//! Venue ports for market data and order execution.
//!
//! These traits are the integration seams for external exchanges. The core
//! treats any error returned from a venue call as a failure signal for that
//! venue's circuit breaker; it never assumes a venue call succeeded.

use async_trait::async_trait;

use crate::domain::{BookSnapshot, OrderId, OrderSpec, OrderStatus, Price, Quantity, Symbol, VenueId};
use crate::error::Result;

/// Events received from a venue's market data stream.
#[derive(Debug, Clone)]
pub enum MarketEvent {
    /// Top-of-book snapshot for one instrument.
    Snapshot(BookSnapshot),
    /// Connection lost (the stream may reconnect).
    Disconnected {
        /// The disconnection reason.
        reason: String,
    },
}

impl MarketEvent {
    /// Get the snapshot if this event carries market data.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&BookSnapshot> {
        match self {
            Self::Snapshot(snapshot) => Some(snapshot),
            Self::Disconnected { .. } => None,
        }
    }
}

/// Real-time market data stream from one venue.
///
/// Implementations handle connection management, subscriptions, and message
/// parsing for their specific venue protocols.
#[async_trait]
pub trait MarketDataStream: Send + Sync {
    /// Connect to the venue's real-time data feed.
    async fn connect(&mut self) -> Result<()>;

    /// Subscribe to top-of-book data for the given symbols.
    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()>;

    /// Receive the next market event.
    ///
    /// Blocks until an event is available. Returns `None` when the stream
    /// is closed for good.
    async fn next_event(&mut self) -> Option<MarketEvent>;

    /// The venue this stream belongs to.
    fn venue(&self) -> &VenueId;
}

#[async_trait]
impl MarketDataStream for Box<dyn MarketDataStream> {
    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        (**self).subscribe(symbols).await
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        (**self).next_event().await
    }

    fn venue(&self) -> &VenueId {
        (**self).venue()
    }
}

/// A venue's view of one order, as returned by a status poll.
#[derive(Debug, Clone)]
pub struct OrderStatusReport {
    /// Venue-assigned order id.
    pub order_id: OrderId,
    /// Current status on the venue.
    pub status: OrderStatus,
    /// Quantity filled so far.
    pub filled_quantity: Quantity,
    /// Average execution price over the filled quantity, if any.
    pub avg_fill_price: Option<Price>,
}

/// Order placement and management on one venue.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Place an order, returning the venue-assigned order id.
    async fn place_order(&self, spec: &OrderSpec) -> Result<OrderId>;

    /// Request cancellation of an order.
    ///
    /// Cancellation is a request, not a guarantee: the order may fill before
    /// the cancel is processed. Callers confirm via
    /// [`fetch_order_status`](Self::fetch_order_status).
    async fn cancel_order(&self, order_id: &OrderId) -> Result<()>;

    /// Fetch the venue's current view of an order.
    async fn fetch_order_status(&self, order_id: &OrderId) -> Result<OrderStatusReport>;

    /// The venue this gateway submits to.
    fn venue(&self) -> &VenueId;
}
