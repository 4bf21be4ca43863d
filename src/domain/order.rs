//! Order specification and lifecycle types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

use super::id::{AttemptId, OrderId, Symbol, VenueId};
use super::money::{Price, Quantity};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl OrderSide {
    /// The side that flattens a position opened on this side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order pricing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    /// Rest at the limit price.
    Limit,
    /// Cross the book at whatever price is available. Used for unwinds,
    /// where bounding exposure matters more than price.
    Market,
}

/// A request to place an order on a venue.
#[derive(Debug, Clone)]
pub struct OrderSpec {
    /// Venue to place the order on.
    pub venue: VenueId,
    /// Instrument to trade.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: OrderSide,
    /// Limit or market.
    pub kind: OrderKind,
    /// Base-currency quantity.
    pub quantity: Quantity,
    /// Limit price; `None` for market orders.
    pub limit_price: Option<Price>,
    /// Correlation id linking this order to its trade attempt.
    pub attempt_id: AttemptId,
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Submitted, not yet acknowledged by the venue.
    Pending,
    /// Acknowledged and resting on the book.
    Open,
    /// Some quantity filled, remainder still working.
    PartiallyFilled,
    /// Fully filled.
    Filled,
    /// Cancelled before completing.
    Cancelled,
    /// Rejected by the venue or abandoned after timeout.
    Failed,
}

impl OrderStatus {
    /// True once the order can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Failed)
    }

    /// Monotonic progression rank. Duplicate or late venue events may only
    /// move an order to an equal-or-later rank, and never out of a terminal
    /// state.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Open => 1,
            Self::PartiallyFilled => 2,
            Self::Filled | Self::Cancelled | Self::Failed => 3,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Tracked state of one order from submission to terminal status.
///
/// Owned exclusively by the order manager; mutated only in response to
/// venue-reported events or timeouts.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    /// Venue-assigned order id.
    pub id: OrderId,
    /// The spec this order was placed from.
    pub spec: OrderSpec,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Quantity filled so far.
    pub filled_quantity: Quantity,
    /// Average fill price over the filled quantity, if any fill occurred.
    pub avg_fill_price: Option<Price>,
    /// Time of the last applied update.
    pub last_updated: DateTime<Utc>,
}

impl OrderRecord {
    /// Create a record for a freshly submitted order.
    #[must_use]
    pub fn new(id: OrderId, spec: OrderSpec, now: DateTime<Utc>) -> Self {
        Self {
            id,
            spec,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            last_updated: now,
        }
    }

    /// True if the full quantity was filled.
    #[must_use]
    pub fn is_fully_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Quantity still unfilled.
    #[must_use]
    pub fn remaining_quantity(&self) -> Quantity {
        (self.spec.quantity - self.filled_quantity).max(Decimal::ZERO)
    }

    /// Quote-currency value of the filled quantity, zero if nothing filled.
    #[must_use]
    pub fn filled_notional(&self) -> Price {
        match self.avg_fill_price {
            Some(price) => self.filled_quantity * price,
            None => Decimal::ZERO,
        }
    }
}
