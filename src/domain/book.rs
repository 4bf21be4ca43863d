//! Top-of-book snapshot types.
//!
//! This module provides types for representing the best quotes of one
//! instrument on one venue:
//!
//! - [`Quote`] - A single side of the book (price and size)
//! - [`BookSnapshot`] - Best bid and ask for a (venue, symbol) pair
//!
//! Snapshots carry the venue's event timestamp; a snapshot older than the
//! one already stored for the same (venue, symbol) key is discarded by the
//! store rather than applied out of order.

use chrono::{DateTime, Utc};

use super::id::{Symbol, VenueId};
use super::money::{Price, Quantity};

/// One side of the top of book: a price and the size available at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// The quoted price.
    price: Price,
    /// Total quantity available at this price.
    size: Quantity,
}

impl Quote {
    /// Creates a new quote.
    #[must_use]
    pub const fn new(price: Price, size: Quantity) -> Self {
        Self { price, size }
    }

    /// Returns the quoted price.
    #[must_use]
    pub const fn price(&self) -> Price {
        self.price
    }

    /// Returns the quantity available at this price.
    #[must_use]
    pub const fn size(&self) -> Quantity {
        self.size
    }
}

/// Best bid and ask for a single instrument on a single venue.
#[derive(Debug, Clone)]
pub struct BookSnapshot {
    venue: VenueId,
    symbol: Symbol,
    best_bid: Quote,
    best_ask: Quote,
    timestamp: DateTime<Utc>,
}

impl BookSnapshot {
    /// Creates a new snapshot.
    #[must_use]
    pub const fn new(
        venue: VenueId,
        symbol: Symbol,
        best_bid: Quote,
        best_ask: Quote,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            venue,
            symbol,
            best_bid,
            best_ask,
            timestamp,
        }
    }

    /// Returns the venue this snapshot came from.
    #[must_use]
    pub const fn venue(&self) -> &VenueId {
        &self.venue
    }

    /// Returns the instrument symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Returns the best bid (highest buy price).
    #[must_use]
    pub const fn best_bid(&self) -> Quote {
        self.best_bid
    }

    /// Returns the best ask (lowest sell price).
    #[must_use]
    pub const fn best_ask(&self) -> Quote {
        self.best_ask
    }

    /// Returns the venue-reported event time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Age of this snapshot relative to `now`.
    ///
    /// Returns zero for snapshots stamped in the future (clock skew between
    /// venues must not make quotes look stale).
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.timestamp).max(chrono::Duration::zero())
    }
}
