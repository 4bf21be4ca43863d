//! Builders for domain primitives used across tests.
//!
//! Concise factory functions for venues, symbols, and snapshots so tests
//! focus on assertions rather than construction boilerplate.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::{BookSnapshot, Quote, Symbol, VenueId};

/// Create a [`VenueId`] from a string.
pub fn venue(id: &str) -> VenueId {
    VenueId::from(id)
}

/// Create a [`Symbol`] from a string.
pub fn symbol(id: &str) -> Symbol {
    Symbol::from(id)
}

/// Create a snapshot stamped now with explicit sizes.
pub fn snapshot_with_sizes(
    venue_id: &str,
    symbol_id: &str,
    bid: Decimal,
    bid_size: Decimal,
    ask: Decimal,
    ask_size: Decimal,
) -> BookSnapshot {
    BookSnapshot::new(
        venue(venue_id),
        symbol(symbol_id),
        Quote::new(bid, bid_size),
        Quote::new(ask, ask_size),
        Utc::now(),
    )
}
