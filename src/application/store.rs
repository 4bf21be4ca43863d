//! Newest-wins snapshot store per (venue, symbol).

use dashmap::DashMap;

use crate::domain::{BookSnapshot, Symbol, VenueId};

/// Result of applying a snapshot to the store.
#[derive(Debug)]
pub struct UpdateApplied {
    /// Whether the snapshot replaced the stored one.
    pub applied: bool,
    /// The snapshot that was stored before this update, if any.
    pub previous: Option<BookSnapshot>,
}

/// Holds the latest top-of-book snapshot per (venue, symbol).
///
/// Timestamps strictly increase per key: a snapshot at or before the stored
/// timestamp is discarded, which drops stale and out-of-order updates. Reads
/// are concurrent; writes are serialized per key.
pub struct OrderBookStore {
    books: DashMap<(VenueId, Symbol), BookSnapshot>,
}

impl OrderBookStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
        }
    }

    /// Store `snapshot` iff it is strictly newer than the one already held
    /// for its (venue, symbol) key.
    ///
    /// Returns whether the update was applied and the previously stored
    /// snapshot. The caller decides whether to trigger a scan; the store
    /// emits no events itself.
    pub fn update(&self, snapshot: BookSnapshot) -> UpdateApplied {
        let key = (snapshot.venue().clone(), snapshot.symbol().clone());
        match self.books.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if snapshot.timestamp() > entry.get().timestamp() {
                    let previous = entry.insert(snapshot);
                    UpdateApplied {
                        applied: true,
                        previous: Some(previous),
                    }
                } else {
                    UpdateApplied {
                        applied: false,
                        previous: Some(entry.get().clone()),
                    }
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(snapshot);
                UpdateApplied {
                    applied: true,
                    previous: None,
                }
            }
        }
    }

    /// Get the latest snapshot for a (venue, symbol) key.
    #[must_use]
    pub fn get(&self, venue: &VenueId, symbol: &Symbol) -> Option<BookSnapshot> {
        self.books
            .get(&(venue.clone(), symbol.clone()))
            .map(|entry| entry.value().clone())
    }

    /// All venues currently holding a snapshot for `symbol`.
    #[must_use]
    pub fn venues_for(&self, symbol: &Symbol) -> Vec<VenueId> {
        self.books
            .iter()
            .filter(|entry| entry.key().1 == *symbol)
            .map(|entry| entry.key().0.clone())
            .collect()
    }

    /// Number of (venue, symbol) keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Returns true if the store holds no snapshots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

impl Default for OrderBookStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Quote;
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal_macros::dec;

    fn snapshot(venue: &str, symbol: &str, bid: rust_decimal::Decimal, ts: DateTime<Utc>) -> BookSnapshot {
        BookSnapshot::new(
            VenueId::new(venue),
            Symbol::new(symbol),
            Quote::new(bid, dec!(1)),
            Quote::new(bid + dec!(0.5), dec!(1)),
            ts,
        )
    }

    #[test]
    fn first_update_is_applied() {
        let store = OrderBookStore::new();
        let result = store.update(snapshot("kraken", "BTC/USDT", dec!(100), Utc::now()));

        assert!(result.applied);
        assert!(result.previous.is_none());
        assert!(store
            .get(&VenueId::new("kraken"), &Symbol::new("BTC/USDT"))
            .is_some());
    }

    #[test]
    fn newer_update_replaces_and_returns_previous() {
        let store = OrderBookStore::new();
        let t0 = Utc::now();

        store.update(snapshot("kraken", "BTC/USDT", dec!(100), t0));
        let result = store.update(snapshot("kraken", "BTC/USDT", dec!(101), t0 + Duration::milliseconds(10)));

        assert!(result.applied);
        assert_eq!(result.previous.unwrap().best_bid().price(), dec!(100));

        let stored = store
            .get(&VenueId::new("kraken"), &Symbol::new("BTC/USDT"))
            .unwrap();
        assert_eq!(stored.best_bid().price(), dec!(101));
    }

    #[test]
    fn stale_update_is_discarded() {
        let store = OrderBookStore::new();
        let t0 = Utc::now();

        store.update(snapshot("kraken", "BTC/USDT", dec!(100), t0));
        let result = store.update(snapshot("kraken", "BTC/USDT", dec!(99), t0 - Duration::milliseconds(10)));

        assert!(!result.applied);
        let stored = store
            .get(&VenueId::new("kraken"), &Symbol::new("BTC/USDT"))
            .unwrap();
        assert_eq!(stored.best_bid().price(), dec!(100));
    }

    #[test]
    fn equal_timestamp_is_discarded() {
        let store = OrderBookStore::new();
        let t0 = Utc::now();

        store.update(snapshot("kraken", "BTC/USDT", dec!(100), t0));
        let result = store.update(snapshot("kraken", "BTC/USDT", dec!(99), t0));

        assert!(!result.applied);
    }

    #[test]
    fn keys_are_independent_per_venue() {
        let store = OrderBookStore::new();
        let now = Utc::now();

        store.update(snapshot("kraken", "BTC/USDT", dec!(100), now));
        store.update(snapshot("binance", "BTC/USDT", dec!(101), now));
        store.update(snapshot("kraken", "ETH/USDT", dec!(2000), now));

        assert_eq!(store.len(), 3);
        let mut venues = store.venues_for(&Symbol::new("BTC/USDT"));
        venues.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(venues.len(), 2);
        assert_eq!(venues[0].as_str(), "binance");
        assert_eq!(venues[1].as_str(), "kraken");
    }
}
