//! Cross-venue opportunity scanning.
//!
//! The scanner re-evaluates every venue pair holding fresh quotes for a
//! symbol whenever the store accepts an update for it. Evaluation is
//! rate-limited per symbol, not globally, so a hot pair cannot starve a
//! quiet one and vice versa.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, trace};

use super::breaker::BreakerRegistry;
use super::store::OrderBookStore;
use crate::domain::{BookSnapshot, Opportunity, Symbol, VenueId};

/// Scanner tuning.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Minimum net profit fraction for a candidate to be emitted.
    pub min_profit_threshold: Decimal,
    /// Per-trade notional cap in quote currency.
    pub max_trade_size: Decimal,
    /// Worst-case slippage fraction applied against the buy notional.
    pub max_slippage: Decimal,
    /// Minimum time between scans of the same symbol.
    pub scan_cooldown: Duration,
    /// Quotes older than this are not evaluated.
    pub max_quote_age: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_profit_threshold: Decimal::new(1, 3), // 0.1%
            max_trade_size: Decimal::from(100),
            max_slippage: Decimal::new(1, 3), // 0.1%
            scan_cooldown: Duration::from_millis(500),
            max_quote_age: Duration::from_secs(5),
        }
    }
}

/// Per-venue taker fees with a default for venues without an override.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    default_fee: Decimal,
    overrides: HashMap<VenueId, Decimal>,
}

impl FeeSchedule {
    /// Create a schedule with a default taker fee fraction.
    #[must_use]
    pub fn new(default_fee: Decimal) -> Self {
        Self {
            default_fee,
            overrides: HashMap::new(),
        }
    }

    /// Set a venue-specific taker fee.
    pub fn set(&mut self, venue: VenueId, fee: Decimal) {
        self.overrides.insert(venue, fee);
    }

    /// Taker fee fraction for a venue.
    #[must_use]
    pub fn taker_fee(&self, venue: &VenueId) -> Decimal {
        self.overrides
            .get(venue)
            .copied()
            .unwrap_or(self.default_fee)
    }
}

/// Scans fresh order-book snapshots for profitable cross-venue pairs.
pub struct OpportunityScanner {
    store: Arc<OrderBookStore>,
    breakers: Arc<BreakerRegistry>,
    fees: FeeSchedule,
    config: ScannerConfig,
    /// Completion time of the last scan per symbol, for the cooldown.
    last_scan: Mutex<HashMap<Symbol, Instant>>,
}

impl OpportunityScanner {
    /// Create a scanner over the shared store and breaker registry.
    #[must_use]
    pub fn new(
        store: Arc<OrderBookStore>,
        breakers: Arc<BreakerRegistry>,
        fees: FeeSchedule,
        config: ScannerConfig,
    ) -> Self {
        Self {
            store,
            breakers,
            fees,
            config,
            last_scan: Mutex::new(HashMap::new()),
        }
    }

    /// Scan a symbol at the present instant.
    #[must_use]
    pub fn scan(&self, symbol: &Symbol) -> Vec<Opportunity> {
        self.scan_at(symbol, Instant::now(), Utc::now())
    }

    /// Scan a symbol with explicit clocks.
    ///
    /// Returns candidates sorted best-first, or nothing if the symbol is
    /// inside its cooldown window or no pair clears the threshold.
    #[must_use]
    pub fn scan_at(&self, symbol: &Symbol, now: Instant, wall: DateTime<Utc>) -> Vec<Opportunity> {
        {
            let last_scan = self.last_scan.lock();
            if let Some(last) = last_scan.get(symbol) {
                if now.duration_since(*last) < self.config.scan_cooldown {
                    trace!(symbol = %symbol, "Scan suppressed by cooldown");
                    return Vec::new();
                }
            }
        }

        let books = self.fresh_books(symbol, now, wall);
        let mut candidates = Vec::new();

        if books.len() >= 2 {
            for buy_book in &books {
                for sell_book in &books {
                    if buy_book.venue() == sell_book.venue() {
                        continue;
                    }
                    if let Some(opportunity) = self.evaluate_pair(buy_book, sell_book) {
                        candidates.push(opportunity);
                    }
                }
            }
        }

        candidates.sort_by(|a, b| b.net_profit().cmp(&a.net_profit()));
        self.last_scan.lock().insert(symbol.clone(), now);

        if let Some(best) = candidates.first() {
            debug!(
                symbol = %symbol,
                candidates = candidates.len(),
                best_net = %best.net_profit(),
                "Scan found candidates"
            );
        }
        candidates
    }

    /// Snapshots for `symbol` that are fresh enough to trade against and
    /// whose venue breaker is Closed or HalfOpen.
    fn fresh_books(&self, symbol: &Symbol, now: Instant, wall: DateTime<Utc>) -> Vec<BookSnapshot> {
        let max_age =
            chrono::Duration::milliseconds(self.config.max_quote_age.as_millis() as i64);
        self.store
            .venues_for(symbol)
            .into_iter()
            .filter(|venue| self.breakers.is_usable_at(venue, now))
            .filter_map(|venue| self.store.get(&venue, symbol))
            .filter(|book| book.age_at(wall) <= max_age)
            .collect()
    }

    /// Evaluate "buy on X, sell on Y" for one snapshot pair.
    fn evaluate_pair(
        &self,
        buy_book: &BookSnapshot,
        sell_book: &BookSnapshot,
    ) -> Option<Opportunity> {
        let buy = buy_book.best_ask();
        let sell = sell_book.best_bid();
        if buy.price() <= Decimal::ZERO || buy.size() <= Decimal::ZERO || sell.size() <= Decimal::ZERO {
            return None;
        }

        let size_cap = self.config.max_trade_size / buy.price();
        let trade_size = buy.size().min(sell.size()).min(size_cap);
        if trade_size <= Decimal::ZERO {
            return None;
        }

        let opportunity = Opportunity::new(
            buy_book.symbol().clone(),
            buy_book.venue().clone(),
            sell_book.venue().clone(),
            buy.price(),
            sell.price(),
            trade_size,
            self.fees.taker_fee(buy_book.venue()),
            self.fees.taker_fee(sell_book.venue()),
            self.config.max_slippage,
        );

        trace!(
            symbol = %opportunity.symbol(),
            buy_venue = %opportunity.buy_venue(),
            sell_venue = %opportunity.sell_venue(),
            net = %opportunity.net_profit(),
            "Evaluated pair"
        );

        if opportunity.net_profit() >= self.config.min_profit_threshold {
            Some(opportunity)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::breaker::BreakerConfig;
    use crate::domain::Quote;
    use rust_decimal_macros::dec;

    fn snapshot(
        venue: &str,
        bid: Decimal,
        bid_size: Decimal,
        ask: Decimal,
        ask_size: Decimal,
        ts: DateTime<Utc>,
    ) -> BookSnapshot {
        BookSnapshot::new(
            VenueId::new(venue),
            Symbol::new("BTC/USDT"),
            Quote::new(bid, bid_size),
            Quote::new(ask, ask_size),
            ts,
        )
    }

    fn scanner_with(config: ScannerConfig) -> (OpportunityScanner, Arc<OrderBookStore>, Arc<BreakerRegistry>) {
        let store = Arc::new(OrderBookStore::new());
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
        let fees = FeeSchedule::new(dec!(0.001));
        let scanner = OpportunityScanner::new(store.clone(), breakers.clone(), fees, config);
        (scanner, store, breakers)
    }

    fn spread_config() -> ScannerConfig {
        ScannerConfig {
            min_profit_threshold: dec!(0.0001), // 0.01%
            max_trade_size: dec!(1000),
            max_slippage: dec!(0.001),
            scan_cooldown: Duration::from_millis(100),
            max_quote_age: Duration::from_secs(5),
        }
    }

    #[test]
    fn emits_profitable_pair_above_threshold() {
        let (scanner, store, _) = scanner_with(spread_config());
        let wall = Utc::now();

        // kraken asks 100, binance bids 100.5: buy kraken / sell binance
        store.update(snapshot("kraken", dec!(99.8), dec!(5), dec!(100.0), dec!(5), wall));
        store.update(snapshot("binance", dec!(100.5), dec!(5), dec!(100.7), dec!(5), wall));

        let candidates = scanner.scan_at(&Symbol::new("BTC/USDT"), Instant::now(), wall);
        assert_eq!(candidates.len(), 1);

        let best = &candidates[0];
        assert_eq!(best.buy_venue().as_str(), "kraken");
        assert_eq!(best.sell_venue().as_str(), "binance");
        // 0.1% fees each leg + 0.1% slippage on a 0.5% gross spread
        assert_eq!(best.net_profit(), dec!(0.001995));
    }

    #[test]
    fn no_candidate_below_threshold() {
        let mut config = spread_config();
        config.min_profit_threshold = dec!(0.005); // 0.5%, above the net spread
        let (scanner, store, _) = scanner_with(config);
        let wall = Utc::now();

        store.update(snapshot("kraken", dec!(99.8), dec!(5), dec!(100.0), dec!(5), wall));
        store.update(snapshot("binance", dec!(100.5), dec!(5), dec!(100.7), dec!(5), wall));

        let candidates = scanner.scan_at(&Symbol::new("BTC/USDT"), Instant::now(), wall);
        assert!(candidates.is_empty());
    }

    #[test]
    fn cooldown_suppresses_back_to_back_scans() {
        let (scanner, store, _) = scanner_with(spread_config());
        let wall = Utc::now();
        let now = Instant::now();

        store.update(snapshot("kraken", dec!(99.8), dec!(5), dec!(100.0), dec!(5), wall));
        store.update(snapshot("binance", dec!(100.5), dec!(5), dec!(100.7), dec!(5), wall));

        let symbol = Symbol::new("BTC/USDT");
        assert_eq!(scanner.scan_at(&symbol, now, wall).len(), 1);

        // Inside the cooldown window: suppressed
        let soon = now + Duration::from_millis(50);
        assert!(scanner.scan_at(&symbol, soon, wall).is_empty());

        // After the window: evaluated again
        let later = now + Duration::from_millis(100);
        assert_eq!(scanner.scan_at(&symbol, later, wall).len(), 1);
    }

    #[test]
    fn cooldown_is_per_symbol() {
        let (scanner, store, _) = scanner_with(spread_config());
        let wall = Utc::now();
        let now = Instant::now();

        store.update(snapshot("kraken", dec!(99.8), dec!(5), dec!(100.0), dec!(5), wall));
        store.update(snapshot("binance", dec!(100.5), dec!(5), dec!(100.7), dec!(5), wall));

        let eth = Symbol::new("ETH/USDT");
        let eth_book = |venue: &str, bid: Decimal, ask: Decimal| {
            BookSnapshot::new(
                VenueId::new(venue),
                eth.clone(),
                Quote::new(bid, dec!(5)),
                Quote::new(ask, dec!(5)),
                wall,
            )
        };
        store.update(eth_book("kraken", dec!(1999), dec!(2000)));
        store.update(eth_book("binance", dec!(2010), dec!(2011)));

        let btc = Symbol::new("BTC/USDT");
        assert_eq!(scanner.scan_at(&btc, now, wall).len(), 1);

        // BTC is cooling down; ETH is not affected
        let soon = now + Duration::from_millis(10);
        assert!(scanner.scan_at(&btc, soon, wall).is_empty());
        assert!(!scanner.scan_at(&eth, soon, wall).is_empty());
    }

    #[test]
    fn stale_quotes_are_not_evaluated() {
        let (scanner, store, _) = scanner_with(spread_config());
        let wall = Utc::now();

        store.update(snapshot(
            "kraken",
            dec!(99.8),
            dec!(5),
            dec!(100.0),
            dec!(5),
            wall - chrono::Duration::seconds(10),
        ));
        store.update(snapshot("binance", dec!(100.5), dec!(5), dec!(100.7), dec!(5), wall));

        let candidates = scanner.scan_at(&Symbol::new("BTC/USDT"), Instant::now(), wall);
        assert!(candidates.is_empty());
    }

    #[test]
    fn open_breaker_excludes_venue() {
        let (scanner, store, breakers) = scanner_with(spread_config());
        let wall = Utc::now();
        let now = Instant::now();

        store.update(snapshot("kraken", dec!(99.8), dec!(5), dec!(100.0), dec!(5), wall));
        store.update(snapshot("binance", dec!(100.5), dec!(5), dec!(100.7), dec!(5), wall));

        breakers.force_open_at(&VenueId::new("kraken"), now);

        let candidates = scanner.scan_at(&Symbol::new("BTC/USDT"), now, wall);
        assert!(candidates.is_empty());
    }

    #[test]
    fn trade_size_capped_by_notional_limit() {
        let mut config = spread_config();
        config.max_trade_size = dec!(200); // 2 units at buy price 100
        let (scanner, store, _) = scanner_with(config);
        let wall = Utc::now();

        store.update(snapshot("kraken", dec!(99.8), dec!(10), dec!(100.0), dec!(10), wall));
        store.update(snapshot("binance", dec!(100.5), dec!(10), dec!(100.7), dec!(10), wall));

        let candidates = scanner.scan_at(&Symbol::new("BTC/USDT"), Instant::now(), wall);
        assert_eq!(candidates[0].trade_size(), dec!(2));
    }

    #[test]
    fn trade_size_limited_by_top_of_book_liquidity() {
        let (scanner, store, _) = scanner_with(spread_config());
        let wall = Utc::now();

        store.update(snapshot("kraken", dec!(99.8), dec!(5), dec!(100.0), dec!(0.5), wall));
        store.update(snapshot("binance", dec!(100.5), dec!(0.25), dec!(100.7), dec!(5), wall));

        let candidates = scanner.scan_at(&Symbol::new("BTC/USDT"), Instant::now(), wall);
        // min(ask size 0.5, bid size 0.25)
        assert_eq!(candidates[0].trade_size(), dec!(0.25));
    }

    #[test]
    fn single_venue_yields_nothing() {
        let (scanner, store, _) = scanner_with(spread_config());
        let wall = Utc::now();

        store.update(snapshot("kraken", dec!(99.8), dec!(5), dec!(100.0), dec!(5), wall));

        let candidates = scanner.scan_at(&Symbol::new("BTC/USDT"), Instant::now(), wall);
        assert!(candidates.is_empty());
    }

    #[test]
    fn fee_schedule_uses_override_then_default() {
        let mut fees = FeeSchedule::new(dec!(0.001));
        fees.set(VenueId::new("kraken"), dec!(0.0026));

        assert_eq!(fees.taker_fee(&VenueId::new("kraken")), dec!(0.0026));
        assert_eq!(fees.taker_fee(&VenueId::new("binance")), dec!(0.001));
    }
}
