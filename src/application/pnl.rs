//! Realized PnL tracking over a durable ledger.
//!
//! The durable append happens before the in-memory total is considered
//! authoritative: a crash between the two loses nothing, because startup
//! replays the ledger from empty to reconstruct the cumulative total.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::info;

use crate::domain::{LedgerEntry, LedgerEventKind, TradeOutcome};
use crate::error::Result;
use crate::port::ledger::PnlLedger;

/// Aggregates realized trade outcomes and persists them.
pub struct PnlTracker {
    ledger: Box<dyn PnlLedger>,
    /// Serializes the append-then-update write path.
    writer: Mutex<()>,
    /// Cumulative realized PnL; readable concurrently.
    cumulative: RwLock<Decimal>,
}

impl PnlTracker {
    /// Open a tracker over `ledger`, replaying it to reconstruct the
    /// cumulative total.
    pub fn load(ledger: Box<dyn PnlLedger>) -> Result<Self> {
        let entries = ledger.read_all()?;
        let cumulative: Decimal = entries
            .iter()
            .filter(|entry| entry.kind == LedgerEventKind::Trade)
            .map(|entry| entry.pnl)
            .sum();

        if !entries.is_empty() {
            info!(
                entries = entries.len(),
                cumulative = %cumulative,
                "PnL ledger replayed"
            );
        }

        Ok(Self {
            ledger,
            writer: Mutex::new(()),
            cumulative: RwLock::new(cumulative),
        })
    }

    /// Record a terminal trade outcome.
    ///
    /// Appends to the ledger first; only after the durable write succeeds
    /// is the in-memory cumulative updated. Returns the new cumulative.
    pub fn record(&self, outcome: &TradeOutcome) -> Result<Decimal> {
        let _writer = self.writer.lock();

        let new_total = *self.cumulative.read() + outcome.pnl;
        let entry = LedgerEntry::trade(
            Utc::now(),
            outcome.attempt_id.as_str(),
            outcome.pnl,
            new_total,
            format!(
                "{} {} buy:{} sell:{}",
                outcome.symbol, outcome.status, outcome.buy_venue, outcome.sell_venue,
            ),
        );
        self.ledger.append(&entry)?;

        *self.cumulative.write() = new_total;
        info!(
            attempt_id = %outcome.attempt_id,
            pnl = %outcome.pnl,
            cumulative = %new_total,
            "Trade outcome recorded"
        );
        Ok(new_total)
    }

    /// Durably record an operator alert (emergency stop, unwind failure).
    pub fn record_alert(&self, note: impl Into<String>) -> Result<()> {
        let _writer = self.writer.lock();
        let entry = LedgerEntry::alert(Utc::now(), *self.cumulative.read(), note);
        self.ledger.append(&entry)
    }

    /// Current cumulative realized PnL.
    #[must_use]
    pub fn cumulative(&self) -> Decimal {
        *self.cumulative.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AttemptId, AttemptStatus, Symbol, VenueId};
    use crate::error::{Error, LedgerError};
    use parking_lot::Mutex as PlMutex;
    use rust_decimal_macros::dec;

    /// In-memory ledger with an optional injected append failure.
    #[derive(Default)]
    struct MemoryLedger {
        entries: PlMutex<Vec<LedgerEntry>>,
        fail_append: std::sync::atomic::AtomicBool,
    }

    impl PnlLedger for MemoryLedger {
        fn append(&self, entry: &LedgerEntry) -> Result<()> {
            if self.fail_append.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::Ledger(LedgerError::Io(std::io::Error::other(
                    "disk full",
                ))));
            }
            self.entries.lock().push(entry.clone());
            Ok(())
        }

        fn read_all(&self) -> Result<Vec<LedgerEntry>> {
            Ok(self.entries.lock().clone())
        }
    }

    fn outcome(pnl: Decimal) -> TradeOutcome {
        TradeOutcome {
            attempt_id: AttemptId::new(),
            symbol: Symbol::new("BTC/USDT"),
            buy_venue: VenueId::new("kraken"),
            sell_venue: VenueId::new("binance"),
            status: AttemptStatus::BothFilled,
            pnl,
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn record_accumulates() {
        let tracker = PnlTracker::load(Box::new(MemoryLedger::default())).unwrap();

        assert_eq!(tracker.record(&outcome(dec!(1.5))).unwrap(), dec!(1.5));
        assert_eq!(tracker.record(&outcome(dec!(-0.5))).unwrap(), dec!(1.0));
        assert_eq!(tracker.cumulative(), dec!(1.0));
    }

    #[test]
    fn failed_append_leaves_total_untouched() {
        let ledger = MemoryLedger::default();
        ledger
            .fail_append
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let tracker = PnlTracker::load(Box::new(ledger)).unwrap();

        assert!(tracker.record(&outcome(dec!(5))).is_err());
        assert_eq!(tracker.cumulative(), Decimal::ZERO);
    }

    #[test]
    fn load_replays_trade_entries_only() {
        let ledger = MemoryLedger::default();
        ledger
            .append(&LedgerEntry::trade(Utc::now(), "a-1", dec!(2), dec!(2), "x"))
            .unwrap();
        ledger
            .append(&LedgerEntry::alert(Utc::now(), dec!(2), "unwind failed"))
            .unwrap();
        ledger
            .append(&LedgerEntry::trade(Utc::now(), "a-2", dec!(-3), dec!(-1), "y"))
            .unwrap();

        let tracker = PnlTracker::load(Box::new(ledger)).unwrap();
        assert_eq!(tracker.cumulative(), dec!(-1));
    }

    #[test]
    fn alerts_do_not_change_cumulative() {
        let tracker = PnlTracker::load(Box::new(MemoryLedger::default())).unwrap();
        tracker.record(&outcome(dec!(4))).unwrap();
        tracker.record_alert("emergency stop").unwrap();
        assert_eq!(tracker.cumulative(), dec!(4));
    }
}
