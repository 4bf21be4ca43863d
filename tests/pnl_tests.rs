//! Ledger durability and replay round-trip tests.

use chrono::Utc;
use rust_decimal_macros::dec;

use spreadhawk::application::PnlTracker;
use spreadhawk::domain::{AttemptId, AttemptStatus, Symbol, TradeOutcome, VenueId};
use spreadhawk::infrastructure::FileLedger;
use spreadhawk::port::ledger::PnlLedger;

fn outcome(pnl: rust_decimal::Decimal) -> TradeOutcome {
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

/// The cumulative total after restart equals replaying the full ledger
/// from empty.
#[test]
fn cumulative_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");

    {
        let tracker = PnlTracker::load(Box::new(FileLedger::open(&path).unwrap())).unwrap();
        tracker.record(&outcome(dec!(2.50))).unwrap();
        tracker.record(&outcome(dec!(-1.25))).unwrap();
        tracker.record(&outcome(dec!(0.75))).unwrap();
        assert_eq!(tracker.cumulative(), dec!(2.00));
    }

    // "Restart": a fresh tracker over the same file
    let reloaded = PnlTracker::load(Box::new(FileLedger::open(&path).unwrap())).unwrap();
    assert_eq!(reloaded.cumulative(), dec!(2.00));
}

/// Alert entries are persisted alongside trades without affecting the
/// replayed total.
#[test]
fn alerts_are_durable_but_neutral() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");

    {
        let tracker = PnlTracker::load(Box::new(FileLedger::open(&path).unwrap())).unwrap();
        tracker.record(&outcome(dec!(-110))).unwrap();
        tracker
            .record_alert("emergency stop: kill switch engaged")
            .unwrap();
    }

    let ledger = FileLedger::open(&path).unwrap();
    let entries = ledger.read_all().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[1].note.contains("emergency stop"));

    let reloaded = PnlTracker::load(Box::new(ledger)).unwrap();
    assert_eq!(reloaded.cumulative(), dec!(-110));
}

/// Every entry carries the running total at the time it was written.
#[test]
fn entries_carry_running_cumulative() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");

    let tracker = PnlTracker::load(Box::new(FileLedger::open(&path).unwrap())).unwrap();
    tracker.record(&outcome(dec!(1))).unwrap();
    tracker.record(&outcome(dec!(2))).unwrap();
    tracker.record(&outcome(dec!(-4))).unwrap();

    let entries = FileLedger::open(&path).unwrap().read_all().unwrap();
    let totals: Vec<_> = entries.iter().map(|entry| entry.cumulative).collect();
    assert_eq!(totals, vec![dec!(1), dec!(3), dec!(-1)]);
}
