//! Persistent PnL ledger record types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    /// A realized trade outcome; contributes to the cumulative total.
    Trade,
    /// An operator-facing alert (emergency stop, unwind failure); carries
    /// zero PnL and exists so the condition is durably recorded.
    Alert,
}

/// One append-only ledger record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Trade outcome or alert.
    pub kind: LedgerEventKind,
    /// Correlation id of the originating attempt, if any.
    pub attempt_id: Option<String>,
    /// Realized profit or loss for this entry (zero for alerts).
    pub pnl: Decimal,
    /// Running cumulative total after this entry was applied.
    pub cumulative: Decimal,
    /// Human-readable context (alert reason, symbol, venues).
    pub note: String,
}

impl LedgerEntry {
    /// Build a trade entry.
    #[must_use]
    pub fn trade(
        timestamp: DateTime<Utc>,
        attempt_id: impl Into<String>,
        pnl: Decimal,
        cumulative: Decimal,
        note: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            kind: LedgerEventKind::Trade,
            attempt_id: Some(attempt_id.into()),
            pnl,
            cumulative,
            note: note.into(),
        }
    }

    /// Build an alert entry.
    #[must_use]
    pub fn alert(timestamp: DateTime<Utc>, cumulative: Decimal, note: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind: LedgerEventKind::Alert,
            attempt_id: None,
            pnl: Decimal::ZERO,
            cumulative,
            note: note.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn trade_entry_roundtrips_through_json() {
        let entry = LedgerEntry::trade(Utc::now(), "attempt-1", dec!(1.25), dec!(3.50), "BTC/USDT");
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: LedgerEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.kind, LedgerEventKind::Trade);
        assert_eq!(parsed.attempt_id.as_deref(), Some("attempt-1"));
        assert_eq!(parsed.pnl, dec!(1.25));
        assert_eq!(parsed.cumulative, dec!(3.50));
    }

    #[test]
    fn alert_entry_has_zero_pnl() {
        let entry = LedgerEntry::alert(Utc::now(), dec!(-11), "emergency stop");
        assert_eq!(entry.kind, LedgerEventKind::Alert);
        assert_eq!(entry.pnl, Decimal::ZERO);
        assert!(entry.attempt_id.is_none());
    }
}
