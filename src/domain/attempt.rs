//! Trade attempt lifecycle and outcome types.
//!
//! A trade attempt is one approved opportunity driven through the two-leg
//! execution protocol. There is no cross-venue atomicity: both legs are
//! submitted best-effort concurrently and partial failure is recovered by
//! compensating (unwind) orders, so the attempt status set distinguishes
//! every recovery path.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

use super::id::{AttemptId, OrderId, Symbol, VenueId};

/// Overall status of a two-leg trade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    /// Legs submitted, waiting for fills.
    InProgress,
    /// Both legs filled; the arbitrage position is complete.
    BothFilled,
    /// One leg failed while the other filled or was still open.
    OneLegFailed,
    /// A compensating order is flattening the one-sided position.
    Unwinding,
    /// The compensating order filled; exposure is flat again.
    Unwound,
    /// The compensating order itself failed; manual intervention required.
    UnwindFailed,
    /// Nothing filled and nothing left open; no position was taken.
    Aborted,
}

impl AttemptStatus {
    /// True once the attempt can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::BothFilled | Self::Unwound | Self::UnwindFailed | Self::Aborted
        )
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InProgress => "in_progress",
            Self::BothFilled => "both_filled",
            Self::OneLegFailed => "one_leg_failed",
            Self::Unwinding => "unwinding",
            Self::Unwound => "unwound",
            Self::UnwindFailed => "unwind_failed",
            Self::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// A trade attempt in flight: the correlation id and its two leg orders.
#[derive(Debug, Clone)]
pub struct TradeAttempt {
    /// Correlation id shared by both legs.
    pub id: AttemptId,
    /// Instrument being traded.
    pub symbol: Symbol,
    /// Order id of the buy leg, once submitted.
    pub buy_order: Option<OrderId>,
    /// Order id of the sell leg, once submitted.
    pub sell_order: Option<OrderId>,
    /// Current attempt status.
    pub status: AttemptStatus,
}

impl TradeAttempt {
    /// Create a new attempt awaiting leg submission.
    #[must_use]
    pub const fn new(id: AttemptId, symbol: Symbol) -> Self {
        Self {
            id,
            symbol,
            buy_order: None,
            sell_order: None,
            status: AttemptStatus::InProgress,
        }
    }
}

/// The realized financial result of one terminal trade attempt.
///
/// Reported to the PnL tracker exactly once per attempt, including any
/// unwind losses and fees.
#[derive(Debug, Clone)]
pub struct TradeOutcome {
    /// The attempt this outcome belongs to.
    pub attempt_id: AttemptId,
    /// Instrument traded.
    pub symbol: Symbol,
    /// Venue of the buy leg.
    pub buy_venue: VenueId,
    /// Venue of the sell leg.
    pub sell_venue: VenueId,
    /// Terminal status the attempt ended in.
    pub status: AttemptStatus,
    /// Realized profit or loss in quote currency, fees included.
    pub pnl: Decimal,
    /// When the attempt closed.
    pub closed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(AttemptStatus::BothFilled.is_terminal());
        assert!(AttemptStatus::Unwound.is_terminal());
        assert!(AttemptStatus::UnwindFailed.is_terminal());
        assert!(AttemptStatus::Aborted.is_terminal());
        assert!(!AttemptStatus::InProgress.is_terminal());
        assert!(!AttemptStatus::OneLegFailed.is_terminal());
        assert!(!AttemptStatus::Unwinding.is_terminal());
    }

    #[test]
    fn new_attempt_starts_in_progress() {
        let attempt = TradeAttempt::new(AttemptId::new(), Symbol::new("BTC/USDT"));
        assert_eq!(attempt.status, AttemptStatus::InProgress);
        assert!(attempt.buy_order.is_none());
        assert!(attempt.sell_order.is_none());
    }
}
