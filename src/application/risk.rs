//! Pre-trade risk validation and the emergency stop.
//!
//! `approve` gates every candidate opportunity through the configured
//! limits, short-circuiting on the first failure. Approval claims an
//! open-trade slot; the matching release happens only when the executor
//! reports the attempt closed in any terminal state.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use super::state::EngineState;
use crate::domain::Opportunity;
use crate::error::RiskError;

/// Result of a risk check.
#[derive(Debug, Clone)]
pub enum RiskCheckResult {
    /// All checks passed; an open-trade slot is claimed.
    Approved,
    /// A check failed; nothing was claimed.
    Rejected(RiskError),
}

impl RiskCheckResult {
    /// Check if the result is an approval.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Get the rejection error, if rejected.
    #[must_use]
    pub const fn rejection_error(&self) -> Option<&RiskError> {
        match self {
            Self::Approved => None,
            Self::Rejected(error) => Some(error),
        }
    }
}

/// Validates opportunities against risk limits and holds the kill switch.
pub struct RiskManager {
    state: Arc<EngineState>,
}

impl RiskManager {
    /// Create a risk manager over the shared engine state.
    #[must_use]
    pub const fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    /// Validate an opportunity, claiming an open-trade slot on approval.
    ///
    /// Checks run in order and short-circuit: kill switch, capacity, trade
    /// size, profit threshold (a defensive re-check of the scanner's own
    /// filter). The capacity check and the slot increment are one atomic
    /// operation, so concurrent approvals cannot oversubscribe the limit.
    #[must_use]
    pub fn approve(&self, opportunity: &Opportunity) -> RiskCheckResult {
        let limits = self.state.limits();

        if self.state.is_kill_switch_engaged() {
            warn!(symbol = %opportunity.symbol(), "Rejected: kill switch engaged");
            return RiskCheckResult::Rejected(RiskError::Halted);
        }

        if !self.state.try_claim_trade_slot() {
            let open = self.state.open_trade_count();
            warn!(
                symbol = %opportunity.symbol(),
                open = open,
                limit = limits.max_open_trades,
                "Rejected: at open-trade capacity"
            );
            return RiskCheckResult::Rejected(RiskError::Capacity {
                open,
                limit: limits.max_open_trades,
            });
        }

        // The slot is held from here on; release it if a later check fails.
        let notional = opportunity.notional();
        if notional > limits.max_trade_size {
            self.state.release_trade_slot();
            warn!(
                symbol = %opportunity.symbol(),
                notional = %notional,
                limit = %limits.max_trade_size,
                "Rejected: trade size over limit"
            );
            return RiskCheckResult::Rejected(RiskError::SizeLimitExceeded {
                notional: notional.to_string(),
                limit: limits.max_trade_size.to_string(),
            });
        }

        if opportunity.net_profit() < limits.min_profit_threshold {
            self.state.release_trade_slot();
            return RiskCheckResult::Rejected(RiskError::BelowThreshold {
                net_profit: opportunity.net_profit().to_string(),
                threshold: limits.min_profit_threshold.to_string(),
            });
        }

        info!(
            symbol = %opportunity.symbol(),
            buy_venue = %opportunity.buy_venue(),
            sell_venue = %opportunity.sell_venue(),
            net = %opportunity.net_profit(),
            "Opportunity approved"
        );
        RiskCheckResult::Approved
    }

    /// Release the open-trade slot for an attempt that reached any terminal
    /// state.
    pub fn on_attempt_closed(&self) {
        self.state.release_trade_slot();
    }

    /// Evaluate the emergency stop against the cumulative PnL.
    ///
    /// Engages the kill switch when cumulative PnL as a fraction of the
    /// reference capital has fallen below the configured stop-loss. Returns
    /// `true` only on the engaging transition so the caller cancels open
    /// orders exactly once.
    pub fn evaluate_emergency_stop(&self, cumulative_pnl: Decimal) -> bool {
        let limits = self.state.limits();
        if limits.reference_capital <= Decimal::ZERO {
            return false;
        }

        let loss_fraction = cumulative_pnl / limits.reference_capital;
        if loss_fraction >= -limits.emergency_stop_loss_pct {
            return false;
        }

        let newly_engaged = self.state.engage_kill_switch(format!(
            "emergency stop: cumulative PnL {cumulative_pnl} breached {} of reference capital {}",
            -limits.emergency_stop_loss_pct, limits.reference_capital,
        ));
        if newly_engaged {
            error!(
                cumulative_pnl = %cumulative_pnl,
                loss_fraction = %loss_fraction,
                stop_loss = %limits.emergency_stop_loss_pct,
                "EMERGENCY STOP: kill switch engaged, no further trades this run"
            );
        }
        newly_engaged
    }
}
