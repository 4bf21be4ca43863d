//! Shared engine state.
//!
//! One `EngineState` is shared by reference across the scanner, risk
//! manager, executor, and engine loop. All mutation goes through the
//! methods here; the open-trade slot counter in particular treats
//! "check limit, then increment" as a single atomic operation so two
//! opportunities racing for the last slot cannot both win it.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

/// Risk limits, validated once at startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    /// Minimum net profit fraction required to act on an opportunity.
    pub min_profit_threshold: Decimal,
    /// Maximum per-trade notional in quote currency.
    pub max_trade_size: Decimal,
    /// Maximum number of trade attempts in flight at once.
    pub max_open_trades: u32,
    /// Loss fraction of reference capital that engages the kill switch.
    pub emergency_stop_loss_pct: Decimal,
    /// Capital baseline the stop-loss percentage is measured against.
    pub reference_capital: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            min_profit_threshold: Decimal::new(1, 3), // 0.1%
            max_trade_size: Decimal::from(100),
            max_open_trades: 5,
            emergency_stop_loss_pct: Decimal::new(1, 1), // 10%
            reference_capital: Decimal::from(1000),
        }
    }
}

/// Shared state accessible by all engine components.
pub struct EngineState {
    /// Risk limits configuration.
    limits: RiskLimits,
    /// Count of trade attempts currently in flight.
    open_trades: Mutex<u32>,
    /// Kill switch - once true, no new trades for the rest of the run.
    kill_switch: AtomicBool,
    /// Reason the kill switch was engaged.
    kill_switch_reason: RwLock<Option<String>>,
    /// Graceful-stop flag - stop accepting new opportunities.
    stopping: AtomicBool,
}

impl EngineState {
    /// Create new state with the given risk limits.
    #[must_use]
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            open_trades: Mutex::new(0),
            kill_switch: AtomicBool::new(false),
            kill_switch_reason: RwLock::new(None),
            stopping: AtomicBool::new(false),
        }
    }

    /// Get the configured risk limits.
    #[must_use]
    pub const fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Try to claim an open-trade slot.
    ///
    /// Returns `false` if the count is already at `max_open_trades`. Check
    /// and increment happen under one lock.
    pub fn try_claim_trade_slot(&self) -> bool {
        let mut open = self.open_trades.lock();
        if *open >= self.limits.max_open_trades {
            return false;
        }
        *open += 1;
        true
    }

    /// Release a previously claimed slot when an attempt reaches any
    /// terminal state.
    pub fn release_trade_slot(&self) {
        let mut open = self.open_trades.lock();
        *open = open.saturating_sub(1);
    }

    /// Number of trade attempts currently in flight.
    #[must_use]
    pub fn open_trade_count(&self) -> u32 {
        *self.open_trades.lock()
    }

    /// Engage the kill switch.
    ///
    /// Returns `true` only for the engaging call; the flag is monotonic for
    /// the rest of the run and is never cleared automatically.
    pub fn engage_kill_switch(&self, reason: impl Into<String>) -> bool {
        let newly = self
            .kill_switch
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if newly {
            *self.kill_switch_reason.write() = Some(reason.into());
        }
        newly
    }

    /// Check if the kill switch is engaged.
    #[must_use]
    pub fn is_kill_switch_engaged(&self) -> bool {
        self.kill_switch.load(Ordering::SeqCst)
    }

    /// Get the kill switch reason if engaged.
    #[must_use]
    pub fn kill_switch_reason(&self) -> Option<String> {
        self.kill_switch_reason.read().clone()
    }

    /// Begin a graceful stop: no new opportunities are accepted, in-flight
    /// attempts resolve normally.
    pub fn begin_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    /// Check if a graceful stop is in progress.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new(RiskLimits::default())
    }
}
