//! Per-venue circuit breakers.
//!
//! Each venue has a three-state breaker gating whether it may currently be
//! used:
//!
//! - **Closed** - calls pass through; consecutive failures are counted.
//! - **Open** - calls are rejected without touching the network until the
//!   backoff deadline passes.
//! - **HalfOpen** - exactly one trial call is permitted; its result decides
//!   between Closed and a longer Open.
//!
//! All transitions take the current [`Instant`] as an explicit argument so
//! the state machine is testable without sleeping; the `*_now` wrappers are
//! the production entry points.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{error, warn};

use crate::domain::VenueId;

/// Breaker tuning, shared by every venue.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a Closed breaker.
    pub failure_threshold: u32,
    /// Backoff after the first trip, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff growth factor per repeated failure.
    pub backoff_multiplier: f64,
    /// Backoff ceiling, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            initial_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 60_000,
        }
    }
}

/// Observable breaker state for one venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    /// Normal operation.
    Closed,
    /// Venue unusable until the backoff deadline.
    Open,
    /// One trial call permitted.
    HalfOpen,
}

impl std::fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
struct Breaker {
    status: BreakerStatus,
    consecutive_failures: u32,
    current_backoff_ms: u64,
    next_retry_at: Option<Instant>,
    trial_in_flight: bool,
}

impl Breaker {
    fn new(initial_backoff_ms: u64) -> Self {
        Self {
            status: BreakerStatus::Closed,
            consecutive_failures: 0,
            current_backoff_ms: initial_backoff_ms,
            next_retry_at: None,
            trial_in_flight: false,
        }
    }

    /// Advance Open to HalfOpen once the backoff deadline has passed.
    fn advance(&mut self, now: Instant) {
        if self.status == BreakerStatus::Open {
            if let Some(retry_at) = self.next_retry_at {
                if now >= retry_at {
                    self.status = BreakerStatus::HalfOpen;
                    self.trial_in_flight = false;
                }
            }
        }
    }

    fn open_with_backoff(&mut self, now: Instant, backoff_ms: u64) {
        self.status = BreakerStatus::Open;
        self.current_backoff_ms = backoff_ms;
        self.next_retry_at = Some(now + Duration::from_millis(backoff_ms));
        self.trial_in_flight = false;
    }
}

/// Breaker registry covering every venue in the run.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<VenueId, Breaker>,
}

impl BreakerRegistry {
    /// Create a registry with the given tuning.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Current status for a venue, advancing Open to HalfOpen if its
    /// deadline has passed. Unknown venues are Closed.
    pub fn status_at(&self, venue: &VenueId, now: Instant) -> BreakerStatus {
        match self.breakers.get_mut(venue) {
            Some(mut breaker) => {
                breaker.advance(now);
                breaker.status
            }
            None => BreakerStatus::Closed,
        }
    }

    /// Current status for a venue at the present instant.
    pub fn status(&self, venue: &VenueId) -> BreakerStatus {
        self.status_at(venue, Instant::now())
    }

    /// True if the venue may be considered for trading: Closed, or HalfOpen
    /// (where the eventual call will consume the trial slot).
    pub fn is_usable_at(&self, venue: &VenueId, now: Instant) -> bool {
        !matches!(self.status_at(venue, now), BreakerStatus::Open)
    }

    /// Try to acquire permission for a venue call.
    ///
    /// Closed always permits. Open rejects. HalfOpen permits exactly one
    /// in-flight trial; concurrent callers are rejected until the trial's
    /// result is recorded.
    pub fn try_acquire_at(&self, venue: &VenueId, now: Instant) -> bool {
        let mut breaker = self
            .breakers
            .entry(venue.clone())
            .or_insert_with(|| Breaker::new(self.config.initial_backoff_ms));
        breaker.advance(now);
        match breaker.status {
            BreakerStatus::Closed => true,
            BreakerStatus::Open => false,
            BreakerStatus::HalfOpen => {
                if breaker.trial_in_flight {
                    false
                } else {
                    breaker.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Try to acquire permission at the present instant.
    pub fn try_acquire(&self, venue: &VenueId) -> bool {
        self.try_acquire_at(venue, Instant::now())
    }

    /// Give back an acquired call slot without recording a result.
    ///
    /// Used when a caller acquired permission but abandoned the call (e.g.
    /// the other leg's venue was unavailable), so a HalfOpen trial slot is
    /// not leaked.
    pub fn release(&self, venue: &VenueId) {
        if let Some(mut breaker) = self.breakers.get_mut(venue) {
            breaker.trial_in_flight = false;
        }
    }

    /// Record a successful venue call: close the breaker and reset backoff.
    pub fn record_success(&self, venue: &VenueId) {
        if let Some(mut breaker) = self.breakers.get_mut(venue) {
            breaker.status = BreakerStatus::Closed;
            breaker.consecutive_failures = 0;
            breaker.current_backoff_ms = self.config.initial_backoff_ms;
            breaker.next_retry_at = None;
            breaker.trial_in_flight = false;
        }
    }

    /// Record a failed venue call.
    ///
    /// Trips Closed to Open at the failure threshold; a failed HalfOpen
    /// trial reopens with increased backoff, capped at the maximum.
    pub fn record_failure_at(&self, venue: &VenueId, now: Instant) {
        let mut breaker = self
            .breakers
            .entry(venue.clone())
            .or_insert_with(|| Breaker::new(self.config.initial_backoff_ms));
        breaker.advance(now);
        breaker.consecutive_failures += 1;

        match breaker.status {
            BreakerStatus::Closed => {
                if breaker.consecutive_failures >= self.config.failure_threshold {
                    let backoff = self.config.initial_backoff_ms;
                    breaker.open_with_backoff(now, backoff);
                    warn!(
                        venue = %venue,
                        failures = breaker.consecutive_failures,
                        backoff_ms = backoff,
                        "Circuit breaker tripped"
                    );
                }
            }
            BreakerStatus::HalfOpen => {
                let grown =
                    (breaker.current_backoff_ms as f64 * self.config.backoff_multiplier) as u64;
                let backoff = grown.min(self.config.max_backoff_ms);
                breaker.open_with_backoff(now, backoff);
                warn!(
                    venue = %venue,
                    backoff_ms = backoff,
                    "Trial call failed, circuit breaker reopened"
                );
            }
            BreakerStatus::Open => {
                // Late failure from an already-rejected window; state holds.
            }
        }
    }

    /// Record a failed venue call at the present instant.
    pub fn record_failure(&self, venue: &VenueId) {
        self.record_failure_at(venue, Instant::now());
    }

    /// Force a venue's breaker Open for the maximum backoff.
    ///
    /// Used when an unwind fails: the venue requires manual intervention
    /// and must not be traded meanwhile. Other venues keep running.
    pub fn force_open_at(&self, venue: &VenueId, now: Instant) {
        let mut breaker = self
            .breakers
            .entry(venue.clone())
            .or_insert_with(|| Breaker::new(self.config.initial_backoff_ms));
        let backoff = self.config.max_backoff_ms;
        breaker.open_with_backoff(now, backoff);
        error!(venue = %venue, backoff_ms = backoff, "Circuit breaker forced open");
    }

    /// Force a venue's breaker Open at the present instant.
    pub fn force_open(&self, venue: &VenueId) {
        self.force_open_at(venue, Instant::now());
    }

    /// Snapshot of every tracked venue's status for the status query.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(VenueId, BreakerStatus)> {
        let now = Instant::now();
        self.breakers
            .iter_mut()
            .map(|mut entry| {
                entry.value_mut().advance(now);
                (entry.key().clone(), entry.value().status)
            })
            .collect()
    }
}
