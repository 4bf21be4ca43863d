//! Engine wiring and event loop.
//!
//! Control flow: venue market-data pushes feed the order-book store; each
//! accepted update triggers a (cooldown-limited) scan for that symbol;
//! approved candidates are executed on a spawned task; terminal outcomes
//! release their trade slot, land in the PnL ledger, and drive the
//! emergency-stop evaluation. A low-frequency safety poll re-checks the
//! stop condition even when no market data flows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::config::Config;
use super::ledger::FileLedger;
use super::paper::{mid_price, PaperFeed, PaperGateway};
use crate::application::breaker::{BreakerRegistry, BreakerStatus};
use crate::application::executor::{GatewayMap, TradeExecutor};
use crate::application::orders::OrderManager;
use crate::application::pnl::PnlTracker;
use crate::application::risk::{RiskCheckResult, RiskManager};
use crate::application::scanner::OpportunityScanner;
use crate::application::state::EngineState;
use crate::application::store::OrderBookStore;
use crate::domain::{AttemptStatus, Opportunity, Symbol, VenueId};
use crate::error::{ConfigError, Result, RiskError};
use crate::port::ledger::PnlLedger;
use crate::port::venue::{MarketDataStream, MarketEvent, OrderGateway};

/// How order submissions are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    /// Orders go to simulated fill responders; no venue is touched.
    Paper,
    /// Orders go to the registered venue gateways.
    Live,
}

/// Read-only engine status for the operational surface.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    /// Trade attempts currently in flight.
    pub open_trade_count: u32,
    /// Whether the kill switch is engaged.
    pub kill_switch_engaged: bool,
    /// Why it engaged, if it did.
    pub kill_switch_reason: Option<String>,
    /// Per-venue circuit breaker states.
    pub breakers: Vec<(VenueId, BreakerStatus)>,
    /// Cumulative realized PnL.
    pub cumulative_pnl: Decimal,
}

/// Handle for stopping and inspecting a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    state: Arc<EngineState>,
    breakers: Arc<BreakerRegistry>,
    pnl: Arc<PnlTracker>,
    shutdown: Arc<Notify>,
}

impl EngineHandle {
    /// Begin a graceful stop: no new opportunities are accepted, in-flight
    /// attempts resolve, then the run loop exits.
    pub fn stop(&self) {
        info!("Graceful stop requested");
        self.state.begin_stop();
        // notify_one stores a permit for a run loop that is not currently
        // parked in select; notify_waiters wakes one that is.
        self.shutdown.notify_one();
        self.shutdown.notify_waiters();
    }

    /// Snapshot of the engine's operational state.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            open_trade_count: self.state.open_trade_count(),
            kill_switch_engaged: self.state.is_kill_switch_engaged(),
            kill_switch_reason: self.state.kill_switch_reason(),
            breakers: self.breakers.snapshot(),
            cumulative_pnl: self.pnl.cumulative(),
        }
    }
}

/// One venue registered with the builder.
struct VenueRegistration {
    stream: Box<dyn MarketDataStream>,
    symbols: Vec<Symbol>,
    gateway: Arc<dyn OrderGateway>,
}

/// Builds an [`Engine`] from configuration plus venue adapters.
pub struct EngineBuilder {
    config: Config,
    ledger: Option<Box<dyn PnlLedger>>,
    venues: Vec<VenueRegistration>,
}

impl EngineBuilder {
    /// Start a builder from validated configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ledger: None,
            venues: Vec::new(),
        }
    }

    /// Register a venue: its market data stream, watched symbols, and order
    /// gateway.
    #[must_use]
    pub fn venue(
        mut self,
        stream: Box<dyn MarketDataStream>,
        symbols: Vec<Symbol>,
        gateway: Arc<dyn OrderGateway>,
    ) -> Self {
        self.venues.push(VenueRegistration {
            stream,
            symbols,
            gateway,
        });
        self
    }

    /// Use a specific ledger instead of the configured file ledger.
    #[must_use]
    pub fn ledger(mut self, ledger: Box<dyn PnlLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Assemble the engine.
    ///
    /// In paper mode every registered gateway is replaced with a simulated
    /// fill responder; the state-machine logic downstream is identical.
    ///
    /// # Errors
    ///
    /// Fails if fewer than two venues are registered (arbitrage needs a
    /// pair) or the ledger cannot be opened.
    pub fn build(self, mode: TradingMode) -> Result<Engine> {
        let distinct_venues = self
            .venues
            .iter()
            .map(|registration| registration.stream.venue().clone())
            .collect::<std::collections::HashSet<_>>();
        if distinct_venues.len() < 2 {
            return Err(ConfigError::InvalidValue {
                field: "venues",
                reason: format!(
                    "arbitrage requires at least two venues, {} registered",
                    distinct_venues.len()
                ),
            }
            .into());
        }

        let ledger: Box<dyn PnlLedger> = match self.ledger {
            Some(ledger) => ledger,
            None => Box::new(FileLedger::open(&self.config.pnl.file)?),
        };
        let pnl = Arc::new(PnlTracker::load(ledger)?);

        let state = Arc::new(EngineState::new(self.config.risk_limits()));
        let store = Arc::new(OrderBookStore::new());
        let breakers = Arc::new(BreakerRegistry::new(self.config.breaker_config()));
        let fees = self.config.fee_schedule();
        let scanner = Arc::new(OpportunityScanner::new(
            store.clone(),
            breakers.clone(),
            fees.clone(),
            self.config.scanner_config(),
        ));
        let risk = Arc::new(RiskManager::new(state.clone()));
        let orders = Arc::new(OrderManager::new(self.config.order_policy()));

        let mut gateways: GatewayMap = HashMap::new();
        let mut paper_gateways: HashMap<VenueId, Arc<PaperGateway>> = HashMap::new();
        let mut streams = Vec::new();

        for registration in self.venues {
            let venue = registration.stream.venue().clone();
            match mode {
                TradingMode::Live => {
                    gateways.insert(venue, registration.gateway);
                }
                TradingMode::Paper => {
                    let paper = Arc::new(PaperGateway::new(venue.clone()));
                    paper_gateways.insert(venue.clone(), paper.clone());
                    gateways.insert(venue, paper);
                }
            }
            streams.push((registration.stream, registration.symbols));
        }

        let executor = Arc::new(TradeExecutor::new(
            gateways.clone(),
            orders.clone(),
            breakers.clone(),
            fees,
        ));

        info!(
            mode = ?mode,
            venues = streams.len(),
            "Engine assembled"
        );

        Ok(Engine {
            mode,
            safety_poll: self.config.safety_poll_interval(),
            state,
            store,
            breakers,
            scanner,
            risk,
            orders,
            executor,
            pnl,
            gateways,
            paper_gateways,
            streams,
            shutdown: Arc::new(Notify::new()),
        })
    }
}

/// The assembled arbitrage engine.
pub struct Engine {
    mode: TradingMode,
    safety_poll: Duration,
    state: Arc<EngineState>,
    store: Arc<OrderBookStore>,
    breakers: Arc<BreakerRegistry>,
    scanner: Arc<OpportunityScanner>,
    risk: Arc<RiskManager>,
    orders: Arc<OrderManager>,
    executor: Arc<TradeExecutor>,
    pnl: Arc<PnlTracker>,
    gateways: GatewayMap,
    paper_gateways: HashMap<VenueId, Arc<PaperGateway>>,
    streams: Vec<(Box<dyn MarketDataStream>, Vec<Symbol>)>,
    shutdown: Arc<Notify>,
}

impl Engine {
    /// Start building an engine from configuration.
    #[must_use]
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Handle for stopping and inspecting the engine while it runs.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            state: self.state.clone(),
            breakers: self.breakers.clone(),
            pnl: self.pnl.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Run until a graceful stop is requested.
    ///
    /// Consumes the engine; use [`Engine::handle`] first to keep a stop and
    /// status handle.
    pub async fn run(mut self) -> Result<()> {
        info!(mode = ?self.mode, "Engine starting");

        let limits = self.state.limits().clone();
        info!(
            max_open_trades = limits.max_open_trades,
            min_profit_threshold = %limits.min_profit_threshold,
            max_trade_size = %limits.max_trade_size,
            emergency_stop_loss_pct = %limits.emergency_stop_loss_pct,
            "Active risk limits"
        );

        let (event_tx, mut event_rx) = mpsc::channel::<MarketEvent>(1024);
        let mut pumps = JoinSet::new();
        for (stream, symbols) in self.streams.drain(..) {
            pumps.spawn(pump_stream(
                stream,
                symbols,
                event_tx.clone(),
                self.breakers.clone(),
                self.state.clone(),
            ));
        }
        drop(event_tx);

        let mut executions = JoinSet::new();
        let mut safety_tick = tokio::time::interval(self.safety_poll);
        safety_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so the poll is
        // genuinely periodic.
        safety_tick.tick().await;

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(MarketEvent::Snapshot(snapshot)) => {
                            self.on_snapshot(snapshot, &mut executions);
                        }
                        Some(MarketEvent::Disconnected { reason }) => {
                            debug!(reason = %reason, "Stream disconnect event");
                        }
                        None => {
                            warn!("All market data streams ended");
                            break;
                        }
                    }
                }
                _ = safety_tick.tick() => {
                    debug!("Safety poll: evaluating emergency stop");
                    self.evaluate_stop().await;
                }
                _ = self.shutdown.notified() => {
                    break;
                }
            }
            if self.state.is_stopping() {
                break;
            }
        }

        info!(
            in_flight = executions.len(),
            "Run loop exiting, letting in-flight attempts resolve"
        );
        while let Some(result) = executions.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "Execution task panicked");
            }
        }
        pumps.abort_all();
        while pumps.join_next().await.is_some() {}

        info!(cumulative_pnl = %self.pnl.cumulative(), "Engine stopped");
        Ok(())
    }

    /// Apply one snapshot and, if it was fresh, scan its symbol.
    fn on_snapshot(
        &self,
        snapshot: crate::domain::BookSnapshot,
        executions: &mut JoinSet<()>,
    ) {
        let symbol = snapshot.symbol().clone();

        if let Some(paper) = self.paper_gateways.get(snapshot.venue()) {
            paper.set_mark(symbol.clone(), mid_price(&snapshot));
        }

        let update = self.store.update(snapshot);
        if !update.applied {
            return;
        }
        if self.state.is_stopping() || self.state.is_kill_switch_engaged() {
            return;
        }

        for opportunity in self.scanner.scan(&symbol) {
            match self.risk.approve(&opportunity) {
                RiskCheckResult::Approved => {
                    self.spawn_execution(opportunity, executions);
                    break;
                }
                RiskCheckResult::Rejected(RiskError::Halted | RiskError::Capacity { .. }) => {
                    break;
                }
                RiskCheckResult::Rejected(reason) => {
                    debug!(reason = %reason, "Candidate rejected, trying next");
                }
            }
        }
    }

    /// Drive one approved opportunity to its terminal outcome.
    fn spawn_execution(&self, opportunity: Opportunity, executions: &mut JoinSet<()>) {
        let executor = self.executor.clone();
        let risk = self.risk.clone();
        let pnl = self.pnl.clone();
        let orders = self.orders.clone();
        let gateways = self.gateways.clone();
        let breakers = self.breakers.clone();

        executions.spawn(async move {
            let outcome = executor.execute(&opportunity).await;
            risk.on_attempt_closed();

            if outcome.status == AttemptStatus::UnwindFailed {
                if let Err(err) = pnl.record_alert(format!(
                    "unwind failed for attempt {} on {}; manual intervention required",
                    outcome.attempt_id, outcome.symbol,
                )) {
                    error!(error = %err, "Failed to persist unwind alert");
                }
            }

            let cumulative = match pnl.record(&outcome) {
                Ok(total) => total,
                Err(err) => {
                    error!(
                        attempt_id = %outcome.attempt_id,
                        error = %err,
                        "Failed to persist trade outcome"
                    );
                    pnl.cumulative()
                }
            };

            if risk.evaluate_emergency_stop(cumulative) {
                halt_open_orders(&orders, &gateways, &breakers, &pnl).await;
            }
        });
    }

    /// Periodic safety poll, independent of trading activity.
    async fn evaluate_stop(&self) {
        if self.risk.evaluate_emergency_stop(self.pnl.cumulative()) {
            halt_open_orders(&self.orders, &self.gateways, &self.breakers, &self.pnl).await;
        }
    }
}

/// Cancel every open order and persist the emergency-stop alert.
async fn halt_open_orders(
    orders: &Arc<OrderManager>,
    gateways: &GatewayMap,
    breakers: &Arc<BreakerRegistry>,
    pnl: &Arc<PnlTracker>,
) {
    let failures = orders.cancel_all_open(gateways).await;
    for (venue, _) in &failures {
        breakers.record_failure(venue);
    }
    if let Err(err) = pnl.record_alert("emergency stop: kill switch engaged, open orders cancelled")
    {
        error!(error = %err, "Failed to persist emergency-stop alert");
    }
}

/// Pump one venue stream into the engine's event channel.
async fn pump_stream(
    mut stream: Box<dyn MarketDataStream>,
    symbols: Vec<Symbol>,
    events: mpsc::Sender<MarketEvent>,
    breakers: Arc<BreakerRegistry>,
    state: Arc<EngineState>,
) {
    let venue = stream.venue().clone();

    while !state.is_stopping() {
        if let Err(err) = stream.connect().await {
            warn!(venue = %venue, error = %err, "Stream connect failed");
            breakers.record_failure(&venue);
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }
        if let Err(err) = stream.subscribe(&symbols).await {
            warn!(venue = %venue, error = %err, "Stream subscribe failed");
            breakers.record_failure(&venue);
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }
        info!(venue = %venue, symbols = symbols.len(), "Market data stream running");

        while let Some(event) = stream.next_event().await {
            if let MarketEvent::Disconnected { ref reason } = event {
                warn!(venue = %venue, reason = %reason, "Stream disconnected");
                breakers.record_failure(&venue);
            }
            if events.send(event).await.is_err() {
                return;
            }
        }
        warn!(venue = %venue, "Stream ended, reconnecting");
    }
}

/// Assemble a fully self-contained paper engine from configuration alone.
///
/// Every enabled venue gets a deterministic cycling quote feed and a
/// simulated fill gateway, so the complete detection-to-ledger path runs
/// with no external connectivity. Venue feeds are phase-shifted so spreads
/// periodically cross and opportunities actually occur.
pub fn paper_engine_from_config(config: Config) -> Result<Engine> {
    let venues = config.enabled_venues();
    let mut builder = Engine::builder(config);

    for (index, (venue, symbols)) in venues.into_iter().enumerate() {
        let offset = Decimal::from(index as u32) * dec!(0.05);
        let quotes = vec![
            (dec!(99.90) + offset, dec!(100.00) + offset),
            (dec!(100.40) - offset, dec!(100.50) - offset),
            (dec!(100.10) + offset, dec!(100.20) + offset),
        ];

        for symbol in &symbols {
            let feed = PaperFeed::new(
                venue.clone(),
                symbol.clone(),
                quotes.clone(),
                dec!(1),
                Duration::from_millis(500),
            );
            let gateway: Arc<dyn OrderGateway> = Arc::new(PaperGateway::new(venue.clone()));
            builder = builder.venue(Box::new(feed), vec![symbol.clone()], gateway);
        }
    }

    builder.build(TradingMode::Paper)
}
