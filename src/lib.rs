//! Spreadhawk - cross-exchange arbitrage detection and execution.
//!
//! This crate continuously compares live prices of the same instrument
//! across venues, detects discrepancies profitable after fees and slippage,
//! and executes matched buy-low/sell-high order pairs with partial-failure
//! recovery and a fail-safe kill switch.
//!
//! # Architecture
//!
//! - **[`domain`]** - Venue-agnostic types: snapshots, opportunities,
//!   orders, trade attempts, ledger records
//! - **[`port`]** - Integration seams: market data streams, order gateways,
//!   the PnL ledger
//! - **[`application`]** - The core services:
//!   - `OrderBookStore` - newest-wins snapshot store per (venue, symbol)
//!   - `OpportunityScanner` - fee/slippage-adjusted pair evaluation with a
//!     per-symbol cooldown
//!   - `RiskManager` - limit checks and the emergency stop
//!   - `TradeExecutor` - the two-leg execution state machine with unwinds
//!   - `OrderManager` - order lifecycle with cancel-on-timeout
//!   - `BreakerRegistry` - per-venue circuit breakers
//!   - `PnlTracker` - durable realized-PnL accounting
//! - **[`infrastructure`]** - Config loading, the JSONL file ledger, the
//!   paper venue, and the engine runtime
//!
//! # Example
//!
//! ```no_run
//! use spreadhawk::infrastructure::{paper_engine_from_config, Config};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.toml")?;
//! let engine = paper_engine_from_config(config)?;
//! let _handle = engine.handle();
//! engine.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
