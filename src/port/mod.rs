//! Integration seams for external collaborators.

pub mod ledger;
pub mod venue;

pub use ledger::PnlLedger;
pub use venue::{MarketDataStream, MarketEvent, OrderGateway, OrderStatusReport};
