//! Venue-agnostic domain types.

mod attempt;
mod book;
mod id;
mod ledger;
mod money;
mod opportunity;
mod order;

pub use attempt::{AttemptStatus, TradeAttempt, TradeOutcome};
pub use book::{BookSnapshot, Quote};
pub use id::{AttemptId, OrderId, Symbol, VenueId};
pub use ledger::{LedgerEntry, LedgerEventKind};
pub use money::{Price, Quantity};
pub use opportunity::Opportunity;
pub use order::{OrderKind, OrderRecord, OrderSide, OrderSpec, OrderStatus};
