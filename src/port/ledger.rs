//! Persistence port for the PnL ledger.

use crate::domain::LedgerEntry;
use crate::error::Result;

/// Append-only storage for realized trade outcomes.
///
/// `append` must be durable before it returns: a crash immediately after a
/// successful append must not lose the record. `read_all` returns entries in
/// append order and is used to reconstruct the cumulative total at startup.
pub trait PnlLedger: Send + Sync {
    /// Durably append one entry.
    fn append(&self, entry: &LedgerEntry) -> Result<()>;

    /// Read every entry in append order.
    fn read_all(&self) -> Result<Vec<LedgerEntry>>;
}
