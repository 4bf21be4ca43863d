use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Errors reported by a market venue.
///
/// Every variant counts as a failure signal against the venue's circuit
/// breaker.
#[derive(Error, Debug)]
pub enum VenueError {
    #[error("venue call failed: {0}")]
    Call(String),

    #[error("order {order_id} timed out after {waited_ms}ms")]
    OrderTimeout { order_id: String, waited_ms: u64 },

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("venue {venue} is unavailable: circuit open")]
    CircuitOpen { venue: String },

    #[error("unknown order id: {0}")]
    UnknownOrder(String),
}

/// Risk management rejections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskError {
    #[error("halted: kill switch engaged")]
    Halted,

    #[error("capacity: {open} open trades >= limit {limit}")]
    Capacity { open: u32, limit: u32 },

    #[error("size: notional {notional} exceeds max trade size {limit}")]
    SizeLimitExceeded { notional: String, limit: String },

    #[error("below-threshold: net profit {net_profit} < {threshold}")]
    BelowThreshold { net_profit: String, threshold: String },
}

/// Trade execution faults.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("leg submission failed on {venue}: {reason}")]
    LegFailed { venue: String, reason: String },

    #[error("unwind failed on {venue}: {reason}; manual intervention required")]
    UnwindFailed { venue: String, reason: String },
}

/// PnL ledger persistence errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger record malformed: {0}")]
    Malformed(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
