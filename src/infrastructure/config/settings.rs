//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all engine settings.
//! Configuration is loaded from a TOML file and validated once at startup;
//! the engine never consults the file again at runtime.
//!
//! # Example
//!
//! ```no_run
//! use spreadhawk::infrastructure::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::logging::LoggingConfig;
use crate::application::breaker::BreakerConfig;
use crate::application::orders::OrderPolicy;
use crate::application::scanner::{FeeSchedule, ScannerConfig};
use crate::application::state::RiskLimits;
use crate::domain::{Symbol, VenueId};
use crate::error::{ConfigError, Result};

/// Per-venue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// Whether this venue participates in the run.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Taker fee fraction override (e.g. 0.0026 = 0.26%). Venues without
    /// an override use `fees.default_taker_fee`.
    #[serde(default)]
    pub taker_fee: Option<Decimal>,
    /// Instruments to watch on this venue.
    #[serde(default)]
    pub symbols: Vec<String>,
}

const fn default_enabled() -> bool {
    true
}

/// Opportunity detection parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ArbitrageConfig {
    /// Minimum net profit fraction to act on (e.g. 0.001 = 0.1%).
    #[serde(default = "default_min_profit_threshold")]
    pub min_profit_threshold: Decimal,
    /// Per-trade notional cap in quote currency.
    #[serde(default = "default_max_trade_size")]
    pub max_trade_size: Decimal,
    /// Worst-case slippage fraction per trade.
    #[serde(default = "default_max_slippage")]
    pub max_slippage: Decimal,
    /// Minimum milliseconds between scans of the same symbol.
    #[serde(default = "default_scan_cooldown_ms")]
    pub scan_cooldown_ms: u64,
    /// Fallback safety poll interval in seconds; catches the emergency-stop
    /// condition even when no market data flows.
    #[serde(default = "default_scan_interval_s")]
    pub scan_interval_s: u64,
    /// Quotes older than this many milliseconds are not evaluated.
    #[serde(default = "default_max_quote_age_ms")]
    pub max_quote_age_ms: u64,
}

fn default_min_profit_threshold() -> Decimal {
    Decimal::new(1, 3) // 0.1%
}

fn default_max_trade_size() -> Decimal {
    Decimal::from(100)
}

fn default_max_slippage() -> Decimal {
    Decimal::new(1, 3) // 0.1%
}

const fn default_scan_cooldown_ms() -> u64 {
    500
}

const fn default_scan_interval_s() -> u64 {
    30
}

const fn default_max_quote_age_ms() -> u64 {
    5_000
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            min_profit_threshold: default_min_profit_threshold(),
            max_trade_size: default_max_trade_size(),
            max_slippage: default_max_slippage(),
            scan_cooldown_ms: default_scan_cooldown_ms(),
            scan_interval_s: default_scan_interval_s(),
            max_quote_age_ms: default_max_quote_age_ms(),
        }
    }
}

/// Fee defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct FeesConfig {
    /// Taker fee fraction for venues without an override.
    #[serde(default = "default_taker_fee")]
    pub default_taker_fee: Decimal,
}

fn default_taker_fee() -> Decimal {
    Decimal::new(1, 3) // 0.1%
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            default_taker_fee: default_taker_fee(),
        }
    }
}

/// Risk management configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Maximum number of trade attempts in flight at once.
    #[serde(default = "default_max_open_trades")]
    pub max_open_trades: u32,
    /// Loss fraction of reference capital that engages the kill switch.
    #[serde(default = "default_emergency_stop_loss_pct")]
    pub emergency_stop_loss_pct: Decimal,
    /// Capital baseline the stop-loss percentage is measured against.
    #[serde(default = "default_reference_capital")]
    pub reference_capital: Decimal,
}

const fn default_max_open_trades() -> u32 {
    5
}

fn default_emergency_stop_loss_pct() -> Decimal {
    Decimal::new(1, 1) // 10%
}

fn default_reference_capital() -> Decimal {
    Decimal::from(1000)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_open_trades: default_max_open_trades(),
            emergency_stop_loss_pct: default_emergency_stop_loss_pct(),
            reference_capital: default_reference_capital(),
        }
    }
}

/// Per-order timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderConfig {
    /// Maximum milliseconds to wait for a terminal status before cancelling.
    #[serde(default = "default_order_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Milliseconds between order status polls.
    #[serde(default = "default_status_poll_ms")]
    pub status_poll_ms: u64,
}

const fn default_order_max_wait_ms() -> u64 {
    10_000
}

const fn default_status_poll_ms() -> u64 {
    250
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: default_order_max_wait_ms(),
            status_poll_ms: default_status_poll_ms(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerAppConfig {
    /// Consecutive failures that trip a venue's breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Backoff after the first trip, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff growth factor per repeated failure.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Backoff ceiling, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for BreakerAppConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// PnL ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PnlConfig {
    /// Path of the append-only ledger file.
    #[serde(default = "default_pnl_file")]
    pub file: String,
}

fn default_pnl_file() -> String {
    "pnl-ledger.jsonl".to_string()
}

impl Default for PnlConfig {
    fn default() -> Self {
        Self {
            file: default_pnl_file(),
        }
    }
}

/// Main application configuration.
///
/// Aggregates all settings for the engine. Load from a TOML file using
/// [`Config::load`] or parse directly with [`Config::parse_toml`].
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Venues keyed by name. At least two enabled venues are required to
    /// arbitrage.
    #[serde(default)]
    pub venues: BTreeMap<String, VenueConfig>,

    /// Opportunity detection parameters.
    #[serde(default)]
    pub arbitrage: ArbitrageConfig,

    /// Fee defaults.
    #[serde(default)]
    pub fees: FeesConfig,

    /// Risk limits.
    #[serde(default)]
    pub risk: RiskConfig,

    /// Per-order timing.
    #[serde(default)]
    pub order: OrderConfig,

    /// Circuit breaker tuning.
    #[serde(default)]
    pub breaker: BreakerAppConfig,

    /// PnL ledger location.
    #[serde(default)]
    pub pnl: PnlConfig,

    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation
    /// fails (e.g. invalid slippage values).
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML content is
    /// malformed, or validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        let arb = &self.arbitrage;
        if arb.max_slippage < Decimal::ZERO || arb.max_slippage > Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "max_slippage",
                reason: "must be between 0 and 1".to_string(),
            }
            .into());
        }
        if arb.min_profit_threshold < Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "min_profit_threshold",
                reason: "must be 0 or greater".to_string(),
            }
            .into());
        }
        if arb.max_trade_size <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "max_trade_size",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if arb.scan_cooldown_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scan_cooldown_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if arb.scan_interval_s == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scan_interval_s",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if arb.max_quote_age_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_quote_age_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        let risk = &self.risk;
        if risk.emergency_stop_loss_pct <= Decimal::ZERO || risk.emergency_stop_loss_pct > Decimal::ONE
        {
            return Err(ConfigError::InvalidValue {
                field: "emergency_stop_loss_pct",
                reason: "must be between 0 (exclusive) and 1".to_string(),
            }
            .into());
        }
        if risk.reference_capital <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "reference_capital",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.order.max_wait_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_wait_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.order.status_poll_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "status_poll_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        let breaker = &self.breaker;
        if breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "failure_threshold",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if breaker.initial_backoff_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "initial_backoff_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if breaker.max_backoff_ms < breaker.initial_backoff_ms {
            return Err(ConfigError::InvalidValue {
                field: "max_backoff_ms",
                reason: "must be >= initial_backoff_ms".to_string(),
            }
            .into());
        }
        if breaker.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier",
                reason: "must be >= 1.0".to_string(),
            }
            .into());
        }

        for (name, venue) in &self.venues {
            if venue.enabled && venue.symbols.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "venues",
                    reason: format!("enabled venue '{name}' lists no symbols"),
                }
                .into());
            }
            if let Some(fee) = venue.taker_fee {
                if fee < Decimal::ZERO || fee > Decimal::ONE {
                    return Err(ConfigError::InvalidValue {
                        field: "taker_fee",
                        reason: format!("taker_fee for venue '{name}' must be between 0 and 1"),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Enabled venues with their watched symbols.
    #[must_use]
    pub fn enabled_venues(&self) -> Vec<(VenueId, Vec<Symbol>)> {
        self.venues
            .iter()
            .filter(|(_, venue)| venue.enabled)
            .map(|(name, venue)| {
                (
                    VenueId::new(name.clone()),
                    venue
                        .symbols
                        .iter()
                        .map(|symbol| Symbol::new(symbol.as_str()))
                        .collect(),
                )
            })
            .collect()
    }

    /// Build the scanner configuration.
    #[must_use]
    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            min_profit_threshold: self.arbitrage.min_profit_threshold,
            max_trade_size: self.arbitrage.max_trade_size,
            max_slippage: self.arbitrage.max_slippage,
            scan_cooldown: Duration::from_millis(self.arbitrage.scan_cooldown_ms),
            max_quote_age: Duration::from_millis(self.arbitrage.max_quote_age_ms),
        }
    }

    /// Build the fee schedule from defaults and per-venue overrides.
    #[must_use]
    pub fn fee_schedule(&self) -> FeeSchedule {
        let mut schedule = FeeSchedule::new(self.fees.default_taker_fee);
        for (name, venue) in &self.venues {
            if let Some(fee) = venue.taker_fee {
                schedule.set(VenueId::new(name.clone()), fee);
            }
        }
        schedule
    }

    /// Build the risk limits.
    #[must_use]
    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            min_profit_threshold: self.arbitrage.min_profit_threshold,
            max_trade_size: self.arbitrage.max_trade_size,
            max_open_trades: self.risk.max_open_trades,
            emergency_stop_loss_pct: self.risk.emergency_stop_loss_pct,
            reference_capital: self.risk.reference_capital,
        }
    }

    /// Build the per-order timing policy.
    #[must_use]
    pub fn order_policy(&self) -> OrderPolicy {
        OrderPolicy {
            max_wait: Duration::from_millis(self.order.max_wait_ms),
            status_poll: Duration::from_millis(self.order.status_poll_ms),
        }
    }

    /// Build the circuit breaker configuration.
    #[must_use]
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            initial_backoff_ms: self.breaker.initial_backoff_ms,
            backoff_multiplier: self.breaker.backoff_multiplier,
            max_backoff_ms: self.breaker.max_backoff_ms,
        }
    }

    /// The fallback safety poll interval.
    #[must_use]
    pub const fn safety_poll_interval(&self) -> Duration {
        Duration::from_secs(self.arbitrage.scan_interval_s)
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
        [venues.kraken]
        enabled = true
        taker_fee = "0.0026"
        symbols = ["BTC/USDT", "ETH/USDT"]

        [venues.binance]
        enabled = true
        symbols = ["BTC/USDT"]

        [venues.bitfinex]
        enabled = false
        symbols = []

        [arbitrage]
        min_profit_threshold = "0.002"
        max_trade_size = "250"
        max_slippage = "0.001"
        scan_cooldown_ms = 250
        scan_interval_s = 15

        [risk]
        max_open_trades = 3
        emergency_stop_loss_pct = "0.05"
        reference_capital = "5000"

        [pnl]
        file = "ledger.jsonl"

        [logging]
        level = "debug"
        format = "json"
    "#;

    #[test]
    fn parses_full_sample() {
        let config = Config::parse_toml(SAMPLE).unwrap();

        assert_eq!(config.arbitrage.min_profit_threshold, dec!(0.002));
        assert_eq!(config.arbitrage.scan_cooldown_ms, 250);
        assert_eq!(config.risk.max_open_trades, 3);
        assert_eq!(config.pnl.file, "ledger.jsonl");
        assert_eq!(config.logging.level, "debug");

        let venues = config.enabled_venues();
        assert_eq!(venues.len(), 2);

        let fees = config.fee_schedule();
        assert_eq!(fees.taker_fee(&VenueId::new("kraken")), dec!(0.0026));
        assert_eq!(fees.taker_fee(&VenueId::new("binance")), dec!(0.001));
    }

    #[test]
    fn defaults_applied_when_sections_missing() {
        let config = Config::parse_toml("").unwrap();
        assert_eq!(config.arbitrage.scan_cooldown_ms, 500);
        assert_eq!(config.risk.max_open_trades, 5);
        assert_eq!(config.order.max_wait_ms, 10_000);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.pnl.file, "pnl-ledger.jsonl");
    }

    #[test]
    fn rejects_out_of_range_slippage() {
        let toml = r#"
            [arbitrage]
            max_slippage = "1.5"
        "#;
        assert!(Config::parse_toml(toml).is_err());
    }

    #[test]
    fn rejects_zero_cooldown() {
        let toml = r#"
            [arbitrage]
            scan_cooldown_ms = 0
        "#;
        assert!(Config::parse_toml(toml).is_err());
    }

    #[test]
    fn rejects_enabled_venue_without_symbols() {
        let toml = r#"
            [venues.kraken]
            enabled = true
            symbols = []
        "#;
        assert!(Config::parse_toml(toml).is_err());
    }

    #[test]
    fn disabled_venue_without_symbols_is_fine() {
        let toml = r#"
            [venues.kraken]
            enabled = false
            symbols = []
        "#;
        assert!(Config::parse_toml(toml).is_ok());
    }

    #[test]
    fn rejects_backoff_cap_below_initial() {
        let toml = r#"
            [breaker]
            initial_backoff_ms = 5000
            max_backoff_ms = 1000
        "#;
        assert!(Config::parse_toml(toml).is_err());
    }

    #[test]
    fn risk_limits_combine_arbitrage_and_risk_sections() {
        let config = Config::parse_toml(SAMPLE).unwrap();
        let limits = config.risk_limits();
        assert_eq!(limits.min_profit_threshold, dec!(0.002));
        assert_eq!(limits.max_trade_size, dec!(250));
        assert_eq!(limits.max_open_trades, 3);
        assert_eq!(limits.emergency_stop_loss_pct, dec!(0.05));
        assert_eq!(limits.reference_capital, dec!(5000));
    }
}
