//! Configuration loading, validation, and logging bootstrap.

pub mod logging;
pub mod settings;

pub use logging::{LogFormat, LoggingConfig};
pub use settings::{
    ArbitrageConfig, BreakerAppConfig, Config, FeesConfig, OrderConfig, PnlConfig, RiskConfig,
    VenueConfig,
};
