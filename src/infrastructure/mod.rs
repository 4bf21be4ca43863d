//! Infrastructure: configuration, persistence, paper venue, engine runtime.

pub mod config;
pub mod engine;
pub mod ledger;
pub mod paper;

pub use config::Config;
pub use engine::{paper_engine_from_config, Engine, EngineBuilder, EngineHandle, EngineStatus, TradingMode};
pub use ledger::FileLedger;
pub use paper::{PaperFeed, PaperGateway};
