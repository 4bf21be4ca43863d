use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use spreadhawk::infrastructure::{paper_engine_from_config, Config};

/// Cross-exchange arbitrage engine.
#[derive(Parser, Debug)]
#[command(name = "spreadhawk", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Run in paper trading mode (simulated fills, no real orders).
    #[arg(long)]
    paper: bool,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load config: {err}");
            std::process::exit(1);
        }
    };

    config.init_logging();
    info!("spreadhawk starting");

    if !cli.paper {
        // Live venue connectivity ships as separate adapter crates wired
        // through the engine builder; this binary only embeds the paper
        // venue.
        error!("live mode requires venue adapters; run with --paper");
        std::process::exit(1);
    }
    warn!("--- PAPER TRADING MODE: orders are simulated ---");

    let engine = match paper_engine_from_config(config) {
        Ok(engine) => engine,
        Err(err) => {
            error!(error = %err, "Failed to assemble engine");
            std::process::exit(1);
        }
    };
    let handle = engine.handle();
    let mut run = tokio::spawn(engine.run());

    tokio::select! {
        result = &mut run => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(error = %err, "Fatal error");
                    std::process::exit(1);
                }
                Err(err) => {
                    error!(error = %err, "Engine task failed");
                    std::process::exit(1);
                }
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            handle.stop();
            if let Err(err) = run.await {
                error!(error = %err, "Engine task failed during shutdown");
            }
        }
    }

    let status = handle.status();
    info!(
        cumulative_pnl = %status.cumulative_pnl,
        kill_switch = status.kill_switch_engaged,
        "spreadhawk stopped"
    );
}
