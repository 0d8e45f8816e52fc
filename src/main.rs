//! SOLARB — Autonomous Solana round-trip arbitrage searcher.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! loads the middle-mint candidate pool, and hands off to the worker
//! supervisor until shutdown.

use anyhow::Result;
use tracing::info;

use solarb::config::Settings;
use solarb::engine::supervisor::Supervisor;

const BANNER: &str = r#"
 ____   ___  _        _    ____  ____
/ ___| / _ \| |      / \  |  _ \| __ )
\___ \| | | | |     / _ \ | |_) |  _ \
 ___) | |_| | |___ / ___ \|  _ <| |_) |
|____/ \___/|_____/_/   \_\_| \_\____/

  Solana round-trip searcher — bundle racer
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Config path may be overridden as the first CLI argument.
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".into());
    let cfg = Settings::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        workers = cfg.engine.worker_count,
        base_mint = %cfg.trade.base_mint,
        relay_endpoints = cfg.relay.urls.len(),
        static_tip = cfg.relay.static_tip_lamports,
        "SOLARB starting up"
    );

    // Candidate pool for the middle leg of every round trip.
    let middle_mints = cfg.load_middle_mints()?;
    info!(count = middle_mints.len(), "Middle mints loaded");

    // Fail fast on a bad signing key rather than inside every worker.
    let _ = cfg.wallet.signer()?;
    let _ = cfg.wallet.intermediaries()?;

    let supervisor = Supervisor::new(cfg, middle_mints);

    tokio::select! {
        result = supervisor.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
            Ok(())
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("solarb=info"));

    let json_logging = std::env::var("SOLARB_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
