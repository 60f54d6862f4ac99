//! resilient-edge
//!
//! Webhook ingress with admission control, forwarding admitted events to a
//! downstream service through a retrying, circuit-breaking HTTP client.
//!
//! ```text
//!     Webhook source                 resilient-edge                      Downstream
//!     ──────────────▶ POST /events ─▶ dedup ─▶ rate limit ─▶ idempotency
//!                                                              │
//!                                                              ▼
//!                                          ResilientClient (breaker, timeout,
//!                                          retry + backoff) ────────────────▶
//!     ◀────────────── 200 EventAck ◀───────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use resilient_edge::clock::system_clock;
use resilient_edge::config::{load_config, EdgeConfig};
use resilient_edge::lifecycle;
use resilient_edge::observability::logging;

#[derive(Parser)]
#[command(name = "resilient-edge")]
#[command(about = "Webhook ingress with retries, circuit breaking and admission control", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long, env = "EDGE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EdgeConfig::default(),
    };

    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        bind_address = %config.listener.bind_address,
        max_retries = config.retries.max_retries,
        failure_threshold = config.circuit_breaker.failure_threshold,
        "resilient-edge starting"
    );

    lifecycle::run(config, system_clock()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
