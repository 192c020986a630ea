//! Milestone escrow ledger node entry point.
//!
//! Replays the command journal into a fresh escrow host (or starts a new
//! ledger with the configured oracle) and serves the escrow's operations and
//! event stream over a small Axum REST API.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ledger_node::config::Config;
use ledger_node::host::Genesis;
use ledger_node::ledger::Ledger;
use ledger_node::{api, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let pool = db::init_pool(&config.database_url).await?;
    let genesis = config.oracle_address.clone().map(|oracle| Genesis {
        oracle,
        fee_allowance: config.oracle_fee_allowance,
        submission_fee: config.submission_fee,
    });
    let ledger = Ledger::open(pool, genesis).await?;

    let app = api::router(Arc::new(api::ApiState {
        ledger,
        signature_window_secs: config.signature_window_secs,
    }));

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("Ledger API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Ledger node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
