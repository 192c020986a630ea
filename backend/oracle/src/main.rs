//! Milestone verification oracle entry point.
//!
//! Confirms its signing key is the ledger's authorized oracle, then runs two background
//! loops until Ctrl-C: a periodic sweep over every active project and a
//! subscription to the ledger event stream that reacts to new funding.
//! Every verification attempt lands in a local SQLite audit log, exposed
//! read-only over a small Axum API.

mod api;
mod config;
mod db;
mod errors;
mod evidence;
mod ledger;
mod strategies;
mod subscriber;
#[cfg(test)]
mod testing;
mod verifier;

use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use evidence::HttpEvidenceSource;
use ledger::HttpLedgerClient;
use strategies::StrategyRegistry;
use verifier::Verifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    if config.allow_manual_verification {
        warn!(
            "ALLOW_MANUAL_VERIFICATION is enabled: projects in the manual-test category \
             are verified WITHOUT evidence (DEPLOYMENT_ENV={})",
            config.deployment_env
        );
    }

    let pool = db::init_pool(&config.database_url).await?;

    let ledger = Arc::new(HttpLedgerClient::new(
        config.ledger_endpoint.clone(),
        std::time::Duration::from_secs(30),
        config.credential.clone(),
    )?);
    let evidence = Arc::new(HttpEvidenceSource::new(
        Client::new(),
        config.evidence_endpoint.clone(),
        config.evidence_api_key.clone(),
        config.evidence_timeout(),
    ));
    let registry = StrategyRegistry::with_builtin(
        evidence,
        config.default_category.clone(),
        config.allow_manual_verification,
    );
    let categories = registry.categories();

    let verifier = Arc::new(Verifier::new(
        pool.clone(),
        ledger,
        registry,
        config.identity(),
    ));
    verifier.preflight().await?;

    // ─── Background loops ─────────────────────────────────
    let cancel = CancellationToken::new();
    let sweeps = tokio::spawn(verifier::run_sweeps(
        verifier.clone(),
        config.poll_interval(),
        cancel.clone(),
    ));
    let events = tokio::spawn(subscriber::run(
        verifier.clone(),
        config.event_poll_interval(),
        cancel.clone(),
    ));

    // ─── Status API ───────────────────────────────────────
    let app = api::router(Arc::new(api::ApiState {
        pool,
        identity: config.identity(),
        categories,
    }));

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("Status API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let shutdown = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    });

    shutdown_signal().await;
    cancel.cancel();

    sweeps.await?;
    events.await?;
    server.await??;

    info!("Oracle stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
