//! Agora API server
//!
//! Startup order: connect and verify DB and KV, run migrations, recover the
//! deadline schedule, reconcile wallet state, start the worker loops, then
//! open the listening socket. On SIGTERM/Ctrl-C the server stops accepting
//! requests, drains in-flight work within the grace period, and signals the
//! workers, which finish their current unit before exiting.
//!
//! ```bash
//! agora-server --config agora.toml
//! AGORA__DATABASE_URL=... agora-server
//! ```

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agora_api::AppState;
use agora_auth::{AuthService, RateLimiter};
use agora_db::Database;
use agora_market::{
    AgentService, EscrowEngine, FeeEngine, JobService, ListingService, ReviewService,
};
use agora_verify::{CriteriaRunner, Sandbox};
use agora_workers::{DeadlineWorker, JsonRpcChainClient, WalletService, WebhookDispatcher};

use crate::config::ServerConfig;

/// Agora marketplace API server
#[derive(Parser, Debug)]
#[command(name = "agora-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "AGORA_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "AGORA_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "AGORA_PORT")]
    port: Option<u16>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Wallet gateway JSON-RPC endpoint
    #[arg(long, env = "AGORA_CHAIN_RPC")]
    chain_rpc_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "AGORA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "AGORA_LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = args.database_url {
        config.database.postgres_url = url;
    }
    if let Some(url) = args.redis_url {
        config.database.redis_url = url;
    }
    if let Some(url) = args.chain_rpc_url {
        config.wallet.chain_rpc_url = url;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    init_logging(&config.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting agora-server");

    // 1. Stores.
    let db = Arc::new(Database::connect(&config.database).await?);
    db.migrate().await?;
    let health = db.health_check().await?;
    anyhow::ensure!(health.healthy, "store connectivity check failed");

    // 2. Services.
    let fees = FeeEngine::new(config.fees.clone());
    let escrow = EscrowEngine::new(db.clone(), fees.clone());
    let runner = Arc::new(CriteriaRunner::new(
        config.verify.clone(),
        Sandbox::new(config.sandbox.clone()),
    ));
    let jobs = JobService::new(db.clone(), escrow.clone(), runner);
    let agents = AgentService::new(
        db.clone(),
        escrow.clone(),
        config.registration.to_registration_config(),
    );
    let listings = ListingService::new(db.clone());
    let reviews = ReviewService::new(db.clone());

    let chain = Arc::new(JsonRpcChainClient::new(config.wallet.chain_rpc_url.clone()));
    let wallet = WalletService::new(db.clone(), chain, config.wallet.watcher.clone());

    let auth = AuthService::new(db.clone(), config.auth.clone());
    let limiter = RateLimiter::new(db.clone(), config.auth.rate_limit.clone());

    // 3. Recovery before any traffic.
    let deadline_worker = Arc::new(DeadlineWorker::new(db.clone(), escrow.clone()));
    deadline_worker.recover().await?;
    wallet.reconcile().await?;

    // 4. Workers.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut worker_handles = Vec::new();

    {
        let worker = deadline_worker.clone();
        let rx = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(async move { worker.run(rx).await }));
    }
    {
        let dispatcher = WebhookDispatcher::new(db.clone(), config.webhooks.clone());
        let rx = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(async move { dispatcher.run(rx).await }));
    }
    {
        let wallet = wallet.clone();
        let rx = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(async move { wallet.run(rx).await }));
    }

    // 5. The listening socket.
    let state = Arc::new(AppState {
        db,
        auth,
        limiter,
        agents,
        listings,
        jobs,
        reviews,
        wallet,
        fees,
        max_body_bytes: config.api.max_body_bytes,
    });
    let app = agora_api::create_router(state)
        .into_make_service_with_connect_info::<std::net::SocketAddr>();

    let addr = config.server.socket_addr()?;
    tracing::info!(addr = %addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout()))
        .await?;

    // 6. Stop the workers; they finish their current unit.
    shutdown_tx.send(true)?;
    for handle in worker_handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "worker exited abnormally");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);
    match config.format.as_str() {
        "json" => subscriber.with(fmt::layer().json().with_target(true)).init(),
        _ => subscriber.with(fmt::layer().pretty().with_target(true)).init(),
    }
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM, then allow in-flight requests a grace period.
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, draining");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, draining");
        }
    }

    tokio::time::sleep(timeout).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parsing() {
        let args = Args::parse_from(["agora-server", "--port", "9090"]);
        assert_eq!(args.port, Some(9090));
    }
}
