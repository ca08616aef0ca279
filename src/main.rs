//! Fund Orchestrator - wallet, balance and fund actions over JSON-RPC
//!
//! Connects a locally-signing wallet to one required network and exposes the
//! fund protocol actions (create, invest, redeem, swap) plus transfers and
//! balance reads over an HTTP API.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod abi;
mod api;
mod chain;
mod config;
mod error;
mod fund;
mod metrics;
mod reader;
mod session;
mod status;
mod transfer;
mod units;
mod wallet;

use api::AppState;
use chain::ChainProvider;
use config::Settings;
use fund::FundOrchestrator;
use metrics::MetricsServer;
use reader::BalanceReader;
use session::SessionManager;
use status::ActionGuard;
use transfer::TransferExecutor;
use wallet::{RpcWallet, WalletGateway};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Fund Orchestrator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    let protocol = settings.protocol.addresses()?;
    info!(
        "Loaded configuration for {} (chain {})",
        settings.network.name, settings.network.chain_id
    );

    // Connect the wallet and establish the session; fatal conditions
    // (no key, wrong network that cannot be corrected) abort startup
    let wallet: Arc<dyn WalletGateway> = Arc::new(
        RpcWallet::connect(&settings.network, &settings.wallet, &settings.orchestrator).await?,
    );
    let session = SessionManager::new(wallet.clone(), settings.network.clone());
    let active = session.connect().await?;
    info!(
        "Session established: account {:?} on chain {}",
        active.account, active.chain_id
    );

    // Initialize metrics server
    let metrics_server = if settings.metrics.enabled {
        Some(MetricsServer::new(settings.metrics.port))
    } else {
        None
    };

    // Build the action components
    let state = AppState {
        session: session.clone(),
        reader: BalanceReader::new(wallet.clone()),
        transfer: Arc::new(TransferExecutor::new(
            wallet.clone(),
            settings.network.native_decimals,
        )),
        funds: Arc::new(FundOrchestrator::new(
            wallet.clone(),
            protocol,
            &settings.orchestrator,
            settings.network.native_decimals,
        )),
        guard: Arc::new(ActionGuard::new()),
    };

    // Log session lifecycle changes
    let session_events_handle = tokio::spawn({
        let mut events = session.subscribe();
        async move {
            while let Ok(event) = events.recv().await {
                info!("Session event: {:?}", event);
            }
        }
    });

    // Start API server
    let api_handle = tokio::spawn({
        let api_config = settings.api.clone();
        let state = state.clone();
        async move {
            if let Err(e) = api::run_server(api_config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = metrics_server.map(|server| {
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        })
    });

    // Health check loop against the required network's endpoints
    let health_handle = tokio::spawn({
        let network = settings.network.clone();
        let interval = settings.orchestrator.health_check_interval_secs;
        async move {
            let provider = match ChainProvider::new(network.chain_id, &network.rpc_urls) {
                Ok(provider) => provider,
                Err(e) => {
                    error!("Health check provider unavailable: {}", e);
                    return;
                }
            };
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;

                let healthy = provider.health_check().await;
                if !healthy {
                    warn!("Chain {} health check failed", network.chain_id);
                }
                metrics::record_chain_health(network.chain_id, healthy);
                metrics::record_block_height(network.chain_id, provider.last_block().await);
            }
        }
    });

    info!("Fund Orchestrator is running");
    info!(
        "API server: http://{}:{}",
        settings.api.host, settings.api.port
    );
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Graceful shutdown
    session.teardown().await;

    // Abort background tasks
    api_handle.abort();
    health_handle.abort();
    session_events_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Fund Orchestrator stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fund_orchestrator=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
