//! Warden relayer - cross-chain bridge event relay
//!
//! Watches Deposit events on the source chain and relays them as wrap()
//! calls on the destination chain, and Unwrap events on the destination
//! chain back as withdraw() calls on the source.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ethers::signers::{LocalWallet, Signer};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

mod api;
mod chain;
mod config;
mod engine;
mod error;
mod events;
mod ledger;
mod metrics;
#[cfg(test)]
mod testutil;
mod translate;
mod tx;

use api::{AppState, ChainInfo, EngineStatusHandle};
use chain::{ChainClient, ChainContext, ChainRole, EventCursor, EvmChainClient};
use config::Settings;
use engine::RelayEngine;
use ledger::{PgRelayLedger, RelayLedger};
use metrics::MetricsServer;
use translate::{has_role_call, WARDEN_ROLE};
use tx::{NonceManager, Submitter};

#[derive(Parser)]
#[command(
    name = "warden-relayer",
    version,
    about = "Cross-chain bridge relayer for Warden wrapped-token transfers"
)]
struct Cli {
    /// Which chain(s) to scan: source relays Deposits, destination relays
    /// Unwraps, both runs the two directions concurrently
    #[arg(value_enum)]
    mode: RunMode,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RunMode {
    Source,
    Destination,
    Both,
}

impl RunMode {
    fn origins(self) -> Vec<ChainRole> {
        match self {
            RunMode::Source => vec![ChainRole::Source],
            RunMode::Destination => vec![ChainRole::Destination],
            RunMode::Both => vec![ChainRole::Source, ChainRole::Destination],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    info!("Starting Warden relayer v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    let wallet = load_wallet(&settings)?;
    info!("Relay account: {:?}", wallet.address());

    let ledger = Arc::new(
        PgRelayLedger::connect(&settings.database)
            .await
            .context("database connection failed")?,
    );
    ledger
        .run_migrations()
        .await
        .context("database migrations failed")?;
    info!("Database connection established");

    // Chain clients; an unreachable chain is an unrecoverable startup failure
    let mut contexts: Vec<ChainContext> = Vec::new();
    for role in [ChainRole::Source, ChainRole::Destination] {
        let chain_config = settings.chains.get(role).clone();
        let client = Arc::new(EvmChainClient::new(chain_config.clone())?);
        let height = client
            .current_height()
            .await
            .with_context(|| format!("chain {} unreachable at startup", chain_config.name))?;
        info!(
            "Chain {} ({}) connected at height {}",
            chain_config.name, chain_config.chain_id, height
        );
        contexts.push(ChainContext::new(role, &chain_config, client)?);
    }

    // Single nonce owner per (chain, account), synced from chain once here
    let nonces = Arc::new(NonceManager::new(wallet.address()));
    for context in &contexts {
        nonces
            .init_from_chain(context.client.as_ref())
            .await
            .with_context(|| format!("nonce sync failed for chain {}", context.name))?;
    }

    let shutdown = Arc::new(RwLock::new(false));
    let submitter = Arc::new(Submitter::new(
        contexts
            .iter()
            .map(|context| (context.clone(), settings.chains.get(context.role).gas.clone()))
            .collect(),
        wallet.clone(),
        nonces,
        settings.relayer.clone(),
        shutdown.clone(),
    ));

    // Warn early if the relay account cannot execute bridge calls
    for context in &contexts {
        let probe = has_role_call(*WARDEN_ROLE, submitter.wallet_address());
        match submitter.check_call(context.role, &probe).await {
            Ok(true) => {}
            Ok(false) => warn!(
                "Relay account lacks BRIDGE_WARDEN_ROLE on chain {}; calls will revert",
                context.name
            ),
            Err(e) => warn!("Could not verify warden role on chain {}: {}", context.name, e),
        }
    }

    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // One engine per requested direction
    let ledger_dyn: Arc<dyn RelayLedger> = ledger.clone();
    let mut engine_handles = Vec::new();
    let mut status_handles = Vec::new();
    for role in cli.mode.origins() {
        let context = contexts
            .iter()
            .find(|c| c.role == role)
            .cloned()
            .context("missing chain context")?;
        let chain_config = settings.chains.get(role);

        let cursor = EventCursor::load(
            chain_config.chain_id,
            chain_config.confirmation_blocks,
            chain_config.max_scan_window,
            context.client.clone(),
            ledger_dyn.clone(),
        )
        .await
        .with_context(|| format!("cursor restore failed for chain {}", context.name))?;

        let relay_engine = RelayEngine::new(
            context,
            cursor,
            ledger_dyn.clone(),
            submitter.clone(),
            settings.relayer.clone(),
            shutdown.clone(),
        );
        status_handles.push(EngineStatusHandle {
            direction: relay_engine.direction().to_string(),
            state: relay_engine.state_handle(),
        });
        engine_handles.push(tokio::spawn(relay_engine.run()));
    }

    // Status API
    let api_state = AppState {
        ledger: ledger_dyn.clone(),
        engines: status_handles,
        chains: contexts
            .iter()
            .map(|c| ChainInfo {
                name: c.name.clone(),
                chain_id: c.chain_id,
            })
            .collect(),
    };
    let api_handle = tokio::spawn({
        let api_config = settings.api.clone();
        async move {
            if let Err(e) = api::run_server(api_config, api_state).await {
                error!("API server error: {}", e);
            }
        }
    });

    info!("Warden relayer is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");
    *shutdown.write().await = true;

    // Give engines a bounded grace period to finish their current event
    let grace = tokio::time::timeout(
        Duration::from_secs(10),
        futures::future::join_all(engine_handles.iter_mut()),
    )
    .await;
    if grace.is_err() {
        warn!("Relay engines did not stop in time, aborting");
        for handle in &engine_handles {
            handle.abort();
        }
    }

    api_handle.abort();
    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    info!("Warden relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,warden_relayer=debug,sqlx=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Load the relay account's key from the configured environment variable
fn load_wallet(settings: &Settings) -> Result<LocalWallet> {
    let var = &settings.wallet.private_key_env;
    let key = std::env::var(var)
        .with_context(|| format!("missing signing key: set {}", var))?;

    key.trim()
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .with_context(|| format!("invalid signing key in {}", var))
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
