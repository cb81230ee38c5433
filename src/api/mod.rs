//! HTTP API for health checks, status, and operator actions

use crate::config::ApiConfig;
use crate::engine::EngineState;
use crate::error::{RelayerError, RelayerResult};
use crate::events::RelayEventId;
use crate::ledger::{LedgerStats, RelayLedger};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use ethers::types::H256;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Live view of one engine's loop state
#[derive(Clone)]
pub struct EngineStatusHandle {
    pub direction: String,
    pub state: Arc<RwLock<EngineState>>,
}

#[derive(Clone)]
pub struct ChainInfo {
    pub name: String,
    pub chain_id: u64,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn RelayLedger>,
    pub engines: Vec<EngineStatusHandle>,
    pub chains: Vec<ChainInfo>,
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> RelayerResult<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route(
            "/records/:chain_id/:tx_hash/:log_index/retry",
            post(retry_record),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RelayerError::Internal(format!("api bind failed: {}", e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| RelayerError::Internal(format!("api server failed: {}", e)))?;

    Ok(())
}

/// Basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Engine states, cursors, and ledger counts
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let mut engines = Vec::with_capacity(state.engines.len());
    for handle in &state.engines {
        engines.push(EngineStatus {
            direction: handle.direction.clone(),
            state: *handle.state.read().await,
        });
    }

    let mut chains = Vec::with_capacity(state.chains.len());
    for chain in &state.chains {
        let last_scanned_block = state.ledger.load_cursor(chain.chain_id).await.ok().flatten();
        chains.push(ChainStatus {
            name: chain.name.clone(),
            chain_id: chain.chain_id,
            last_scanned_block,
        });
    }

    let records = state.ledger.stats().await.unwrap_or_default();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engines,
        chains,
        records,
    })
}

/// Explicit operator path to re-arm a Failed record
async fn retry_record(
    State(state): State<AppState>,
    Path((chain_id, tx_hash, log_index)): Path<(u64, String, u64)>,
) -> impl IntoResponse {
    let tx_hash: H256 = match tx_hash.parse() {
        Ok(hash) => hash,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RetryResponse {
                    retried: false,
                    message: format!("invalid transaction hash: {}", tx_hash),
                }),
            )
        }
    };

    let id = RelayEventId {
        chain_id,
        tx_hash,
        log_index,
    };

    match state.ledger.retry_failed(id).await {
        Ok(()) => {
            info!("Operator re-armed record {}", id);
            (
                StatusCode::OK,
                Json(RetryResponse {
                    retried: true,
                    message: format!("record {} reset to seen", id),
                }),
            )
        }
        Err(RelayerError::Ledger { message, .. }) => (
            StatusCode::CONFLICT,
            Json(RetryResponse {
                retried: false,
                message,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RetryResponse {
                retried: false,
                message: e.to_string(),
            }),
        ),
    }
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct EngineStatus {
    direction: String,
    state: EngineState,
}

#[derive(Serialize)]
struct ChainStatus {
    name: String,
    chain_id: u64,
    last_scanned_block: Option<u64>,
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    engines: Vec<EngineStatus>,
    chains: Vec<ChainStatus>,
    records: LedgerStats,
}

#[derive(Serialize)]
struct RetryResponse {
    retried: bool,
    message: String,
}
