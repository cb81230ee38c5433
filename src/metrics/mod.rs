//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Scan progress per chain
//! - Relay outcomes per direction
//! - Relay latency

use crate::error::{RelayerError, RelayerResult};

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Scan metrics
    pub static ref CHAIN_HEIGHT: GaugeVec = register_gauge_vec!(
        "warden_chain_height",
        "Latest observed block height per chain",
        &["chain_id"]
    ).unwrap();

    pub static ref CURSOR_POSITION: GaugeVec = register_gauge_vec!(
        "warden_cursor_position",
        "Last scanned block per chain",
        &["chain_id"]
    ).unwrap();

    pub static ref EVENTS_OBSERVED: CounterVec = register_counter_vec!(
        "warden_events_observed_total",
        "Bridge events decoded from scanned logs",
        &["chain_id", "kind"]
    ).unwrap();

    // Relay metrics
    pub static ref RELAYS_SUBMITTED: CounterVec = register_counter_vec!(
        "warden_relays_submitted_total",
        "Relay transactions broadcast",
        &["direction"]
    ).unwrap();

    pub static ref RELAYS_CONFIRMED: CounterVec = register_counter_vec!(
        "warden_relays_confirmed_total",
        "Relay transactions confirmed on the target chain",
        &["direction"]
    ).unwrap();

    pub static ref RELAYS_FAILED: CounterVec = register_counter_vec!(
        "warden_relays_failed_total",
        "Relay records marked failed",
        &["direction"]
    ).unwrap();

    pub static ref RELAYS_SKIPPED: CounterVec = register_counter_vec!(
        "warden_relays_skipped_total",
        "Events skipped because the ledger already settled them",
        &["direction"]
    ).unwrap();

    pub static ref RELAY_LATENCY: HistogramVec = register_histogram_vec!(
        "warden_relay_latency_seconds",
        "Time from broadcast to confirmation",
        &["direction"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> RelayerResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayerError::Internal(format!("metrics bind failed: {}", e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| RelayerError::Internal(format!("metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_chain_height(chain_id: u64, height: u64) {
    CHAIN_HEIGHT
        .with_label_values(&[&chain_id.to_string()])
        .set(height as f64);
}

pub fn record_cursor_position(chain_id: u64, block: u64) {
    CURSOR_POSITION
        .with_label_values(&[&chain_id.to_string()])
        .set(block as f64);
}

pub fn record_event_observed(chain_id: u64, kind: &str) {
    EVENTS_OBSERVED
        .with_label_values(&[&chain_id.to_string(), kind])
        .inc();
}

pub fn record_relay_submitted(direction: &str) {
    RELAYS_SUBMITTED.with_label_values(&[direction]).inc();
}

pub fn record_relay_confirmed(direction: &str) {
    RELAYS_CONFIRMED.with_label_values(&[direction]).inc();
}

pub fn record_relay_latency(direction: &str, latency_secs: f64) {
    RELAY_LATENCY
        .with_label_values(&[direction])
        .observe(latency_secs);
}

pub fn record_relay_failed(direction: &str) {
    RELAYS_FAILED.with_label_values(&[direction]).inc();
}

pub fn record_relay_skipped(direction: &str) {
    RELAYS_SKIPPED.with_label_values(&[direction]).inc();
}
