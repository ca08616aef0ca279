//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status
//! - Transaction submission and confirmation
//! - Action outcomes
//! - Health checks

use crate::error::OrchestratorResult;

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, Encoder, GaugeVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "orchestrator_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();

    pub static ref CHAIN_BLOCK_HEIGHT: GaugeVec = register_gauge_vec!(
        "orchestrator_chain_block_height",
        "Current block height per chain",
        &["chain_id"]
    ).unwrap();

    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "orchestrator_transactions_submitted_total",
        "Total transactions submitted",
        &["action"]
    ).unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "orchestrator_transactions_confirmed_total",
        "Total transactions confirmed",
        &["action"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "orchestrator_transactions_failed_total",
        "Total transactions reverted or rejected",
        &["action"]
    ).unwrap();

    // Action metrics
    pub static ref ACTIONS: CounterVec = register_counter_vec!(
        "orchestrator_actions_total",
        "Total user actions by outcome",
        &["action", "outcome"]
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "orchestrator_health_check_success_total",
        "Total successful health checks",
        &[]
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: CounterVec = register_counter_vec!(
        "orchestrator_health_check_failure_total",
        "Total failed health checks",
        &[]
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

    pub async fn run(&self) -> OrchestratorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::error::OrchestratorError::Internal(e.to_string()))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| crate::error::OrchestratorError::Internal(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });

    if healthy {
        HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
    } else {
        HEALTH_CHECK_FAILURE.with_label_values(&[]).inc();
    }
}

pub fn record_block_height(chain_id: u64, block_number: u64) {
    CHAIN_BLOCK_HEIGHT
        .with_label_values(&[&chain_id.to_string()])
        .set(block_number as f64);
}

pub fn record_tx_submitted(action: &str) {
    TX_SUBMITTED.with_label_values(&[action]).inc();
}

pub fn record_tx_confirmed(action: &str) {
    TX_CONFIRMED.with_label_values(&[action]).inc();
}

pub fn record_tx_failed(action: &str) {
    TX_FAILED.with_label_values(&[action]).inc();
}

pub fn record_action(action: &str, outcome: &str) {
    ACTIONS.with_label_values(&[action, outcome]).inc();
}
