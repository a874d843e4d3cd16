//! HTTP API for health, Prometheus metrics, snapshots and instance lifecycle

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use monitor_lib::{MonitorError, NodeMonitoringData, ResourceMonitor, ResourceMonitorParams};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Snapshots older than this many send periods mark the agent unhealthy
const HEALTHY_SEND_PERIODS: u32 = 3;

/// Shared application state
pub struct AppState {
    pub monitor: Arc<ResourceMonitor>,
    latest: RwLock<Option<Delivered>>,
    health_window: Duration,
}

struct Delivered {
    snapshot: NodeMonitoringData,
    at: tokio::time::Instant,
}

impl AppState {
    pub fn new(monitor: Arc<ResourceMonitor>) -> Self {
        let config = monitor.config();
        let send_period = config.send_period.unwrap_or(config.poll_period);

        Self {
            health_window: send_period * HEALTHY_SEND_PERIODS,
            monitor,
            latest: RwLock::new(None),
        }
    }

    /// Remember the latest delivered snapshot
    pub async fn record_snapshot(&self, snapshot: NodeMonitoringData) {
        *self.latest.write().await = Some(Delivered {
            snapshot,
            at: tokio::time::Instant::now(),
        });
    }

    pub async fn latest_snapshot(&self) -> Option<NodeMonitoringData> {
        self.latest
            .read()
            .await
            .as_ref()
            .map(|d| d.snapshot.clone())
    }

    /// Healthy while snapshots keep arriving
    pub async fn is_healthy(&self) -> bool {
        self.latest
            .read()
            .await
            .as_ref()
            .is_some_and(|d| d.at.elapsed() <= self.health_window)
    }
}

/// Feed snapshots from the monitor into the state until the channel closes
pub async fn forward_snapshots(state: Arc<AppState>, mut rx: mpsc::Receiver<NodeMonitoringData>) {
    while let Some(snapshot) = rx.recv().await {
        debug!(
            instances = snapshot.instances.len(),
            timestamp = %snapshot.timestamp,
            "Snapshot delivered"
        );
        state.record_snapshot(snapshot).await;
    }
    info!("Snapshot channel closed");
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    last_snapshot: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Health check response - 200 while snapshots are fresh, 503 otherwise
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state.is_healthy().await;
    let last_snapshot = state.latest_snapshot().await.map(|s| s.timestamp);

    let (status_code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            node_id: state.monitor.node_id().to_string(),
            last_snapshot,
        }),
    )
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn monitoring(State(state): State<Arc<AppState>>) -> Response {
    match state.latest_snapshot().await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no snapshot delivered yet"),
    }
}

async fn average_monitoring(State(state): State<Arc<AppState>>) -> Response {
    match state.monitor.get_average_monitoring().await {
        Ok(average) => Json(average).into_response(),
        Err(e @ (MonitorError::NoData { .. } | MonitorError::AveragingDisabled)) => {
            error_response(StatusCode::NOT_FOUND, e)
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn system_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.get_system_info().clone())
}

async fn list_instances(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.instance_ids().await)
}

async fn start_instance(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Json(params): Json<ResourceMonitorParams>,
) -> Response {
    match state
        .monitor
        .start_instance_monitor(&instance_id, params)
        .await
    {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e @ (MonitorError::InvalidRule { .. } | MonitorError::InvalidInstanceId(_))) => {
            warn!(instance_id = %instance_id, error = %e, "Rejected instance rules");
            error_response(StatusCode::BAD_REQUEST, e)
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn stop_instance(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
) -> StatusCode {
    state.monitor.stop_instance_monitor(&instance_id).await;
    StatusCode::NO_CONTENT
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/monitoring", get(monitoring))
        .route("/monitoring/average", get(average_monitoring))
        .route("/system-info", get(system_info))
        .route("/instances", get(list_instances))
        .route("/instances/:id", post(start_instance).delete(stop_instance))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
