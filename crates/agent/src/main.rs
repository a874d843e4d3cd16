//! Monitor agent - resource monitoring and quota alerting for an edge node
//!
//! Samples the node and its workload instances, raises quota alerts and
//! serves snapshots and metrics over HTTP.

use anyhow::{Context, Result};
use monitor_agent::{api, config::AgentConfig};
use monitor_lib::{
    source::{CgroupSystemUsage, HostStats, SysinfoHostStats, SysinfoTraffic},
    LoggingAlertSender, NodeConfig, NodeInfo, ResourceMonitor, StaticNodeConfigProvider,
    StaticNodeInfoProvider, StructuredLogger,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting monitor-agent");

    let config = AgentConfig::load()?;
    info!(
        node_id = %config.node_id,
        poll_period_ms = config.monitor.poll_period.as_millis() as u64,
        "Agent configured"
    );

    let host = Arc::new(SysinfoHostStats::new());
    let node_info = NodeInfo {
        node_id: config.node_id.clone(),
        node_type: config.node_type.clone(),
        ..Default::default()
    };
    let logger = StructuredLogger::new(&config.node_id);

    let monitor = ResourceMonitor::builder(config.monitor.clone())
        .node_info_provider(Arc::new(StaticNodeInfoProvider::new(node_info)))
        .node_config_provider(Arc::new(StaticNodeConfigProvider::new(NodeConfig::default())))
        .traffic_monitoring(Arc::new(SysinfoTraffic::new()))
        .alert_sender(Arc::new(LoggingAlertSender::new(logger)))
        .usage_provider(Arc::new(CgroupSystemUsage::new(
            config.cgroup_root.clone(),
            host.num_cpus(),
        )))
        .host_stats(host)
        .build()
        .await
        .context("Failed to start resource monitor")?;
    let monitor = Arc::new(monitor);

    let snapshots = monitor
        .node_monitoring_channel()
        .context("Snapshot channel unavailable")?;
    let app_state = Arc::new(api::AppState::new(monitor.clone()));
    tokio::spawn(api::forward_snapshots(app_state.clone(), snapshots));

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("SIGINT received, shutting down");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => info!("API server stopped"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    monitor.close().await;

    Ok(())
}
