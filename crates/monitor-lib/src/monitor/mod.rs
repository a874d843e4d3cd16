//! Resource monitor orchestrator
//!
//! Owns the system and instance records together with their alert
//! processors, runs the poll/send loop, and exposes the instance lifecycle.

mod instance;
mod r#loop;


pub use instance::{PartitionParam, ResourceMonitorParams};

use crate::alert::{AlertRules, ParameterAlert};
use crate::average::AverageWindow;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::models::{
    InstanceMonitoringData, MonitoringData, NodeInfo, NodeMonitoringData, PartitionInfo,
    SystemInfo,
};
use crate::node::{NodeConfigProvider, NodeInfoProvider};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::sender::{monitoring_channel, AlertSender, MonitoringSender};
use crate::source::{
    CgroupSystemUsage, HostStats, OwnedFilesQuota, QuotaProvider, SysinfoHostStats,
    SystemUsageProvider, TrafficMonitoring,
};
use instance::{build_alerts, is_valid_instance_id, InstanceMonitoring};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default cgroup v2 mount for the built-in usage provider
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Everything a poll tick reads or mutates, guarded by one lock
pub(crate) struct MonitorState {
    pub node_data: MonitoringData,
    /// Set once any system fetch has succeeded
    pub system_sampled: bool,
    pub system_alerts: Vec<ParameterAlert>,
    pub system_window: Option<AverageWindow>,
    pub instances: BTreeMap<String, InstanceMonitoring>,
}

impl MonitorState {
    fn processor_count(&self) -> usize {
        self.system_alerts.len()
            + self
                .instances
                .values()
                .map(|i| i.alerts.len())
                .sum::<usize>()
    }
}

pub(crate) struct MonitorInner {
    node_id: String,
    config: MonitorConfig,
    system_info: SystemInfo,
    state: Mutex<MonitorState>,
    host: Arc<dyn HostStats>,
    usage: Arc<dyn SystemUsageProvider>,
    quota: Arc<dyn QuotaProvider>,
    traffic: Option<Arc<dyn TrafficMonitoring>>,
    alert_sender: Option<Arc<dyn AlertSender>>,
    monitoring_sender: Arc<dyn MonitoringSender>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl MonitorInner {
    fn update_gauges(&self, state: &MonitorState) {
        self.metrics.set_instances_monitored(state.instances.len());
        self.metrics.set_alert_processors(state.processor_count());
    }
}

/// Builder for `ResourceMonitor`
pub struct ResourceMonitorBuilder {
    config: MonitorConfig,
    node_info_provider: Option<Arc<dyn NodeInfoProvider>>,
    node_config_provider: Option<Arc<dyn NodeConfigProvider>>,
    traffic: Option<Arc<dyn TrafficMonitoring>>,
    alert_sender: Option<Arc<dyn AlertSender>>,
    monitoring_sender: Option<Arc<dyn MonitoringSender>>,
    host_stats: Option<Arc<dyn HostStats>>,
    usage_provider: Option<Arc<dyn SystemUsageProvider>>,
    quota_provider: Option<Arc<dyn QuotaProvider>>,
}

impl ResourceMonitorBuilder {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            node_info_provider: None,
            node_config_provider: None,
            traffic: None,
            alert_sender: None,
            monitoring_sender: None,
            host_stats: None,
            usage_provider: None,
            quota_provider: None,
        }
    }

    /// Set the node info provider (required)
    pub fn node_info_provider(mut self, provider: Arc<dyn NodeInfoProvider>) -> Self {
        self.node_info_provider = Some(provider);
        self
    }

    pub fn node_config_provider(mut self, provider: Arc<dyn NodeConfigProvider>) -> Self {
        self.node_config_provider = Some(provider);
        self
    }

    pub fn traffic_monitoring(mut self, traffic: Arc<dyn TrafficMonitoring>) -> Self {
        self.traffic = Some(traffic);
        self
    }

    pub fn alert_sender(mut self, sender: Arc<dyn AlertSender>) -> Self {
        self.alert_sender = Some(sender);
        self
    }

    /// Deliver snapshots to `sender` instead of the built-in channel
    pub fn monitoring_sender(mut self, sender: Arc<dyn MonitoringSender>) -> Self {
        self.monitoring_sender = Some(sender);
        self
    }

    pub fn host_stats(mut self, host: Arc<dyn HostStats>) -> Self {
        self.host_stats = Some(host);
        self
    }

    pub fn usage_provider(mut self, provider: Arc<dyn SystemUsageProvider>) -> Self {
        self.usage_provider = Some(provider);
        self
    }

    pub fn quota_provider(mut self, provider: Arc<dyn QuotaProvider>) -> Self {
        self.quota_provider = Some(provider);
        self
    }

    /// Gather capacity facts, build the system processors and start the loop
    pub async fn build(self) -> Result<ResourceMonitor> {
        self.config.validate()?;

        let node_info_provider = self.node_info_provider.ok_or_else(|| {
            MonitorError::InvalidConfig("node info provider is required".to_string())
        })?;
        let node_info = node_info_provider
            .node_info()
            .await
            .map_err(MonitorError::Provider)?;

        let host = self
            .host_stats
            .unwrap_or_else(|| Arc::new(SysinfoHostStats::new()));
        let system_info = gather_system_info(&self.config, &node_info, host.as_ref()).await?;

        let node_rules = match &self.node_config_provider {
            Some(provider) => {
                provider
                    .node_config()
                    .await
                    .map_err(MonitorError::Provider)?
                    .alert_rules
            }
            None => None,
        };
        let rules: Option<AlertRules> = node_rules.or_else(|| self.config.alert_rules.clone());

        let partition_names: Vec<&str> = system_info
            .partitions
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        let system_alerts = match &rules {
            Some(rules) => build_alerts("System", rules, &system_info, &partition_names)?,
            None => Vec::new(),
        };

        let (monitoring_sender, monitoring_rx) = match self.monitoring_sender {
            Some(sender) => (sender, None),
            None => {
                let (sender, rx) = monitoring_channel(self.config.monitoring_buffer);
                (Arc::new(sender) as Arc<dyn MonitoringSender>, Some(rx))
            }
        };

        let usage = self.usage_provider.unwrap_or_else(|| {
            Arc::new(CgroupSystemUsage::new(
                DEFAULT_CGROUP_ROOT,
                system_info.num_cpus,
            ))
        });
        let quota = self
            .quota_provider
            .unwrap_or_else(|| Arc::new(OwnedFilesQuota::new()));

        let state = MonitorState {
            node_data: MonitoringData::with_partitions(partition_names.iter().copied()),
            system_sampled: false,
            system_alerts,
            system_window: self.config.average_window.map(AverageWindow::new),
            instances: BTreeMap::new(),
        };

        let logger = StructuredLogger::new(&node_info.node_id);
        let metrics = MonitorMetrics::new();
        let processors = state.system_alerts.len();

        let inner = Arc::new(MonitorInner {
            node_id: node_info.node_id.clone(),
            config: self.config,
            system_info,
            state: Mutex::new(state),
            host,
            usage,
            quota,
            traffic: self.traffic,
            alert_sender: self.alert_sender,
            monitoring_sender,
            metrics,
            logger,
        });
        {
            let state = inner.state.lock().await;
            inner.update_gauges(&state);
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(r#loop::run(inner.clone(), shutdown_rx));

        inner
            .logger
            .log_startup(env!("CARGO_PKG_VERSION"), processors);

        Ok(ResourceMonitor {
            inner,
            shutdown_tx,
            task: std::sync::Mutex::new(Some(task)),
            monitoring_rx: std::sync::Mutex::new(monitoring_rx),
        })
    }
}

/// Resolve capacity facts from node info, probing the host for gaps
async fn gather_system_info(
    config: &MonitorConfig,
    node_info: &NodeInfo,
    host: &dyn HostStats,
) -> Result<SystemInfo> {
    let num_cpus = if node_info.num_cpus > 0 {
        node_info.num_cpus
    } else {
        host.num_cpus()
    };

    let total_ram = if node_info.total_ram > 0 {
        node_info.total_ram
    } else {
        host.memory()
            .await
            .map_err(|source| MonitorError::CapacityProbe {
                what: "total RAM".to_string(),
                source,
            })?
            .total
    };

    let mut partitions: Vec<PartitionInfo> = if config.partitions.is_empty() {
        node_info.partitions.clone()
    } else {
        config
            .partitions
            .iter()
            .map(|p| PartitionInfo {
                name: p.name.clone(),
                types: p.types.clone(),
                path: p.path.clone(),
                total_size: node_info
                    .partitions
                    .iter()
                    .find(|info| info.name == p.name)
                    .map(|info| info.total_size)
                    .unwrap_or(0),
            })
            .collect()
    };

    for partition in &mut partitions {
        if partition.total_size > 0 {
            continue;
        }
        partition.total_size = host
            .disk_usage(&partition.path)
            .await
            .map_err(|source| MonitorError::CapacityProbe {
                what: format!("partition {}", partition.name),
                source,
            })?
            .total;
    }

    Ok(SystemInfo {
        num_cpus,
        total_ram,
        partitions,
    })
}

/// Periodically samples the node and its instances and raises quota alerts
pub struct ResourceMonitor {
    inner: Arc<MonitorInner>,
    shutdown_tx: broadcast::Sender<()>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
    monitoring_rx: std::sync::Mutex<Option<mpsc::Receiver<NodeMonitoringData>>>,
}

impl ResourceMonitor {
    pub fn builder(config: MonitorConfig) -> ResourceMonitorBuilder {
        ResourceMonitorBuilder::new(config)
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Capacity facts gathered at construction
    pub fn get_system_info(&self) -> &SystemInfo {
        &self.inner.system_info
    }

    /// Receiver of the built-in snapshot channel.
    ///
    /// Returns `None` when a custom monitoring sender was configured or the
    /// receiver was already taken.
    pub fn node_monitoring_channel(&self) -> Option<mpsc::Receiver<NodeMonitoringData>> {
        self.monitoring_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Start monitoring an instance; a known id is left untouched
    pub async fn start_instance_monitor(
        &self,
        instance_id: &str,
        params: ResourceMonitorParams,
    ) -> Result<()> {
        if !is_valid_instance_id(instance_id) {
            return Err(MonitorError::InvalidInstanceId(instance_id.to_string()));
        }

        let mut state = self.inner.state.lock().await;

        if state.instances.contains_key(instance_id) {
            warn!(instance_id = %instance_id, "Instance monitor already started");
            return Ok(());
        }

        let partition_names: Vec<&str> = params.partitions.iter().map(|p| p.name.as_str()).collect();
        let alerts = match &params.alert_rules {
            Some(rules) => build_alerts(
                instance_id,
                rules,
                &self.inner.system_info,
                &partition_names,
            )?,
            None => Vec::new(),
        };

        let processors = alerts.len();
        let instance = InstanceMonitoring::new(params, alerts, self.inner.config.average_window);
        state.instances.insert(instance_id.to_string(), instance);
        self.inner.update_gauges(&state);
        drop(state);

        self.inner
            .logger
            .log_instance_started(instance_id, processors);
        Ok(())
    }

    /// Stop monitoring an instance; an unknown id is a no-op
    pub async fn stop_instance_monitor(&self, instance_id: &str) {
        let mut state = self.inner.state.lock().await;

        if state.instances.remove(instance_id).is_none() {
            debug!(instance_id = %instance_id, "Instance is not monitored");
            return;
        }
        self.inner.update_gauges(&state);
        drop(state);

        self.inner.logger.log_instance_stopped(instance_id);
    }

    /// Windowed average of the system and every live instance
    pub async fn get_average_monitoring(&self) -> Result<NodeMonitoringData> {
        let state = self.inner.state.lock().await;

        let node_data = state
            .system_window
            .as_ref()
            .ok_or(MonitorError::AveragingDisabled)?
            .average("system")?;

        let instances = state
            .instances
            .iter()
            .map(|(id, instance)| -> Result<InstanceMonitoringData> {
                Ok(InstanceMonitoringData {
                    instance_ident: instance.ident.clone(),
                    monitoring: instance.average(id)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NodeMonitoringData {
            node_id: self.inner.node_id.clone(),
            timestamp: node_data.timestamp,
            node_data,
            instances,
        })
    }

    /// Windowed average of one instance
    pub async fn get_instance_average(&self, instance_id: &str) -> Result<MonitoringData> {
        let state = self.inner.state.lock().await;
        state
            .instances
            .get(instance_id)
            .ok_or_else(|| MonitorError::UnknownInstance(instance_id.to_string()))?
            .average(instance_id)
    }

    /// Ids of the monitored instances, in order
    pub async fn instance_ids(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        state.instances.keys().cloned().collect()
    }

    /// Names of every registered alert processor, system ones first
    pub async fn alert_processor_names(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        state
            .system_alerts
            .iter()
            .chain(state.instances.values().flat_map(|i| i.alerts.iter()))
            .map(|a| a.name.clone())
            .collect()
    }

    /// Stop the loop; an in-flight tick finishes first
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(());

        let task = self.task.lock().ok().and_then(|mut task| task.take());
        let Some(task) = task else {
            return;
        };

        if let Err(e) = task.await {
            warn!(error = %e, "Resource monitor loop ended abnormally");
        }
        self.inner.logger.log_shutdown("closed");
        info!(node = %self.inner.node_id, "Resource monitor stopped");
    }

    #[cfg(test)]
    pub(crate) async fn poll_tick(&self, now: chrono::DateTime<chrono::Utc>) {
        self.inner.poll_tick(now).await;
    }

    #[cfg(test)]
    pub(crate) async fn send_tick(&self, now: chrono::DateTime<chrono::Utc>) {
        self.inner.send_tick(now).await;
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}
