//! Poll/send loop of the resource monitor

use super::instance::InstanceMonitoring;
use super::MonitorInner;
use crate::error::SourceError;
use crate::models::{
    cpu_percent_to_fixed, InstanceIdent, InstanceMonitoringData, InstanceQuotaAlert,
    MonitoringData, NodeMonitoringData, QuotaAlert, SystemQuotaAlert,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Run until a shutdown signal arrives or the monitor is dropped
pub(crate) async fn run(inner: Arc<MonitorInner>, mut shutdown: broadcast::Receiver<()>) {
    let poll_period = inner.config.poll_period;
    let combined = inner.config.combined_cadence();

    info!(
        poll_period_ms = poll_period.as_millis() as u64,
        send_period_ms = inner.config.send_period.unwrap_or(poll_period).as_millis() as u64,
        "Starting resource monitor loop"
    );

    let mut poll = ticker(poll_period);
    let mut send = match inner.config.send_period {
        Some(period) if !combined => Some(ticker(period)),
        _ => None,
    };

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!("Shutting down resource monitor loop");
                break;
            }
            _ = poll.tick() => {
                inner.poll_tick(Utc::now()).await;
                if combined {
                    inner.send_tick(Utc::now()).await;
                }
            }
            _ = next_tick(&mut send) => {
                inner.send_tick(Utc::now()).await;
            }
        }
    }
}

/// Interval whose first tick is one period from now
fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl MonitorInner {
    /// Sample every entity, feed the averaging windows and run the alert
    /// processors, all under the state lock
    pub(crate) async fn poll_tick(&self, now: DateTime<Utc>) {
        let started = std::time::Instant::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        self.usage.cache_system_infos().await;

        state.system_sampled |= self.refresh_system(&mut state.node_data, now).await;
        for (id, instance) in state.instances.iter_mut() {
            let sampled = self.refresh_instance(id, instance, now).await;
            instance.sampled |= sampled;
        }

        // entities without a single successful fetch stay out of the windows
        if state.system_sampled {
            if let Some(window) = &mut state.system_window {
                window.push(state.node_data.clone());
            }
        }
        for instance in state.instances.values_mut().filter(|i| i.sampled) {
            if let Some(window) = &mut instance.window {
                window.push(instance.data.clone());
            }
        }

        for alert in &mut state.system_alerts {
            if let Some(quota) = alert.check(&state.node_data) {
                self.dispatch_system(&alert.name, quota);
            }
        }
        for instance in state.instances.values_mut() {
            for alert in &mut instance.alerts {
                if let Some(quota) = alert.check(&instance.data) {
                    self.dispatch_instance(&instance.ident, &alert.name, quota);
                }
            }
        }

        debug!(
            node = %self.node_id,
            cpu = state.node_data.cpu,
            ram = state.node_data.ram,
            in_traffic = state.node_data.in_traffic,
            out_traffic = state.node_data.out_traffic,
            instances = state.instances.len(),
            "Poll tick complete"
        );
        drop(guard);

        self.metrics
            .observe_poll_latency(started.elapsed().as_secs_f64());
    }

    /// Compose one snapshot of the latest poll results and hand it off
    pub(crate) async fn send_tick(&self, now: DateTime<Utc>) {
        let snapshot = {
            let state = self.state.lock().await;
            NodeMonitoringData {
                node_id: self.node_id.clone(),
                node_data: state.node_data.clone(),
                instances: state
                    .instances
                    .values()
                    .map(|instance| InstanceMonitoringData {
                        instance_ident: instance.ident.clone(),
                        monitoring: instance.data.clone(),
                    })
                    .collect(),
                timestamp: now,
            }
        };

        self.monitoring_sender.send_monitoring_data(snapshot);
        self.metrics.inc_snapshots_sent();
    }

    /// Refresh the node snapshot; returns whether any fetch succeeded
    async fn refresh_system(&self, data: &mut MonitoringData, now: DateTime<Utc>) -> bool {
        data.timestamp = now;
        let mut sampled = false;

        match self.host.cpu_percent().await {
            Ok(percent) => {
                data.cpu = cpu_percent_to_fixed(percent);
                sampled = true;
            }
            Err(e) => self.sampling_error("system", "cpu", &e),
        }

        match self.host.memory().await {
            Ok(memory) => {
                data.ram = memory.used;
                sampled = true;
            }
            Err(e) => self.sampling_error("system", "ram", &e),
        }

        for (usage, info) in data.partitions.iter_mut().zip(&self.system_info.partitions) {
            match self.host.disk_usage(&info.path).await {
                Ok(disk) => {
                    usage.used_size = disk.used;
                    sampled = true;
                }
                Err(e) => self.sampling_error("system", &info.name, &e),
            }
        }

        if let Some(traffic) = &self.traffic {
            match traffic.system_traffic().await {
                Ok((in_traffic, out_traffic)) => {
                    data.in_traffic = in_traffic;
                    data.out_traffic = out_traffic;
                    sampled = true;
                }
                Err(e) => self.sampling_error("system", "traffic", &e),
            }
        }

        sampled
    }

    /// Refresh one instance snapshot; returns whether any fetch succeeded
    async fn refresh_instance(
        &self,
        id: &str,
        instance: &mut InstanceMonitoring,
        now: DateTime<Utc>,
    ) -> bool {
        instance.data.timestamp = now;
        let mut sampled = false;

        let mut usage = instance.usage.clone();
        match self.usage.fill_system_info(id, &mut usage).await {
            Ok(()) => {
                instance.data.cpu = usage.cpu;
                instance.data.ram = usage.ram;
                instance.usage = usage;
                sampled = true;
            }
            Err(e) => self.sampling_error(id, "cpu/ram", &e),
        }

        for (usage, param) in instance.data.partitions.iter_mut().zip(&instance.partitions) {
            match self
                .quota
                .user_fs_quota_usage(&param.path, instance.uid, instance.gid)
                .await
            {
                Ok(used) => {
                    usage.used_size = used;
                    sampled = true;
                }
                Err(e) => self.sampling_error(id, &param.name, &e),
            }
        }

        let traffic = self
            .traffic
            .as_ref()
            .filter(|traffic| traffic.has_instance_counters());
        if let Some(traffic) = traffic {
            match traffic.instance_traffic(id).await {
                Ok((in_traffic, out_traffic)) => {
                    instance.data.in_traffic = in_traffic;
                    instance.data.out_traffic = out_traffic;
                    sampled = true;
                }
                Err(e) => self.sampling_error(id, "traffic", &e),
            }
        }

        sampled
    }

    fn sampling_error(&self, entity: &str, parameter: &str, err: &SourceError) {
        error!(
            entity = %entity,
            parameter = %parameter,
            error = %err,
            "Failed to sample, keeping last value"
        );
        self.metrics.inc_sampling_errors();
    }

    fn dispatch_system(&self, name: &str, alert: QuotaAlert) {
        debug!(
            alert = %name,
            value = alert.value,
            status = %alert.status,
            "System quota alert"
        );
        self.metrics.inc_alerts(alert.status);

        if let Some(sender) = &self.alert_sender {
            sender.send_system_quota_alert(SystemQuotaAlert {
                node_id: self.node_id.clone(),
                alert,
            });
        }
    }

    fn dispatch_instance(&self, ident: &InstanceIdent, name: &str, alert: QuotaAlert) {
        debug!(
            alert = %name,
            instance = %ident,
            value = alert.value,
            status = %alert.status,
            "Instance quota alert"
        );
        self.metrics.inc_alerts(alert.status);

        if let Some(sender) = &self.alert_sender {
            sender.send_instance_quota_alert(InstanceQuotaAlert {
                instance_ident: ident.clone(),
                alert,
            });
        }
    }
}
