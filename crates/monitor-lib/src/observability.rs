//! Observability for the resource monitor
//!
//! Provides:
//! - Prometheus metrics (poll latency, monitored instances, alert counts)
//! - Structured logging of alerts and lifecycle events with tracing

use crate::models::{AlertStatus, QuotaAlert};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for poll latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    poll_latency_seconds: Histogram,
    instances_monitored: IntGauge,
    alert_processors: IntGauge,
    alerts_total: IntCounterVec,
    sampling_errors_total: IntCounter,
    snapshots_sent_total: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            poll_latency_seconds: register_histogram!(
                "resource_monitor_poll_latency_seconds",
                "Time spent in one poll tick",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register poll_latency_seconds"),

            instances_monitored: register_int_gauge!(
                "resource_monitor_instances_monitored",
                "Number of instances currently monitored"
            )
            .expect("Failed to register instances_monitored"),

            alert_processors: register_int_gauge!(
                "resource_monitor_alert_processors",
                "Number of registered alert processors"
            )
            .expect("Failed to register alert_processors"),

            alerts_total: register_int_counter_vec!(
                "resource_monitor_alerts_total",
                "Quota alerts emitted, by status",
                &["status"]
            )
            .expect("Failed to register alerts_total"),

            sampling_errors_total: register_int_counter!(
                "resource_monitor_sampling_errors_total",
                "Per-metric sampling failures"
            )
            .expect("Failed to register sampling_errors_total"),

            snapshots_sent_total: register_int_counter!(
                "resource_monitor_snapshots_sent_total",
                "Node monitoring snapshots handed to the sender"
            )
            .expect("Failed to register snapshots_sent_total"),
        }
    }
}

/// Handle to the process-wide monitor metrics; clones share one registry
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_poll_latency(&self, duration_secs: f64) {
        self.inner().poll_latency_seconds.observe(duration_secs);
    }

    pub fn set_instances_monitored(&self, count: usize) {
        self.inner().instances_monitored.set(count as i64);
    }

    pub fn set_alert_processors(&self, count: usize) {
        self.inner().alert_processors.set(count as i64);
    }

    pub fn inc_alerts(&self, status: AlertStatus) {
        self.inner()
            .alerts_total
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn inc_sampling_errors(&self) {
        self.inner().sampling_errors_total.inc();
    }

    pub fn inc_snapshots_sent(&self) {
        self.inner().snapshots_sent_total.inc();
    }
}

/// Structured logger for monitor events
#[derive(Clone)]
pub struct StructuredLogger {
    node_id: String,
}

impl StructuredLogger {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }

    /// Log a quota alert; `entity` is "system" or the instance identity
    pub fn log_quota_alert(&self, entity: &str, alert: &QuotaAlert) {
        match alert.status {
            AlertStatus::Raise => {
                warn!(
                    event = "quota_alert",
                    node = %self.node_id,
                    entity = %entity,
                    parameter = %alert.parameter,
                    value = alert.value,
                    status = %alert.status,
                    timestamp = %alert.timestamp,
                    "Quota alert raised"
                );
            }
            _ => {
                info!(
                    event = "quota_alert",
                    node = %self.node_id,
                    entity = %entity,
                    parameter = %alert.parameter,
                    value = alert.value,
                    status = %alert.status,
                    timestamp = %alert.timestamp,
                    "Quota alert"
                );
            }
        }
    }

    pub fn log_instance_started(&self, instance_id: &str, processors: usize) {
        info!(
            event = "instance_monitor_started",
            node = %self.node_id,
            instance_id = %instance_id,
            alert_processors = processors,
            "Instance monitoring started"
        );
    }

    pub fn log_instance_stopped(&self, instance_id: &str) {
        info!(
            event = "instance_monitor_stopped",
            node = %self.node_id,
            instance_id = %instance_id,
            "Instance monitoring stopped"
        );
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, processors: usize) {
        info!(
            event = "monitor_started",
            node = %self.node_id,
            monitor_version = %version,
            alert_processors = processors,
            "Resource monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_closed",
            node = %self.node_id,
            reason = %reason,
            "Resource monitor closed"
        );
    }
}
