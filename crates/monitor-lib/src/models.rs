//! Core data models for the monitoring core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fixed-point scale for CPU usage: one unit is a hundredth of a percent
pub const CPU_SCALE: u64 = 100;

/// CPU value that represents the whole node being busy (100 %)
pub const CPU_FULL_SCALE: u64 = 100 * CPU_SCALE;

/// Convert a CPU percentage into the fixed-point representation
pub fn cpu_percent_to_fixed(percent: f64) -> u64 {
    if !percent.is_finite() || percent <= 0.0 {
        return 0;
    }
    (percent * CPU_SCALE as f64).round() as u64
}

/// Identity of a workload instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdent {
    pub service_id: String,
    pub subject_id: String,
    pub instance: u64,
}

impl std::fmt::Display for InstanceIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.service_id, self.subject_id, self.instance)
    }
}

/// Used size of a named partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionUsage {
    pub name: String,
    pub used_size: u64,
}

/// One monitoring snapshot of an entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringData {
    /// CPU usage in hundredths of a percent of node capacity
    pub cpu: u64,
    /// RAM usage in bytes
    pub ram: u64,
    pub partitions: Vec<PartitionUsage>,
    /// Inbound traffic in bytes
    pub in_traffic: u64,
    /// Outbound traffic in bytes
    pub out_traffic: u64,
    pub timestamp: DateTime<Utc>,
}

impl MonitoringData {
    /// Create empty data with one zeroed entry per partition name
    pub fn with_partitions<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            partitions: names
                .into_iter()
                .map(|name| PartitionUsage {
                    name: name.to_string(),
                    used_size: 0,
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Used size of a partition by name
    pub fn partition_used(&self, name: &str) -> Option<u64> {
        self.partitions
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.used_size)
    }
}

/// Monitoring data of one workload instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMonitoringData {
    pub instance_ident: InstanceIdent,
    #[serde(flatten)]
    pub monitoring: MonitoringData,
}

/// Composed snapshot for the node and all live instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMonitoringData {
    pub node_id: String,
    pub node_data: MonitoringData,
    pub instances: Vec<InstanceMonitoringData>,
    pub timestamp: DateTime<Utc>,
}

/// Static facts about a partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
    pub path: PathBuf,
    /// Total size in bytes; zero means "probe the host"
    #[serde(default)]
    pub total_size: u64,
}

/// Node facts reported by the node info provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub node_id: String,
    #[serde(default)]
    pub node_type: String,
    /// Zero means "probe the host"
    #[serde(default)]
    pub num_cpus: u64,
    /// Zero means "probe the host"
    #[serde(default)]
    pub total_ram: u64,
    #[serde(default)]
    pub partitions: Vec<PartitionInfo>,
}

/// Capacity facts gathered once at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub num_cpus: u64,
    pub total_ram: u64,
    pub partitions: Vec<PartitionInfo>,
}

impl SystemInfo {
    /// Total size of a partition by name
    pub fn partition_total(&self, name: &str) -> Option<u64> {
        self.partitions
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.total_size)
    }
}

/// Alert lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Raise,
    Continue,
    Fall,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Raise => "raise",
            AlertStatus::Continue => "continue",
            AlertStatus::Fall => "fall",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload shared by system and instance quota alerts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaAlert {
    pub timestamp: DateTime<Utc>,
    pub parameter: String,
    pub value: u64,
    pub status: AlertStatus,
}

/// Quota alert raised for the node as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemQuotaAlert {
    pub node_id: String,
    #[serde(flatten)]
    pub alert: QuotaAlert,
}

/// Quota alert raised for one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceQuotaAlert {
    pub instance_ident: InstanceIdent,
    #[serde(flatten)]
    pub alert: QuotaAlert,
}

/// Either kind of quota alert, as forwarded by channel-based senders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "camelCase")]
pub enum QuotaAlertRecord {
    SystemQuotaAlert(SystemQuotaAlert),
    InstanceQuotaAlert(InstanceQuotaAlert),
}

impl QuotaAlertRecord {
    pub fn alert(&self) -> &QuotaAlert {
        match self {
            QuotaAlertRecord::SystemQuotaAlert(a) => &a.alert,
            QuotaAlertRecord::InstanceQuotaAlert(a) => &a.alert,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_percent_to_fixed() {
        assert_eq!(cpu_percent_to_fixed(35.0), 3500);
        assert_eq!(cpu_percent_to_fixed(12.346), 1235);
        assert_eq!(cpu_percent_to_fixed(-1.0), 0);
        assert_eq!(cpu_percent_to_fixed(f64::NAN), 0);
    }

    #[test]
    fn test_partition_lookup() {
        let mut data = MonitoringData::with_partitions(["storage", "state"]);
        data.partitions[1].used_size = 42;

        assert_eq!(data.partition_used("state"), Some(42));
        assert_eq!(data.partition_used("storage"), Some(0));
        assert_eq!(data.partition_used("missing"), None);
    }

    #[test]
    fn test_instance_alert_serialization() {
        let record = QuotaAlertRecord::InstanceQuotaAlert(InstanceQuotaAlert {
            instance_ident: InstanceIdent {
                service_id: "service1".to_string(),
                subject_id: "subject1".to_string(),
                instance: 1,
            },
            alert: QuotaAlert {
                timestamp: DateTime::<Utc>::default(),
                parameter: "ram".to_string(),
                value: 9000,
                status: AlertStatus::Raise,
            },
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tag"], "instanceQuotaAlert");
        assert_eq!(json["instanceIdent"]["serviceId"], "service1");
        assert_eq!(json["parameter"], "ram");
        assert_eq!(json["status"], "raise");
    }
}
