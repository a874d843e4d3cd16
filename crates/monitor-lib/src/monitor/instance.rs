//! Per-instance monitoring records and processor construction

use crate::alert::{AlertRule, AlertRules, Parameter, ParameterAlert};
use crate::average::AverageWindow;
use crate::error::{MonitorError, Result};
use crate::models::{InstanceIdent, MonitoringData, SystemInfo, CPU_FULL_SCALE};
use crate::source::InstanceUsage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Partition an instance is measured on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionParam {
    pub name: String,
    pub path: PathBuf,
}

/// Parameters of `ResourceMonitor::start_instance_monitor`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMonitorParams {
    pub instance_ident: InstanceIdent,
    /// Owner used for filesystem quota lookups
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_rules: Option<AlertRules>,
    #[serde(default)]
    pub partitions: Vec<PartitionParam>,
}

pub(crate) struct InstanceMonitoring {
    pub ident: InstanceIdent,
    pub uid: u32,
    pub gid: u32,
    pub partitions: Vec<PartitionParam>,
    pub usage: InstanceUsage,
    pub data: MonitoringData,
    /// Set once any fetch for the instance has succeeded
    pub sampled: bool,
    pub window: Option<AverageWindow>,
    pub alerts: Vec<ParameterAlert>,
}

impl InstanceMonitoring {
    pub fn new(
        params: ResourceMonitorParams,
        alerts: Vec<ParameterAlert>,
        average_window: Option<Duration>,
    ) -> Self {
        let data = MonitoringData::with_partitions(params.partitions.iter().map(|p| p.name.as_str()));
        Self {
            ident: params.instance_ident,
            uid: params.uid,
            gid: params.gid,
            partitions: params.partitions,
            usage: InstanceUsage::default(),
            data,
            sampled: false,
            window: average_window.map(AverageWindow::new),
            alerts,
        }
    }

    pub fn average(&self, instance_id: &str) -> Result<MonitoringData> {
        self.window
            .as_ref()
            .ok_or(MonitorError::AveragingDisabled)?
            .average(instance_id)
    }
}

/// An id names a single cgroup directory under the configured root
pub(crate) fn is_valid_instance_id(instance_id: &str) -> bool {
    !instance_id.is_empty()
        && instance_id != "."
        && instance_id != ".."
        && !instance_id.contains(['/', '\\', '\0'])
}

/// Build one processor per present rule.
///
/// Partition rules only apply to partitions in `partitions`. Relative
/// rules are resolved against `system_info`.
pub(crate) fn build_alerts(
    prefix: &str,
    rules: &AlertRules,
    system_info: &SystemInfo,
    partitions: &[&str],
) -> Result<Vec<ParameterAlert>> {
    rules.validate()?;

    let mut alerts = Vec::new();
    let mut add = |label: String, parameter: Parameter, rule: &AlertRule, capacity: Option<u64>| {
        let thresholds = rule.resolve(parameter.name(), capacity)?;
        alerts.push(ParameterAlert::new(
            format!("{prefix} {label}"),
            parameter,
            thresholds,
        ));
        Ok::<_, MonitorError>(())
    };

    if let Some(rule) = &rules.cpu {
        add("CPU".to_string(), Parameter::Cpu, rule, Some(CPU_FULL_SCALE))?;
    }

    if let Some(rule) = &rules.ram {
        add("RAM".to_string(), Parameter::Ram, rule, Some(system_info.total_ram))?;
    }

    for partition_rule in &rules.partitions {
        let name = partition_rule.name.as_str();
        if !partitions.contains(&name) {
            debug!(
                entity = %prefix,
                partition = %name,
                "Skipping rule for unmonitored partition"
            );
            continue;
        }
        add(
            format!("Partition {name}"),
            Parameter::Partition(name.to_string()),
            &partition_rule.rule,
            system_info.partition_total(name),
        )?;
    }

    if let Some(rule) = &rules.in_traffic {
        add("Traffic In".to_string(), Parameter::InTraffic, rule, None)?;
    }

    if let Some(rule) = &rules.out_traffic {
        add("Traffic Out".to_string(), Parameter::OutTraffic, rule, None)?;
    }

    Ok(alerts)
}
