//! Alert rules and per-parameter detectors

mod processor;
mod rules;

pub use processor::{AlertEvent, AlertProcessor};
pub use rules::{AlertRule, AlertRuleParam, AlertRules, PartitionAlertRule, Thresholds};

use crate::models::{MonitoringData, QuotaAlert};

/// Measured quantity of an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Parameter {
    Cpu,
    Ram,
    Partition(String),
    InTraffic,
    OutTraffic,
}

impl Parameter {
    /// Name carried in alerts
    pub fn name(&self) -> &str {
        match self {
            Parameter::Cpu => "cpu",
            Parameter::Ram => "ram",
            Parameter::Partition(name) => name.as_str(),
            Parameter::InTraffic => "inTraffic",
            Parameter::OutTraffic => "outTraffic",
        }
    }

    /// Current value of the parameter in a snapshot
    pub fn read(&self, data: &MonitoringData) -> Option<u64> {
        match self {
            Parameter::Cpu => Some(data.cpu),
            Parameter::Ram => Some(data.ram),
            Parameter::Partition(name) => data.partition_used(name),
            Parameter::InTraffic => Some(data.in_traffic),
            Parameter::OutTraffic => Some(data.out_traffic),
        }
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Detector bound to one parameter of one entity
#[derive(Debug, Clone)]
pub struct ParameterAlert {
    /// Display name, e.g. "System CPU" or "<instance> RAM"
    pub name: String,
    pub parameter: Parameter,
    pub processor: AlertProcessor,
}

impl ParameterAlert {
    pub fn new(name: String, parameter: Parameter, thresholds: Thresholds) -> Self {
        Self {
            name,
            parameter,
            processor: AlertProcessor::new(thresholds),
        }
    }

    /// Run the detector against the snapshot
    pub fn check(&mut self, data: &MonitoringData) -> Option<QuotaAlert> {
        let value = self.parameter.read(data)?;
        self.processor
            .check(data.timestamp, value)
            .map(|event| QuotaAlert {
                timestamp: event.timestamp,
                parameter: self.parameter.name().to_string(),
                value: event.value,
                status: event.status,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertStatus;
    use std::time::Duration;

    #[test]
    fn test_parameter_reads_snapshot() {
        let mut data = MonitoringData::with_partitions(["storage"]);
        data.cpu = 3500;
        data.partitions[0].used_size = 4300;
        data.out_traffic = 250;

        assert_eq!(Parameter::Cpu.read(&data), Some(3500));
        assert_eq!(Parameter::Partition("storage".into()).read(&data), Some(4300));
        assert_eq!(Parameter::Partition("state".into()).read(&data), None);
        assert_eq!(Parameter::OutTraffic.read(&data), Some(250));
        assert_eq!(Parameter::InTraffic.name(), "inTraffic");
    }

    #[test]
    fn test_parameter_alert_names_the_parameter() {
        let thresholds = Thresholds {
            low: 100,
            high: 200,
            timeout: Duration::ZERO,
        };
        let mut alert = ParameterAlert::new("System out".into(), Parameter::OutTraffic, thresholds);

        let mut data = MonitoringData::default();
        data.out_traffic = 150;
        assert!(alert.check(&data).is_none());

        data.out_traffic = 250;
        let quota = alert.check(&data).unwrap();
        assert_eq!(quota.parameter, "outTraffic");
        assert_eq!(quota.value, 250);
        assert_eq!(quota.status, AlertStatus::Raise);
    }
}
