//! Monitor configuration

use crate::alert::AlertRules;
use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Default poll period (1 second)
const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(1);

/// Default capacity of the built-in snapshot channel
const DEFAULT_MONITORING_BUFFER: usize = 16;

/// Partition to monitor on the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
    pub path: PathBuf,
}

/// Configuration for the resource monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Sampling cadence
    #[serde(rename = "poll_period_ms", with = "millis", default = "default_poll_period")]
    pub poll_period: Duration,

    /// Snapshot delivery cadence; unset means "deliver after every poll"
    #[serde(
        rename = "send_period_ms",
        with = "opt_millis",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub send_period: Option<Duration>,

    /// Retention of the averaging window; unset disables averaging
    #[serde(
        rename = "average_window_ms",
        with = "opt_millis",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub average_window: Option<Duration>,

    /// Partitions to monitor; empty means "use the node info partitions"
    #[serde(default)]
    pub partitions: Vec<PartitionConfig>,

    /// Rules used when the node config provider has none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_rules: Option<AlertRules>,

    /// Capacity of the built-in snapshot channel
    #[serde(default = "default_monitoring_buffer")]
    pub monitoring_buffer: usize,
}

fn default_poll_period() -> Duration {
    DEFAULT_POLL_PERIOD
}

fn default_monitoring_buffer() -> usize {
    DEFAULT_MONITORING_BUFFER
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_period: DEFAULT_POLL_PERIOD,
            send_period: None,
            average_window: None,
            partitions: Vec::new(),
            alert_rules: None,
            monitoring_buffer: DEFAULT_MONITORING_BUFFER,
        }
    }
}

impl MonitorConfig {
    /// Create a configuration with the given poll period
    pub fn with_poll_period(poll_period: Duration) -> Self {
        Self {
            poll_period,
            ..Default::default()
        }
    }

    /// Check the configuration for structural errors
    pub fn validate(&self) -> Result<()> {
        if self.poll_period.is_zero() {
            return Err(MonitorError::InvalidConfig(
                "poll period must be greater than zero".to_string(),
            ));
        }

        if self.send_period.is_some_and(|p| p.is_zero()) {
            return Err(MonitorError::InvalidConfig(
                "send period must be greater than zero".to_string(),
            ));
        }

        if self.average_window.is_some_and(|w| w.is_zero()) {
            return Err(MonitorError::InvalidConfig(
                "average window must be greater than zero".to_string(),
            ));
        }

        if self.monitoring_buffer == 0 {
            return Err(MonitorError::InvalidConfig(
                "monitoring buffer must hold at least one snapshot".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for partition in &self.partitions {
            if !names.insert(partition.name.as_str()) {
                return Err(MonitorError::InvalidConfig(format!(
                    "duplicate partition {}",
                    partition.name
                )));
            }
        }

        if let Some(rules) = &self.alert_rules {
            rules.validate()?;
        }

        Ok(())
    }

    /// Whether polling and sending share one timer
    pub fn combined_cadence(&self) -> bool {
        self.send_period
            .map(|send| send == self.poll_period)
            .unwrap_or(true)
    }
}

/// Serialize a `Duration` as integer milliseconds
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Serialize an optional `Duration` as integer milliseconds
pub mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|v| v.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_config_default() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_period, Duration::from_secs(1));
        assert!(config.send_period.is_none());
        assert!(config.average_window.is_none());
        assert!(config.combined_cadence());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_monitor_config_from_json() {
        let config: MonitorConfig = serde_json::from_str(
            r#"{
                "poll_period_ms": 500,
                "send_period_ms": 2000,
                "average_window_ms": 3000,
                "partitions": [{"name": "storage", "types": ["generic"], "path": "/var"}]
            }"#,
        )
        .unwrap();

        assert_eq!(config.poll_period, Duration::from_millis(500));
        assert_eq!(config.send_period, Some(Duration::from_secs(2)));
        assert_eq!(config.average_window, Some(Duration::from_secs(3)));
        assert_eq!(config.partitions[0].types, vec!["generic".to_string()]);
        assert!(!config.combined_cadence());
    }

    #[test]
    fn test_monitor_config_rejects_zero_poll_period() {
        let config = MonitorConfig::with_poll_period(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(MonitorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_monitor_config_rejects_duplicate_partitions() {
        let partition = PartitionConfig {
            name: "storage".to_string(),
            types: vec![],
            path: PathBuf::from("/var"),
        };
        let config = MonitorConfig {
            partitions: vec![partition.clone(), partition],
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_equal_periods_share_cadence() {
        let config = MonitorConfig {
            send_period: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        assert!(config.combined_cadence());
    }
}
