//! Alert rule documents and threshold resolution

use crate::config::millis;
use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Bounds and dwell time of one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleParam {
    /// Minimum time a crossing must persist before it is confirmed
    #[serde(rename = "min_timeout_ms", with = "millis", default)]
    pub min_timeout: Duration,
    /// Clear threshold
    pub min_threshold: f64,
    /// Alarm threshold
    pub max_threshold: f64,
}

impl AlertRuleParam {
    pub fn new(min_threshold: f64, max_threshold: f64, min_timeout: Duration) -> Self {
        Self {
            min_timeout,
            min_threshold,
            max_threshold,
        }
    }

    fn validate(&self, parameter: &str) -> Result<()> {
        for (label, value) in [("min", self.min_threshold), ("max", self.max_threshold)] {
            if !value.is_finite() {
                return Err(MonitorError::invalid_rule(
                    parameter,
                    format!("{label} threshold is not a finite number"),
                ));
            }
            if value < 0.0 {
                return Err(MonitorError::invalid_rule(
                    parameter,
                    format!("{label} threshold is negative"),
                ));
            }
        }

        if self.min_threshold >= self.max_threshold {
            return Err(MonitorError::invalid_rule(
                parameter,
                format!(
                    "min threshold {} must be below max threshold {}",
                    self.min_threshold, self.max_threshold
                ),
            ));
        }

        Ok(())
    }
}

/// Threshold rule for one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AlertRule {
    /// Bounds are raw units
    Absolute(AlertRuleParam),
    /// Bounds are percentages of the parameter capacity
    Relative(AlertRuleParam),
}

impl AlertRule {
    pub fn param(&self) -> &AlertRuleParam {
        match self {
            AlertRule::Absolute(p) | AlertRule::Relative(p) => p,
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, AlertRule::Relative(_))
    }

    /// Check the rule without resolving it
    pub fn validate(&self, parameter: &str) -> Result<()> {
        self.param().validate(parameter)
    }

    /// Turn the rule into absolute thresholds.
    ///
    /// `capacity` is the full-scale value of the parameter; relative rules
    /// are rejected for parameters without one.
    pub fn resolve(&self, parameter: &str, capacity: Option<u64>) -> Result<Thresholds> {
        self.validate(parameter)?;

        let param = self.param();
        let (low, high) = match self {
            AlertRule::Absolute(p) => (p.min_threshold.round(), p.max_threshold.round()),
            AlertRule::Relative(p) => {
                let capacity = capacity.ok_or_else(|| {
                    MonitorError::invalid_rule(parameter, "relative rule without a known capacity")
                })? as f64;
                (
                    (capacity * p.min_threshold / 100.0).round(),
                    (capacity * p.max_threshold / 100.0).round(),
                )
            }
        };

        let (low, high) = (low as u64, high as u64);
        if low >= high {
            return Err(MonitorError::invalid_rule(
                parameter,
                format!("bounds collapse to {low}..{high} after resolution"),
            ));
        }

        Ok(Thresholds {
            low,
            high,
            timeout: param.min_timeout,
        })
    }
}

/// Rule for a named partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionAlertRule {
    pub name: String,
    #[serde(flatten)]
    pub rule: AlertRule,
}

/// Rule set; an absent rule disables alerting for that parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<AlertRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<AlertRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<PartitionAlertRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_traffic: Option<AlertRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_traffic: Option<AlertRule>,
}

impl AlertRules {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none()
            && self.ram.is_none()
            && self.partitions.is_empty()
            && self.in_traffic.is_none()
            && self.out_traffic.is_none()
    }

    /// Rule attached to a partition name
    pub fn partition(&self, name: &str) -> Option<&AlertRule> {
        self.partitions
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.rule)
    }

    /// Check every present rule
    pub fn validate(&self) -> Result<()> {
        if let Some(rule) = &self.cpu {
            rule.validate("cpu")?;
        }
        if let Some(rule) = &self.ram {
            rule.validate("ram")?;
        }

        let mut names = HashSet::new();
        for partition in &self.partitions {
            if !names.insert(partition.name.as_str()) {
                return Err(MonitorError::invalid_rule(
                    &partition.name,
                    "duplicate partition rule",
                ));
            }
            partition.rule.validate(&partition.name)?;
        }

        for (parameter, rule) in [("inTraffic", &self.in_traffic), ("outTraffic", &self.out_traffic)] {
            if let Some(rule) = rule {
                if rule.is_relative() {
                    return Err(MonitorError::invalid_rule(
                        parameter,
                        "traffic has no capacity for a relative rule",
                    ));
                }
                rule.validate(parameter)?;
            }
        }

        Ok(())
    }
}

/// Absolute thresholds an alert processor runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub low: u64,
    pub high: u64,
    pub timeout: Duration,
}
