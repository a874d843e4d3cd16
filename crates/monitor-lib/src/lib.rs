//! Resource monitoring and quota alerting for edge nodes
//!
//! This crate provides:
//! - Periodic sampling of node and per-instance resource usage
//! - Hysteresis-based quota alerts with a minimum dwell time
//! - Trailing-window averages per monitored entity
//! - Pluggable sample sources, alert sinks and snapshot sinks

pub mod alert;
pub mod average;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod node;
pub mod observability;
pub mod sender;
pub mod source;

pub use alert::{AlertRule, AlertRuleParam, AlertRules, PartitionAlertRule};
pub use config::{MonitorConfig, PartitionConfig};
pub use error::{MonitorError, Result, SourceError};
pub use models::*;
pub use monitor::{
    PartitionParam, ResourceMonitor, ResourceMonitorBuilder, ResourceMonitorParams,
};
pub use node::{
    NodeConfig, NodeConfigProvider, NodeInfoProvider, StaticNodeConfigProvider,
    StaticNodeInfoProvider,
};
pub use observability::{MonitorMetrics, StructuredLogger};
pub use sender::{
    monitoring_channel, AlertSender, ChannelAlertSender, ChannelMonitoringSender,
    LoggingAlertSender, MonitoringSender,
};
