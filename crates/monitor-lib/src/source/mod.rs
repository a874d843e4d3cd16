//! Sample sources consumed by the resource monitor
//!
//! Each trait is a capability the monitor is constructed with:
//! - `HostStats` for node-wide CPU, memory and disk figures
//! - `SystemUsageProvider` for per-instance CPU and RAM
//! - `QuotaProvider` for per-instance disk usage
//! - `TrafficMonitoring` for network counters

mod cgroup;
mod host;
mod quota;

pub use cgroup::CgroupSystemUsage;
pub use host::{SysinfoHostStats, SysinfoTraffic};
pub use quota::OwnedFilesQuota;

use crate::error::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Memory figures in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStat {
    pub total: u64,
    pub used: u64,
}

/// Disk figures in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskStat {
    pub total: u64,
    pub used: u64,
}

/// Node-wide statistics
#[async_trait]
pub trait HostStats: Send + Sync {
    /// Number of logical CPUs
    fn num_cpus(&self) -> u64;

    /// Node CPU usage in percent of total capacity
    async fn cpu_percent(&self) -> Result<f64, SourceError>;

    async fn memory(&self) -> Result<MemoryStat, SourceError>;

    /// Usage of the filesystem holding `path`
    async fn disk_usage(&self, path: &Path) -> Result<DiskStat, SourceError>;
}

/// CPU and RAM of one instance, plus the counters needed to derive the
/// next CPU figure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceUsage {
    /// Hundredths of a percent of node capacity
    pub cpu: u64,
    /// Bytes
    pub ram: u64,
    pub prev_cpu_usage_usec: Option<u64>,
    pub prev_sample: Option<DateTime<Utc>>,
}

/// Per-instance CPU and RAM backend
#[async_trait]
pub trait SystemUsageProvider: Send + Sync {
    /// Batched pre-fetch ahead of a round of `fill_system_info` calls
    async fn cache_system_infos(&self);

    /// Update `usage` for the instance
    async fn fill_system_info(
        &self,
        instance_id: &str,
        usage: &mut InstanceUsage,
    ) -> Result<(), SourceError>;
}

/// Per-user filesystem usage lookup
#[async_trait]
pub trait QuotaProvider: Send + Sync {
    /// Bytes used under `path` by the given owner
    async fn user_fs_quota_usage(&self, path: &Path, uid: u32, gid: u32)
        -> Result<u64, SourceError>;
}

/// Network counters in bytes, as `(in, out)`
#[async_trait]
pub trait TrafficMonitoring: Send + Sync {
    async fn system_traffic(&self) -> Result<(u64, u64), SourceError>;

    /// Fails with `SourceError::UnknownInstance` for an unknown id
    async fn instance_traffic(&self, instance_id: &str) -> Result<(u64, u64), SourceError>;

    /// Backends with node-wide counters only return false; instance traffic is then not sampled
    fn has_instance_counters(&self) -> bool {
        true
    }
}
