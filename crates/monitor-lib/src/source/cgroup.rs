//! cgroup v2 per-instance usage
//!
//! Each instance lives in `<root>/<instance_id>`:
//! - cpu.stat for cumulative CPU time (`usage_usec`)
//! - memory.current for current memory usage

use super::{InstanceUsage, SystemUsageProvider};
use crate::error::SourceError;
use crate::models::CPU_FULL_SCALE;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Usage provider over the unified cgroup v2 hierarchy
pub struct CgroupSystemUsage {
    cgroup_root: PathBuf,
    num_cpus: u64,
}

impl CgroupSystemUsage {
    pub fn new(cgroup_root: impl Into<PathBuf>, num_cpus: u64) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
            num_cpus: num_cpus.max(1),
        }
    }

    pub fn cgroup_root(&self) -> &Path {
        &self.cgroup_root
    }

    /// Parse the `usage_usec` line of cpu.stat
    pub fn parse_cpu_usage(content: &str) -> Result<u64, SourceError> {
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            if parts.next() == Some("usage_usec") {
                let value = parts.next().unwrap_or_default();
                return value.parse().map_err(|_| SourceError::Parse {
                    what: "cpu.stat usage_usec".to_string(),
                    detail: value.to_string(),
                });
            }
        }

        Err(SourceError::Parse {
            what: "cpu.stat".to_string(),
            detail: "missing usage_usec".to_string(),
        })
    }

    async fn read_value(path: &Path) -> Result<u64, SourceError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| SourceError::io(path, e))?;

        content.trim().parse().map_err(|_| SourceError::Parse {
            what: path.display().to_string(),
            detail: content.trim().to_string(),
        })
    }

    /// CPU share of the node between two cumulative readings
    fn cpu_between(&self, prev_usec: u64, usec: u64, wall_usec: u64) -> u64 {
        if wall_usec == 0 {
            return 0;
        }
        let used = usec.saturating_sub(prev_usec) as u128;
        let capacity = wall_usec as u128 * self.num_cpus as u128;
        let share = used * CPU_FULL_SCALE as u128 / capacity;
        share.min(CPU_FULL_SCALE as u128) as u64
    }

    pub(crate) async fn sample(
        &self,
        instance_id: &str,
        usage: &mut InstanceUsage,
        now: DateTime<Utc>,
    ) -> Result<(), SourceError> {
        let cgroup_path = self.cgroup_root.join(instance_id);
        if let Err(e) = fs::metadata(&cgroup_path).await {
            return Err(match e.kind() {
                std::io::ErrorKind::NotFound => SourceError::UnknownInstance(instance_id.to_string()),
                _ => SourceError::io(&cgroup_path, e),
            });
        }

        let cpu_stat_path = cgroup_path.join("cpu.stat");
        let cpu_stat = fs::read_to_string(&cpu_stat_path)
            .await
            .map_err(|e| SourceError::io(&cpu_stat_path, e))?;
        let usage_usec = Self::parse_cpu_usage(&cpu_stat)?;
        let ram = Self::read_value(&cgroup_path.join("memory.current")).await?;

        usage.cpu = match (usage.prev_cpu_usage_usec, usage.prev_sample) {
            (Some(prev_usec), Some(prev_sample)) => {
                let wall = (now - prev_sample).num_microseconds().unwrap_or(0).max(0) as u64;
                self.cpu_between(prev_usec, usage_usec, wall)
            }
            _ => 0,
        };
        usage.ram = ram;
        usage.prev_cpu_usage_usec = Some(usage_usec);
        usage.prev_sample = Some(now);

        Ok(())
    }
}

#[async_trait]
impl SystemUsageProvider for CgroupSystemUsage {
    async fn cache_system_infos(&self) {}

    async fn fill_system_info(
        &self,
        instance_id: &str,
        usage: &mut InstanceUsage,
    ) -> Result<(), SourceError> {
        self.sample(instance_id, usage, Utc::now()).await
    }
}
