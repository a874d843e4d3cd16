//! Host statistics backed by sysinfo

use super::{DiskStat, HostStats, MemoryStat, TrafficMonitoring};
use crate::error::SourceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use sysinfo::{Disks, Networks, System};

/// Node statistics read through sysinfo
pub struct SysinfoHostStats {
    system: Mutex<System>,
    num_cpus: u64,
}

impl SysinfoHostStats {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        let num_cpus = system.cpus().len() as u64;
        Self {
            system: Mutex::new(system),
            num_cpus,
        }
    }

    fn with_system<T>(&self, f: impl FnOnce(&mut System) -> T) -> Result<T, SourceError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| SourceError::Backend("sysinfo state poisoned".to_string()))?;
        Ok(f(&mut system))
    }
}

impl Default for SysinfoHostStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Absolute form of `path` so it can be matched against mount points
async fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = tokio::fs::canonicalize(path).await {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|dir| dir.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Longest mount point that is a prefix of `path`
fn disk_for_path<'a, I>(mounts: I, path: &Path) -> Option<DiskStat>
where
    I: IntoIterator<Item = (&'a Path, DiskStat)>,
{
    mounts
        .into_iter()
        .filter(|(mount_point, _)| path.starts_with(mount_point))
        .max_by_key(|(mount_point, _)| mount_point.as_os_str().len())
        .map(|(_, stat)| stat)
}

#[async_trait]
impl HostStats for SysinfoHostStats {
    fn num_cpus(&self) -> u64 {
        self.num_cpus
    }

    async fn cpu_percent(&self) -> Result<f64, SourceError> {
        self.with_system(|system| {
            system.refresh_cpu_usage();
            system.global_cpu_usage() as f64
        })
    }

    async fn memory(&self) -> Result<MemoryStat, SourceError> {
        self.with_system(|system| {
            system.refresh_memory();
            MemoryStat {
                total: system.total_memory(),
                used: system.used_memory(),
            }
        })
    }

    async fn disk_usage(&self, path: &Path) -> Result<DiskStat, SourceError> {
        let resolved = resolve_path(path).await;
        let disks = Disks::new_with_refreshed_list();
        let mounts = disks.iter().map(|disk| {
            (
                disk.mount_point(),
                DiskStat {
                    total: disk.total_space(),
                    used: disk.total_space().saturating_sub(disk.available_space()),
                },
            )
        });
        disk_for_path(mounts, &resolved).ok_or_else(|| {
            SourceError::Backend(format!("no mounted filesystem holds {}", path.display()))
        })
    }
}

/// Interface counters summed over the node; instances have no counters here
#[derive(Debug, Default)]
pub struct SysinfoTraffic;

impl SysinfoTraffic {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TrafficMonitoring for SysinfoTraffic {
    async fn system_traffic(&self) -> Result<(u64, u64), SourceError> {
        let networks = Networks::new_with_refreshed_list();
        Ok(networks.iter().fold((0, 0), |(rx, tx), (_, data)| {
            (
                rx + data.total_received(),
                tx + data.total_transmitted(),
            )
        }))
    }

    async fn instance_traffic(&self, instance_id: &str) -> Result<(u64, u64), SourceError> {
        Err(SourceError::UnknownInstance(instance_id.to_string()))
    }
    fn has_instance_counters(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_host_memory_is_consistent() {
        let host = SysinfoHostStats::new();
        let memory = host.memory().await.unwrap();

        assert!(memory.used <= memory.total);
        assert!(host.num_cpus() >= 1);
    }

    #[tokio::test]
    async fn test_instance_traffic_is_unknown() {
        let traffic = SysinfoTraffic::new();
        assert!(!traffic.has_instance_counters());
        let err = traffic.instance_traffic("instance0").await.unwrap_err();
        assert!(err.is_unknown_instance());
    }

    fn stat(total: u64) -> DiskStat {
        DiskStat { total, used: total / 2 }
    }

    #[test]
    fn test_longest_mount_point_wins() {
        let mounts = [
            (Path::new("/"), stat(100)),
            (Path::new("/var"), stat(200)),
            (Path::new("/var/lib"), stat(300)),
        ];

        let disk = disk_for_path(mounts.iter().cloned(), Path::new("/var/storage")).unwrap();
        assert_eq!(disk.total, 200);
        let disk = disk_for_path(mounts.iter().cloned(), Path::new("/var/lib/data")).unwrap();
        assert_eq!(disk.total, 300);
        // component-wise prefix, not string prefix
        let disk = disk_for_path(mounts.iter().cloned(), Path::new("/variant")).unwrap();
        assert_eq!(disk.total, 100);
    }

    #[test]
    fn test_unmatched_path_has_no_disk() {
        let mounts = [(Path::new("/var"), stat(200))];
        assert!(disk_for_path(mounts, Path::new("relative/dir")).is_none());
    }

    #[tokio::test]
    async fn test_relative_path_resolves_to_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_path(Path::new(".")).await;
        assert!(resolved.is_absolute());

        let resolved = resolve_path(dir.path()).await;
        assert!(resolved.is_absolute());
        // missing paths fall back to joining the working directory
        let resolved = resolve_path(Path::new("no-such-dir/child")).await;
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("no-such-dir/child"));

        let mounts = [(Path::new("/"), stat(100))];
        let resolved = resolve_path(Path::new(".")).await;
        assert_eq!(disk_for_path(mounts, &resolved).unwrap().total, 100);
    }
}
