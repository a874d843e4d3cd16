//! Trailing-duration moving average of monitoring snapshots

use crate::error::{MonitorError, Result};
use crate::models::{MonitoringData, PartitionUsage};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;

/// Per-entity window of retained snapshots
#[derive(Debug, Clone)]
pub struct AverageWindow {
    retention: Duration,
    samples: VecDeque<MonitoringData>,
}

impl AverageWindow {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            samples: VecDeque::new(),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a snapshot and evict everything older than the retention
    pub fn push(&mut self, sample: MonitoringData) {
        let now = sample.timestamp;
        self.samples.push_back(sample);
        self.expire_old_samples(now);
    }

    fn expire_old_samples(&mut self, now: DateTime<Utc>) {
        let Ok(retention) = chrono::Duration::from_std(self.retention) else {
            return;
        };
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return;
        };

        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Mean of every field across retained samples.
    ///
    /// Partitions are averaged over the samples that carry them. The result
    /// is stamped with the latest sample time.
    pub fn average(&self, entity: &str) -> Result<MonitoringData> {
        let latest = self.samples.back().ok_or_else(|| MonitorError::NoData {
            entity: entity.to_string(),
        })?;

        let count = self.samples.len() as u128;
        let mean = |field: fn(&MonitoringData) -> u64| -> u64 {
            let sum: u128 = self.samples.iter().map(|s| field(s) as u128).sum();
            rounded_div(sum, count)
        };

        let mut partition_sums: Vec<(String, u128, u128)> = Vec::new();
        for sample in &self.samples {
            for partition in &sample.partitions {
                match partition_sums.iter_mut().find(|(name, _, _)| *name == partition.name) {
                    Some((_, sum, n)) => {
                        *sum += partition.used_size as u128;
                        *n += 1;
                    }
                    None => partition_sums.push((
                        partition.name.clone(),
                        partition.used_size as u128,
                        1,
                    )),
                }
            }
        }

        Ok(MonitoringData {
            cpu: mean(|s| s.cpu),
            ram: mean(|s| s.ram),
            partitions: partition_sums
                .into_iter()
                .map(|(name, sum, n)| PartitionUsage {
                    name,
                    used_size: rounded_div(sum, n),
                })
                .collect(),
            in_traffic: mean(|s| s.in_traffic),
            out_traffic: mean(|s| s.out_traffic),
            timestamp: latest.timestamp,
        })
    }
}

fn rounded_div(sum: u128, count: u128) -> u64 {
    if count == 0 {
        return 0;
    }
    ((sum + count / 2) / count) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn sample(secs: i64, cpu: u64, partitions: &[(&str, u64)]) -> MonitoringData {
        MonitoringData {
            cpu,
            ram: cpu * 10,
            partitions: partitions
                .iter()
                .map(|(name, used)| PartitionUsage {
                    name: name.to_string(),
                    used_size: *used,
                })
                .collect(),
            in_traffic: cpu + 1,
            out_traffic: cpu + 2,
            timestamp: at(secs),
        }
    }

    #[test]
    fn test_empty_window_reports_no_data() {
        let window = AverageWindow::new(Duration::from_secs(5));
        assert!(matches!(
            window.average("system"),
            Err(MonitorError::NoData { entity }) if entity == "system"
        ));
    }

    #[test]
    fn test_repeated_sample_averages_to_itself() {
        let mut window = AverageWindow::new(Duration::from_secs(10));
        for secs in 0..5 {
            window.push(sample(secs, 1234, &[("storage", 777)]));
        }

        let average = window.average("system").unwrap();
        let mut expected = sample(4, 1234, &[("storage", 777)]);
        expected.timestamp = at(4);
        assert_eq!(average, expected);
    }

    #[test]
    fn test_distinct_values_average_to_mean() {
        let mut window = AverageWindow::new(Duration::from_secs(10));
        for (secs, cpu) in [(0, 100), (1, 200), (2, 300), (3, 401)] {
            window.push(sample(secs, cpu, &[]));
        }

        let average = window.average("system").unwrap();
        assert_eq!(average.cpu, 250);
        assert_eq!(average.ram, 2503);
        assert_eq!(average.timestamp, at(3));
    }

    #[test]
    fn test_old_samples_are_evicted() {
        let mut window = AverageWindow::new(Duration::from_secs(3));
        for secs in 0..10 {
            window.push(sample(secs, secs as u64 * 100, &[]));
        }

        // samples 6..=9 remain: the cutoff at 9 - 3 keeps the sample at 6
        assert_eq!(window.len(), 4);
        assert_eq!(window.average("system").unwrap().cpu, 750);
    }

    #[test]
    fn test_partition_averaged_over_samples_that_carry_it() {
        let mut window = AverageWindow::new(Duration::from_secs(10));
        window.push(sample(0, 100, &[("storage", 1000)]));
        window.push(sample(1, 100, &[("storage", 2000), ("state", 10)]));
        window.push(sample(2, 100, &[("state", 30)]));

        let average = window.average("instance").unwrap();
        assert_eq!(
            average.partitions,
            vec![
                PartitionUsage {
                    name: "storage".to_string(),
                    used_size: 1500,
                },
                PartitionUsage {
                    name: "state".to_string(),
                    used_size: 20,
                },
            ]
        );
    }
}
