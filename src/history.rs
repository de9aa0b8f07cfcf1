//! Performance History Store
//!
//! Append-only, time-windowed series of performance snapshots per peer.
//! Appends closer than the sampling interval to the previous sample are
//! silently dropped, and every successful append prunes all series.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::types::{current_timestamp, NodeStats, Timestamp};

/// Default RAM total assumed when a peer does not report one (4 GiB)
const DEFAULT_RAM_TOTAL: u64 = 4 * 1024 * 1024 * 1024;

/// One point of a peer's performance series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub address: String,
    pub timestamp: Timestamp,
    pub cpu_percent: f64,
    pub ram_used: u64,
    pub ram_total: u64,
    pub uptime_secs: u64,
    pub active_streams: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub storage_bytes: Option<u64>,
}

/// Measured figures of a snapshot, before address and time are attached
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceSample {
    pub cpu_percent: f64,
    pub ram_used: u64,
    pub ram_total: u64,
    pub uptime_secs: u64,
    pub active_streams: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub storage_bytes: Option<u64>,
}

impl From<&NodeStats> for PerformanceSample {
    fn from(stats: &NodeStats) -> Self {
        Self {
            cpu_percent: stats.cpu_percent,
            ram_used: stats.ram_used,
            ram_total: if stats.ram_total == 0 { DEFAULT_RAM_TOTAL } else { stats.ram_total },
            uptime_secs: stats.uptime,
            active_streams: stats.active_streams,
            packets_received: stats.packets_received,
            packets_sent: stats.packets_sent,
            storage_bytes: stats.file_size,
        }
    }
}

/// min / avg / max of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl Aggregate {
    fn of(values: &[f64]) -> Self {
        let sum: f64 = values.iter().sum();
        Self {
            avg: sum / values.len() as f64,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Aggregated view of a peer's series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub cpu: Aggregate,
    pub ram_percent: Aggregate,
    pub current_uptime: u64,
    pub max_uptime: u64,
    pub snapshot_count: usize,
    pub first_snapshot: Timestamp,
    pub last_snapshot: Timestamp,
}

/// In-memory performance history
pub struct HistoryStore {
    min_interval_secs: u64,
    retention_secs: u64,
    series: RwLock<HashMap<String, Vec<PerformanceSnapshot>>>,
}

impl HistoryStore {
    pub fn new(min_interval_secs: u64, retention_secs: u64) -> Self {
        Self {
            min_interval_secs,
            retention_secs,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Append a sample; returns the stored snapshot, `None` if the interval
    /// since the previous sample has not elapsed
    pub fn append(&self, address: &str, sample: PerformanceSample) -> Option<PerformanceSnapshot> {
        self.append_at(address, sample, current_timestamp())
    }

    pub fn append_at(
        &self,
        address: &str,
        sample: PerformanceSample,
        now: Timestamp,
    ) -> Option<PerformanceSnapshot> {
        let mut series = self.series.write();
        let snapshots = series.entry(address.to_string()).or_default();

        if let Some(last) = snapshots.last() {
            if now < last.timestamp.saturating_add(self.min_interval_secs) {
                debug!("Skipping snapshot for {}: last sample too recent", address);
                return None;
            }
        }

        let snapshot = PerformanceSnapshot {
            address: address.to_string(),
            timestamp: now,
            cpu_percent: sample.cpu_percent,
            ram_used: sample.ram_used,
            ram_total: sample.ram_total,
            uptime_secs: sample.uptime_secs,
            active_streams: sample.active_streams,
            packets_received: sample.packets_received,
            packets_sent: sample.packets_sent,
            storage_bytes: sample.storage_bytes,
        };
        snapshots.push(snapshot.clone());

        prune_series(&mut series, now.saturating_sub(self.retention_secs));

        Some(snapshot)
    }

    /// Snapshots of a peer at or after `since`, chronological
    pub fn query(&self, address: &str, since: Timestamp) -> Vec<PerformanceSnapshot> {
        self.series
            .read()
            .get(address)
            .map(|s| s.iter().filter(|p| p.timestamp >= since).cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every sample older than `max_age_secs`
    pub fn prune(&self, max_age_secs: u64) -> usize {
        self.prune_at(max_age_secs, current_timestamp())
    }

    pub fn prune_at(&self, max_age_secs: u64, now: Timestamp) -> usize {
        prune_series(&mut self.series.write(), now.saturating_sub(max_age_secs))
    }

    /// Peers that have at least one snapshot
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.series.read().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Aggregates over the stored window
    pub fn summary(&self, address: &str) -> Option<PerformanceSummary> {
        let series = self.series.read();
        let snapshots = series.get(address).filter(|s| !s.is_empty())?;

        let cpu: Vec<f64> = snapshots.iter().map(|s| s.cpu_percent).collect();
        let ram: Vec<f64> = snapshots
            .iter()
            .map(|s| {
                if s.ram_total == 0 {
                    0.0
                } else {
                    s.ram_used as f64 / s.ram_total as f64 * 100.0
                }
            })
            .collect();

        let first = snapshots.first()?;
        let last = snapshots.last()?;

        Some(PerformanceSummary {
            cpu: Aggregate::of(&cpu),
            ram_percent: Aggregate::of(&ram),
            current_uptime: last.uptime_secs,
            max_uptime: snapshots.iter().map(|s| s.uptime_secs).max().unwrap_or(0),
            snapshot_count: snapshots.len(),
            first_snapshot: first.timestamp,
            last_snapshot: last.timestamp,
        })
    }

    pub fn clear(&self) {
        self.series.write().clear();
    }
}

/// Remove samples older than `cutoff` and drop empty series
fn prune_series(series: &mut HashMap<String, Vec<PerformanceSnapshot>>, cutoff: Timestamp) -> usize {
    let mut removed = 0;
    for snapshots in series.values_mut() {
        let before = snapshots.len();
        snapshots.retain(|s| s.timestamp >= cutoff);
        removed += before - snapshots.len();
    }
    series.retain(|_, s| !s.is_empty());
    removed
}
