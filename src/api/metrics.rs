//! Metrics Collection
//!
//! Collects and exposes counters for monitoring the scanner, collector and sync.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::types::{ProbeFailure, ProbeOutcome};

/// Metrics collector for the monitor
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Probes issued (scans, collector and on-demand)
    pub probes: AtomicU64,

    /// Probes that came back accessible
    pub probes_accessible: AtomicU64,

    /// Probes abandoned at the deadline
    pub probe_timeouts: AtomicU64,

    pub scans_completed: AtomicU64,

    /// Scan triggers dropped by the single-flight guard
    pub scans_skipped: AtomicU64,

    pub syncs_completed: AtomicU64,

    pub syncs_failed: AtomicU64,

    pub records_synced: AtomicU64,

    pub conflicts_resolved: AtomicU64,

    /// Performance snapshots admitted to history
    pub snapshots_collected: AtomicU64,

    pub ranking_snapshots_recorded: AtomicU64,

    /// Peers in the last discovery result
    pub known_peers: AtomicU64,

    /// Peers currently known-accessible
    pub accessible_peers: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Count one probe by outcome
    pub fn record_probe(&self, outcome: &ProbeOutcome) {
        self.probes.fetch_add(1, Ordering::Relaxed);
        if outcome.accessible {
            self.probes_accessible.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.failure == Some(ProbeFailure::Timeout) {
            self.probe_timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_scans_completed(&self) {
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scans_skipped(&self) {
        self.scans_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished sync and its counts
    pub fn record_sync(&self, records: u64, conflicts: u64) {
        self.syncs_completed.fetch_add(1, Ordering::Relaxed);
        self.records_synced.fetch_add(records, Ordering::Relaxed);
        self.conflicts_resolved.fetch_add(conflicts, Ordering::Relaxed);
    }

    pub fn inc_syncs_failed(&self) {
        self.syncs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_snapshots_collected(&self) {
        self.snapshots_collected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_ranking_snapshots(&self, count: u64) {
        self.ranking_snapshots_recorded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_known_peers(&self, count: u64) {
        self.known_peers.store(count, Ordering::Relaxed);
    }

    pub fn set_accessible_peers(&self, count: u64) {
        self.accessible_peers.store(count, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        let gauges = [
            ("uptime_seconds", "Monitor uptime in seconds", self.uptime_secs()),
            ("known_peers", "Peers in the last discovery result", self.known_peers.load(Ordering::Relaxed)),
            ("accessible_peers", "Peers currently known-accessible", self.accessible_peers.load(Ordering::Relaxed)),
        ];

        let counters = [
            ("probes_total", "Stats probes issued", &self.probes),
            ("probes_accessible_total", "Stats probes that came back accessible", &self.probes_accessible),
            ("probe_timeouts_total", "Stats probes abandoned at the deadline", &self.probe_timeouts),
            ("scans_completed_total", "Accessibility scans completed", &self.scans_completed),
            ("scans_skipped_total", "Scan triggers dropped while a scan was running", &self.scans_skipped),
            ("syncs_completed_total", "Background syncs completed", &self.syncs_completed),
            ("syncs_failed_total", "Background syncs aborted", &self.syncs_failed),
            ("records_synced_total", "Records pushed to the durable store", &self.records_synced),
            ("conflicts_resolved_total", "Duplicate identities merged", &self.conflicts_resolved),
            ("snapshots_collected_total", "Performance snapshots admitted", &self.snapshots_collected),
            ("ranking_snapshots_total", "Ranking snapshots recorded", &self.ranking_snapshots_recorded),
        ];

        for (name, help, value) in gauges {
            output.push_str(&format!(
                "# HELP pnode_monitor_{name} {help}\n\
                 # TYPE pnode_monitor_{name} gauge\n\
                 pnode_monitor_{name} {value}\n\n"
            ));
        }

        for (name, help, counter) in counters {
            output.push_str(&format!(
                "# HELP pnode_monitor_{name} {help}\n\
                 # TYPE pnode_monitor_{name} counter\n\
                 pnode_monitor_{name} {}\n\n",
                counter.load(Ordering::Relaxed)
            ));
        }

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "probes": {
                "total": self.probes.load(Ordering::Relaxed),
                "accessible": self.probes_accessible.load(Ordering::Relaxed),
                "timeouts": self.probe_timeouts.load(Ordering::Relaxed),
            },
            "scans": {
                "completed": self.scans_completed.load(Ordering::Relaxed),
                "skipped": self.scans_skipped.load(Ordering::Relaxed),
            },
            "sync": {
                "completed": self.syncs_completed.load(Ordering::Relaxed),
                "failed": self.syncs_failed.load(Ordering::Relaxed),
                "records_synced": self.records_synced.load(Ordering::Relaxed),
                "conflicts_resolved": self.conflicts_resolved.load(Ordering::Relaxed),
            },
            "snapshots_collected": self.snapshots_collected.load(Ordering::Relaxed),
            "ranking_snapshots": self.ranking_snapshots_recorded.load(Ordering::Relaxed),
            "network": {
                "known_peers": self.known_peers.load(Ordering::Relaxed),
                "accessible_peers": self.accessible_peers.load(Ordering::Relaxed),
            },
        })
    }
}
