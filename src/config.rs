//! Monitor Configuration
//!
//! Every timing and sizing constant of the scanner, cache, collector, sync
//! and ranking engine lives here so deployments can tune them from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for the monitor service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    // === Discovery ===

    /// JSON-RPC endpoint answering `get-pods`
    pub gossip_endpoint: String,

    /// Timeout of the discovery call (milliseconds)
    pub discovery_timeout_ms: u64,

    // === Probing ===

    /// Private stats port, identical on every peer
    pub stats_port: u16,

    /// Hard deadline of a single probe (milliseconds)
    pub probe_timeout_ms: u64,

    /// Peers probed concurrently per batch
    pub scan_batch_size: usize,

    /// Interval between accessibility scans (seconds)
    pub scan_interval_secs: u64,

    // === Stats cache ===

    /// Validity window of positive and negative results (seconds)
    pub cache_ttl_secs: u64,

    // === Performance history ===

    /// Interval between collector runs (seconds)
    pub collector_interval_secs: u64,

    /// Pause between two collector requests (milliseconds)
    pub collector_request_delay_ms: u64,

    /// Minimum age of the last snapshot before a new one is admitted (seconds)
    pub history_sample_interval_secs: u64,

    /// In-memory retention window (seconds)
    pub history_retention_secs: u64,

    /// Durable retention window (seconds)
    pub durable_history_retention_secs: u64,

    // === Background sync ===

    /// Interval between syncs (seconds)
    pub sync_interval_secs: u64,

    /// Delay of the first sync after start (seconds)
    pub sync_initial_delay_secs: u64,

    // === Ranking ===

    /// Reference version that earns the top version score
    pub latest_version: String,

    /// Interval between persisted ranking snapshots (seconds)
    pub ranking_snapshot_interval_secs: u64,

    // === Maintenance ===

    /// Interval for cache purge and status logging (seconds)
    pub maintenance_interval_secs: u64,

    // === API ===

    /// Port for HTTP API
    pub api_port: u16,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            // Discovery
            gossip_endpoint: "http://192.190.136.36:6000/rpc".to_string(),
            discovery_timeout_ms: 10_000,

            // Probing
            stats_port: 6000,
            probe_timeout_ms: 10_000,
            scan_batch_size: 3,
            scan_interval_secs: 30 * 60,

            // Cache
            cache_ttl_secs: 5 * 60,

            // Performance history
            collector_interval_secs: 5 * 60,
            collector_request_delay_ms: 500,
            history_sample_interval_secs: 5 * 60,
            history_retention_secs: 24 * 60 * 60,
            durable_history_retention_secs: 7 * 24 * 60 * 60,

            // Sync
            sync_interval_secs: 60,
            sync_initial_delay_secs: 10,

            // Ranking
            latest_version: "0.8.0".to_string(),
            ranking_snapshot_interval_secs: 24 * 60 * 60,

            // Maintenance
            maintenance_interval_secs: 60,

            // API
            api_port: 8080,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = port;
        self
    }

    pub fn with_gossip_endpoint(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint {
            self.gossip_endpoint = endpoint;
        }
        self
    }

    pub fn with_latest_version(mut self, version: Option<String>) -> Self {
        if let Some(version) = version {
            self.latest_version = version;
        }
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scan_batch_size == 0 {
            anyhow::bail!("scan_batch_size must be at least 1");
        }

        if self.cache_ttl_secs == 0 {
            anyhow::bail!("cache_ttl_secs must be greater than zero");
        }

        if self.probe_timeout_ms >= self.scan_interval_secs.saturating_mul(1000) {
            anyhow::bail!(
                "probe_timeout_ms ({}) must be shorter than scan_interval_secs ({})",
                self.probe_timeout_ms,
                self.scan_interval_secs
            );
        }

        let periods = [
            ("collector_interval_secs", self.collector_interval_secs),
            ("sync_interval_secs", self.sync_interval_secs),
            ("ranking_snapshot_interval_secs", self.ranking_snapshot_interval_secs),
            ("maintenance_interval_secs", self.maintenance_interval_secs),
        ];
        for (name, secs) in periods {
            if secs == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if self.history_sample_interval_secs > self.history_retention_secs {
            anyhow::bail!(
                "history_sample_interval_secs ({}) must not exceed history_retention_secs ({})",
                self.history_sample_interval_secs,
                self.history_retention_secs
            );
        }

        if crate::ranking::scoring::VersionTiers::parse(&self.latest_version).is_none() {
            anyhow::bail!(
                "latest_version ({}) must start with numeric major.minor components",
                self.latest_version
            );
        }

        Ok(())
    }
}
