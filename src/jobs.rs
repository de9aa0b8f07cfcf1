//! Recurring jobs run by the supervisor
//!
//! Jobs never call one another; they meet only in the shared cache, the peer
//! directory and the durable store.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::Metrics;
use crate::cache::StatsCache;
use crate::collector::PerformanceCollector;
use crate::durable::DurableStore;
use crate::history::HistoryStore;
use crate::network_health::NetworkHealthAggregator;
use crate::peers::PeerDirectory;
use crate::ranking::{self, RankingEngine};
use crate::rpc::DiscoveryClient;
use crate::scanner::AccessibilityScanner;
use crate::supervisor::PeriodicJob;
use crate::sync::BackgroundSync;
use crate::types::{current_timestamp, Timestamp};

pub const SCAN_JOB: &str = "scan";
pub const COLLECT_JOB: &str = "collect";
pub const SYNC_JOB: &str = "sync";
pub const RANKING_SNAPSHOT_JOB: &str = "ranking-snapshot";
pub const MAINTENANCE_JOB: &str = "maintenance";

// =============================================================================
// SCAN
// =============================================================================

/// Refresh the peer set from gossip, then scan it
pub struct ScanJob {
    pub discovery: DiscoveryClient,
    pub directory: Arc<PeerDirectory>,
    pub scanner: Arc<AccessibilityScanner>,
    pub cache: Arc<StatsCache>,
    pub metrics: Arc<Metrics>,
}

#[async_trait]
impl PeriodicJob for ScanJob {
    fn name(&self) -> &'static str {
        SCAN_JOB
    }

    async fn run_once(&self) {
        match self.discovery.discover().await {
            Ok(peers) => self.directory.replace(peers),
            Err(e) => warn!(
                "Discovery failed, scanning {} last known peers: {}",
                self.directory.len(),
                e
            ),
        }

        let peers = self.directory.list();
        self.metrics.set_known_peers(peers.len() as u64);

        let scanned = self
            .scanner
            .scan(&peers, |p| {
                debug!("Scan progress {}/{} ({} accessible)", p.scanned, p.total, p.accessible);
            })
            .await;

        if scanned.is_some() {
            self.metrics.set_accessible_peers(self.cache.accessible_count() as u64);
        }
    }
}

// =============================================================================
// COLLECT / SYNC
// =============================================================================

pub struct CollectJob {
    pub collector: Arc<PerformanceCollector>,
}

#[async_trait]
impl PeriodicJob for CollectJob {
    fn name(&self) -> &'static str {
        COLLECT_JOB
    }

    async fn run_once(&self) {
        if self.collector.collect().await.is_none() {
            debug!("Collector still running, cycle skipped");
        }
    }
}

pub struct SyncJob {
    pub sync: Arc<BackgroundSync>,
}

#[async_trait]
impl PeriodicJob for SyncJob {
    fn name(&self) -> &'static str {
        SYNC_JOB
    }

    async fn run_once(&self) {
        // Failures are recorded in the sync status and retried next cycle
        let _ = self.sync.trigger_now();
    }
}

// =============================================================================
// RANKING SNAPSHOTS
// =============================================================================

/// Persist the current ranking for trend queries.
///
/// Ticks often and records only when the last snapshot is at least
/// `interval_secs` old, so a fresh start with no peers yet does not wait a
/// whole interval for the first snapshot.
pub struct RankingSnapshotJob {
    engine: Arc<RankingEngine>,
    directory: Arc<PeerDirectory>,
    cache: Arc<StatsCache>,
    durable: Arc<dyn DurableStore>,
    metrics: Arc<Metrics>,
    interval_secs: u64,

    /// `None` until read back from the durable store
    last_recorded: Mutex<Option<Timestamp>>,
}

impl RankingSnapshotJob {
    pub fn new(
        engine: Arc<RankingEngine>,
        directory: Arc<PeerDirectory>,
        cache: Arc<StatsCache>,
        durable: Arc<dyn DurableStore>,
        metrics: Arc<Metrics>,
        interval_secs: u64,
    ) -> Self {
        Self {
            engine,
            directory,
            cache,
            durable,
            metrics,
            interval_secs,
            last_recorded: Mutex::new(None),
        }
    }

    fn is_due(&self, now: Timestamp) -> bool {
        let mut last = self.last_recorded.lock();
        if last.is_none() {
            match self.durable.latest_ranking_snapshot_at() {
                Ok(latest) => *last = Some(latest.unwrap_or(0)),
                Err(e) => {
                    warn!("Could not read last ranking snapshot time: {}", e);
                    return false;
                }
            }
        }
        let last = (*last).unwrap_or(0);
        last == 0 || now.saturating_sub(last) >= self.interval_secs
    }

    fn run_at(&self, now: Timestamp) {
        if !self.is_due(now) {
            return;
        }

        let peers = self.directory.list();
        if peers.is_empty() {
            debug!("No peers known yet, ranking snapshot deferred");
            return;
        }

        match ranking::record_snapshot(&self.engine, &peers, &self.cache, self.durable.as_ref(), now) {
            Ok(count) => {
                *self.last_recorded.lock() = Some(now);
                self.metrics.add_ranking_snapshots(count as u64);
                info!("🏁 Recorded ranking snapshot of {} peers", count);
            }
            Err(e) => warn!("Failed to record ranking snapshot: {}", e),
        }
    }
}

#[async_trait]
impl PeriodicJob for RankingSnapshotJob {
    fn name(&self) -> &'static str {
        RANKING_SNAPSHOT_JOB
    }

    async fn run_once(&self) {
        self.run_at(current_timestamp());
    }
}

// =============================================================================
// MAINTENANCE
// =============================================================================

/// Cache purge, history pruning and the periodic health line
pub struct MaintenanceJob {
    pub cache: Arc<StatsCache>,
    pub history: Arc<HistoryStore>,
    pub history_retention_secs: u64,
    pub directory: Arc<PeerDirectory>,
    pub health: Arc<RwLock<NetworkHealthAggregator>>,
    pub metrics: Arc<Metrics>,
}

#[async_trait]
impl PeriodicJob for MaintenanceJob {
    fn name(&self) -> &'static str {
        MAINTENANCE_JOB
    }

    async fn run_once(&self) {
        let now = current_timestamp();

        let purged = self.cache.purge_expired(now);
        let pruned = self.history.prune_at(self.history_retention_secs, now);
        if purged > 0 || pruned > 0 {
            info!("🧹 Purged {} expired cache entries, {} old snapshots", purged, pruned);
        }

        let accessible = self.cache.accessible_count();
        self.metrics.set_accessible_peers(accessible as u64);

        let peers = self.directory.list();
        let mut health = self.health.write();
        let current = health.update(&peers, &self.cache, now);
        info!(
            "📊 Status: {} peers, {} accessible, health={} ({:?})",
            current.total_peers, accessible, current.overall_score, current.status
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::RocksStore;
    use crate::ranking::scoring::VersionTiers;
    use crate::types::Peer;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;

    fn peer(address: &str) -> Peer {
        Peer {
            address: address.to_string(),
            pubkey: None,
            version: "0.8.0".to_string(),
            geo: None,
            last_seen: current_timestamp(),
        }
    }

    fn snapshot_job(directory: Arc<PeerDirectory>, durable: Arc<RocksStore>) -> RankingSnapshotJob {
        let cache = Arc::new(StatsCache::new(Duration::from_secs(300)));
        cache.set("b:1", json!({}), true);
        RankingSnapshotJob::new(
            Arc::new(RankingEngine::new(VersionTiers::parse("0.8.0").unwrap())),
            directory,
            cache,
            durable,
            Arc::new(Metrics::new()),
            3_600,
        )
    }

    #[tokio::test]
    async fn test_ranking_snapshot_job_persists_ranking() {
        let dir = tempdir().unwrap();
        let durable = Arc::new(RocksStore::open(dir.path()).unwrap());
        let directory = Arc::new(PeerDirectory::new());
        directory.replace(vec![peer("a:1"), peer("b:1")]);

        let job = snapshot_job(directory, durable.clone());
        job.run_once().await;

        let snapshots = durable.ranking_snapshots(0).unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].rank, 1);
        assert_eq!(snapshots[0].address, "b:1");
    }

    #[tokio::test]
    async fn test_ranking_snapshot_waits_for_peers_then_interval() {
        let dir = tempdir().unwrap();
        let durable = Arc::new(RocksStore::open(dir.path()).unwrap());
        let directory = Arc::new(PeerDirectory::new());
        let job = snapshot_job(directory.clone(), durable.clone());

        // Nothing discovered yet: retried on the next tick
        job.run_at(10_000);
        assert_eq!(durable.latest_ranking_snapshot_at().unwrap(), None);

        directory.replace(vec![peer("a:1"), peer("b:1")]);
        job.run_at(10_060);
        assert_eq!(durable.latest_ranking_snapshot_at().unwrap(), Some(10_060));

        job.run_at(10_060 + 3_599);
        assert_eq!(durable.latest_ranking_snapshot_at().unwrap(), Some(10_060));

        job.run_at(10_060 + 3_600);
        assert_eq!(durable.latest_ranking_snapshot_at().unwrap(), Some(13_660));
    }

    #[tokio::test]
    async fn test_ranking_snapshot_resumes_from_stored_time() {
        let dir = tempdir().unwrap();
        let durable = Arc::new(RocksStore::open(dir.path()).unwrap());
        let directory = Arc::new(PeerDirectory::new());
        directory.replace(vec![peer("a:1")]);

        snapshot_job(directory.clone(), durable.clone()).run_at(50_000);

        // A restarted job must not record again within the interval
        let restarted = snapshot_job(directory, durable.clone());
        restarted.run_at(50_600);
        assert_eq!(durable.ranking_snapshots(0).unwrap().len(), 1);
        assert_eq!(durable.latest_ranking_snapshot_at().unwrap(), Some(50_000));
    }

    #[tokio::test]
    async fn test_maintenance_job_purges_and_updates_health() {
        let cache = Arc::new(StatsCache::new(Duration::from_secs(300)));
        cache.set_at("old:1", json!({}), true, 1_000);
        let directory = Arc::new(PeerDirectory::new());
        directory.replace(vec![peer("a:1")]);
        let health = Arc::new(RwLock::new(NetworkHealthAggregator::new("0.8.0")));

        let job = MaintenanceJob {
            cache: cache.clone(),
            history: Arc::new(HistoryStore::new(300, 86_400)),
            history_retention_secs: 86_400,
            directory,
            health: health.clone(),
            metrics: Arc::new(Metrics::new()),
        };
        job.run_once().await;

        assert!(cache.is_empty());
        assert_eq!(health.read().current().unwrap().total_peers, 1);
    }
}
