//! Performance Collector
//!
//! Re-probes every currently accessible peer, one at a time with a short
//! pause between requests, and turns each stats payload into a history
//! snapshot. Admitted snapshots are mirrored to the durable store; a durable
//! failure is logged and never stops collection.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::Metrics;
use crate::cache::StatsCache;
use crate::durable::DurableStore;
use crate::history::{HistoryStore, PerformanceSample};
use crate::rpc::StatsProbe;
use crate::types::{current_timestamp, Timestamp};

/// Progress of the current or last collection run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionProgress {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub is_collecting: bool,
    pub last_collection_time: Option<Timestamp>,
}

struct CollectGuard<'a>(&'a AtomicBool);

impl Drop for CollectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PerformanceCollector {
    probe: Arc<dyn StatsProbe>,
    cache: Arc<StatsCache>,
    history: Arc<HistoryStore>,
    durable: Arc<dyn DurableStore>,
    metrics: Arc<Metrics>,
    timeout: Duration,
    request_delay: Duration,
    durable_retention_secs: u64,
    running: AtomicBool,
    progress: RwLock<CollectionProgress>,
}

impl PerformanceCollector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        probe: Arc<dyn StatsProbe>,
        cache: Arc<StatsCache>,
        history: Arc<HistoryStore>,
        durable: Arc<dyn DurableStore>,
        metrics: Arc<Metrics>,
        timeout: Duration,
        request_delay: Duration,
        durable_retention_secs: u64,
    ) -> Self {
        Self {
            probe,
            cache,
            history,
            durable,
            metrics,
            timeout,
            request_delay,
            durable_retention_secs,
            running: AtomicBool::new(false),
            progress: RwLock::new(CollectionProgress::default()),
        }
    }

    pub fn progress(&self) -> CollectionProgress {
        *self.progress.read()
    }

    /// One collection pass; `None` when a pass is already running
    pub async fn collect(&self) -> Option<CollectionProgress> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Collection already running, trigger dropped");
            return None;
        }
        let _guard = CollectGuard(&self.running);

        let targets = self.cache.list_accessible();
        let mut progress = CollectionProgress {
            total: targets.len(),
            is_collecting: true,
            last_collection_time: self.progress.read().last_collection_time,
            ..Default::default()
        };
        *self.progress.write() = progress;

        if targets.is_empty() {
            debug!("No accessible peers to collect from");
        }

        for (i, address) in targets.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            if self.collect_one(address).await {
                progress.successful += 1;
            } else {
                progress.failed += 1;
            }
            progress.completed += 1;
            *self.progress.write() = progress;
        }

        progress.is_collecting = false;
        progress.last_collection_time = Some(current_timestamp());
        *self.progress.write() = progress;

        info!(
            "📈 Collection complete: {} ok, {} failed of {} peers",
            progress.successful, progress.failed, progress.total
        );

        Some(progress)
    }

    /// Probe, refresh the cache and append a snapshot; true on a usable payload
    async fn collect_one(&self, address: &str) -> bool {
        let outcome = self.probe.probe(address, self.timeout).await;
        self.metrics.record_probe(&outcome);

        let stats = outcome.node_stats();
        self.cache.store(address, None, outcome);

        let Some(stats) = stats else {
            debug!("No usable stats from {}", address);
            return false;
        };

        let now = current_timestamp();
        if let Some(snapshot) = self.history.append_at(address, PerformanceSample::from(&stats), now) {
            self.metrics.inc_snapshots_collected();

            let retain_since = now.saturating_sub(self.durable_retention_secs);
            if let Err(e) = self.durable.save_performance(&snapshot, retain_since) {
                warn!("Failed to persist snapshot of {}: {}", address, e);
            }
        }

        true
    }
}
