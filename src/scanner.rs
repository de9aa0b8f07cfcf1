//! Accessibility Scanner
//!
//! Probes the whole peer set in fixed-size batches. Members of a batch run
//! concurrently; the next batch starts only once every member of the current
//! one has resolved, so at most `batch_size` probes are ever in flight.
//!
//! Every outcome is written to the [`StatsCache`] as soon as its probe
//! resolves, followed by a progress callback. A failing peer only degrades its
//! own cache entry.

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::api::Metrics;
use crate::cache::StatsCache;
use crate::rpc::StatsProbe;
use crate::types::{Peer, ProbeOutcome, ScanProgress};

/// Resets the running flag when a scan ends, however it ends
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AccessibilityScanner {
    probe: Arc<dyn StatsProbe>,
    cache: Arc<StatsCache>,
    metrics: Arc<Metrics>,
    batch_size: usize,
    timeout: Duration,
    running: AtomicBool,
    progress: RwLock<ScanProgress>,
}

impl AccessibilityScanner {
    pub fn new(
        probe: Arc<dyn StatsProbe>,
        cache: Arc<StatsCache>,
        metrics: Arc<Metrics>,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            probe,
            cache,
            metrics,
            batch_size: batch_size.max(1),
            timeout,
            running: AtomicBool::new(false),
            progress: RwLock::new(ScanProgress::default()),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Latest progress, of the running scan or of the last finished one
    pub fn progress(&self) -> ScanProgress {
        *self.progress.read()
    }

    /// Scan with the configured batch size and timeout
    pub async fn scan<F>(&self, peers: &[Peer], on_progress: F) -> Option<ScanProgress>
    where
        F: FnMut(ScanProgress) + Send,
    {
        self.scan_with(peers, self.batch_size, self.timeout, on_progress).await
    }

    /// Probe every peer; returns the final progress, or `None` when another
    /// scan is already running (the trigger is dropped, not queued)
    pub async fn scan_with<F>(
        &self,
        peers: &[Peer],
        batch_size: usize,
        timeout: Duration,
        mut on_progress: F,
    ) -> Option<ScanProgress>
    where
        F: FnMut(ScanProgress) + Send,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Scan already running, trigger dropped");
            self.metrics.inc_scans_skipped();
            return None;
        }
        let _guard = ScanGuard(&self.running);

        let mut progress = ScanProgress {
            total: peers.len(),
            scanned: 0,
            accessible: 0,
            is_scanning: true,
        };
        self.publish(progress, &mut on_progress);

        info!(
            "🔍 Scanning {} peers in batches of {}",
            peers.len(),
            batch_size.max(1)
        );

        for batch in peers.chunks(batch_size.max(1)) {
            let mut pending: FuturesUnordered<_> = batch
                .iter()
                .map(|peer| async move { (peer, self.probe.probe(&peer.address, timeout).await) })
                .collect();

            while let Some((peer, outcome)) = pending.next().await {
                let accessible = outcome.accessible;
                self.record(peer, outcome);

                progress.scanned += 1;
                if accessible {
                    progress.accessible += 1;
                }
                self.publish(progress, &mut on_progress);
            }
        }

        progress.is_scanning = false;
        self.publish(progress, &mut on_progress);
        self.metrics.inc_scans_completed();

        info!(
            "✅ Scan complete: {}/{} peers accessible",
            progress.accessible, progress.total
        );

        Some(progress)
    }

    /// On-demand probe of one peer; the outcome overwrites its cache entry
    pub async fn probe_one(&self, address: &str, pubkey: Option<String>) -> ProbeOutcome {
        let outcome = self.probe.probe(address, self.timeout).await;
        self.metrics.record_probe(&outcome);
        self.cache.store(address, pubkey, outcome.clone());
        outcome
    }

    fn record(&self, peer: &Peer, outcome: ProbeOutcome) {
        self.metrics.record_probe(&outcome);
        self.cache.store(&peer.address, peer.pubkey.clone(), outcome);
    }

    fn publish<F: FnMut(ScanProgress)>(&self, progress: ScanProgress, on_progress: &mut F) {
        *self.progress.write() = progress;
        on_progress(progress);
    }
}
