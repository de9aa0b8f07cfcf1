//! Background Sync / Reconciliation
//!
//! Pushes the live cache and the watch-list to the durable store and, on a
//! cold start, pulls durable rows back into an empty cache.
//!
//! Durable rows are matched by [`Identity`]: pubkey first, address second.
//! When one write matches two different rows (the pubkey's row and another
//! row holding the address) the address row is the stale duplicate; it is
//! deleted and the write lands on the pubkey row.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::Metrics;
use crate::cache::{CacheEntry, StatsCache};
use crate::durable::{DurableRecord, DurableStore};
use crate::error::{MonitorError, Result, RpcError};
use crate::types::{current_timestamp, Identity, ProbeOutcome, Timestamp};
use crate::watchlist::Watchlist;

/// Outcome of one push
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub records_synced: usize,
    pub conflicts_resolved: usize,
    /// Records skipped after a per-record failure
    pub failed: usize,
    pub watchlist_synced: usize,
    /// One entry per duplicate row removed while merging an identity
    pub conflicts: Vec<RpcError>,
}

/// Read-only view for operators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_sync: Option<DateTime<Utc>>,
    pub syncing: bool,
    pub last_report: Option<SyncReport>,
    pub last_error: Option<String>,
}

/// Result of a duplicate cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted: usize,
    pub remaining: usize,
}

/// How a single upsert landed
#[derive(Debug)]
enum Upsert {
    Inserted,
    Updated,
    /// Landed on the pubkey row after deleting a stale address row
    Merged(MonitorError),
}

struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BackgroundSync {
    cache: Arc<StatsCache>,
    watchlist: Arc<Watchlist>,
    durable: Arc<dyn DurableStore>,
    metrics: Arc<Metrics>,
    running: AtomicBool,
    status: RwLock<SyncStatus>,
}

impl BackgroundSync {
    pub fn new(
        cache: Arc<StatsCache>,
        watchlist: Arc<Watchlist>,
        durable: Arc<dyn DurableStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cache,
            watchlist,
            durable,
            metrics,
            running: AtomicBool::new(false),
            status: RwLock::new(SyncStatus::default()),
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status.read().clone()
    }

    /// Run one push now. `Ok(None)` when a sync is already running.
    pub fn trigger_now(&self) -> Result<Option<SyncReport>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress, trigger dropped");
            return Ok(None);
        }
        let _guard = SyncGuard(&self.running);
        self.status.write().syncing = true;

        let result = self.push_local_to_durable();

        let mut status = self.status.write();
        status.syncing = false;
        match &result {
            Ok(report) => {
                status.last_sync = Some(Utc::now());
                status.last_report = Some(report.clone());
                status.last_error = None;
                self.metrics
                    .record_sync(report.records_synced as u64, report.conflicts_resolved as u64);
                info!(
                    "🔄 Sync complete: {} records ({} merged, {} failed), {} watch-list entries",
                    report.records_synced, report.conflicts_resolved, report.failed, report.watchlist_synced
                );
            }
            Err(e) => {
                status.last_error = Some(e.to_string());
                self.metrics.inc_syncs_failed();
                warn!("Sync aborted: {}", e);
            }
        }

        result.map(Some)
    }

    /// Upsert every valid cache entry and watch-list member.
    ///
    /// Entries go oldest probe first so a newer write for the same identity
    /// lands last. A store outage aborts the push; any other per-record
    /// failure is logged and skipped.
    pub fn push_local_to_durable(&self) -> Result<SyncReport> {
        let now = current_timestamp();
        let watched: HashSet<String> = self
            .watchlist
            .list()
            .into_iter()
            .map(|e| e.address)
            .collect();

        let mut report = SyncReport::default();

        for entry in self.cache.valid_entries_at(now) {
            let incoming = to_record(&entry, watched.contains(&entry.address), now);

            match self.upsert(incoming) {
                Ok(Upsert::Merged(conflict)) => {
                    report.records_synced += 1;
                    report.conflicts_resolved += 1;
                    report.conflicts.push(RpcError::from(&conflict));
                }
                Ok(Upsert::Inserted | Upsert::Updated) => report.records_synced += 1,
                Err(e) if e.is_store_unavailable() => return Err(e),
                Err(e) => {
                    warn!("Failed to sync {}: {}", entry.address, e);
                    report.failed += 1;
                }
            }
        }

        for entry in self.watchlist.list() {
            match self.durable.add_to_watchlist(&entry) {
                Ok(_) => report.watchlist_synced += 1,
                Err(e) if e.is_store_unavailable() => return Err(e),
                Err(e) => warn!("Failed to sync watch-list entry {}: {}", entry.address, e),
            }
        }

        Ok(report)
    }

    /// Restore durable rows into an empty cache; `Ok(None)` when the cache
    /// already holds live entries and nothing was touched.
    ///
    /// Restored entries are stamped with the restore time, so they live for
    /// one TTL before the first scan replaces them.
    pub fn pull_durable_to_local(&self) -> Result<Option<usize>> {
        let now = current_timestamp();
        if self.cache.has_live_entries_at(now) {
            info!("Cache already has live data, skipping durable restore");
            return Ok(None);
        }

        let records = self.durable.all_records()?;
        for record in &records {
            let outcome = ProbeOutcome {
                accessible: record.accessible,
                stats: record.stats(),
                probed_at: now,
                failure: None,
            };
            self.cache.store(&record.address, record.pubkey.clone(), outcome);
        }

        if self.watchlist.is_empty() {
            let entries = self.durable.watchlist()?;
            info!("Restored {} watch-list entries", entries.len());
            self.watchlist.replace(entries);
        }

        info!("📥 Restored {} peers from the durable store", records.len());
        Ok(Some(records.len()))
    }

    /// Delete durable rows that repeat an identity, keeping the newest
    pub fn cleanup_duplicates(&self) -> Result<CleanupReport> {
        let mut records = self.durable.all_records()?;
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

        let mut seen: HashSet<Identity> = HashSet::new();
        let mut report = CleanupReport::default();

        for record in records {
            if seen.insert(record.identity()) {
                report.remaining += 1;
            } else {
                debug!("Deleting duplicate row {} ({})", record.id, record.address);
                self.durable.delete_record(record.id)?;
                report.deleted += 1;
            }
        }

        info!(
            "🧹 Duplicate cleanup: {} deleted, {} remaining",
            report.deleted, report.remaining
        );
        Ok(report)
    }

    fn upsert(&self, incoming: DurableRecord) -> Result<Upsert> {
        let by_pubkey = match incoming.identity() {
            Identity::ByPubkey(key) => self.durable.find_by_pubkey(&key)?,
            Identity::ByAddress(_) => None,
        };
        let by_address = self.durable.find_by_address(&incoming.address)?;

        match (by_pubkey, by_address) {
            (Some(keyed), Some(stale)) if keyed.id != stale.id => {
                let conflict = MonitorError::DuplicateIdentityConflict {
                    pubkey: keyed.pubkey.clone().unwrap_or_default(),
                    kept: keyed.id,
                    removed: stale.id,
                };
                info!("🔀 {}", conflict);

                // Free the address before the kept row takes it
                self.durable.delete_record(stale.id)?;
                self.durable.update_record(&merge(keyed, incoming))?;
                Ok(Upsert::Merged(conflict))
            }
            (Some(existing), _) | (None, Some(existing)) => {
                self.durable.update_record(&merge(existing, incoming))?;
                Ok(Upsert::Updated)
            }
            (None, None) => {
                self.durable.insert_record(incoming)?;
                Ok(Upsert::Inserted)
            }
        }
    }
}

fn to_record(entry: &CacheEntry, watched: bool, now: Timestamp) -> DurableRecord {
    DurableRecord {
        id: 0,
        address: entry.address.clone(),
        pubkey: entry.pubkey.clone().filter(|k| !k.is_empty()),
        stats_json: entry.outcome.stats.as_ref().map(|s| s.to_string()),
        accessible: entry.outcome.accessible,
        last_scanned: entry.outcome.probed_at,
        watched,
        updated_at: now,
    }
}

/// Fold an incoming write into an existing row; the incoming side wins
/// except for a pubkey it does not know
fn merge(existing: DurableRecord, incoming: DurableRecord) -> DurableRecord {
    DurableRecord {
        id: existing.id,
        address: incoming.address,
        pubkey: incoming.pubkey.or(existing.pubkey),
        stats_json: incoming.stats_json,
        accessible: incoming.accessible,
        last_scanned: incoming.last_scanned,
        watched: incoming.watched,
        updated_at: incoming.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::RocksStore;
    use crate::error::codes;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        cache: Arc<StatsCache>,
        watchlist: Arc<Watchlist>,
        durable: Arc<RocksStore>,
        sync: BackgroundSync,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let durable = Arc::new(RocksStore::open(dir.path()).unwrap());
        let cache = Arc::new(StatsCache::new(Duration::from_secs(300)));
        let watchlist = Arc::new(Watchlist::new());
        let sync = BackgroundSync::new(
            cache.clone(),
            watchlist.clone(),
            durable.clone(),
            Arc::new(Metrics::new()),
        );
        Fixture {
            _dir: dir,
            cache,
            watchlist,
            durable,
            sync,
        }
    }

    fn scan_result(cache: &StatsCache, address: &str, pubkey: Option<&str>, at: Timestamp) {
        cache.store(
            address,
            pubkey.map(str::to_string),
            ProbeOutcome::accessible(json!({ "uptime": at }), at),
        );
    }

    fn row(address: &str, pubkey: Option<&str>, updated_at: Timestamp) -> DurableRecord {
        DurableRecord {
            id: 0,
            address: address.to_string(),
            pubkey: pubkey.map(str::to_string),
            stats_json: None,
            accessible: false,
            last_scanned: updated_at,
            watched: false,
            updated_at,
        }
    }

    fn mapping(cache: &StatsCache) -> HashMap<String, (bool, Option<serde_json::Value>)> {
        cache
            .valid_entries()
            .into_iter()
            .map(|e| (e.address.clone(), (e.accessible(), e.outcome.stats.clone())))
            .collect()
    }

    #[test]
    fn test_push_then_pull_round_trip() {
        let f = fixture();
        let now = current_timestamp();
        scan_result(&f.cache, "1.1.1.1:9001", Some("abc"), now);
        scan_result(&f.cache, "2.2.2.2:9001", None, now);
        f.cache.store("3.3.3.3:9001", None, ProbeOutcome::inaccessible(None, now));
        f.watchlist.add("2.2.2.2:9001", None);

        let report = f.sync.trigger_now().unwrap().unwrap();
        assert_eq!(report.records_synced, 3);
        assert_eq!(report.watchlist_synced, 1);

        let before = mapping(&f.cache);

        let fresh = Arc::new(StatsCache::new(Duration::from_secs(300)));
        let fresh_watchlist = Arc::new(Watchlist::new());
        let restore = BackgroundSync::new(
            fresh.clone(),
            fresh_watchlist.clone(),
            f.durable.clone(),
            Arc::new(Metrics::new()),
        );
        assert_eq!(restore.pull_durable_to_local().unwrap(), Some(3));

        assert_eq!(mapping(&fresh), before);
        assert_eq!(fresh.get("1.1.1.1:9001").unwrap().pubkey.as_deref(), Some("abc"));
        assert!(fresh_watchlist.contains("2.2.2.2:9001"));
    }

    #[test]
    fn test_moved_peer_keeps_single_record() {
        let f = fixture();
        let now = current_timestamp();

        scan_result(&f.cache, "1.1.1.1:9001", Some("abc"), now - 10);
        f.sync.trigger_now().unwrap();

        scan_result(&f.cache, "1.1.1.2:9001", Some("abc"), now);
        f.sync.trigger_now().unwrap();

        let records = f.durable.all_records().unwrap();
        let abc: Vec<_> = records.iter().filter(|r| r.pubkey.as_deref() == Some("abc")).collect();
        assert_eq!(abc.len(), 1);
        assert_eq!(abc[0].address, "1.1.1.2:9001");
    }

    #[test]
    fn test_dual_match_deletes_stale_row() {
        let f = fixture();
        let keyed = f.durable.insert_record(row("1.1.1.1:9001", Some("abc"), 10)).unwrap();
        let stale = f.durable.insert_record(row("1.1.1.2:9001", None, 20)).unwrap();

        scan_result(&f.cache, "1.1.1.2:9001", Some("abc"), current_timestamp());
        let report = f.sync.trigger_now().unwrap().unwrap();

        assert_eq!(report.conflicts_resolved, 1);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].code, codes::DUPLICATE_IDENTITY);
        assert!(report.conflicts[0].message.contains("abc"));
        assert_eq!(f.sync.status().last_report, Some(report));

        let records = f.durable.all_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, keyed.id);
        assert_ne!(records[0].id, stale.id);
        assert_eq!(records[0].address, "1.1.1.2:9001");
        assert!(records[0].accessible);
    }

    #[test]
    fn test_undecodable_row_fails_only_that_record() {
        let f = fixture();
        let broken = f.durable.insert_record(row("b:1", None, 10)).unwrap();
        f.durable.corrupt_record(broken.id).unwrap();

        let now = current_timestamp();
        scan_result(&f.cache, "a:1", None, now);
        scan_result(&f.cache, "b:1", None, now);
        scan_result(&f.cache, "c:1", None, now);

        let report = f.sync.trigger_now().unwrap().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.records_synced, 2);
        assert!(f.sync.status().last_error.is_none());

        assert!(f.durable.find_by_address("a:1").unwrap().is_some());
        assert!(f.durable.find_by_address("c:1").unwrap().is_some());
        assert!(f.durable.find_by_address("b:1").is_err());
    }

    #[test]
    fn test_address_match_adopts_pubkey() {
        let f = fixture();
        f.durable.insert_record(row("1.1.1.1:9001", None, 10)).unwrap();

        scan_result(&f.cache, "1.1.1.1:9001", Some("abc"), current_timestamp());
        f.sync.trigger_now().unwrap();

        let records = f.durable.all_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pubkey.as_deref(), Some("abc"));
    }

    #[test]
    fn test_store_outage_fails_push_without_panic() {
        let f = fixture();
        scan_result(&f.cache, "1.1.1.1:9001", None, current_timestamp());
        f.durable.close().unwrap();

        let err = f.sync.trigger_now().unwrap_err();
        assert!(err.is_store_unavailable());

        let status = f.sync.status();
        assert!(!status.syncing);
        assert!(status.last_sync.is_none());
        assert!(status.last_error.is_some());

        // The cache is untouched and the next trigger runs again
        assert!(f.cache.is_accessible("1.1.1.1:9001"));
        assert!(f.sync.trigger_now().is_err());
    }

    #[test]
    fn test_pull_skips_live_cache() {
        let f = fixture();
        f.durable.insert_record(row("9.9.9.9:9001", None, 10)).unwrap();
        scan_result(&f.cache, "1.1.1.1:9001", None, current_timestamp());

        assert_eq!(f.sync.pull_durable_to_local().unwrap(), None);
        assert!(f.cache.get("9.9.9.9:9001").is_none());
    }

    #[test]
    fn test_cleanup_duplicates_keeps_newest() {
        let f = fixture();
        f.durable.insert_record(row("1.1.1.1:9001", Some("abc"), 10)).unwrap();
        let newest = f.durable.insert_record(row("1.1.1.2:9001", Some("abc"), 30)).unwrap();
        f.durable.insert_record(row("2.2.2.2:9001", None, 10)).unwrap();
        f.durable.insert_record(row("2.2.2.2:9001", None, 20)).unwrap();
        f.durable.insert_record(row("3.3.3.3:9001", None, 5)).unwrap();

        let report = f.sync.cleanup_duplicates().unwrap();
        assert_eq!(report, CleanupReport { deleted: 2, remaining: 3 });

        let records = f.durable.all_records().unwrap();
        assert!(records.iter().any(|r| r.id == newest.id));
        assert_eq!(records.iter().filter(|r| r.address == "2.2.2.2:9001").count(), 1);
    }
}
