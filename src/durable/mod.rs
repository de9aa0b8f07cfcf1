//! Durable Store
//!
//! Persisted mirror of the stats cache plus the watch-list, the performance
//! history and the ranking snapshots. Accessed through select / upsert /
//! delete by key only; identity reconciliation lives in [`crate::sync`].

mod rocks;

pub use rocks::RocksStore;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::history::PerformanceSnapshot;
use crate::ranking::RankingSnapshot;
use crate::types::{Identity, Timestamp};
use crate::watchlist::WatchlistEntry;

/// Durable row of the peer stats table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableRecord {
    /// Row id, assigned on insert
    pub id: u64,

    pub address: String,

    pub pubkey: Option<String>,

    /// Stats payload as JSON text
    pub stats_json: Option<String>,

    pub accessible: bool,

    pub last_scanned: Timestamp,

    pub watched: bool,

    pub updated_at: Timestamp,
}

impl DurableRecord {
    pub fn identity(&self) -> Identity {
        Identity::resolve(self.pubkey.as_deref(), &self.address)
    }

    /// Decoded stats payload
    pub fn stats(&self) -> Option<serde_json::Value> {
        self.stats_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
    }
}

/// Storage backend of the monitor
pub trait DurableStore: Send + Sync {
    // === Peer stats ===

    fn find_by_pubkey(&self, pubkey: &str) -> Result<Option<DurableRecord>>;

    fn find_by_address(&self, address: &str) -> Result<Option<DurableRecord>>;

    /// Insert a new row; the id of `record` is ignored and assigned
    fn insert_record(&self, record: DurableRecord) -> Result<DurableRecord>;

    /// Overwrite the row with `record.id`
    fn update_record(&self, record: &DurableRecord) -> Result<()>;

    fn delete_record(&self, id: u64) -> Result<()>;

    fn all_records(&self) -> Result<Vec<DurableRecord>>;

    // === Watch-list ===

    fn watchlist(&self) -> Result<Vec<WatchlistEntry>>;

    /// Returns false if the address was already present
    fn add_to_watchlist(&self, entry: &WatchlistEntry) -> Result<bool>;

    fn remove_from_watchlist(&self, address: &str) -> Result<bool>;

    // === Performance history ===

    /// Store a snapshot and drop the peer's snapshots older than `retain_since`
    fn save_performance(&self, snapshot: &PerformanceSnapshot, retain_since: Timestamp) -> Result<()>;

    /// Chronological snapshots of a peer
    fn performance_history(&self, address: &str) -> Result<Vec<PerformanceSnapshot>>;

    // === Ranking snapshots ===

    fn save_ranking_snapshots(&self, snapshots: &[RankingSnapshot]) -> Result<usize>;

    /// Snapshots taken at or after `since`, oldest first
    fn ranking_snapshots(&self, since: Timestamp) -> Result<Vec<RankingSnapshot>>;

    /// Time of the most recent ranking snapshot, if any
    fn latest_ranking_snapshot_at(&self) -> Result<Option<Timestamp>>;

    fn flush(&self) -> Result<()>;
}
