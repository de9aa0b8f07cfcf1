//! RocksDB-backed durable store
//!
//! Key layout:
//!
//! ```text
//! stats:<id be64>            -> DurableRecord
//! idx:pk:<pubkey>            -> id be64
//! idx:addr:<address>         -> id be64
//! meta:next_id               -> u64 be64
//! watch:<address>            -> WatchlistEntry
//! perf:<address>#<ts be64>   -> PerformanceSnapshot
//! rank:<ts be64><rank be32>  -> RankingSnapshot
//! ```

use parking_lot::{Mutex, RwLock};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{DurableRecord, DurableStore};
use crate::error::{MonitorError, Result};
use crate::history::PerformanceSnapshot;
use crate::ranking::RankingSnapshot;
use crate::types::Timestamp;
use crate::watchlist::WatchlistEntry;

/// Key prefixes for different data types
const PREFIX_RECORD: &[u8] = b"stats:";
const PREFIX_PUBKEY_INDEX: &[u8] = b"idx:pk:";
const PREFIX_ADDRESS_INDEX: &[u8] = b"idx:addr:";
const PREFIX_WATCH: &[u8] = b"watch:";
const PREFIX_PERF: &[u8] = b"perf:";
const PREFIX_RANK: &[u8] = b"rank:";

/// Sorts directly after every `rank:` key
const RANK_RANGE_END: &[u8] = b"rank;";

/// Metadata keys
const META_NEXT_ID: &[u8] = b"meta:next_id";

/// Durable store backed by RocksDB
pub struct RocksStore {
    /// `None` once closed
    db: RwLock<Option<DB>>,

    /// Serialises read-modify-write sequences (id allocation, index moves)
    write_lock: Mutex<()>,

    path: PathBuf,
}

impl RocksStore {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(100);
        opts.set_keep_log_file_num(3);

        let db = DB::open(&opts, path)?;

        let store = Self {
            db: RwLock::new(Some(db)),
            write_lock: Mutex::new(()),
            path: path.to_path_buf(),
        };

        info!(
            "📦 Durable store opened at {:?} ({} peer records)",
            path,
            store.all_records().map(|r| r.len()).unwrap_or(0)
        );

        Ok(store)
    }

    /// Flush and release the database; later calls fail as unavailable
    pub fn close(&self) -> Result<()> {
        let mut guard = self.db.write();
        if let Some(db) = guard.take() {
            db.flush()?;
            info!("📦 Durable store at {:?} closed", self.path);
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.db.read().is_some()
    }

    /// Overwrite a row with bytes that do not decode
    #[cfg(test)]
    pub(crate) fn corrupt_record(&self, id: u64) -> Result<()> {
        self.with_db(|db| {
            db.put(record_key(id), b"\xff\xfe not a record")?;
            Ok(())
        })
    }

    fn with_db<T>(&self, f: impl FnOnce(&DB) -> Result<T>) -> Result<T> {
        let guard = self.db.read();
        let db = guard
            .as_ref()
            .ok_or_else(|| MonitorError::DurableStoreUnavailable("store is closed".to_string()))?;
        f(db)
    }
}

impl DurableStore for RocksStore {
    fn find_by_pubkey(&self, pubkey: &str) -> Result<Option<DurableRecord>> {
        self.with_db(|db| lookup_index(db, &index_key(PREFIX_PUBKEY_INDEX, pubkey)))
    }

    fn find_by_address(&self, address: &str) -> Result<Option<DurableRecord>> {
        self.with_db(|db| lookup_index(db, &index_key(PREFIX_ADDRESS_INDEX, address)))
    }

    fn insert_record(&self, mut record: DurableRecord) -> Result<DurableRecord> {
        let _lock = self.write_lock.lock();
        self.with_db(|db| {
            let id = match db.get(META_NEXT_ID)? {
                Some(bytes) => decode_id(&bytes)?,
                None => 1,
            };
            record.id = id;

            let mut batch = WriteBatch::default();
            batch.put(record_key(id), bincode::serialize(&record)?);
            batch.put(index_key(PREFIX_ADDRESS_INDEX, &record.address), id.to_be_bytes());
            if let Some(pubkey) = &record.pubkey {
                batch.put(index_key(PREFIX_PUBKEY_INDEX, pubkey), id.to_be_bytes());
            }
            batch.put(META_NEXT_ID, (id + 1).to_be_bytes());
            db.write(batch)?;

            debug!("Inserted durable record {} for {}", id, record.address);
            Ok(record)
        })
    }

    fn update_record(&self, record: &DurableRecord) -> Result<()> {
        let _lock = self.write_lock.lock();
        self.with_db(|db| {
            let old = load_record(db, record.id)?.ok_or_else(|| {
                MonitorError::CorruptRecord(format!("record {} does not exist", record.id))
            })?;

            let mut batch = WriteBatch::default();

            if old.address != record.address {
                unindex(db, &mut batch, &index_key(PREFIX_ADDRESS_INDEX, &old.address), old.id)?;
            }
            batch.put(index_key(PREFIX_ADDRESS_INDEX, &record.address), record.id.to_be_bytes());

            if let Some(old_key) = &old.pubkey {
                if record.pubkey.as_ref() != Some(old_key) {
                    unindex(db, &mut batch, &index_key(PREFIX_PUBKEY_INDEX, old_key), old.id)?;
                }
            }
            if let Some(pubkey) = &record.pubkey {
                batch.put(index_key(PREFIX_PUBKEY_INDEX, pubkey), record.id.to_be_bytes());
            }

            batch.put(record_key(record.id), bincode::serialize(record)?);
            db.write(batch)?;
            Ok(())
        })
    }

    fn delete_record(&self, id: u64) -> Result<()> {
        let _lock = self.write_lock.lock();
        self.with_db(|db| {
            let Some(old) = load_record(db, id)? else {
                return Ok(());
            };

            let mut batch = WriteBatch::default();
            batch.delete(record_key(id));
            unindex(db, &mut batch, &index_key(PREFIX_ADDRESS_INDEX, &old.address), id)?;
            if let Some(pubkey) = &old.pubkey {
                unindex(db, &mut batch, &index_key(PREFIX_PUBKEY_INDEX, pubkey), id)?;
            }
            db.write(batch)?;

            debug!("Deleted durable record {} ({})", id, old.address);
            Ok(())
        })
    }

    fn all_records(&self) -> Result<Vec<DurableRecord>> {
        self.with_db(|db| {
            let mut records = Vec::new();
            for (_, value) in scan_prefix(db, PREFIX_RECORD)? {
                match bincode::deserialize::<DurableRecord>(&value) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Skipping undecodable peer record: {}", e),
                }
            }
            Ok(records)
        })
    }

    fn watchlist(&self) -> Result<Vec<WatchlistEntry>> {
        self.with_db(|db| {
            let mut entries = Vec::new();
            for (_, value) in scan_prefix(db, PREFIX_WATCH)? {
                match bincode::deserialize::<WatchlistEntry>(&value) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("Skipping undecodable watch-list entry: {}", e),
                }
            }
            entries.sort_by_key(|e| e.added_at);
            Ok(entries)
        })
    }

    fn add_to_watchlist(&self, entry: &WatchlistEntry) -> Result<bool> {
        let _lock = self.write_lock.lock();
        self.with_db(|db| {
            let key = prefixed(PREFIX_WATCH, entry.address.as_bytes());
            if db.get(&key)?.is_some() {
                return Ok(false);
            }
            db.put(&key, bincode::serialize(entry)?)?;
            Ok(true)
        })
    }

    fn remove_from_watchlist(&self, address: &str) -> Result<bool> {
        let _lock = self.write_lock.lock();
        self.with_db(|db| {
            let key = prefixed(PREFIX_WATCH, address.as_bytes());
            if db.get(&key)?.is_none() {
                return Ok(false);
            }
            db.delete(&key)?;
            Ok(true)
        })
    }

    fn save_performance(&self, snapshot: &PerformanceSnapshot, retain_since: Timestamp) -> Result<()> {
        self.with_db(|db| {
            let prefix = perf_prefix(&snapshot.address);

            let mut batch = WriteBatch::default();
            batch.put(perf_key(&prefix, snapshot.timestamp), bincode::serialize(snapshot)?);

            // Keys sort by timestamp within the peer's prefix
            for (key, _) in scan_prefix(db, &prefix)? {
                if key_timestamp(&key) >= retain_since {
                    break;
                }
                batch.delete(key);
            }

            db.write(batch)?;
            Ok(())
        })
    }

    fn performance_history(&self, address: &str) -> Result<Vec<PerformanceSnapshot>> {
        self.with_db(|db| {
            scan_prefix(db, &perf_prefix(address))?
                .into_iter()
                .map(|(_, value)| bincode::deserialize(&value).map_err(MonitorError::from))
                .collect()
        })
    }

    fn save_ranking_snapshots(&self, snapshots: &[RankingSnapshot]) -> Result<usize> {
        self.with_db(|db| {
            let mut batch = WriteBatch::default();
            for snapshot in snapshots {
                batch.put(rank_key(snapshot.taken_at, snapshot.rank), bincode::serialize(snapshot)?);
            }
            db.write(batch)?;
            Ok(snapshots.len())
        })
    }

    fn ranking_snapshots(&self, since: Timestamp) -> Result<Vec<RankingSnapshot>> {
        self.with_db(|db| {
            let start = prefixed(PREFIX_RANK, &since.to_be_bytes());
            let mut snapshots = Vec::new();

            for item in db.iterator(IteratorMode::From(&start, Direction::Forward)) {
                let (key, value) = item?;
                if !key.starts_with(PREFIX_RANK) {
                    break;
                }
                match bincode::deserialize::<RankingSnapshot>(&value) {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(e) => warn!("Skipping undecodable ranking snapshot: {}", e),
                }
            }

            Ok(snapshots)
        })
    }

    fn latest_ranking_snapshot_at(&self) -> Result<Option<Timestamp>> {
        self.with_db(|db| {
            for item in db.iterator(IteratorMode::From(RANK_RANGE_END, Direction::Reverse)) {
                let (key, _) = item?;
                if !key.starts_with(PREFIX_RANK) {
                    break;
                }
                let ts = &key[PREFIX_RANK.len()..];
                if ts.len() >= 8 {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(&ts[..8]);
                    return Ok(Some(u64::from_be_bytes(buf)));
                }
            }
            Ok(None)
        })
    }

    fn flush(&self) -> Result<()> {
        self.with_db(|db| {
            db.flush()?;
            Ok(())
        })
    }
}

fn prefixed(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}

fn record_key(id: u64) -> Vec<u8> {
    prefixed(PREFIX_RECORD, &id.to_be_bytes())
}

fn index_key(prefix: &[u8], value: &str) -> Vec<u8> {
    prefixed(prefix, value.as_bytes())
}

fn perf_prefix(address: &str) -> Vec<u8> {
    let mut prefix = prefixed(PREFIX_PERF, address.as_bytes());
    prefix.push(b'#');
    prefix
}

fn perf_key(prefix: &[u8], timestamp: Timestamp) -> Vec<u8> {
    prefixed(prefix, &timestamp.to_be_bytes())
}

fn rank_key(taken_at: Timestamp, rank: u32) -> Vec<u8> {
    let mut key = prefixed(PREFIX_RANK, &taken_at.to_be_bytes());
    key.extend_from_slice(&rank.to_be_bytes());
    key
}

/// Trailing big-endian timestamp of a perf key
fn key_timestamp(key: &[u8]) -> Timestamp {
    if key.len() < 8 {
        return 0;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[key.len() - 8..]);
    u64::from_be_bytes(buf)
}

fn decode_id(bytes: &[u8]) -> Result<u64> {
    let buf: [u8; 8] = bytes
        .try_into()
        .map_err(|_| MonitorError::CorruptRecord(format!("invalid id of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(buf))
}

fn load_record(db: &DB, id: u64) -> Result<Option<DurableRecord>> {
    match db.get(record_key(id))? {
        Some(value) => Ok(Some(bincode::deserialize(&value)?)),
        None => Ok(None),
    }
}

/// Resolve a secondary index entry; dangling entries read as absent
fn lookup_index(db: &DB, key: &[u8]) -> Result<Option<DurableRecord>> {
    match db.get(key)? {
        Some(bytes) => load_record(db, decode_id(&bytes)?),
        None => Ok(None),
    }
}

/// Delete an index entry only if it still points at `id`
fn unindex(db: &DB, batch: &mut WriteBatch, key: &[u8], id: u64) -> Result<()> {
    if let Some(bytes) = db.get(key)? {
        if decode_id(&bytes)? == id {
            batch.delete(key);
        }
    }
    Ok(())
}

fn scan_prefix(db: &DB, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
    let mut items = Vec::new();
    for item in db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
        let (key, value) = item?;
        if !key.starts_with(prefix) {
            break;
        }
        items.push((key, value));
    }
    Ok(items)
}
