//! Stats Cache
//!
//! Per-peer, time-boxed store of the last probe result. An entry stays valid
//! through `probed_at + ttl` inclusive; a read after that is a miss even if it still physically exists; physical removal
//! only happens in [`StatsCache::purge_expired`].
//!
//! Writers (the scanner, the collector and on-demand probes) all overwrite
//! unconditionally, so concurrent writes resolve as last-write-wins.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::types::{current_timestamp, ProbeOutcome, Timestamp};

/// Cached probe result of one peer
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub address: String,

    /// Identity known when the entry was written
    pub pubkey: Option<String>,

    pub outcome: ProbeOutcome,

    /// `probed_at + ttl`
    pub expires_at: Timestamp,
}

impl CacheEntry {
    /// Valid up to and including `expires_at`
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        now <= self.expires_at
    }

    pub fn accessible(&self) -> bool {
        self.outcome.accessible
    }
}

/// In-memory stats cache shared by every component
pub struct StatsCache {
    ttl_secs: u64,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl StatsCache {
    /// Create an empty cache; the same TTL applies to positive and negative entries
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl_secs: ttl.as_secs().max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Get a valid entry, `None` if absent or expired
    pub fn get(&self, address: &str) -> Option<CacheEntry> {
        self.get_at(address, current_timestamp())
    }

    pub fn get_at(&self, address: &str, now: Timestamp) -> Option<CacheEntry> {
        self.entries
            .read()
            .get(address)
            .filter(|e| e.is_valid_at(now))
            .cloned()
    }

    /// Whether the peer is currently known-accessible
    pub fn is_accessible(&self, address: &str) -> bool {
        self.get(address).map(|e| e.accessible()).unwrap_or(false)
    }

    /// Record a result with a payload
    pub fn set(&self, address: &str, payload: serde_json::Value, accessible: bool) {
        self.set_at(address, payload, accessible, current_timestamp());
    }

    pub fn set_at(&self, address: &str, payload: serde_json::Value, accessible: bool, now: Timestamp) {
        let outcome = ProbeOutcome {
            accessible,
            stats: Some(payload),
            probed_at: now,
            failure: None,
        };
        self.store(address, None, outcome);
    }

    /// Record a negative result without a payload
    pub fn set_inaccessible(&self, address: &str) {
        self.set_inaccessible_at(address, current_timestamp());
    }

    pub fn set_inaccessible_at(&self, address: &str, now: Timestamp) {
        self.store(address, None, ProbeOutcome::inaccessible(None, now));
    }

    /// Write a probe outcome; the expiry is derived from `probed_at`.
    /// A missing pubkey keeps the one already known for this address.
    pub fn store(&self, address: &str, pubkey: Option<String>, outcome: ProbeOutcome) {
        let expires_at = outcome.probed_at.saturating_add(self.ttl_secs);
        let mut entries = self.entries.write();

        let pubkey = pubkey.or_else(|| entries.get(address).and_then(|e| e.pubkey.clone()));

        entries.insert(
            address.to_string(),
            CacheEntry {
                address: address.to_string(),
                pubkey,
                outcome,
                expires_at,
            },
        );
    }

    /// Drop one entry
    pub fn invalidate(&self, address: &str) {
        self.entries.write().remove(address);
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        self.entries.write().clear();
    }

    /// Addresses of peers that are accessible according to a valid entry
    pub fn list_accessible(&self) -> Vec<String> {
        self.list_accessible_at(current_timestamp())
    }

    pub fn list_accessible_at(&self, now: Timestamp) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .entries
            .read()
            .values()
            .filter(|e| e.is_valid_at(now) && e.accessible())
            .map(|e| e.address.clone())
            .collect();
        addresses.sort();
        addresses
    }

    /// All valid entries, oldest probe first
    pub fn valid_entries_at(&self, now: Timestamp) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| e.is_valid_at(now))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            a.outcome
                .probed_at
                .cmp(&b.outcome.probed_at)
                .then_with(|| a.address.cmp(&b.address))
        });
        entries
    }

    pub fn valid_entries(&self) -> Vec<CacheEntry> {
        self.valid_entries_at(current_timestamp())
    }

    /// Whether any entry is still valid
    pub fn has_live_entries_at(&self, now: Timestamp) -> bool {
        self.entries.read().values().any(|e| e.is_valid_at(now))
    }

    pub fn accessible_count(&self) -> usize {
        self.list_accessible().len()
    }

    /// Physical entry count, expired entries included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Physically remove expired entries
    pub fn purge_expired(&self, now: Timestamp) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.is_valid_at(now));
        let removed = before - entries.len();

        if removed > 0 {
            debug!("Purged {} expired cache entries", removed);
        }

        removed
    }
}
