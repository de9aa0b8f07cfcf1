//! Operator watch-list of peers

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{current_timestamp, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub address: String,
    pub pubkey: Option<String>,
    pub added_at: Timestamp,
}

#[derive(Default)]
pub struct Watchlist {
    entries: RwLock<Vec<WatchlistEntry>>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer; returns false if it was already watched
    pub fn add(&self, address: &str, pubkey: Option<String>) -> bool {
        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.address == address) {
            return false;
        }
        entries.push(WatchlistEntry {
            address: address.to_string(),
            pubkey,
            added_at: current_timestamp(),
        });
        true
    }

    /// Remove a peer; returns false if it was not watched
    pub fn remove(&self, address: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.address != address);
        entries.len() != before
    }

    /// Flip membership; returns the new state
    pub fn toggle(&self, address: &str) -> bool {
        if self.remove(address) {
            false
        } else {
            self.add(address, None)
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.read().iter().any(|e| e.address == address)
    }

    pub fn list(&self) -> Vec<WatchlistEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Replace the whole list (cold-start restore)
    pub fn replace(&self, entries: Vec<WatchlistEntry>) {
        *self.entries.write() = entries;
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
