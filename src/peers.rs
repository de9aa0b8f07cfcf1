//! Last known peer set, refreshed from gossip before every scan

use parking_lot::RwLock;

use crate::types::{current_timestamp, Peer, Timestamp};

#[derive(Default)]
pub struct PeerDirectory {
    peers: RwLock<Vec<Peer>>,
    refreshed_at: RwLock<Option<Timestamp>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set with a fresh discovery result
    pub fn replace(&self, peers: Vec<Peer>) {
        *self.peers.write() = peers;
        *self.refreshed_at.write() = Some(current_timestamp());
    }

    /// Snapshot of the peer set in gossip order
    pub fn list(&self) -> Vec<Peer> {
        self.peers.read().clone()
    }

    pub fn find(&self, address: &str) -> Option<Peer> {
        self.peers.read().iter().find(|p| p.address == address).cloned()
    }

    pub fn pubkey_of(&self, address: &str) -> Option<String> {
        self.peers
            .read()
            .iter()
            .find(|p| p.address == address)
            .and_then(|p| p.pubkey.clone())
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    pub fn refreshed_at(&self) -> Option<Timestamp> {
        *self.refreshed_at.read()
    }
}
