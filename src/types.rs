//! Core types shared by the scanner, cache, history, sync and ranking engine
//!
//! Peers come from the gossip discovery call, probe outcomes from the stats
//! port of each peer. All timestamps are Unix epoch seconds.

use serde::{Deserialize, Serialize};

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Country bucket used when a peer carries no geographic annotation
pub const UNKNOWN_COUNTRY: &str = "Unknown";

// =============================================================================
// PEERS
// =============================================================================

/// Geographic annotation (supplied by an external resolver)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    /// Country code or name
    pub country: String,

    #[serde(default)]
    pub city: Option<String>,

    #[serde(default)]
    pub flag: Option<String>,
}

/// A participant of the storage network as reported by gossip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    /// Gossip address (`host:port`), mutable over time
    pub address: String,

    /// Stable cryptographic identity, authoritative when present
    #[serde(default)]
    pub pubkey: Option<String>,

    /// Software version string
    pub version: String,

    /// Geographic annotation
    #[serde(default)]
    pub geo: Option<GeoInfo>,

    /// Last time the peer was seen by gossip
    pub last_seen: Timestamp,
}

impl Peer {
    /// Host part of the gossip address
    pub fn host(&self) -> &str {
        host_of(&self.address)
    }

    /// Country bucket for diversity scoring
    pub fn country(&self) -> &str {
        self.geo
            .as_ref()
            .map(|g| g.country.as_str())
            .filter(|c| !c.is_empty())
            .unwrap_or(UNKNOWN_COUNTRY)
    }

    /// Identity of this peer, resolved pubkey-first
    pub fn identity(&self) -> Identity {
        Identity::resolve(self.pubkey.as_deref(), &self.address)
    }
}

/// Extract the host from a `host:port` address (IPv6 brackets stripped)
pub fn host_of(address: &str) -> &str {
    if let Some(rest) = address.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match address.rsplit_once(':') {
        Some((host, _)) if !host.contains(':') => host,
        Some(_) => address,
        None => address,
    }
}

/// Peer identity at the reconciliation boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    ByPubkey(String),
    ByAddress(String),
}

impl Identity {
    /// Pubkey wins when present and non-empty, the address otherwise
    pub fn resolve(pubkey: Option<&str>, address: &str) -> Self {
        match pubkey.filter(|k| !k.is_empty()) {
            Some(key) => Identity::ByPubkey(key.to_string()),
            None => Identity::ByAddress(address.to_string()),
        }
    }

    pub fn pubkey(&self) -> Option<&str> {
        match self {
            Identity::ByPubkey(key) => Some(key),
            Identity::ByAddress(_) => None,
        }
    }
}

// =============================================================================
// PROBING
// =============================================================================

/// Why a probe did not come back accessible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeFailure {
    Timeout,
    Network,
    Protocol,
}

/// Result of one stats probe. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub accessible: bool,

    /// Raw `get-stats` result, only present on success
    pub stats: Option<serde_json::Value>,

    pub probed_at: Timestamp,

    /// Failure classification for inaccessible outcomes
    #[serde(default)]
    pub failure: Option<ProbeFailure>,
}

impl ProbeOutcome {
    pub fn accessible(stats: serde_json::Value, probed_at: Timestamp) -> Self {
        Self {
            accessible: true,
            stats: Some(stats),
            probed_at,
            failure: None,
        }
    }

    pub fn inaccessible(failure: Option<ProbeFailure>, probed_at: Timestamp) -> Self {
        Self {
            accessible: false,
            stats: None,
            probed_at,
            failure,
        }
    }

    /// Typed view of the stats payload
    pub fn node_stats(&self) -> Option<NodeStats> {
        self.stats.as_ref().and_then(NodeStats::from_payload)
    }
}

/// Runtime statistics exposed by a peer's stats port
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStats {
    pub cpu_percent: f64,
    pub ram_used: u64,
    pub ram_total: u64,
    /// Process uptime in seconds
    pub uptime: u64,
    pub active_streams: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    /// Stored bytes
    pub file_size: Option<u64>,
}

impl NodeStats {
    /// Parse a raw payload; some peers nest the figures under `stats`.
    /// Each field is read on its own: a missing, null or mistyped field
    /// reads as zero instead of discarding the whole payload.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        if !payload.is_object() {
            return None;
        }
        let source = match payload.get("stats") {
            Some(inner) if inner.is_object() => inner,
            _ => payload,
        };

        Some(Self {
            cpu_percent: float_field(source, "cpu_percent").unwrap_or(0.0),
            ram_used: uint_field(source, "ram_used").unwrap_or(0),
            ram_total: uint_field(source, "ram_total").unwrap_or(0),
            uptime: uint_field(source, "uptime").unwrap_or(0),
            active_streams: uint_field(source, "active_streams").unwrap_or(0),
            packets_received: uint_field(source, "packets_received").unwrap_or(0),
            packets_sent: uint_field(source, "packets_sent").unwrap_or(0),
            file_size: uint_field(source, "file_size"),
        })
    }

    /// RAM usage in percent, zero when the total is unknown
    pub fn ram_usage_percent(&self) -> f64 {
        if self.ram_total == 0 {
            return 0.0;
        }
        self.ram_used as f64 / self.ram_total as f64 * 100.0
    }

    pub fn total_packets(&self) -> u64 {
        self.packets_received.saturating_add(self.packets_sent)
    }
}

fn float_field(source: &serde_json::Value, key: &str) -> Option<f64> {
    source.get(key).and_then(|v| v.as_f64()).filter(|v| v.is_finite())
}

/// Non-negative integer field; fractional values are truncated
fn uint_field(source: &serde_json::Value, key: &str) -> Option<u64> {
    let value = source.get(key)?;
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    })
}

/// Progress of an accessibility scan, handed to observers after every probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub total: usize,
    pub scanned: usize,
    pub accessible: usize,
    pub is_scanning: bool,
}

/// Get current Unix timestamp
pub fn current_timestamp() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
