//! Peer Scoring System
//!
//! Independent sub-scores combined by the ranking engine. The maximum total
//! is 130: version 40, geography 30, stability 30, RPC bonus 10 and
//! performance 20.

use crate::types::{NodeStats, Timestamp};

/// Maximum points per component
pub mod weights {
    pub const VERSION: u32 = 40;
    pub const GEOGRAPHY: f64 = 30.0;
    pub const STABILITY: u32 = 30;
    pub const RPC_BONUS: u32 = 10;
    pub const PERFORMANCE: u32 = 20;

    pub const MAX_TOTAL: u32 = VERSION + GEOGRAPHY as u32 + STABILITY + RPC_BONUS + PERFORMANCE;
}

/// Version tiers, relative to the reference version
pub mod version_tiers {
    pub const EXACT: u32 = 40;
    pub const SAME_MINOR: u32 = 30;
    pub const PREVIOUS_MINOR: u32 = 20;
    pub const FLOOR: u32 = 10;
}

/// Stability bands: (seen within secs, points); older than all bands gets the floor
pub const STABILITY_BANDS: [(u64, u32); 3] = [(60, 30), (300, 20), (1_800, 10)];
pub const STABILITY_FLOOR: u32 = 5;

const SECS_PER_DAY: f64 = 86_400.0;

// =============================================================================
// VERSION
// =============================================================================

/// Reference version with its numeric `major.minor`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTiers {
    latest: String,
    major: u64,
    minor: u64,
}

impl VersionTiers {
    /// `None` unless the version starts with numeric major and minor components
    pub fn parse(latest: &str) -> Option<Self> {
        let (major, minor) = major_minor(latest)?;
        Some(Self {
            latest: latest.to_string(),
            major,
            minor,
        })
    }

    pub fn latest(&self) -> &str {
        &self.latest
    }

    /// Exact match, same minor line, previous minor line, or the floor
    pub fn score(&self, version: &str) -> u32 {
        if version == self.latest {
            return version_tiers::EXACT;
        }
        match major_minor(version) {
            Some((major, minor)) if major == self.major && minor == self.minor => {
                version_tiers::SAME_MINOR
            }
            Some((major, minor)) if major == self.major && minor + 1 == self.minor => {
                version_tiers::PREVIOUS_MINOR
            }
            _ => version_tiers::FLOOR,
        }
    }
}

/// Leading numeric `major.minor` of a version string (`v` prefix tolerated)
fn major_minor(version: &str) -> Option<(u64, u64)> {
    let mut parts = version.trim().trim_start_matches('v').split('.');
    let major = leading_number(parts.next()?)?;
    let minor = leading_number(parts.next()?)?;
    Some((major, minor))
}

fn leading_number(part: &str) -> Option<u64> {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

// =============================================================================
// GEOGRAPHY & STABILITY
// =============================================================================

/// `30 × (1 − peers_in_country / total_peers)`
pub fn geo_score(peers_in_country: usize, total_peers: usize) -> f64 {
    if total_peers == 0 {
        return 0.0;
    }
    weights::GEOGRAPHY * (1.0 - peers_in_country as f64 / total_peers as f64)
}

/// Step function of the time since the peer was last seen
pub fn stability_score(last_seen: Timestamp, now: Timestamp) -> u32 {
    let since = now.saturating_sub(last_seen);
    STABILITY_BANDS
        .iter()
        .find(|(within, _)| since < *within)
        .map(|(_, points)| *points)
        .unwrap_or(STABILITY_FLOOR)
}

// =============================================================================
// PERFORMANCE
// =============================================================================

/// Tiered performance sub-scores, 5 points each
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PerformanceBreakdown {
    pub cpu_efficiency: u32,
    pub ram_efficiency: u32,
    pub uptime_reliability: u32,
    pub network_activity: u32,
}

impl PerformanceBreakdown {
    pub fn from_stats(stats: &NodeStats) -> Self {
        Self {
            cpu_efficiency: cpu_efficiency(stats.cpu_percent),
            ram_efficiency: ram_efficiency(stats.ram_usage_percent()),
            uptime_reliability: uptime_reliability(stats.uptime),
            network_activity: network_activity(stats.active_streams, stats.total_packets()),
        }
    }

    pub fn total(&self) -> u32 {
        self.cpu_efficiency + self.ram_efficiency + self.uptime_reliability + self.network_activity
    }
}

pub fn cpu_efficiency(cpu_percent: f64) -> u32 {
    if cpu_percent < 25.0 {
        5
    } else if cpu_percent < 50.0 {
        3
    } else if cpu_percent < 75.0 {
        1
    } else {
        0
    }
}

pub fn ram_efficiency(ram_percent: f64) -> u32 {
    if ram_percent < 50.0 {
        5
    } else if ram_percent < 70.0 {
        3
    } else if ram_percent < 90.0 {
        1
    } else {
        0
    }
}

pub fn uptime_reliability(uptime_secs: u64) -> u32 {
    let days = uptime_secs as f64 / SECS_PER_DAY;
    if days > 7.0 {
        5
    } else if days > 3.0 {
        3
    } else if days > 1.0 {
        2
    } else {
        1
    }
}

pub fn network_activity(active_streams: u64, total_packets: u64) -> u32 {
    if active_streams >= 5 || total_packets > 10_000_000 {
        5
    } else if active_streams >= 2 || total_packets > 1_000_000 {
        3
    } else {
        1
    }
}
