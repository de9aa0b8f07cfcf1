//! Network Health Aggregator
//!
//! Rolls the peer set up into one health score:
//! availability 40%, version health 35%, geographic distribution 25%.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::debug;

use crate::cache::StatsCache;
use crate::types::{Peer, Timestamp};

/// Peers seen within this window count as online
pub const ONLINE_WINDOW_SECS: u64 = 1_800;

/// Country count that earns a full distribution score
pub const IDEAL_COUNTRIES: usize = 10;

const AVAILABILITY_WEIGHT: f64 = 0.40;
const VERSION_WEIGHT: f64 = 0.35;
const DISTRIBUTION_WEIGHT: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn from_score(score: u32) -> Self {
        if score >= 80 {
            HealthStatus::Healthy
        } else if score >= 60 {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }
}

/// Network-wide health figures, scores in 0..=100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkHealth {
    pub availability_score: u32,
    pub version_health_score: u32,
    pub distribution_score: u32,
    pub overall_score: u32,
    pub status: HealthStatus,
    pub total_peers: usize,
    pub online_peers: usize,
    pub accessible_peers: usize,
    pub unique_countries: usize,
    /// Off the reference version or without geo annotation
    pub at_risk_peers: usize,
    pub version_distribution: BTreeMap<String, usize>,
    pub latest_version: String,
    pub computed_at: Timestamp,
}

impl NetworkHealth {
    /// Compute health from a peer set and the cache at `now`
    pub fn compute(peers: &[Peer], cache: &StatsCache, latest_version: &str, now: Timestamp) -> Self {
        let total = peers.len();

        let online = peers
            .iter()
            .filter(|p| now.saturating_sub(p.last_seen) < ONLINE_WINDOW_SECS)
            .count();

        let accessible = peers
            .iter()
            .filter(|p| cache.get_at(&p.address, now).map(|e| e.accessible()).unwrap_or(false))
            .count();

        let mut version_distribution = BTreeMap::new();
        for peer in peers {
            *version_distribution.entry(peer.version.clone()).or_insert(0) += 1;
        }
        let on_latest = version_distribution.get(latest_version).copied().unwrap_or(0);

        let countries: HashSet<&str> = peers
            .iter()
            .filter_map(|p| p.geo.as_ref())
            .map(|g| g.country.as_str())
            .filter(|c| !c.is_empty())
            .collect();

        let at_risk = peers
            .iter()
            .filter(|p| p.version != latest_version || p.geo.is_none())
            .count();

        let availability = percent(online, total);
        let version_health = percent(on_latest, total);
        let distribution = (countries.len() as f64 / IDEAL_COUNTRIES as f64 * 100.0).min(100.0);

        let overall = (availability * AVAILABILITY_WEIGHT
            + version_health * VERSION_WEIGHT
            + distribution * DISTRIBUTION_WEIGHT)
            .round() as u32;

        Self {
            availability_score: availability.round() as u32,
            version_health_score: version_health.round() as u32,
            distribution_score: distribution.round() as u32,
            overall_score: overall,
            status: HealthStatus::from_score(overall),
            total_peers: total,
            online_peers: online,
            accessible_peers: accessible,
            unique_countries: countries.len(),
            at_risk_peers: at_risk,
            version_distribution,
            latest_version: latest_version.to_string(),
            computed_at: now,
        }
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

/// Keeps the latest health figures and a short score history
pub struct NetworkHealthAggregator {
    latest_version: String,
    current: Option<NetworkHealth>,
    history: VecDeque<(Timestamp, u32)>,
    max_history: usize,
}

impl NetworkHealthAggregator {
    pub fn new(latest_version: &str) -> Self {
        Self {
            latest_version: latest_version.to_string(),
            current: None,
            history: VecDeque::new(),
            max_history: 1_000,
        }
    }

    pub fn update(&mut self, peers: &[Peer], cache: &StatsCache, now: Timestamp) -> &NetworkHealth {
        let health = NetworkHealth::compute(peers, cache, &self.latest_version, now);
        debug!(
            "Network health {} ({:?}) over {} peers",
            health.overall_score, health.status, health.total_peers
        );

        self.history.push_back((now, health.overall_score));
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }

        self.current.insert(health)
    }

    pub fn current(&self) -> Option<&NetworkHealth> {
        self.current.as_ref()
    }

    /// Compares the latest score with the average of the previous ten
    pub fn trend(&self) -> &'static str {
        if self.history.len() < 2 {
            return "stable";
        }

        let latest = self.history.back().map(|(_, s)| *s as f64).unwrap_or(0.0);
        let previous: Vec<f64> = self
            .history
            .iter()
            .rev()
            .skip(1)
            .take(10)
            .map(|(_, s)| *s as f64)
            .collect();
        let avg = previous.iter().sum::<f64>() / previous.len() as f64;

        if latest > avg + 2.0 {
            "improving"
        } else if latest < avg - 2.0 {
            "declining"
        } else {
            "stable"
        }
    }
}
