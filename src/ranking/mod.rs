//! Ranking Engine
//!
//! A deterministic function of the peer set, the stats cache and a reference
//! time. Nothing here mutates state; re-running with the same inputs gives
//! the same order and the same per-peer scores, which is what makes persisted
//! [`RankingSnapshot`]s comparable over time.

pub mod badges;
pub mod scoring;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::cache::StatsCache;
use crate::durable::DurableStore;
use crate::error::Result;
use crate::types::{Peer, Timestamp};
use scoring::{PerformanceBreakdown, VersionTiers};

pub use badges::Badge;

const SECS_PER_DAY: u64 = 86_400;

/// Peers kept per day in the daily leaderboard
pub const LEADERBOARD_SIZE: usize = 10;

/// Scored peer, derived on every ranking request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPeer {
    pub peer: Peer,

    /// 1-based position
    pub rank: u32,

    /// Rounded sum of every component
    pub total_score: u32,

    pub version_score: u32,
    pub geo_score: f64,
    pub stability_score: u32,
    pub rpc_accessible: bool,
    pub rpc_bonus: u32,
    pub performance_score: u32,

    /// Present only for accessible peers with a cached payload
    pub performance: Option<PerformanceBreakdown>,
}

/// Immutable record of one peer's position at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub address: String,
    pub pubkey: Option<String>,
    pub rank: u32,
    pub score: u32,
    pub version: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub taken_at: Timestamp,
}

impl RankingSnapshot {
    pub fn from_ranked(ranked: &RankedPeer, taken_at: Timestamp) -> Self {
        let geo = ranked.peer.geo.as_ref();
        Self {
            address: ranked.peer.address.clone(),
            pubkey: ranked.peer.pubkey.clone(),
            rank: ranked.rank,
            score: ranked.total_score,
            version: ranked.peer.version.clone(),
            country: geo.map(|g| g.country.clone()),
            city: geo.and_then(|g| g.city.clone()),
            taken_at,
        }
    }
}

pub struct RankingEngine {
    tiers: VersionTiers,
}

impl RankingEngine {
    pub fn new(tiers: VersionTiers) -> Self {
        Self { tiers }
    }

    pub fn latest_version(&self) -> &str {
        self.tiers.latest()
    }

    /// Score and order `peers`; equal totals keep input order
    pub fn rank(&self, peers: &[Peer], cache: &StatsCache, now: Timestamp) -> Vec<RankedPeer> {
        let mut per_country: HashMap<&str, usize> = HashMap::new();
        for peer in peers {
            *per_country.entry(peer.country()).or_insert(0) += 1;
        }

        let mut ranked: Vec<RankedPeer> = peers
            .iter()
            .map(|peer| {
                let in_country = per_country.get(peer.country()).copied().unwrap_or(1);
                self.score(peer, in_country, peers.len(), cache, now)
            })
            .collect();

        // Vec::sort_by is stable
        ranked.sort_by(|a, b| b.total_score.cmp(&a.total_score));
        for (i, peer) in ranked.iter_mut().enumerate() {
            peer.rank = i as u32 + 1;
        }

        ranked
    }

    fn score(
        &self,
        peer: &Peer,
        in_country: usize,
        total: usize,
        cache: &StatsCache,
        now: Timestamp,
    ) -> RankedPeer {
        let version_score = self.tiers.score(&peer.version);
        let geo_score = scoring::geo_score(in_country, total);
        let stability_score = scoring::stability_score(peer.last_seen, now);

        let entry = cache.get_at(&peer.address, now).filter(|e| e.accessible());
        let rpc_accessible = entry.is_some();
        let rpc_bonus = if rpc_accessible { scoring::weights::RPC_BONUS } else { 0 };

        let performance = entry
            .and_then(|e| e.outcome.node_stats())
            .map(|stats| PerformanceBreakdown::from_stats(&stats));
        let performance_score = performance.map(|p| p.total()).unwrap_or(0);

        let sum = version_score as f64
            + geo_score
            + stability_score as f64
            + rpc_bonus as f64
            + performance_score as f64;

        RankedPeer {
            peer: peer.clone(),
            rank: 0,
            total_score: sum.round() as u32,
            version_score,
            geo_score,
            stability_score,
            rpc_accessible,
            rpc_bonus,
            performance_score,
            performance,
        }
    }
}

// =============================================================================
// TRENDS
// =============================================================================

/// Snapshot rows for every ranked peer
pub fn snapshots_of(ranked: &[RankedPeer], taken_at: Timestamp) -> Vec<RankingSnapshot> {
    ranked
        .iter()
        .map(|r| RankingSnapshot::from_ranked(r, taken_at))
        .collect()
}

/// Start of a `days` window ending at `now`
pub fn window_start(days: u64, now: Timestamp) -> Timestamp {
    now.saturating_sub(days.saturating_mul(SECS_PER_DAY))
}

/// Newest first, optionally restricted to one address
pub fn history_of(mut snapshots: Vec<RankingSnapshot>, address: Option<&str>) -> Vec<RankingSnapshot> {
    if let Some(address) = address {
        snapshots.retain(|s| s.address == address);
    }
    snapshots.sort_by(|a, b| b.taken_at.cmp(&a.taken_at).then(a.rank.cmp(&b.rank)));
    snapshots
}

/// Latest snapshot per address
pub fn latest_per_peer(snapshots: &[RankingSnapshot]) -> HashMap<String, RankingSnapshot> {
    let mut latest: HashMap<String, RankingSnapshot> = HashMap::new();
    for snapshot in snapshots {
        match latest.get(&snapshot.address) {
            Some(existing) if existing.taken_at >= snapshot.taken_at => {}
            _ => {
                latest.insert(snapshot.address.clone(), snapshot.clone());
            }
        }
    }
    latest
}

/// Positions gained since `previous` (positive = moved up)
pub fn rank_change(current_rank: u32, previous: Option<&RankingSnapshot>) -> Option<i64> {
    previous.map(|p| p.rank as i64 - current_rank as i64)
}

/// Rank the peer set at `now` and persist the result; returns the rows written
pub fn record_snapshot(
    engine: &RankingEngine,
    peers: &[Peer],
    cache: &StatsCache,
    durable: &dyn DurableStore,
    now: Timestamp,
) -> Result<usize> {
    let ranked = engine.rank(peers, cache, now);
    durable.save_ranking_snapshots(&snapshots_of(&ranked, now))
}

/// Best peers of one UTC day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLeaderboard {
    /// `YYYY-MM-DD`
    pub date: String,
    pub peers: Vec<RankingSnapshot>,
}

/// Top `top` peers per UTC day, newest day first.
///
/// A day with several snapshots is represented by its latest one.
pub fn leaderboard_by_day(snapshots: &[RankingSnapshot], top: usize) -> Vec<DailyLeaderboard> {
    let mut latest_of_day: BTreeMap<u64, Timestamp> = BTreeMap::new();
    for snapshot in snapshots {
        let day = snapshot.taken_at / SECS_PER_DAY;
        let entry = latest_of_day.entry(day).or_insert(snapshot.taken_at);
        *entry = (*entry).max(snapshot.taken_at);
    }

    latest_of_day
        .into_iter()
        .rev()
        .map(|(day, taken_at)| {
            let mut peers: Vec<RankingSnapshot> = snapshots
                .iter()
                .filter(|s| s.taken_at == taken_at)
                .cloned()
                .collect();
            peers.sort_by_key(|s| s.rank);
            peers.truncate(top);
            DailyLeaderboard {
                date: day_label(day),
                peers,
            }
        })
        .collect()
}

fn day_label(day: u64) -> String {
    i64::try_from(day * SECS_PER_DAY)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoInfo;
    use serde_json::json;
    use std::time::Duration;

    const NOW: Timestamp = 1_700_000_000;

    fn engine() -> RankingEngine {
        RankingEngine::new(VersionTiers::parse("0.8.0").unwrap())
    }

    fn cache() -> StatsCache {
        StatsCache::new(Duration::from_secs(300))
    }

    fn peer(address: &str, country: Option<&str>, version: &str, last_seen: Timestamp) -> Peer {
        Peer {
            address: address.to_string(),
            pubkey: None,
            version: version.to_string(),
            geo: country.map(|c| GeoInfo {
                country: c.to_string(),
                city: None,
                flag: None,
            }),
            last_seen,
        }
    }

    #[test]
    fn test_crowded_country_scores_lower() {
        let peers = vec![
            peer("a:1", Some("US"), "0.8.0", NOW),
            peer("b:1", Some("US"), "0.8.0", NOW),
            peer("c:1", Some("DE"), "0.8.0", NOW),
            peer("d:1", Some("FR"), "0.8.0", NOW),
            peer("e:1", Some("JP"), "0.8.0", NOW),
            peer("f:1", Some("BR"), "0.8.0", NOW),
            peer("g:1", Some("IN"), "0.8.0", NOW),
        ];

        let ranked = engine().rank(&peers, &cache(), NOW);
        let geo = |addr: &str| ranked.iter().find(|r| r.peer.address == addr).unwrap().geo_score;

        for single in ["c:1", "d:1", "e:1", "f:1", "g:1"] {
            assert!(geo("a:1") < geo(single));
            assert!(geo("b:1") < geo(single));
        }
        assert_eq!(geo("a:1"), geo("b:1"));
    }

    #[test]
    fn test_unknown_country_is_own_bucket() {
        let peers = vec![
            peer("a:1", None, "0.8.0", NOW),
            peer("b:1", None, "0.8.0", NOW),
            peer("c:1", Some("DE"), "0.8.0", NOW),
        ];
        let ranked = engine().rank(&peers, &cache(), NOW);
        assert_eq!(ranked[0].peer.address, "c:1");
        assert!((ranked[1].geo_score - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_stability_tiers() {
        let peers = vec![
            peer("fresh:1", Some("DE"), "0.8.0", NOW - 10),
            peer("stale:1", Some("FR"), "0.8.0", NOW - 7_200),
        ];
        let ranked = engine().rank(&peers, &cache(), NOW);

        assert_eq!(ranked[0].peer.address, "fresh:1");
        assert_eq!(ranked[0].stability_score, 30);
        assert_eq!(ranked[1].stability_score, scoring::STABILITY_FLOOR);
    }

    #[test]
    fn test_accessible_peer_gets_bonus_and_performance() {
        let cache = cache();
        cache.set_at(
            "a:1",
            json!({ "stats": { "cpu_percent": 10.0, "ram_used": 1, "ram_total": 10, "uptime": 864_000, "active_streams": 6 } }),
            true,
            NOW - 10,
        );
        cache.set_inaccessible_at("b:1", NOW - 10);

        let peers = vec![
            peer("b:1", Some("FR"), "0.8.0", NOW),
            peer("a:1", Some("DE"), "0.8.0", NOW),
        ];
        let ranked = engine().rank(&peers, &cache, NOW);

        let a = &ranked[0];
        assert_eq!(a.peer.address, "a:1");
        assert!(a.rpc_accessible);
        assert_eq!(a.rpc_bonus, 10);
        assert_eq!(a.performance_score, 20);
        // 40 + 15 + 30 + 10 + 20
        assert_eq!(a.total_score, 115);

        let b = &ranked[1];
        assert_eq!(b.rpc_bonus, 0);
        assert!(b.performance.is_none());
    }

    #[test]
    fn test_expired_cache_entry_gives_no_bonus() {
        let cache = cache();
        cache.set_at("a:1", json!({}), true, NOW - 301);

        let ranked = engine().rank(&[peer("a:1", None, "0.8.0", NOW)], &cache, NOW);
        assert!(!ranked[0].rpc_accessible);
        assert_eq!(ranked[0].performance_score, 0);
    }

    #[test]
    fn test_ranking_is_deterministic_and_stable() {
        let cache = cache();
        cache.set_at("c:1", json!({ "cpu_percent": 60.0 }), true, NOW);

        let peers = vec![
            peer("a:1", Some("US"), "0.7.2", NOW - 100),
            peer("b:1", Some("US"), "0.7.2", NOW - 100),
            peer("c:1", Some("DE"), "0.8.0", NOW - 2_000),
            peer("d:1", None, "0.5.0", NOW),
        ];

        let first = engine().rank(&peers, &cache, NOW);
        let second = engine().rank(&peers, &cache, NOW);
        assert_eq!(first, second);

        // Equal totals keep input order
        let a = first.iter().position(|r| r.peer.address == "a:1").unwrap();
        let b = first.iter().position(|r| r.peer.address == "b:1").unwrap();
        assert_eq!(first[a].total_score, first[b].total_score);
        assert!(a < b);

        let ranks: Vec<u32> = first.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_latest_per_peer_and_rank_change() {
        let snap = |address: &str, rank: u32, taken_at: Timestamp| RankingSnapshot {
            address: address.to_string(),
            pubkey: None,
            rank,
            score: 50,
            version: "0.8.0".to_string(),
            country: None,
            city: None,
            taken_at,
        };
        let snapshots = vec![snap("a:1", 5, 100), snap("a:1", 3, 200), snap("b:1", 1, 100)];

        let latest = latest_per_peer(&snapshots);
        assert_eq!(latest["a:1"].rank, 3);
        assert_eq!(latest.len(), 2);

        assert_eq!(rank_change(1, latest.get("a:1")), Some(2));
        assert_eq!(rank_change(1, latest.get("z:1")), None);

        let history = history_of(snapshots, Some("a:1"));
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].taken_at, 200);
    }

    fn snapshot_row(address: &str, rank: u32, taken_at: Timestamp) -> RankingSnapshot {
        RankingSnapshot {
            address: address.to_string(),
            pubkey: None,
            rank,
            score: 100 - rank,
            version: "0.8.0".to_string(),
            country: None,
            city: None,
            taken_at,
        }
    }

    #[test]
    fn test_leaderboard_groups_by_utc_day() {
        let yesterday = NOW - SECS_PER_DAY;
        let mut snapshots: Vec<RankingSnapshot> = (1..=12)
            .rev()
            .map(|rank| snapshot_row(&format!("p{}:1", rank), rank, yesterday))
            .collect();
        // Two snapshots today; the later one wins
        snapshots.push(snapshot_row("a:1", 1, NOW - 3_600));
        snapshots.push(snapshot_row("b:1", 2, NOW - 3_600));
        snapshots.push(snapshot_row("b:1", 1, NOW));
        snapshots.push(snapshot_row("a:1", 2, NOW));

        let days = leaderboard_by_day(&snapshots, LEADERBOARD_SIZE);
        assert_eq!(days.len(), 2);

        assert_eq!(days[0].date, "2023-11-14");
        let today: Vec<&str> = days[0].peers.iter().map(|s| s.address.as_str()).collect();
        assert_eq!(today, vec!["b:1", "a:1"]);

        assert_eq!(days[1].date, "2023-11-13");
        assert_eq!(days[1].peers.len(), LEADERBOARD_SIZE);
        assert_eq!(days[1].peers[0].rank, 1);
        assert_eq!(days[1].peers[9].rank, 10);

        assert!(leaderboard_by_day(&[], LEADERBOARD_SIZE).is_empty());
    }

    #[tokio::test]
    async fn test_record_snapshot_persists_ranking() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::durable::RocksStore::open(dir.path()).unwrap();
        let peers = vec![
            peer("a:1", Some("US"), "0.7.2", NOW),
            peer("b:1", Some("DE"), "0.8.0", NOW),
        ];

        let written = record_snapshot(&engine(), &peers, &cache(), &store, NOW).unwrap();
        assert_eq!(written, 2);

        let stored = store.ranking_snapshots(NOW).unwrap();
        assert_eq!(stored[0].address, "b:1");
        assert_eq!(stored[0].rank, 1);
        assert_eq!(store.latest_ranking_snapshot_at().unwrap(), Some(NOW));
    }
}
