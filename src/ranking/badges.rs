//! Achievement badges derived from a ranking and its history

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::RankedPeer;

/// Ranks a peer must have on record for the stability badge
pub const STABLE_CHAMPION_MIN_RANKS: usize = 7;

/// Worst rank still counted as top
pub const STABLE_CHAMPION_MAX_RANK: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    /// Runs the reference version
    LatestVersion,
    /// Only peer in its (known) country
    GeographicPioneer,
    /// Enough history, every rank within the top 10
    StableChampion,
}

impl Badge {
    pub fn name(&self) -> &'static str {
        match self {
            Badge::LatestVersion => "Latest Version",
            Badge::GeographicPioneer => "Geographic Pioneer",
            Badge::StableChampion => "Stable Champion",
        }
    }
}

/// Country population of a ranking, unannotated peers excluded
pub fn country_counts(all: &[RankedPeer]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for ranked in all {
        if let Some(geo) = ranked.peer.geo.as_ref().filter(|g| !g.country.is_empty()) {
            *counts.entry(geo.country.as_str()).or_insert(0) += 1;
        }
    }
    counts
}

/// Badges earned by `peer`; `past_ranks` are its persisted historical ranks
pub fn earned_badges(
    peer: &RankedPeer,
    countries: &HashMap<&str, usize>,
    past_ranks: &[u32],
    latest_version: &str,
) -> Vec<Badge> {
    let mut badges = Vec::new();

    if peer.peer.version == latest_version {
        badges.push(Badge::LatestVersion);
    }

    let pioneer = peer
        .peer
        .geo
        .as_ref()
        .and_then(|g| countries.get(g.country.as_str()))
        .map(|count| *count == 1)
        .unwrap_or(false);
    if pioneer {
        badges.push(Badge::GeographicPioneer);
    }

    if past_ranks.len() >= STABLE_CHAMPION_MIN_RANKS
        && past_ranks.iter().all(|rank| *rank <= STABLE_CHAMPION_MAX_RANK)
    {
        badges.push(Badge::StableChampion);
    }

    badges
}
