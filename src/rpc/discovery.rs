//! Gossip Discovery
//!
//! Fetches the peer list with `get-pods` and turns pods into [`Peer`]s.
//! Geographic enrichment is an external concern behind [`GeoResolver`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::client::RpcClient;
use super::types::{GetPodsResult, Pod};
use crate::error::{MonitorError, Result};
use crate::types::{GeoInfo, Peer};

/// Discovery method of the gossip endpoint
pub const PODS_METHOD: &str = "get-pods";

/// External geo-IP lookup
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Option<GeoInfo>;
}

/// Resolver that never annotates; peers land in the unknown bucket
pub struct NoGeo;

#[async_trait]
impl GeoResolver for NoGeo {
    async fn resolve(&self, _host: &str) -> Option<GeoInfo> {
        None
    }
}

/// Client for the gossip discovery endpoint
pub struct DiscoveryClient {
    rpc: RpcClient,
    endpoint: String,
    timeout: Duration,
    geo: Box<dyn GeoResolver>,
}

impl DiscoveryClient {
    pub fn new(rpc: RpcClient, endpoint: String, timeout: Duration) -> Self {
        Self {
            rpc,
            endpoint,
            timeout,
            geo: Box::new(NoGeo),
        }
    }

    pub fn with_geo_resolver(mut self, geo: Box<dyn GeoResolver>) -> Self {
        self.geo = geo;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the raw pod list
    pub async fn fetch_pods(&self) -> Result<Vec<Pod>> {
        let result = self
            .rpc
            .call(&self.endpoint, PODS_METHOD, Some(serde_json::json!([])), self.timeout)
            .await?;

        let pods: GetPodsResult = serde_json::from_value(result)
            .map_err(|e| MonitorError::ProbeProtocol(format!("invalid get-pods result: {}", e)))?;

        Ok(pods.pods)
    }

    /// Fetch, enrich and deduplicate the current peer set
    pub async fn discover(&self) -> Result<Vec<Peer>> {
        let pods = self.fetch_pods().await?;
        let reported = pods.len();

        let mut peers = Vec::with_capacity(pods.len());
        for pod in dedup_pods(pods) {
            let mut peer = peer_from_pod(pod);
            if peer.geo.is_none() {
                peer.geo = self.geo.resolve(peer.host()).await;
            }
            peers.push(peer);
        }

        info!(
            "🔭 Discovered {} peers ({} pods reported) from {}",
            peers.len(),
            reported,
            self.endpoint
        );

        Ok(peers)
    }
}

fn peer_from_pod(pod: Pod) -> Peer {
    Peer {
        address: pod.address,
        pubkey: pod.pubkey.filter(|k| !k.is_empty()),
        version: pod.version,
        geo: pod.geo.filter(|g| !g.country.is_empty()),
        last_seen: pod.last_seen_timestamp,
    }
}

/// One pod per address, the most recently seen one wins; gossip order kept
fn dedup_pods(pods: Vec<Pod>) -> Vec<Pod> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Pod> = Vec::with_capacity(pods.len());

    for pod in pods {
        if pod.address.is_empty() {
            debug!("Skipping pod without address");
            continue;
        }
        match index.get(&pod.address) {
            Some(&i) => {
                if pod.last_seen_timestamp > unique[i].last_seen_timestamp {
                    unique[i] = pod;
                }
            }
            None => {
                index.insert(pod.address.clone(), unique.len());
                unique.push(pod);
            }
        }
    }

    unique
}
