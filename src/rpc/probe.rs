//! Stats Probe
//!
//! One timed `get-stats` request against a peer's private stats port.
//! Every failure is folded into an inaccessible outcome; nothing is written
//! anywhere, callers persist the result.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::client::RpcClient;
use crate::types::{current_timestamp, host_of, ProbeOutcome};

/// Stats method exposed on the private port
pub const STATS_METHOD: &str = "get-stats";

/// Probe seam used by the scanner and the collector
#[async_trait]
pub trait StatsProbe: Send + Sync {
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome;
}

/// Stats endpoint of a peer: its gossip host on the shared stats port
pub fn stats_endpoint(address: &str, stats_port: u16) -> String {
    let host = host_of(address);
    if host.contains(':') {
        format!("http://[{}]:{}/rpc", host, stats_port)
    } else {
        format!("http://{}:{}/rpc", host, stats_port)
    }
}

/// JSON-RPC implementation of [`StatsProbe`]
#[derive(Clone)]
pub struct ProbeClient {
    rpc: RpcClient,
    stats_port: u16,
}

impl ProbeClient {
    pub fn new(rpc: RpcClient, stats_port: u16) -> Self {
        Self { rpc, stats_port }
    }

    pub fn stats_port(&self) -> u16 {
        self.stats_port
    }
}

#[async_trait]
impl StatsProbe for ProbeClient {
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome {
        let endpoint = stats_endpoint(address, self.stats_port);

        match self.rpc.call(&endpoint, STATS_METHOD, None, timeout).await {
            Ok(stats) => {
                debug!("✓ {} accessible", address);
                ProbeOutcome::accessible(stats, current_timestamp())
            }
            Err(e) => {
                debug!("✗ {} inaccessible: {}", address, e);
                ProbeOutcome::inaccessible(e.probe_failure(), current_timestamp())
            }
        }
    }
}
