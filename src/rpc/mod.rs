//! RPC Module
//!
//! JSON-RPC 2.0 client side: the shared call primitive, the per-peer stats
//! probe and the gossip discovery call.

pub mod client;
pub mod discovery;
pub mod probe;
pub mod types;

pub use client::RpcClient;
pub use discovery::{DiscoveryClient, GeoResolver, NoGeo};
pub use probe::{stats_endpoint, ProbeClient, StatsProbe};
