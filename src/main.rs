//! pNode Monitor
//!
//! Watches a storage network of pNodes: discovers peers through gossip,
//! checks which of them expose their private stats endpoint, keeps the
//! answers in a TTL cache, samples performance over time, mirrors everything
//! into a durable store and ranks the network.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PNODE MONITOR                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Discovery (get-pods)       ←── Peer set from gossip        │
//! │  Accessibility Scanner      ←── Batched get-stats probes    │
//! │  Stats Cache (TTL)          ←── Latest outcome per peer     │
//! │  Performance Collector      ←── History of accessible peers │
//! │  Background Sync (RocksDB)  ←── Durable mirror, dedup       │
//! │  Ranking Engine             ←── Scores, badges, snapshots   │
//! │  HTTP API (8080)            ←── Status, rankings, metrics   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod api;
mod cache;
mod collector;
mod config;
mod durable;
mod error;
mod history;
mod jobs;
mod network_health;
mod peers;
mod ranking;
mod rpc;
mod scanner;
mod supervisor;
mod sync;
mod types;
mod watchlist;

use api::{ApiState, Metrics};
use cache::StatsCache;
use collector::PerformanceCollector;
use config::MonitorConfig;
use durable::{DurableStore, RocksStore};
use history::HistoryStore;
use network_health::NetworkHealthAggregator;
use peers::PeerDirectory;
use ranking::{scoring::VersionTiers, RankingEngine};
use rpc::{DiscoveryClient, ProbeClient, RpcClient, StatsProbe};
use scanner::AccessibilityScanner;
use supervisor::{Schedule, Supervisor};
use sync::BackgroundSync;
use watchlist::Watchlist;

/// pNode Monitor - accessibility, performance and ranking of pNodes
#[derive(Parser, Debug)]
#[command(name = "pnode-monitor")]
#[command(author = "pNode Monitor Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Monitoring and ranking service for pNode storage networks", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "pnode-monitor.toml")]
    config: PathBuf,

    /// Data directory for the durable store
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// HTTP API port
    #[arg(long, default_value = "8080")]
    api_port: u16,

    /// Gossip JSON-RPC endpoint used for discovery
    #[arg(long)]
    gossip_endpoint: Option<String>,

    /// Reference version for ranking
    #[arg(long)]
    latest_version: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into())
        )
        .init();

    info!("🛰️  pNode Monitor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.config.exists() {
        MonitorConfig::load(&args.config)?
    } else {
        warn!("Config file not found, using defaults");
        MonitorConfig::default()
    };

    // Override config with CLI args
    let config = config
        .with_api_port(args.api_port)
        .with_gossip_endpoint(args.gossip_endpoint)
        .with_latest_version(args.latest_version);

    config.validate()?;

    info!("⚙️  Configuration:");
    info!("   Gossip endpoint: {}", config.gossip_endpoint);
    info!("   Stats port: {}", config.stats_port);
    info!("   API port: {}", config.api_port);
    info!("   Scan: every {}s, batch {}, timeout {}ms", config.scan_interval_secs, config.scan_batch_size, config.probe_timeout_ms);
    info!("   Cache TTL: {}s", config.cache_ttl_secs);
    info!("   Latest version: {}", config.latest_version);

    let tiers = VersionTiers::parse(&config.latest_version)
        .ok_or_else(|| anyhow::anyhow!("invalid latest_version {}", config.latest_version))?;
    let shared_config = Arc::new(config);

    // Open durable store
    tokio::fs::create_dir_all(&args.data_dir).await?;
    let store_path = args.data_dir.join("monitor_db");
    let store = Arc::new(RocksStore::open(&store_path)?);
    let durable: Arc<dyn DurableStore> = store.clone();

    // Core state
    let metrics = Arc::new(Metrics::new());
    let cache = Arc::new(StatsCache::new(shared_config.cache_ttl()));
    let history = Arc::new(HistoryStore::new(
        shared_config.history_sample_interval_secs,
        shared_config.history_retention_secs,
    ));
    let watchlist = Arc::new(Watchlist::new());
    let directory = Arc::new(PeerDirectory::new());
    let engine = Arc::new(RankingEngine::new(tiers));
    let health = Arc::new(RwLock::new(NetworkHealthAggregator::new(&shared_config.latest_version)));

    // RPC clients
    let rpc = RpcClient::new()?;
    let probe: Arc<dyn StatsProbe> = Arc::new(ProbeClient::new(rpc.clone(), shared_config.stats_port));
    let discovery = DiscoveryClient::new(
        rpc,
        shared_config.gossip_endpoint.clone(),
        shared_config.discovery_timeout(),
    );

    let scanner = Arc::new(AccessibilityScanner::new(
        probe.clone(),
        cache.clone(),
        metrics.clone(),
        shared_config.scan_batch_size,
        shared_config.probe_timeout(),
    ));

    let collector = Arc::new(PerformanceCollector::new(
        probe,
        cache.clone(),
        history.clone(),
        durable.clone(),
        metrics.clone(),
        shared_config.probe_timeout(),
        Duration::from_millis(shared_config.collector_request_delay_ms),
        shared_config.durable_history_retention_secs,
    ));

    let sync = Arc::new(BackgroundSync::new(
        cache.clone(),
        watchlist.clone(),
        durable.clone(),
        metrics.clone(),
    ));

    // Warm start from the durable store
    match sync.pull_durable_to_local() {
        Ok(Some(restored)) => info!("♻️  Restored {} cached results from durable store", restored),
        Ok(None) => {}
        Err(e) => warn!("Could not restore from durable store: {}", e),
    }

    // Recurring jobs
    let mut supervisor = Supervisor::new();
    supervisor.spawn(
        Arc::new(jobs::ScanJob {
            discovery,
            directory: directory.clone(),
            scanner: scanner.clone(),
            cache: cache.clone(),
            metrics: metrics.clone(),
        }),
        Schedule::every(Duration::from_secs(shared_config.scan_interval_secs)),
    );
    supervisor.spawn(
        Arc::new(jobs::CollectJob {
            collector: collector.clone(),
        }),
        Schedule::every(Duration::from_secs(shared_config.collector_interval_secs)),
    );
    supervisor.spawn(
        Arc::new(jobs::SyncJob { sync: sync.clone() }),
        Schedule::every(Duration::from_secs(shared_config.sync_interval_secs))
            .after(Duration::from_secs(shared_config.sync_initial_delay_secs)),
    );
    // Checked on the maintenance cadence; records once the interval has passed
    let maintenance_period = Duration::from_secs(shared_config.maintenance_interval_secs);
    supervisor.spawn(
        Arc::new(jobs::RankingSnapshotJob::new(
            engine.clone(),
            directory.clone(),
            cache.clone(),
            durable.clone(),
            metrics.clone(),
            shared_config.ranking_snapshot_interval_secs,
        )),
        Schedule::every(maintenance_period).after(maintenance_period),
    );
    supervisor.spawn(
        Arc::new(jobs::MaintenanceJob {
            cache: cache.clone(),
            history: history.clone(),
            history_retention_secs: shared_config.history_retention_secs,
            directory: directory.clone(),
            health: health.clone(),
            metrics: metrics.clone(),
        }),
        Schedule::every(Duration::from_secs(shared_config.maintenance_interval_secs)),
    );

    let api_state = Arc::new(ApiState {
        config: shared_config.clone(),
        cache,
        directory,
        scanner,
        collector,
        history,
        durable: durable.clone(),
        sync: sync.clone(),
        watchlist,
        engine,
        health,
        metrics,
    });
    let api_handle = tokio::spawn(api::run_api_server(api_state));

    info!("✅ All services started");
    info!("   Press Ctrl+C to shutdown gracefully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
        result = api_handle => {
            error!("HTTP API exited: {:?}", result);
        }
    }

    // Graceful shutdown: stop jobs, push what is left, close the store
    supervisor.stop().await;

    if let Err(e) = sync.trigger_now() {
        warn!("Final sync failed: {}", e);
    }

    durable.flush()?;
    store.close()?;
    info!("📦 Durable store flushed to disk");

    info!("👋 pNode Monitor shutting down");
    Ok(())
}
