//! API Routes
//!
//! HTTP endpoints for status, rankings, history, sync control and metrics

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::Metrics;
use crate::cache::StatsCache;
use crate::collector::PerformanceCollector;
use crate::config::MonitorConfig;
use crate::durable::DurableStore;
use crate::error::{MonitorError, RpcError};
use crate::history::HistoryStore;
use crate::network_health::{NetworkHealth, NetworkHealthAggregator};
use crate::peers::PeerDirectory;
use crate::ranking::{self, badges, scoring, RankingEngine};
use crate::scanner::AccessibilityScanner;
use crate::sync::BackgroundSync;
use crate::types::current_timestamp;
use crate::watchlist::{Watchlist, WatchlistEntry};

/// Days of ranking history considered for badges
const BADGE_HISTORY_DAYS: u64 = 30;

/// Shared API state
pub struct ApiState {
    pub config: Arc<MonitorConfig>,
    pub cache: Arc<StatsCache>,
    pub directory: Arc<PeerDirectory>,
    pub scanner: Arc<AccessibilityScanner>,
    pub collector: Arc<PerformanceCollector>,
    pub history: Arc<HistoryStore>,
    pub durable: Arc<dyn DurableStore>,
    pub sync: Arc<BackgroundSync>,
    pub watchlist: Arc<Watchlist>,
    pub engine: Arc<RankingEngine>,
    pub health: Arc<RwLock<NetworkHealthAggregator>>,
    pub metrics: Arc<Metrics>,
}

/// Build the router over shared state
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health_check))
        .route("/status", get(get_status))

        // Scanning
        .route("/scan/progress", get(get_scan_progress))
        .route("/collector/progress", get(get_collector_progress))
        .route("/peers/:address/probe", post(probe_peer))

        // Rankings
        .route("/rankings", get(get_rankings))
        .route("/rankings/history", get(get_ranking_history))
        .route("/rankings/latest", get(get_latest_rankings))
        .route("/rankings/leaderboard", get(get_leaderboard))
        .route("/rankings/snapshot", post(record_ranking_snapshot))

        // Performance history
        .route("/history", get(get_history_peers))
        .route("/history/:address", get(get_history))
        .route("/history/:address/summary", get(get_history_summary))

        // Sync
        .route("/sync/status", get(get_sync_status))
        .route("/sync/trigger", post(trigger_sync))
        .route("/admin/cleanup-duplicates", post(cleanup_duplicates))

        // Watch-list
        .route("/watchlist", get(get_watchlist))
        .route("/watchlist/:address", post(add_to_watchlist).delete(remove_from_watchlist))

        // Metrics
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))

        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_api_server(state: Arc<ApiState>) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], state.config.api_port));
    let app = router(state);

    info!("📊 HTTP API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `{"error": {"code", "message"}}` with a status matching the error
fn error_response(e: MonitorError) -> Response {
    let status = match e {
        MonitorError::DurableStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        MonitorError::CorruptRecord(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    };
    let body = RpcError::from(&e);
    (status, Json(serde_json::json!({ "error": body }))).into_response()
}

fn not_found(message: String) -> Response {
    let body = RpcError { code: 404, message };
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": body }))).into_response()
}

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// GET /status - Detailed status
async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let now = current_timestamp();
    let network = {
        let health = state.health.read();
        match health.current() {
            Some(current) => current.clone(),
            None => NetworkHealth::compute(
                &state.directory.list(),
                &state.cache,
                state.engine.latest_version(),
                now,
            ),
        }
    };
    let trend = state.health.read().trend();

    Json(serde_json::json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.metrics.uptime_secs(),
        "peers": {
            "known": state.directory.len(),
            "last_discovery": state.directory.refreshed_at(),
            "accessible": state.cache.accessible_count(),
            "cache_entries": state.cache.len(),
            "watched": state.watchlist.len(),
        },
        "scan": state.scanner.progress(),
        "collector": state.collector.progress(),
        "sync": state.sync.status(),
        "network": network,
        "network_trend": trend,
    }))
}

/// GET /scan/progress
async fn get_scan_progress(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.scanner.progress())
}

/// GET /collector/progress
async fn get_collector_progress(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.collector.progress())
}

/// POST /peers/:address/probe - On-demand probe, result written to the cache
async fn probe_peer(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    let pubkey = state.directory.pubkey_of(&address);
    let outcome = state.scanner.probe_one(&address, pubkey).await;

    Json(serde_json::json!({
        "address": address,
        "accessible": outcome.accessible,
        "stats": outcome.stats,
        "probed_at": outcome.probed_at,
        "failure": outcome.failure,
    }))
}

/// GET /rankings - Current ranking with badges and movement
async fn get_rankings(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let now = current_timestamp();
    let peers = state.directory.list();
    let ranked = state.engine.rank(&peers, &state.cache, now);

    // The ranking itself never depends on the durable store
    let past = match state
        .durable
        .ranking_snapshots(ranking::window_start(BADGE_HISTORY_DAYS, now))
    {
        Ok(snapshots) => snapshots,
        Err(e) => {
            warn!("Ranking history unavailable: {}", e);
            Vec::new()
        }
    };

    let latest = ranking::latest_per_peer(&past);
    let mut past_ranks: HashMap<&str, Vec<u32>> = HashMap::new();
    for snapshot in &past {
        past_ranks.entry(snapshot.address.as_str()).or_default().push(snapshot.rank);
    }
    let countries = badges::country_counts(&ranked);

    let entries: Vec<_> = ranked
        .iter()
        .map(|r| {
            let history = past_ranks.get(r.peer.address.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            serde_json::json!({
                "ranking": r,
                "badges": badges::earned_badges(r, &countries, history, state.engine.latest_version()),
                "rank_change": ranking::rank_change(r.rank, latest.get(&r.peer.address)),
                "watched": state.watchlist.contains(&r.peer.address),
            })
        })
        .collect();

    Json(serde_json::json!({
        "latest_version": state.engine.latest_version(),
        "max_score": scoring::weights::MAX_TOTAL,
        "computed_at": now,
        "count": entries.len(),
        "peers": entries,
    }))
}

#[derive(Debug, Deserialize)]
struct RankingHistoryQuery {
    address: Option<String>,
    #[serde(default = "default_days")]
    days: u64,
}

fn default_days() -> u64 {
    7
}

/// GET /rankings/history?address=&days=
async fn get_ranking_history(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<RankingHistoryQuery>,
) -> Response {
    let since = ranking::window_start(query.days, current_timestamp());
    match state.durable.ranking_snapshots(since) {
        Ok(snapshots) => {
            let snapshots = ranking::history_of(snapshots, query.address.as_deref());
            Json(snapshots).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /rankings/latest - Latest snapshot per peer over the last day
async fn get_latest_rankings(State(state): State<Arc<ApiState>>) -> Response {
    let since = ranking::window_start(1, current_timestamp());
    match state.durable.ranking_snapshots(since) {
        Ok(snapshots) => {
            let mut latest: Vec<_> = ranking::latest_per_peer(&snapshots).into_values().collect();
            latest.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.address.cmp(&b.address)));
            Json(latest).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    #[serde(default = "default_leaderboard_days")]
    days: u64,
}

fn default_leaderboard_days() -> u64 {
    30
}

/// GET /rankings/leaderboard?days= - Top peers per UTC day, newest first
async fn get_leaderboard(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Response {
    let since = ranking::window_start(query.days, current_timestamp());
    match state.durable.ranking_snapshots(since) {
        Ok(snapshots) => {
            Json(ranking::leaderboard_by_day(&snapshots, ranking::LEADERBOARD_SIZE)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /rankings/snapshot - Record the current ranking now
async fn record_ranking_snapshot(State(state): State<Arc<ApiState>>) -> Response {
    let now = current_timestamp();
    let peers = state.directory.list();
    match ranking::record_snapshot(&state.engine, &peers, &state.cache, state.durable.as_ref(), now) {
        Ok(recorded) => {
            state.metrics.add_ranking_snapshots(recorded as u64);
            info!("🏁 Manual ranking snapshot of {} peers", recorded);
            Json(serde_json::json!({
                "recorded": recorded,
                "taken_at": now,
            }))
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /history - Peers with performance history
async fn get_history_peers(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.history.addresses())
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    since: Option<u64>,
}

/// GET /history/:address?since= - In-memory series, durable series as fallback
async fn get_history(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let since = query.since.unwrap_or_else(|| {
        current_timestamp().saturating_sub(state.config.history_retention_secs)
    });

    let snapshots = state.history.query(&address, since);
    if !snapshots.is_empty() {
        return Json(serde_json::json!({ "source": "memory", "snapshots": snapshots })).into_response();
    }

    match state.durable.performance_history(&address) {
        Ok(mut snapshots) => {
            snapshots.retain(|s| s.timestamp >= since);
            Json(serde_json::json!({ "source": "durable", "snapshots": snapshots })).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /history/:address/summary
async fn get_history_summary(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Response {
    match state.history.summary(&address) {
        Some(summary) => Json(summary).into_response(),
        None => not_found(format!("no performance history for {}", address)),
    }
}

/// GET /sync/status
async fn get_sync_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.sync.status())
}

/// POST /sync/trigger - Synchronous manual sync
async fn trigger_sync(State(state): State<Arc<ApiState>>) -> Response {
    match state.sync.trigger_now() {
        Ok(Some(report)) => Json(report).into_response(),
        Ok(None) => {
            let body = RpcError {
                code: 409,
                message: "sync already in progress".to_string(),
            };
            (StatusCode::CONFLICT, Json(serde_json::json!({ "error": body }))).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /admin/cleanup-duplicates
async fn cleanup_duplicates(State(state): State<Arc<ApiState>>) -> Response {
    match state.sync.cleanup_duplicates() {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /watchlist
async fn get_watchlist(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.watchlist.list())
}

/// POST /watchlist/:address
async fn add_to_watchlist(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    let pubkey = state.directory.pubkey_of(&address);
    let added = state.watchlist.add(&address, pubkey.clone());

    let entry = WatchlistEntry {
        address: address.clone(),
        pubkey,
        added_at: current_timestamp(),
    };
    if let Err(e) = state.durable.add_to_watchlist(&entry) {
        warn!("Durable watch-list insert of {} failed: {}", address, e);
    }

    Json(serde_json::json!({ "address": address, "added": added }))
}

/// DELETE /watchlist/:address - Local removal; the durable copy follows best-effort
async fn remove_from_watchlist(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    let removed = state.watchlist.remove(&address);
    if let Err(e) = state.durable.remove_from_watchlist(&address) {
        warn!("Durable watch-list removal of {} failed: {}", address, e);
    }

    Json(serde_json::json!({ "address": address, "removed": removed }))
}

/// GET /metrics - Prometheus format metrics
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    refresh_gauges(&state);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.to_prometheus(),
    )
}

/// GET /metrics/json - JSON format metrics
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    refresh_gauges(&state);
    Json(state.metrics.to_json())
}

fn refresh_gauges(state: &ApiState) {
    state.metrics.set_known_peers(state.directory.len() as u64);
    state.metrics.set_accessible_peers(state.cache.accessible_count() as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::RocksStore;
    use crate::history::PerformanceSample;
    use crate::ranking::scoring::VersionTiers;
    use crate::rpc::StatsProbe;
    use crate::types::{Peer, ProbeOutcome};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    struct AlwaysUp;

    #[async_trait]
    impl StatsProbe for AlwaysUp {
        async fn probe(&self, _address: &str, _timeout: Duration) -> ProbeOutcome {
            ProbeOutcome::accessible(json!({ "uptime": 7200, "cpu_percent": 10.0 }), current_timestamp())
        }
    }

    fn peer(address: &str, version: &str) -> Peer {
        Peer {
            address: address.to_string(),
            pubkey: Some(format!("pk-{}", address)),
            version: version.to_string(),
            geo: None,
            last_seen: current_timestamp(),
        }
    }

    fn test_state(dir: &TempDir) -> Arc<ApiState> {
        let config = Arc::new(MonitorConfig::default());
        let metrics = Arc::new(Metrics::new());
        let cache = Arc::new(StatsCache::new(Duration::from_secs(300)));
        let history = Arc::new(HistoryStore::new(0, 86_400));
        let watchlist = Arc::new(Watchlist::new());
        let durable: Arc<dyn DurableStore> = Arc::new(RocksStore::open(dir.path()).unwrap());
        let probe: Arc<dyn StatsProbe> = Arc::new(AlwaysUp);

        let directory = Arc::new(PeerDirectory::new());
        directory.replace(vec![peer("a:9001", "0.8.0"), peer("b:9001", "0.7.0")]);

        Arc::new(ApiState {
            scanner: Arc::new(AccessibilityScanner::new(
                probe.clone(),
                cache.clone(),
                metrics.clone(),
                4,
                Duration::from_secs(1),
            )),
            collector: Arc::new(PerformanceCollector::new(
                probe,
                cache.clone(),
                history.clone(),
                durable.clone(),
                metrics.clone(),
                Duration::from_secs(1),
                Duration::ZERO,
                86_400,
            )),
            sync: Arc::new(BackgroundSync::new(
                cache.clone(),
                watchlist.clone(),
                durable.clone(),
                metrics.clone(),
            )),
            engine: Arc::new(RankingEngine::new(VersionTiers::parse("0.8.0").unwrap())),
            health: Arc::new(RwLock::new(NetworkHealthAggregator::new("0.8.0"))),
            config,
            cache,
            directory,
            history,
            durable,
            watchlist,
            metrics,
        })
    }

    async fn send(state: &Arc<ApiState>, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = router(state.clone())
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir);

        let (status, _) = send(&state, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&state, "GET", "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["peers"]["known"], 2);
        assert_eq!(body["network"]["total_peers"], 2);
    }

    #[tokio::test]
    async fn test_rankings_prefer_accessible_latest_peer() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir);
        state.cache.set("a:9001", json!({}), true);

        let (status, body) = send(&state, "GET", "/rankings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["max_score"], scoring::weights::MAX_TOTAL);

        let first = &body["peers"][0];
        assert_eq!(first["ranking"]["peer"]["address"], "a:9001");
        assert_eq!(first["ranking"]["rank"], 1);
        assert!(first["rank_change"].is_null());
        assert!(first["badges"]
            .as_array()
            .unwrap()
            .contains(&json!("latest_version")));
    }

    #[tokio::test]
    async fn test_ranking_history_and_latest() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir);
        let now = current_timestamp();
        let ranked = state.engine.rank(&state.directory.list(), &state.cache, now);
        state
            .durable
            .save_ranking_snapshots(&ranking::snapshots_of(&ranked, now))
            .unwrap();

        let (status, body) = send(&state, "GET", "/rankings/history?address=b:9001").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["address"], "b:9001");

        let (_, body) = send(&state, "GET", "/rankings/latest").await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["rank"], 1);
    }

    #[tokio::test]
    async fn test_manual_snapshot_feeds_leaderboard() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir);

        let (status, body) = send(&state, "GET", "/rankings/leaderboard").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let (status, body) = send(&state, "POST", "/rankings/snapshot").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recorded"], 2);
        let taken_at = body["taken_at"].as_u64().unwrap();
        assert_eq!(state.durable.latest_ranking_snapshot_at().unwrap(), Some(taken_at));

        let (status, body) = send(&state, "GET", "/rankings/leaderboard?days=7").await;
        assert_eq!(status, StatusCode::OK);
        let days = body.as_array().unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0]["date"].as_str().unwrap().len(), 10);
        assert_eq!(days[0]["peers"][0]["address"], "a:9001");
        assert_eq!(days[0]["peers"][0]["rank"], 1);
        assert_eq!(days[0]["peers"][1]["rank"], 2);
    }

    #[tokio::test]
    async fn test_probe_writes_cache() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir);

        let (status, body) = send(&state, "POST", "/peers/a:9001/probe").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accessible"], true);
        assert!(state.cache.is_accessible("a:9001"));
    }

    #[tokio::test]
    async fn test_history_memory_then_durable() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir);
        let now = current_timestamp();

        let sample = PerformanceSample {
            cpu_percent: 12.5,
            ..Default::default()
        };
        let snapshot = state.history.append_at("a:9001", sample, now).unwrap();
        state.durable.save_performance(&snapshot, 0).unwrap();

        let (_, body) = send(&state, "GET", "/history/a:9001").await;
        assert_eq!(body["source"], "memory");
        assert_eq!(body["snapshots"].as_array().unwrap().len(), 1);

        let (status, _) = send(&state, "GET", "/history/a:9001/summary").await;
        assert_eq!(status, StatusCode::OK);

        state.history.clear();
        let (_, body) = send(&state, "GET", "/history/a:9001").await;
        assert_eq!(body["source"], "durable");
        assert_eq!(body["snapshots"][0]["cpu_percent"], 12.5);

        let (status, body) = send(&state, "GET", "/history/a:9001/summary").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 404);
    }

    #[tokio::test]
    async fn test_sync_trigger_and_status() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir);
        state.cache.set("a:9001", json!({ "uptime": 1 }), true);

        let (status, body) = send(&state, "POST", "/sync/trigger").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records_synced"], 1);

        let (_, body) = send(&state, "GET", "/sync/status").await;
        assert_eq!(body["syncing"], false);
        assert!(!body["last_sync"].is_null());
    }

    #[tokio::test]
    async fn test_sync_trigger_reports_store_outage() {
        let dir = tempdir().unwrap();
        let store_dir = tempdir().unwrap();
        let store = Arc::new(RocksStore::open(store_dir.path()).unwrap());
        let state = test_state(&dir);
        let sync = Arc::new(BackgroundSync::new(
            state.cache.clone(),
            state.watchlist.clone(),
            store.clone(),
            state.metrics.clone(),
        ));
        store.close().unwrap();
        state.cache.set("a:9001", json!({}), true);

        let state = Arc::new(ApiState {
            config: state.config.clone(),
            cache: state.cache.clone(),
            directory: state.directory.clone(),
            scanner: state.scanner.clone(),
            collector: state.collector.clone(),
            history: state.history.clone(),
            durable: store,
            sync,
            watchlist: state.watchlist.clone(),
            engine: state.engine.clone(),
            health: state.health.clone(),
            metrics: state.metrics.clone(),
        });

        let (status, body) = send(&state, "POST", "/sync/trigger").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"]["message"].as_str().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_watchlist_add_and_remove() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir);

        let (_, body) = send(&state, "POST", "/watchlist/a:9001").await;
        assert_eq!(body["added"], true);
        let (_, body) = send(&state, "POST", "/watchlist/a:9001").await;
        assert_eq!(body["added"], false);

        let (_, body) = send(&state, "GET", "/watchlist").await;
        assert_eq!(body[0]["pubkey"], "pk-a:9001");
        assert_eq!(state.durable.watchlist().unwrap().len(), 1);

        let (_, body) = send(&state, "DELETE", "/watchlist/a:9001").await;
        assert_eq!(body["removed"], true);
        assert!(state.watchlist.is_empty());
        assert!(state.durable.watchlist().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_endpoints() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir);

        let response = router(state.clone())
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("pnode_monitor_known_peers 2"));

        let (_, body) = send(&state, "GET", "/metrics/json").await;
        assert!(body.is_object());
    }
}
