// JSON-RPC 2.0 envelopes spoken by the gossip and stats endpoints
use serde::{Deserialize, Serialize};

use crate::types::GeoInfo;

// =============================================================================
// JSON-RPC 2.0 PROTOCOL TYPES
// =============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,

    /// Method name (e.g., "get-stats")
    pub method: String,

    /// Method parameters, omitted when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,

    /// Request ID
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,

    /// Result (present on success)
    #[serde(default)]
    pub result: Option<serde_json::Value>,

    /// Error (present on failure)
    #[serde(default)]
    pub error: Option<JsonRpcError>,

    #[serde(default)]
    pub id: serde_json::Value,
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

// =============================================================================
// GOSSIP DISCOVERY
// =============================================================================

/// `get-pods` result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetPodsResult {
    #[serde(default)]
    pub pods: Vec<Pod>,

    #[serde(default)]
    pub total_count: usize,
}

/// One peer record as reported by gossip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    pub address: String,

    #[serde(default)]
    pub version: String,

    /// Unix seconds
    #[serde(default)]
    pub last_seen_timestamp: u64,

    #[serde(default)]
    pub pubkey: Option<String>,

    /// Geographic annotation, when the endpoint enriches it
    #[serde(default)]
    pub geo: Option<GeoInfo>,
}
