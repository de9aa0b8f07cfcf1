//! JSON-RPC Call Primitive
//!
//! One POST per call, bounded by a hard deadline. The deadline wraps the whole
//! request future in `tokio::time::timeout`; when it fires the future is
//! dropped, which aborts the in-flight request and releases its connection.

use std::time::Duration;
use tracing::debug;

use super::types::{JsonRpcRequest, JsonRpcResponse};
use crate::error::{MonitorError, Result, RpcError};

/// Shared HTTP client for gossip and stats calls
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
}

impl RpcClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MonitorError::ProbeNetwork(format!("HTTP client error: {}", e)))?;

        Ok(Self { http })
    }

    /// Call `method` on `endpoint` and return its `result`
    pub async fn call(
        &self,
        endpoint: &str,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let request = JsonRpcRequest::new(method, params);

        match tokio::time::timeout(timeout, self.send(endpoint, &request)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("{} on {} abandoned after {:?}", method, endpoint, timeout);
                Err(MonitorError::ProbeTimeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Same as [`RpcClient::call`], errors folded into `{code, message}`
    pub async fn call_structured(
        &self,
        endpoint: &str,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> std::result::Result<serde_json::Value, RpcError> {
        self.call(endpoint, method, params, timeout)
            .await
            .map_err(RpcError::from)
    }

    async fn send(&self, endpoint: &str, request: &JsonRpcRequest) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(endpoint)
            .json(request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::ProbeProtocol(format!("HTTP error: {}", status)));
        }

        let body = response.bytes().await.map_err(classify_transport)?;

        let envelope: JsonRpcResponse = serde_json::from_slice(&body)
            .map_err(|e| MonitorError::ProbeProtocol(format!("JSON parse failed: {}", e)))?;

        if let Some(error) = envelope.error {
            return Err(MonitorError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        match envelope.result {
            Some(serde_json::Value::Null) | None => {
                Err(MonitorError::ProbeProtocol("response carries no result".to_string()))
            }
            Some(result) => Ok(result),
        }
    }
}

fn classify_transport(e: reqwest::Error) -> MonitorError {
    if e.is_timeout() {
        MonitorError::ProbeTimeout(0)
    } else if e.is_decode() || e.is_body() {
        MonitorError::ProbeProtocol(e.to_string())
    } else {
        MonitorError::ProbeNetwork(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/rpc", addr)
    }

    #[tokio::test]
    async fn test_call_returns_result() {
        let app = Router::new().route(
            "/rpc",
            post(|Json(req): Json<serde_json::Value>| async move {
                Json(json!({ "jsonrpc": "2.0", "id": req["id"], "result": { "method": req["method"] } }))
            }),
        );
        let endpoint = serve(app).await;

        let client = RpcClient::new().unwrap();
        let result = client
            .call(&endpoint, "get-stats", None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(result["method"], "get-stats");
    }

    #[tokio::test]
    async fn test_remote_error_is_structured() {
        let app = Router::new().route(
            "/rpc",
            post(|| async {
                Json(json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32601, "message": "Method not found" } }))
            }),
        );
        let endpoint = serve(app).await;

        let client = RpcClient::new().unwrap();
        let err = client
            .call_structured(&endpoint, "nope", None, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "Method not found");
    }

    #[tokio::test]
    async fn test_malformed_body_is_protocol_error() {
        let app = Router::new().route("/rpc", post(|| async { "not json" }));
        let endpoint = serve(app).await;

        let client = RpcClient::new().unwrap();
        let err = client
            .call(&endpoint, "get-stats", None, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::ProbeProtocol(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RpcClient::new().unwrap();
        let err = client
            .call(&format!("http://{}/rpc", addr), "get-stats", None, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::ProbeNetwork(_)));
    }
}
