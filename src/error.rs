//! Error taxonomy
//!
//! Probe errors are always recovered by the caller and downgraded to an
//! inaccessible cache entry. Durable store errors abort only the current
//! sync or persistence call. Nothing here is fatal to the process.

use serde::{Deserialize, Serialize};

use crate::types::ProbeFailure;

/// JSON-RPC server error range used for locally generated errors
pub mod codes {
    pub const PROBE_TIMEOUT: i32 = -32001;
    pub const PROBE_NETWORK: i32 = -32002;
    pub const PROBE_PROTOCOL: i32 = -32003;
    pub const STORE_UNAVAILABLE: i32 = -32010;
    pub const CORRUPT_RECORD: i32 = -32011;
    pub const DUPLICATE_IDENTITY: i32 = -32012;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MonitorError {
    #[error("probe timed out after {0}ms")]
    ProbeTimeout(u64),

    #[error("network error: {0}")]
    ProbeNetwork(String),

    #[error("protocol error: {0}")]
    ProbeProtocol(String),

    /// A JSON-RPC error object returned by the remote side
    #[error("rpc error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("durable store unavailable: {0}")]
    DurableStoreUnavailable(String),

    #[error("corrupt durable record: {0}")]
    CorruptRecord(String),

    #[error("duplicate identity for {pubkey}: rows {kept} and {removed}")]
    DuplicateIdentityConflict {
        pubkey: String,
        kept: u64,
        removed: u64,
    },
}

impl MonitorError {
    /// Probe classification, `None` for non-probe errors
    pub fn probe_failure(&self) -> Option<ProbeFailure> {
        match self {
            MonitorError::ProbeTimeout(_) => Some(ProbeFailure::Timeout),
            MonitorError::ProbeNetwork(_) => Some(ProbeFailure::Network),
            MonitorError::ProbeProtocol(_) | MonitorError::Remote { .. } => {
                Some(ProbeFailure::Protocol)
            }
            _ => None,
        }
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, MonitorError::DurableStoreUnavailable(_))
    }

    pub fn code(&self) -> i32 {
        match self {
            MonitorError::ProbeTimeout(_) => codes::PROBE_TIMEOUT,
            MonitorError::ProbeNetwork(_) => codes::PROBE_NETWORK,
            MonitorError::ProbeProtocol(_) => codes::PROBE_PROTOCOL,
            MonitorError::Remote { code, .. } => *code,
            MonitorError::DurableStoreUnavailable(_) => codes::STORE_UNAVAILABLE,
            MonitorError::CorruptRecord(_) => codes::CORRUPT_RECORD,
            MonitorError::DuplicateIdentityConflict { .. } => codes::DUPLICATE_IDENTITY,
        }
    }
}

impl From<rocksdb::Error> for MonitorError {
    fn from(e: rocksdb::Error) -> Self {
        MonitorError::DurableStoreUnavailable(e.to_string())
    }
}

impl From<bincode::Error> for MonitorError {
    fn from(e: bincode::Error) -> Self {
        MonitorError::CorruptRecord(e.to_string())
    }
}

/// Structured error handed to cross-boundary callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl From<&MonitorError> for RpcError {
    fn from(e: &MonitorError) -> Self {
        let message = match e {
            MonitorError::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            code: e.code(),
            message,
        }
    }
}

impl From<MonitorError> for RpcError {
    fn from(e: MonitorError) -> Self {
        RpcError::from(&e)
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
