//! RPC error types.

use thiserror::Error;

/// Error codes returned by the daemon and wallet service.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Generic wallet failure, also returned when no wallet is open.
    pub const WALLET_UNKNOWN_ERROR: i64 = -1;
    pub const WALLET_WRONG_ADDRESS: i64 = -2;
    pub const WALLET_WRONG_TXID: i64 = -8;
    pub const WALLET_NOT_OPEN: i64 = -13;
    pub const WALLET_ALREADY_EXISTS: i64 = -21;
    pub const WALLET_WRONG_KEY: i64 = -25;
    pub const WALLET_ATTRIBUTE_NOT_FOUND: i64 = -45;
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("{method}: request to {url} failed: {source}")]
    Http {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method}: HTTP {status} from {url}: {body}")]
    HttpStatus {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("{method}: request to {url} timed out")]
    Timeout { method: String, url: String },

    #[error("authentication failed for {url}")]
    AuthFailed { url: String },

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        method: String,
    },

    #[error("{method}: status {status}")]
    Status { method: String, status: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no result in response to {context}")]
    NoResult { context: String },

    #[error("portable storage error: {0}")]
    PortableStorage(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl RpcError {
    /// Transport-level failure: connection, timeout, or non-2xx status.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            RpcError::Http { .. } | RpcError::HttpStatus { .. } | RpcError::Timeout { .. } | RpcError::AuthFailed { .. }
        )
    }

    /// Worth retrying: the peer was unreachable, overloaded or slow.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Http { .. } | RpcError::Timeout { .. } => true,
            RpcError::HttpStatus { status, .. } => *status >= 500,
            RpcError::Status { status, .. } => status == "BUSY",
            _ => false,
        }
    }

    /// HTTP status code, when the failure carried one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            RpcError::HttpStatus { status, .. } => Some(*status),
            RpcError::AuthFailed { .. } => Some(401),
            RpcError::Http { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// JSON-RPC error code, when the peer returned an error object.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            RpcError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}
