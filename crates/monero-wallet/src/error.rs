//! Wallet error types.

use monero_rpc::RpcError;
use monero_types::AddressError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    /// Transport failure: connection refused, timeout, non-2xx status.
    #[error("network error: {0}")]
    Network(#[source] RpcError),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The peer answered, but the body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("wallet is not connected to a daemon")]
    NotConnected,

    #[error("wallet is closed")]
    WalletClosed,

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("wallet already exists: {0}")]
    WalletAlreadyExists(String),

    /// Two observations of the same entity disagree on a field.
    #[error("cannot reconcile {field}: {left} != {right}")]
    Reconcile { field: String, left: String, right: String },

    #[error("transaction already relayed: {0}")]
    TxAlreadyRelayed(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("operation cancelled")]
    Cancelled,

    /// A listener called back into a wallet method that takes the wallet lock.
    #[error("re-entrant wallet call from a listener")]
    ReentrantCall,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid wallet file: {0}")]
    InvalidFile(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption failed (wrong password or corrupted data)")]
    DecryptionFailed,

    /// Failure reported by the delegated key engine.
    #[error("key engine: {0}")]
    Engine(String),
}

impl WalletError {
    pub fn is_network(&self) -> bool {
        matches!(self, WalletError::Network(_))
    }
}

impl From<RpcError> for WalletError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Rpc { code, message, .. } => WalletError::Rpc { code, message },
            RpcError::NotImplemented(what) => WalletError::NotImplemented(what),
            RpcError::Status { ref status, .. } if status != "BUSY" => WalletError::Rpc {
                code: 0,
                message: status.clone(),
            },
            RpcError::Json(_) | RpcError::NoResult { .. } | RpcError::PortableStorage(_) => {
                WalletError::InvalidResponse(e.to_string())
            }
            other => WalletError::Network(other),
        }
    }
}

impl From<AddressError> for WalletError {
    fn from(e: AddressError) -> Self {
        if e.is_encoding() {
            WalletError::InvalidEncoding(e.to_string())
        } else {
            WalletError::InvalidAddress(e.to_string())
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::InvalidFile(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_mapping() {
        let rpc = RpcError::Rpc {
            code: -13,
            message: "No wallet file".into(),
            method: "get_balance".into(),
        };
        assert!(matches!(WalletError::from(rpc), WalletError::Rpc { code: -13, .. }));

        let timeout = RpcError::Timeout { method: "get_info".into(), url: "u".into() };
        assert!(WalletError::from(timeout).is_network());

        let busy = RpcError::Status { method: "get_info".into(), status: "BUSY".into() };
        assert!(WalletError::from(busy).is_network());

        let failed = RpcError::Status { method: "relay_tx".into(), status: "Failed".into() };
        assert!(matches!(WalletError::from(failed), WalletError::Rpc { code: 0, .. }));

        let empty = RpcError::NoResult { context: "get_info".into() };
        let mapped = WalletError::from(empty);
        assert!(!mapped.is_network());
        assert!(matches!(mapped, WalletError::InvalidResponse(_)));

        let garbled = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(WalletError::from(RpcError::Json(garbled)), WalletError::InvalidResponse(_)));

        let bin = RpcError::PortableStorage("bad signature".into());
        assert!(!WalletError::from(bin).is_network());

        assert!(matches!(
            WalletError::from(RpcError::NotImplemented("check_for_update")),
            WalletError::NotImplemented("check_for_update")
        ));
    }

    #[test]
    fn test_address_error_mapping() {
        let overflow = monero_types::validate_address(&"z".repeat(95), None).unwrap_err();
        assert!(matches!(WalletError::from(overflow), WalletError::InvalidEncoding(_)));

        let short = monero_types::validate_address("4AYjQM", None).unwrap_err();
        assert!(matches!(WalletError::from(short), WalletError::InvalidAddress(_)));
    }
}
