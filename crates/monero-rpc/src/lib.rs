//! Monero RPC client library.
//!
//! Provides async HTTP clients for the Monero daemon and wallet-service
//! JSON-RPC interfaces, plus Epee portable storage binary format support
//! for `.bin` endpoints.
//!
//! # Example
//!
//! ```ignore
//! use monero_rpc::DaemonRpc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let daemon = DaemonRpc::new("http://localhost:18081").unwrap();
//!     let info = daemon.get_info().await.unwrap();
//!     println!("Height: {} (trusted: {})", info.height, info.info.is_trusted);
//! }
//! ```

pub mod error;
pub mod client;
pub mod daemon;
pub mod wallet_rpc;
pub mod portable_storage;

pub use client::{RpcClient, RpcConfig, RpcConnection};
pub use daemon::{DaemonRpc, ResponseInfo, Tagged};
pub use wallet_rpc::WalletRpc;
pub use error::RpcError;

/// Default RPC ports.
pub mod ports {
    pub const DAEMON_MAINNET: u16 = 18081;
    pub const DAEMON_TESTNET: u16 = 28081;
    pub const DAEMON_STAGENET: u16 = 38081;
    pub const WALLET_MAINNET: u16 = 18083;
    pub const WALLET_TESTNET: u16 = 28083;
    pub const WALLET_STAGENET: u16 = 38083;
}
