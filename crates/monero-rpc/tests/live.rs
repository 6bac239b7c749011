//! Live tests against a running daemon and wallet service.
//!
//! Run with: cargo test -p monero-rpc --test live -- --ignored
//!
//! Requires a daemon at MONERO_DAEMON_URL (default: http://localhost:38081)
//! and, for the wallet tests, a wallet service with an open wallet at
//! MONERO_WALLET_RPC_URL (default: http://localhost:38083).

use monero_rpc::daemon::KeyImageSpentStatus;
use monero_rpc::{DaemonRpc, RpcError, WalletRpc};
use monero_types::validate_address;

fn daemon() -> DaemonRpc {
    let url = std::env::var("MONERO_DAEMON_URL").unwrap_or_else(|_| "http://localhost:38081".to_string());
    DaemonRpc::new(&url).expect("daemon client")
}

fn wallet() -> WalletRpc {
    let url = std::env::var("MONERO_WALLET_RPC_URL").unwrap_or_else(|_| "http://localhost:38083".to_string());
    WalletRpc::new(&url).expect("wallet client")
}

// ─── 1. Daemon ──────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn test_get_info() {
    let info = daemon().get_info().await.expect("get_info failed");
    assert!(info.height > 0, "height should be positive");
    assert_eq!(info.info.status, "OK");
    println!("Daemon height: {} ({})", info.height, info.network());
}

#[tokio::test]
#[ignore]
async fn test_block_count_matches_height() {
    let d = daemon();
    let count = d.get_block_count().await.expect("get_block_count failed");
    let height = d.get_height().await.expect("get_height failed");
    assert!(height.abs_diff(*count) <= 1);
}

#[tokio::test]
#[ignore]
async fn test_genesis_header_and_hash() {
    let d = daemon();
    let header = d.get_block_header_by_height(0).await.expect("header failed");
    let hash = d.get_block_hash(0).await.expect("hash failed");
    assert_eq!(header.height, 0);
    assert_eq!(header.hash, hash);
    assert!(header.reward > 0);
}

#[tokio::test]
#[ignore]
async fn test_headers_range() {
    let headers = daemon().get_block_headers_range(1, 5).await.expect("range failed");
    let heights: Vec<u64> = headers.iter().map(|h| h.height).collect();
    assert_eq!(heights, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
#[ignore]
async fn test_output_indices_of_miner_tx() {
    let d = daemon();
    let block = d.get_block_by_height(10).await.expect("get_block failed");
    let indices = d.get_output_indices(&block.miner_tx_hash).await.expect("get_o_indexes failed");
    assert!(!indices.is_empty());

    let outs = d
        .get_outs_bin(&[monero_rpc::daemon::OutputRequest { amount: 0, index: indices[0] }], true)
        .await
        .expect("get_outs.bin failed");
    assert_eq!(outs[0].key.len(), 64);
}

#[tokio::test]
#[ignore]
async fn test_fake_key_image_not_spent() {
    let ki = "00".repeat(32);
    let status = daemon().is_key_image_spent(&[&ki]).await.expect("is_key_image_spent failed");
    assert_eq!(status.value, vec![KeyImageSpentStatus::NotSpent]);
}

#[tokio::test]
#[ignore]
async fn test_send_raw_tx_rejects_garbage() {
    let result = daemon().send_raw_transaction("deadbeef", true).await.expect("send_raw failed");
    assert_ne!(result.info.status, "OK");
}

#[tokio::test]
#[ignore]
async fn test_backlog_not_implemented() {
    assert!(matches!(
        daemon().get_tx_pool_backlog().await,
        Err(RpcError::NotImplemented(_))
    ));
}

// ─── 2. Wallet service ──────────────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn test_wallet_address_validates() {
    let addr = wallet().get_address(0, &[]).await.expect("get_address failed");
    validate_address(&addr.address, None).expect("primary address should validate");
}

#[tokio::test]
#[ignore]
async fn test_wallet_accounts_sum() {
    let w = wallet();
    let accounts = w.get_accounts(None).await.expect("get_accounts failed");
    let total: u64 = accounts.subaddress_accounts.iter().map(|a| a.balance).sum();
    assert_eq!(total, accounts.total_balance);
}

#[tokio::test]
#[ignore]
async fn test_wallet_invalid_txid() {
    let err = wallet().get_tx_key("zz").await.unwrap_err();
    assert_eq!(err.rpc_code(), Some(monero_rpc::error::codes::WALLET_WRONG_TXID));
}
