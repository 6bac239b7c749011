//! Live tests of both wallet backends.
//!
//! Run with: cargo test -p monero-wallet --test live -- --ignored --nocapture
//!
//! Requires a stagenet daemon at MONERO_DAEMON_URL (default:
//! http://localhost:38081) and a wallet service with an open, funded wallet
//! at MONERO_WALLET_RPC_URL (default: http://localhost:38083).

use monero_types::Network;
use monero_wallet::{
    BlockSource, MoneroWallet, OutputQuery, RemoteWallet, SendPriority, SendRequest, TransferQuery, TxQuery,
    WalletError,
};
use monero_rpc::{DaemonRpc, RpcConfig};

fn daemon_url() -> String {
    std::env::var("MONERO_DAEMON_URL").unwrap_or_else(|_| "http://localhost:38081".to_string())
}

fn wallet() -> RemoteWallet {
    let url = std::env::var("MONERO_WALLET_RPC_URL").unwrap_or_else(|_| "http://localhost:38083".to_string());
    RemoteWallet::connect(RpcConfig {
        url,
        ..Default::default()
    })
    .expect("wallet client")
    .with_network(Network::Stagenet)
}

// ─── 1. Remote wallet ───────────────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn test_accounts_balance_sums() {
    let w = wallet();
    let accounts = w.get_accounts(true, None).await.expect("get_accounts failed");
    assert!(!accounts.is_empty());
    for account in &accounts {
        account.check_balances().expect("account balance should equal its subaddresses");
    }
    let total: u64 = accounts.iter().map(|a| a.balance).sum();
    assert_eq!(total, w.get_balance(None, None).await.expect("get_balance failed"));
}

#[tokio::test]
#[ignore]
async fn test_integrated_address_round_trip() {
    let w = wallet();
    let integrated = w
        .get_integrated_address(None, Some("03284e41c342f032"))
        .await
        .expect("make_integrated_address failed");
    let decoded = w.decode_integrated_address(&integrated).await.expect("decode failed");
    assert_eq!(decoded.payment_id(), Some("03284e41c342f032"));
    assert_eq!(decoded.standard_address(), w.primary_address().await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_txs_are_unique_and_consistent() {
    let w = wallet();
    let txs = w.get_txs(&TxQuery::default()).await.expect("get_txs failed");
    let mut ids: Vec<&str> = txs.iter().map(|t| t.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), txs.len(), "txs should be merged by id");

    let incoming = w.get_transfers(&TransferQuery::incoming()).await.expect("get_transfers failed");
    assert!(incoming.iter().all(|t| t.is_incoming));
    let unspent = w.get_outputs(&OutputQuery::unspent()).await.expect("get_outputs failed");
    assert!(unspent.iter().all(|o| o.is_spent != Some(true)));
}

#[tokio::test]
#[ignore]
async fn test_send_to_self_without_relay() {
    let w = wallet();
    let me = w.primary_address().await.unwrap();
    let unlocked = w.get_unlocked_balance(Some(0), None).await.unwrap();
    if unlocked < 1_000_000 {
        println!("skipping: unlocked balance {} too low", unlocked);
        return;
    }
    let request = SendRequest::payment(0, &me, unlocked / 20, SendPriority::Default).do_not_relay(true);
    let tx = w.create_tx(&request).await.expect("transfer failed");
    assert!(tx.fee.unwrap_or(0) > 0);
    assert_eq!(tx.height, None);
    assert!(tx.metadata.is_some());
    let out = tx.outgoing_transfer.expect("outgoing transfer");
    assert_eq!(out.destinations.len(), 1);
    assert_eq!(out.destinations[0].amount, unlocked / 20);
}

#[tokio::test]
#[ignore]
async fn test_missing_attribute_is_none() {
    let w = wallet();
    assert_eq!(w.get_attribute("never-set-by-tests").await.unwrap(), None);
}

#[tokio::test]
#[ignore]
async fn test_open_missing_wallet() {
    let w = wallet();
    let result = RemoteWallet::open(w.rpc().clone(), "no-such-wallet-file", "").await;
    assert!(matches!(result, Err(WalletError::WalletNotFound(_))));
}

// ─── 2. Daemon as block source ──────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn test_daemon_block_source() {
    let daemon = DaemonRpc::new(&daemon_url()).expect("daemon client");
    let height = daemon.chain_height().await.expect("chain_height failed");
    assert!(height > 1);
    let block = daemon.block(height - 1).await.expect("block failed");
    assert_eq!(block.height, height - 1);
    assert_eq!(block.hash.len(), 64);
    assert_eq!(block.tx_blobs.len(), block.tx_hashes.len());
}
