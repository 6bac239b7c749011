//! Remote wallet tests against a one-shot local wallet service.

use monero_rpc::RpcConfig;
use monero_wallet::{MoneroWallet, RemoteWallet, WalletError};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const METADATA: &str = "7b226964223a226161227d";
const TX_HASH: &str = "c1b2b4e1f5a1d4e3b0cb0b67a4fa56e6e1c2a6b2f5c0e4d3f1b2a5c6d7e8f901";

/// Answer exactly one JSON-RPC request with `body`, returning the request body.
async fn serve_once(body: Value) -> (String, JoinHandle<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = sock.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let len: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        while buf.len() < header_end + len {
            let n = sock.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
        }

        let payload = serde_json::to_vec(&body).unwrap();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            payload.len()
        );
        sock.write_all(response.as_bytes()).await.unwrap();
        sock.write_all(&payload).await.unwrap();
        sock.shutdown().await.ok();

        serde_json::from_slice(&buf[header_end..header_end + len]).unwrap()
    });
    (url, handle)
}

fn wallet(url: String) -> RemoteWallet {
    RemoteWallet::connect(RpcConfig {
        url,
        ..Default::default()
    })
    .unwrap()
}

// ─── Relay ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_relay_is_cached_per_wallet() {
    let (url, server) = serve_once(json!({
        "jsonrpc": "2.0",
        "id": "0",
        "result": { "tx_hash": TX_HASH }
    }))
    .await;
    let w = wallet(url);

    let ids = w.relay_txs(&[METADATA.to_string()]).await.unwrap();
    assert_eq!(ids, vec![TX_HASH.to_string()]);
    let request = server.await.unwrap();
    assert_eq!(request["method"], "relay_tx");
    assert_eq!(request["params"]["hex"], METADATA);

    // The responder is gone; a second relay must not reach the service.
    assert_eq!(w.relay_tx(METADATA).await.unwrap(), TX_HASH);
}

#[tokio::test]
async fn test_relay_from_fresh_wallet_reports_already_relayed() {
    let (url, server) = serve_once(json!({
        "jsonrpc": "2.0",
        "id": "0",
        "result": { "tx_hash": TX_HASH }
    }))
    .await;
    let first = wallet(url);
    assert_eq!(first.relay_tx(METADATA).await.unwrap(), TX_HASH);
    server.await.unwrap();

    let (url, server) = serve_once(json!({
        "jsonrpc": "2.0",
        "id": "0",
        "error": {
            "code": -4,
            "message": "Transaction was rejected by daemon with status: Failed. Reason: double spend"
        }
    }))
    .await;
    let second = wallet(url);
    let err = second.relay_tx(METADATA).await.unwrap_err();
    assert!(matches!(err, WalletError::TxAlreadyRelayed(_)), "got {:?}", err);
    server.await.unwrap();
}

#[tokio::test]
async fn test_relay_other_rejection_stays_rpc_error() {
    let (url, server) = serve_once(json!({
        "jsonrpc": "2.0",
        "id": "0",
        "error": { "code": -27, "message": "Failed to parse tx metadata" }
    }))
    .await;
    let err = wallet(url).relay_tx("zz").await.unwrap_err();
    assert!(matches!(err, WalletError::Rpc { code: -27, .. }), "got {:?}", err);
    server.await.unwrap();
}
