//! Transport tests against a one-shot local HTTP responder.

use monero_rpc::portable_storage::{self, PsMap, PsValue};
use monero_rpc::{DaemonRpc, RpcClient, RpcConfig, RpcConnection, RpcError, WalletRpc};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A captured HTTP request.
struct Captured {
    head: String,
    body: Vec<u8>,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    fn path(&self) -> &str {
        self.head.split_whitespace().nth(1).unwrap_or_default()
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Serve exactly one request with the given status, content type and body.
async fn serve_once(status: u16, content_type: &str, body: Vec<u8>) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let content_type = content_type.to_string();

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
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let captured = Captured { head, body: Vec::new() };
        let len: usize = captured.header("content-length").and_then(|v| v.parse().ok()).unwrap_or(0);
        while buf.len() < header_end + len {
            let n = sock.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
        }

        let reason = if status == 200 { "OK" } else { "Error" };
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            reason,
            content_type,
            body.len()
        );
        sock.write_all(response.as_bytes()).await.unwrap();
        sock.write_all(&body).await.unwrap();
        sock.shutdown().await.ok();

        Captured {
            body: buf[header_end..header_end + len].to_vec(),
            ..captured
        }
    });
    (url, handle)
}

async fn serve_json(body: Value) -> (String, JoinHandle<Captured>) {
    serve_once(200, "application/json", serde_json::to_vec(&body).unwrap()).await
}

#[tokio::test]
async fn test_json_rpc_envelope_and_result() {
    let (url, server) = serve_json(json!({
        "id": "0",
        "jsonrpc": "2.0",
        "result": { "count": 993163, "status": "OK", "untrusted": false }
    }))
    .await;

    let daemon = DaemonRpc::new(&url).unwrap();
    let count = daemon.get_block_count().await.unwrap();
    assert_eq!(*count, 993163);
    assert!(count.info.is_trusted);

    let req = server.await.unwrap();
    assert_eq!(req.path(), "/json_rpc");
    assert_eq!(req.json(), json!({"jsonrpc": "2.0", "id": "0", "method": "get_block_count"}));
    assert!(req.header("authorization").is_none());
}

#[tokio::test]
async fn test_rpc_error_object() {
    let (url, server) = serve_json(json!({
        "id": "0",
        "jsonrpc": "2.0",
        "error": { "code": -2, "message": "Invalid address" }
    }))
    .await;

    let wallet = WalletRpc::new(&url).unwrap();
    let err = wallet.get_address_index("nope").await.unwrap_err();
    match err {
        RpcError::Rpc { code, message, method } => {
            assert_eq!(code, -2);
            assert_eq!(message, "Invalid address");
            assert_eq!(method, "get_address_index");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn test_http_status_is_network_error() {
    let (url, server) = serve_once(500, "text/plain", b"boom".to_vec()).await;
    let client = RpcClient::new(&url).unwrap();
    let err = client.send_json_request("get_info", None).await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(err.http_status(), Some(500));
    server.await.unwrap();
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth_failed() {
    let (url, server) = serve_once(401, "text/plain", Vec::new()).await;
    let conn = RpcConnection::with_credentials(&url, "rpc", "pw");
    let client = RpcClient::with_config(conn.into()).unwrap();
    let err = client.send_path_request("get_height", None).await.unwrap_err();
    assert!(matches!(err, RpcError::AuthFailed { .. }));

    let req = server.await.unwrap();
    assert_eq!(req.header("authorization"), Some("Basic cnBjOnB3"));
}

#[tokio::test]
async fn test_path_request() {
    let (url, server) = serve_json(json!({"height": 3195144, "status": "OK", "untrusted": false})).await;
    let daemon = DaemonRpc::new(&url).unwrap();
    assert_eq!(daemon.get_height().await.unwrap(), 3195144);

    let req = server.await.unwrap();
    assert_eq!(req.path(), "/get_height");
    assert_eq!(req.json(), json!({}));
}

#[tokio::test]
async fn test_binary_request_roundtrip() {
    let mut response = PsMap::new();
    response.insert(
        "o_indexes".into(),
        PsValue::Array(vec![PsValue::Uint64(7), PsValue::Uint64(8), PsValue::Uint64(9)]),
    );
    response.insert("status".into(), PsValue::String(b"OK".to_vec()));
    response.insert("untrusted".into(), PsValue::Bool(false));
    let body = portable_storage::serialize(&response).unwrap();

    let (url, server) = serve_once(200, "application/octet-stream", body).await;
    let daemon = DaemonRpc::new(&url).unwrap();
    let txid = "ab".repeat(32);
    let indices = daemon.get_output_indices(&txid).await.unwrap();
    assert_eq!(indices.value, vec![7, 8, 9]);
    assert!(indices.info.is_trusted);

    let req = server.await.unwrap();
    assert_eq!(req.path(), "/get_o_indexes.bin");
    let sent = portable_storage::deserialize(&req.body).unwrap();
    assert_eq!(sent.get("txid").and_then(PsValue::as_bytes), Some(&[0xAB; 32][..]));
}

#[tokio::test]
async fn test_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (_sock, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let config = RpcConfig {
        url,
        timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let client = RpcClient::with_config(config).unwrap();
    let err = client.send_json_request("get_info", None).await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout { .. }), "got {err:?}");
    assert!(err.is_network());
    server.abort();
}

#[tokio::test]
async fn test_untrusted_daemon_response() {
    let (url, server) = serve_json(json!({
        "id": "0",
        "jsonrpc": "2.0",
        "result": { "height": 10, "status": "OK", "untrusted": true, "nettype": "testnet", "testnet": true }
    }))
    .await;
    let info = DaemonRpc::new(&url).unwrap().get_info().await.unwrap();
    assert!(!info.info.is_trusted);
    assert_eq!(info.network(), monero_types::Network::Testnet);
    server.await.unwrap();
}
