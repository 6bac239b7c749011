//! Base JSON-RPC 2.0 HTTP client.
//!
//! Provides `send_json_request()` for JSON-RPC methods (POST to `/json_rpc`),
//! `send_path_request()` for JSON endpoints addressed by path and
//! `send_binary_request()` for portable-storage `.bin` endpoints.
//! Supports Basic auth, a per-call timeout, and optional retry with
//! exponential backoff.

use crate::error::RpcError;
use crate::portable_storage::{self, PsMap};
use base64::Engine;
use log::{trace, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// JSON-RPC 2.0 request envelope. The daemon and wallet service ignore the
/// id, so it is always `"0"`.
#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

/// JSON-RPC 2.0 error object.
#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Endpoint identity: where to connect and with which credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RpcConnection {
    pub uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl RpcConnection {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.trim_end_matches('/').to_string(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(uri: &str, username: &str, password: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            ..Self::new(uri)
        }
    }
}

/// Configuration for an RPC client.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Base URL (e.g., `http://localhost:18081`).
    pub url: String,
    /// Optional username for Basic auth.
    pub username: Option<String>,
    /// Optional password for Basic auth.
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Number of retry attempts on transient failure.
    pub retries: u32,
    /// Initial delay between retries (doubles each attempt).
    pub retry_delay: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:18081".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
            retries: 0,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl From<RpcConnection> for RpcConfig {
    fn from(conn: RpcConnection) -> Self {
        Self {
            url: conn.uri.trim_end_matches('/').to_string(),
            username: conn.username,
            password: conn.password,
            ..Default::default()
        }
    }
}

/// Async RPC client for Monero JSON-RPC and raw HTTP endpoints.
///
/// The inner `reqwest::Client` pools connections and is shared by every
/// call made through this value; it is safe to use from many tasks.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    config: RpcConfig,
}

impl RpcClient {
    /// Create a new client with the given URL.
    pub fn new(url: &str) -> Result<Self, RpcError> {
        Self::with_config(RpcConfig::from(RpcConnection::new(url)))
    }

    /// Create a new client with full configuration.
    pub fn with_config(mut config: RpcConfig) -> Result<Self, RpcError> {
        config.url = config.url.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| RpcError::Http {
                method: "client".into(),
                url: config.url.clone(),
                source: e,
            })?;

        Ok(Self { client, config })
    }

    /// Get the configured base URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn connection(&self) -> RpcConnection {
        RpcConnection {
            uri: self.config.url.clone(),
            username: self.config.username.clone(),
            password: self.config.password.clone(),
        }
    }

    fn auth_header(&self) -> Option<HeaderValue> {
        match (&self.config.username, &self.config.password) {
            (Some(user), Some(pass)) => {
                let creds = format!("{}:{}", user, pass);
                let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
                HeaderValue::from_str(&format!("Basic {}", encoded)).ok()
            }
            _ => None,
        }
    }

    fn build_headers(&self, content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(auth) = self.auth_header() {
            headers.insert(AUTHORIZATION, auth);
        }
        headers
    }

    /// Run `op` up to `retries + 1` times while it fails transiently.
    async fn with_retries<T, F, Fut>(&self, context: &str, mut op: F) -> Result<T, RpcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let attempts = self.config.retries + 1;
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(val) => return Ok(val),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let delay = self.config.retry_delay * 2u32.saturating_pow(attempt);
                    warn!("{}: {} (retrying in {:?})", context, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// POST a JSON-RPC 2.0 request to `/json_rpc` and return the full
    /// decoded response map.
    pub async fn send_json_request(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let url = format!("{}/json_rpc", self.config.url);
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id: "0",
            method,
            params: params.as_ref(),
        };
        let (req, url) = (&req, &url);

        self.with_retries(method, || async move {
            trace!("json_rpc {} -> {}", method, url);
            let resp = self
                .client
                .post(url)
                .headers(self.build_headers("application/json"))
                .json(req)
                .send()
                .await
                .map_err(|e| transport_error(method, url, e))?;
            let resp = check_status(resp, method, url).await?;
            let body: Value = resp.json().await.map_err(|e| transport_error(method, url, e))?;

            if let Some(err) = body.get("error").filter(|e| e.is_object()) {
                let err: JsonRpcError = serde_json::from_value(err.clone())?;
                if err.message == "BUSY" {
                    return Err(RpcError::Status {
                        method: method.to_string(),
                        status: err.message,
                    });
                }
                return Err(RpcError::Rpc {
                    code: err.code,
                    message: err.message,
                    method: method.to_string(),
                });
            }
            Ok(body)
        })
        .await
    }

    /// Call a JSON-RPC method and return only its `result` member.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let mut body = self.send_json_request(method, params).await?;
        body.get_mut("result")
            .map(Value::take)
            .ok_or(RpcError::NoResult {
                context: method.to_string(),
            })
    }

    /// POST JSON to `uri/path` (not JSON-RPC) and return the decoded body.
    pub async fn send_path_request(&self, path: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let url = format!("{}/{}", self.config.url, path.trim_start_matches('/'));
        let body = params.unwrap_or_else(|| Value::Object(Default::default()));
        let (body, url) = (&body, &url);

        self.with_retries(path, || async move {
            trace!("path request -> {}", url);
            let resp = self
                .client
                .post(url)
                .headers(self.build_headers("application/json"))
                .json(body)
                .send()
                .await
                .map_err(|e| transport_error(path, url, e))?;
            let resp = check_status(resp, path, url).await?;
            resp.json::<Value>().await.map_err(|e| transport_error(path, url, e))
        })
        .await
    }

    /// POST portable-storage encoded `params` to `uri/path` and return the
    /// raw response body.
    pub async fn send_binary_request(&self, path: &str, params: Option<&PsMap>) -> Result<Vec<u8>, RpcError> {
        let url = format!("{}/{}", self.config.url, path.trim_start_matches('/'));
        let empty = PsMap::new();
        let body = portable_storage::serialize(params.unwrap_or(&empty))?;
        let (body, url) = (&body, &url);

        self.with_retries(path, || async move {
            trace!("binary request -> {} ({} bytes)", url, body.len());
            let resp = self
                .client
                .post(url)
                .headers(self.build_headers("application/octet-stream"))
                .body(body.clone())
                .send()
                .await
                .map_err(|e| transport_error(path, url, e))?;
            let resp = check_status(resp, path, url).await?;
            let bytes = resp.bytes().await.map_err(|e| transport_error(path, url, e))?;
            Ok(bytes.to_vec())
        })
        .await
    }

    /// Simple connectivity check (`get_version` over JSON-RPC).
    pub async fn is_connected(&self) -> bool {
        self.send_json_request("get_version", None).await.is_ok()
    }
}

fn transport_error(method: &str, url: &str, e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout {
            method: method.to_string(),
            url: url.to_string(),
        }
    } else {
        RpcError::Http {
            method: method.to_string(),
            url: url.to_string(),
            source: e,
        }
    }
}

async fn check_status(resp: reqwest::Response, method: &str, url: &str) -> Result<reqwest::Response, RpcError> {
    let status = resp.status();
    if status.as_u16() == 401 {
        return Err(RpcError::AuthFailed { url: url.to_string() });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(RpcError::HttpStatus {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        });
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RpcConfig::default();
        assert_eq!(config.url, "http://localhost:18081");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retries, 0);
    }

    #[test]
    fn test_client_url() {
        let client = RpcClient::new("http://example.com:18081/").unwrap();
        assert_eq!(client.url(), "http://example.com:18081");
    }

    #[test]
    fn test_envelope_shape() {
        let params = serde_json::json!({"height": 1});
        let req = JsonRpcRequest { jsonrpc: "2.0", id: "0", method: "on_get_block_hash", params: Some(&params) };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"jsonrpc": "2.0", "id": "0", "method": "on_get_block_hash", "params": {"height": 1}})
        );

        let bare = JsonRpcRequest { jsonrpc: "2.0", id: "0", method: "get_info", params: None };
        assert_eq!(
            serde_json::to_value(&bare).unwrap(),
            serde_json::json!({"jsonrpc": "2.0", "id": "0", "method": "get_info"})
        );
    }

    #[test]
    fn test_connection_equality_and_auth() {
        let a = RpcConnection::with_credentials("http://node:18081/", "rpc", "pw");
        let b = RpcConnection::with_credentials("http://node:18081", "rpc", "pw");
        assert_eq!(a, b);
        assert_ne!(a, RpcConnection::new("http://node:18081"));

        let client = RpcClient::with_config(a.clone().into()).unwrap();
        assert_eq!(client.connection(), a);
        assert_eq!(client.auth_header().unwrap(), "Basic cnBjOnB3");
        assert!(RpcClient::new("http://node:18081").unwrap().auth_header().is_none());
    }
}
