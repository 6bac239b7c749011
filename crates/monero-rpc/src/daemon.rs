//! Daemon RPC client.
//!
//! Typed async methods for the Monero daemon's JSON-RPC methods, its JSON
//! path endpoints and the portable-storage `.bin` endpoints. Every typed
//! wrapper returns a [`Tagged`] value carrying the response's
//! [`ResponseInfo`].
//!
//! Reference: monero/src/rpc/core_rpc_server_commands_defs.h

use crate::client::{RpcClient, RpcConfig};
use crate::error::RpcError;
use crate::portable_storage::{self, PsMap, PsValue};
use log::debug;
use monero_types::Network;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::ops::Deref;
use std::time::Duration;

// =============================================================================
// Response Envelope
// =============================================================================

/// Status fields every daemon response carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub status: String,
    pub is_trusted: bool,
}

impl ResponseInfo {
    /// Derive from a decoded JSON body: `status` plus the negation of `untrusted`.
    pub fn from_json(body: &Value) -> Self {
        Self {
            status: body.get("status").and_then(Value::as_str).unwrap_or_default().to_string(),
            is_trusted: !body.get("untrusted").and_then(Value::as_bool).unwrap_or(false),
        }
    }

    pub fn from_portable(body: &PsMap) -> Self {
        Self {
            status: body.get("status").and_then(PsValue::as_str).unwrap_or_default().to_string(),
            is_trusted: !body.get("untrusted").and_then(PsValue::as_bool).unwrap_or(false),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }

    /// Fail unless the status is `OK`. An absent status is accepted.
    fn check(&self, method: &str) -> Result<(), RpcError> {
        if self.status.is_empty() || self.is_ok() {
            Ok(())
        } else {
            Err(RpcError::Status {
                method: method.to_string(),
                status: self.status.clone(),
            })
        }
    }
}

/// A daemon result together with the response's status information.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<T> {
    pub info: ResponseInfo,
    pub value: T,
}

impl<T> Tagged<T> {
    pub fn into_inner(self) -> T {
        self.value
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> Tagged<U> {
        Tagged {
            info: self.info,
            value: f(self.value),
        }
    }
}

impl<T> Deref for Tagged<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Response types that keep fields this crate does not model.
pub trait Extensible {
    fn unknown_fields(&self) -> Option<&Map<String, Value>> {
        None
    }
}

impl<T> Extensible for Vec<T> {}
impl Extensible for u64 {}
impl Extensible for String {}

macro_rules! extensible {
    ($($ty:ty),* $(,)?) => {
        $(impl Extensible for $ty {
            fn unknown_fields(&self) -> Option<&Map<String, Value>> {
                Some(&self.extra)
            }
        })*
    };
}

/// Envelope keys that are consumed by [`ResponseInfo`] rather than the body.
const ENVELOPE_KEYS: [&str; 4] = ["status", "untrusted", "credits", "top_hash"];

fn decode<T: DeserializeOwned + Extensible>(method: &str, body: Value) -> Result<Tagged<T>, RpcError> {
    let info = ResponseInfo::from_json(&body);
    info.check(method)?;
    let value: T = serde_json::from_value(body)?;
    if let Some(extra) = value.unknown_fields() {
        let unknown: Vec<&str> = extra
            .keys()
            .map(String::as_str)
            .filter(|k| !ENVELOPE_KEYS.contains(k))
            .collect();
        if !unknown.is_empty() {
            debug!("{}: ignoring unknown fields {:?}", method, unknown);
        }
    }
    Ok(Tagged { info, value })
}

/// Decode one member of a response body, keeping the body's status.
fn decode_field<T: DeserializeOwned + Extensible>(
    method: &str,
    mut body: Value,
    field: &str,
) -> Result<Tagged<T>, RpcError> {
    let info = ResponseInfo::from_json(&body);
    info.check(method)?;
    let member = body
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| RpcError::NoResult {
            context: format!("{}({})", method, field),
        })?;
    let Tagged { value, .. } = decode::<T>(method, member)?;
    Ok(Tagged { info, value })
}

// =============================================================================
// Response Types: Network / Version
// =============================================================================

/// Daemon `get_info` response.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonInfo {
    pub height: u64,
    #[serde(default)]
    pub target_height: u64,
    #[serde(default)]
    pub difficulty: u64,
    #[serde(default)]
    pub wide_difficulty: Option<String>,
    #[serde(default)]
    pub cumulative_difficulty: u64,
    #[serde(default)]
    pub tx_count: u64,
    #[serde(default)]
    pub tx_pool_size: u64,
    #[serde(default)]
    pub alt_blocks_count: u64,
    #[serde(default)]
    pub outgoing_connections_count: u64,
    #[serde(default)]
    pub incoming_connections_count: u64,
    #[serde(default)]
    pub white_peerlist_size: u64,
    #[serde(default)]
    pub grey_peerlist_size: u64,
    #[serde(default)]
    pub mainnet: bool,
    #[serde(default)]
    pub testnet: bool,
    #[serde(default)]
    pub stagenet: bool,
    #[serde(default)]
    pub nettype: String,
    #[serde(default)]
    pub synchronized: bool,
    #[serde(default)]
    pub busy_syncing: bool,
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub top_block_hash: String,
    #[serde(default)]
    pub block_size_limit: u64,
    #[serde(default)]
    pub block_weight_limit: u64,
    #[serde(default)]
    pub database_size: u64,
    #[serde(default)]
    pub free_space: u64,
    #[serde(default)]
    pub start_time: u64,
    #[serde(default)]
    pub update_available: bool,
    #[serde(default)]
    pub version: String,
    /// Catch-all for additional fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DaemonInfo {
    pub fn network(&self) -> Network {
        if self.testnet {
            Network::Testnet
        } else if self.stagenet {
            Network::Stagenet
        } else {
            Network::Mainnet
        }
    }
}

/// Response from `sync_info`.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncInfo {
    pub height: u64,
    #[serde(default)]
    pub target_height: u64,
    #[serde(default)]
    pub next_needed_pruning_seed: u32,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub peers: Vec<Value>,
    #[serde(default)]
    pub spans: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response from `hard_fork_info`.
#[derive(Debug, Clone, Deserialize)]
pub struct HardForkInfo {
    pub version: u8,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub earliest_height: u64,
    #[serde(default)]
    pub state: u32,
    #[serde(default)]
    pub threshold: u32,
    #[serde(default)]
    pub votes: u32,
    #[serde(default)]
    pub voting: u32,
    #[serde(default)]
    pub window: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response from `get_version`.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub version: u32,
    #[serde(default)]
    pub release: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Response Types: Blocks
// =============================================================================

/// Block header as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub prev_hash: String,
    pub nonce: u32,
    #[serde(default)]
    pub orphan_status: bool,
    pub height: u64,
    #[serde(default)]
    pub depth: u64,
    pub hash: String,
    #[serde(default)]
    pub difficulty: u64,
    #[serde(default)]
    pub wide_difficulty: Option<String>,
    #[serde(default)]
    pub cumulative_difficulty: u64,
    pub reward: u64,
    #[serde(default)]
    pub block_size: u64,
    #[serde(default)]
    pub block_weight: u64,
    #[serde(default)]
    pub num_txes: u64,
    #[serde(default)]
    pub pow_hash: Option<String>,
    #[serde(default)]
    pub long_term_weight: u64,
    #[serde(default)]
    pub miner_tx_hash: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full block from `get_block`.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    pub blob: String,
    pub block_header: BlockHeader,
    #[serde(default)]
    pub miner_tx_hash: String,
    #[serde(default)]
    pub tx_hashes: Vec<String>,
    #[serde(default)]
    pub json: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Block template from `get_block_template`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockTemplate {
    pub difficulty: u64,
    #[serde(default)]
    pub wide_difficulty: Option<String>,
    pub height: u64,
    pub reserved_offset: u32,
    pub expected_reward: u64,
    pub prev_hash: String,
    #[serde(default)]
    pub seed_height: u64,
    #[serde(default)]
    pub seed_hash: String,
    #[serde(default)]
    pub next_seed_hash: Option<String>,
    pub blocktemplate_blob: String,
    pub blockhashing_blob: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Alternate chain entry from `get_alternate_chains`.
#[derive(Debug, Clone, Deserialize)]
pub struct AltChain {
    #[serde(default)]
    pub block_hash: String,
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub difficulty: u64,
    #[serde(default)]
    pub block_hashes: Vec<String>,
    #[serde(default)]
    pub main_chain_parent_block: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Response Types: Transactions
// =============================================================================

/// Transaction entry from `/get_transactions`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionEntry {
    #[serde(default)]
    pub tx_hash: String,
    #[serde(default)]
    pub as_hex: String,
    #[serde(default)]
    pub pruned_as_hex: String,
    #[serde(default)]
    pub prunable_hash: String,
    #[serde(default)]
    pub as_json: Option<String>,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub block_timestamp: Option<u64>,
    #[serde(default)]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub in_pool: bool,
    #[serde(default)]
    pub double_spend_seen: bool,
    #[serde(default)]
    pub output_indices: Vec<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response from `/get_transactions`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionsResult {
    #[serde(default)]
    pub txs: Vec<TransactionEntry>,
    #[serde(default)]
    pub missed_tx: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response from `/send_raw_transaction`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendRawTxResult {
    #[serde(default)]
    pub double_spend: bool,
    #[serde(default)]
    pub fee_too_low: bool,
    #[serde(default)]
    pub invalid_input: bool,
    #[serde(default)]
    pub invalid_output: bool,
    #[serde(default)]
    pub too_big: bool,
    #[serde(default)]
    pub overspend: bool,
    #[serde(default)]
    pub not_relayed: bool,
    #[serde(default)]
    pub sanity_check_failed: bool,
    #[serde(default)]
    pub too_few_outputs: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SendRawTxResult {
    pub fn is_rejected(&self) -> bool {
        self.double_spend
            || self.fee_too_low
            || self.invalid_input
            || self.invalid_output
            || self.too_big
            || self.overspend
            || self.sanity_check_failed
            || self.too_few_outputs
    }
}

/// Spent state of a key image from `/is_key_image_spent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyImageSpentStatus {
    NotSpent,
    Confirmed,
    TxPool,
}

impl KeyImageSpentStatus {
    fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::NotSpent),
            1 => Some(Self::Confirmed),
            2 => Some(Self::TxPool),
            _ => None,
        }
    }
}

/// Transaction pool entry from `/get_transaction_pool`.
#[derive(Debug, Clone, Deserialize)]
pub struct TxPoolEntry {
    #[serde(default)]
    pub id_hash: String,
    #[serde(default)]
    pub tx_json: String,
    #[serde(default)]
    pub tx_blob: String,
    #[serde(default)]
    pub blob_size: u64,
    #[serde(default)]
    pub weight: u64,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub max_used_block_id_hash: String,
    #[serde(default)]
    pub max_used_block_height: u64,
    #[serde(default)]
    pub kept_by_block: bool,
    #[serde(default)]
    pub last_failed_height: u64,
    #[serde(default)]
    pub last_failed_id_hash: String,
    #[serde(default)]
    pub receive_time: u64,
    #[serde(default)]
    pub relayed: bool,
    #[serde(default)]
    pub last_relayed_time: u64,
    #[serde(default)]
    pub do_not_relay: bool,
    #[serde(default)]
    pub double_spend_seen: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Spent key image info from `/get_transaction_pool`.
#[derive(Debug, Clone, Deserialize)]
pub struct SpentKeyImageInfo {
    #[serde(default)]
    pub id_hash: String,
    #[serde(default)]
    pub txs_hashes: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response from `/get_transaction_pool`.
#[derive(Debug, Clone, Deserialize)]
pub struct TxPool {
    #[serde(default)]
    pub transactions: Vec<TxPoolEntry>,
    #[serde(default)]
    pub spent_key_images: Vec<SpentKeyImageInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Transaction pool statistics from `/get_transaction_pool_stats`.
#[derive(Debug, Clone, Deserialize)]
pub struct TxPoolStats {
    #[serde(default)]
    pub bytes_max: u64,
    #[serde(default)]
    pub bytes_med: u64,
    #[serde(default)]
    pub bytes_min: u64,
    #[serde(default)]
    pub bytes_total: u64,
    #[serde(default)]
    pub fee_total: u64,
    #[serde(default)]
    pub num_10m: u32,
    #[serde(default)]
    pub num_double_spends: u32,
    #[serde(default)]
    pub num_failing: u32,
    #[serde(default)]
    pub num_not_relayed: u32,
    #[serde(default)]
    pub oldest: u64,
    #[serde(default)]
    pub txs_total: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Response Types: Outputs / Fees
// =============================================================================

/// Request for a specific output by amount and index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRequest {
    pub amount: u64,
    pub index: u64,
}

/// Output info from `get_outs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputInfo {
    pub key: String,
    pub mask: String,
    pub unlocked: bool,
    pub height: u64,
    #[serde(default)]
    pub txid: Option<String>,
}

/// Output distribution entry.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputDistribution {
    pub amount: u64,
    #[serde(default)]
    pub start_height: u64,
    #[serde(default)]
    pub distribution: Vec<u64>,
    #[serde(default)]
    pub base: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Histogram entry from `get_output_histogram`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistogramEntry {
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub total_instances: u64,
    #[serde(default)]
    pub unlocked_instances: u64,
    #[serde(default)]
    pub recent_instances: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response from `get_fee_estimate`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeeEstimate {
    pub fee: u64,
    #[serde(default)]
    pub quantization_mask: u64,
    #[serde(default)]
    pub fees: Vec<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response from `get_coinbase_tx_sum`.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinbaseTxSum {
    #[serde(default)]
    pub emission_amount: u64,
    #[serde(default)]
    pub fee_amount: u64,
    #[serde(default)]
    pub emission_amount_top64: u64,
    #[serde(default)]
    pub fee_amount_top64: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CoinbaseTxSum {
    /// Emission as a 128-bit value (`top64` carries the high word).
    pub fn total_emission(&self) -> u128 {
        ((self.emission_amount_top64 as u128) << 64) | self.emission_amount as u128
    }

    pub fn total_fees(&self) -> u128 {
        ((self.fee_amount_top64 as u128) << 64) | self.fee_amount as u128
    }
}

// =============================================================================
// Response Types: Peers / Bans / Mining
// =============================================================================

/// Connection info returned by `get_connections`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionInfo {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub peer_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub incoming: bool,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub recv_count: u64,
    #[serde(default)]
    pub send_count: u64,
    #[serde(default)]
    pub avg_download: u64,
    #[serde(default)]
    pub avg_upload: u64,
    #[serde(default)]
    pub live_time: u64,
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub connection_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Peer entry from `/get_peer_list`.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerEntry {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub ip: u32,
    #[serde(default)]
    pub last_seen: u64,
    #[serde(default)]
    pub pruning_seed: u32,
    #[serde(default)]
    pub rpc_port: u16,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response from `/get_peer_list`.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerList {
    #[serde(default)]
    pub white_list: Vec<PeerEntry>,
    #[serde(default)]
    pub gray_list: Vec<PeerEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Bandwidth limits from `/get_limit` or `/set_limit`, in kB/s.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitInfo {
    #[serde(default)]
    pub limit_down: i64,
    #[serde(default)]
    pub limit_up: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Ban entry for `set_bans`.
#[derive(Debug, Clone, Serialize)]
pub struct BanEntry {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<u32>,
    pub ban: bool,
    pub seconds: u32,
}

/// Ban info returned by `get_bans`.
#[derive(Debug, Clone, Deserialize)]
pub struct BanInfo {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub ip: u32,
    #[serde(default)]
    pub seconds: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Mining status from `/mining_status`.
#[derive(Debug, Clone, Deserialize)]
pub struct MiningStatus {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub speed: u64,
    #[serde(default)]
    pub threads_count: u32,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub is_background_mining_enabled: bool,
    #[serde(default)]
    pub block_target: u64,
    #[serde(default)]
    pub block_reward: u64,
    #[serde(default)]
    pub difficulty: u64,
    #[serde(default)]
    pub pow_algorithm: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Bare acknowledgement for commands that return only a status.
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

extensible!(
    DaemonInfo,
    SyncInfo,
    HardForkInfo,
    VersionInfo,
    BlockHeader,
    Block,
    BlockTemplate,
    AltChain,
    TransactionEntry,
    TransactionsResult,
    SendRawTxResult,
    TxPoolEntry,
    SpentKeyImageInfo,
    TxPool,
    TxPoolStats,
    OutputDistribution,
    HistogramEntry,
    FeeEstimate,
    CoinbaseTxSum,
    ConnectionInfo,
    PeerEntry,
    PeerList,
    LimitInfo,
    BanInfo,
    MiningStatus,
    Ack,
);

// =============================================================================
// DaemonRpc
// =============================================================================

/// Async RPC client for the Monero daemon.
#[derive(Debug, Clone)]
pub struct DaemonRpc {
    client: RpcClient,
}

impl DaemonRpc {
    /// Create a daemon RPC client connected to the given URL.
    pub fn new(url: &str) -> Result<Self, RpcError> {
        Ok(Self {
            client: RpcClient::new(url)?,
        })
    }

    /// Create with full configuration.
    pub fn with_config(config: RpcConfig) -> Result<Self, RpcError> {
        Ok(Self {
            client: RpcClient::with_config(config)?,
        })
    }

    pub fn from_client(client: RpcClient) -> Self {
        Self { client }
    }

    /// Get the underlying RPC client for custom calls.
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    async fn call<T: DeserializeOwned + Extensible>(&self, method: &str, params: Option<Value>) -> Result<Tagged<T>, RpcError> {
        let val = self.client.call(method, params).await?;
        decode(method, val)
    }

    async fn call_field<T: DeserializeOwned + Extensible>(
        &self,
        method: &str,
        params: Option<Value>,
        field: &str,
    ) -> Result<Tagged<T>, RpcError> {
        let val = self.client.call(method, params).await?;
        decode_field(method, val, field)
    }

    async fn path<T: DeserializeOwned + Extensible>(&self, path: &str, params: Option<Value>) -> Result<Tagged<T>, RpcError> {
        let val = self.client.send_path_request(path, params).await?;
        decode(path, val)
    }

    async fn binary(&self, path: &str, params: &PsMap) -> Result<(ResponseInfo, PsMap), RpcError> {
        let bytes = self.client.send_binary_request(path, Some(params)).await?;
        let body = portable_storage::deserialize(&bytes)?;
        let info = ResponseInfo::from_portable(&body);
        info.check(path)?;
        Ok((info, body))
    }

    // =========================================================================
    // Network Information
    // =========================================================================

    /// Get daemon info (height, difficulty, sync status, etc.).
    pub async fn get_info(&self) -> Result<Tagged<DaemonInfo>, RpcError> {
        self.call("get_info", None).await
    }

    /// Get current blockchain height.
    pub async fn get_height(&self) -> Result<u64, RpcError> {
        let val = self.client.send_path_request("get_height", None).await?;
        ResponseInfo::from_json(&val).check("get_height")?;
        val.get("height")
            .and_then(Value::as_u64)
            .ok_or(RpcError::NoResult { context: "get_height".into() })
    }

    /// Get sync info (heights, peers, spans).
    pub async fn sync_info(&self) -> Result<Tagged<SyncInfo>, RpcError> {
        self.call("sync_info", None).await
    }

    pub async fn hard_fork_info(&self) -> Result<Tagged<HardForkInfo>, RpcError> {
        self.call("hard_fork_info", None).await
    }

    pub async fn get_version(&self) -> Result<Tagged<VersionInfo>, RpcError> {
        self.call("get_version", None).await
    }

    /// Number of blocks in the longest chain (top height + 1).
    pub async fn get_block_count(&self) -> Result<Tagged<u64>, RpcError> {
        self.call_field("get_block_count", None, "count").await
    }

    /// Determine network type from daemon info.
    pub async fn network_type(&self) -> Result<Network, RpcError> {
        Ok(self.get_info().await?.network())
    }

    /// Poll `get_info` until `synchronized` is true or `timeout` passes.
    pub async fn wait_for_sync(&self, poll_interval: Duration, timeout: Duration) -> Result<bool, RpcError> {
        let start = tokio::time::Instant::now();
        loop {
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            match self.get_info().await {
                Ok(info) if info.synchronized => return Ok(true),
                Ok(_) => {}
                Err(e) if e.is_transient() => debug!("wait_for_sync: {}", e),
                Err(e) => return Err(e),
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    // =========================================================================
    // Block Operations
    // =========================================================================

    /// Get the block hash at a given height.
    pub async fn get_block_hash(&self, height: u64) -> Result<String, RpcError> {
        let val = self.client.call("on_get_block_hash", Some(json!([height]))).await?;
        val.as_str()
            .map(str::to_string)
            .ok_or(RpcError::NoResult { context: "on_get_block_hash".into() })
    }

    pub async fn get_last_block_header(&self) -> Result<Tagged<BlockHeader>, RpcError> {
        self.call_field("get_last_block_header", None, "block_header").await
    }

    pub async fn get_block_header_by_hash(&self, hash: &str) -> Result<Tagged<BlockHeader>, RpcError> {
        self.call_field("get_block_header_by_hash", Some(json!({ "hash": hash })), "block_header")
            .await
    }

    pub async fn get_block_header_by_height(&self, height: u64) -> Result<Tagged<BlockHeader>, RpcError> {
        self.call_field("get_block_header_by_height", Some(json!({ "height": height })), "block_header")
            .await
    }

    /// Headers for the inclusive range `[start_height, end_height]`.
    pub async fn get_block_headers_range(
        &self,
        start_height: u64,
        end_height: u64,
    ) -> Result<Tagged<Vec<BlockHeader>>, RpcError> {
        self.call_field(
            "get_block_headers_range",
            Some(json!({ "start_height": start_height, "end_height": end_height })),
            "headers",
        )
        .await
    }

    /// Full block by height (blob, header, miner tx hash, tx hashes).
    pub async fn get_block_by_height(&self, height: u64) -> Result<Tagged<Block>, RpcError> {
        self.call("get_block", Some(json!({ "height": height }))).await
    }

    pub async fn get_block_by_hash(&self, hash: &str) -> Result<Tagged<Block>, RpcError> {
        self.call("get_block", Some(json!({ "hash": hash }))).await
    }

    pub async fn get_block_template(&self, wallet_address: &str, reserve_size: u32) -> Result<Tagged<BlockTemplate>, RpcError> {
        self.call(
            "get_block_template",
            Some(json!({ "wallet_address": wallet_address, "reserve_size": reserve_size })),
        )
        .await
    }

    /// Submit a mined block blob.
    pub async fn submit_block(&self, block_blob_hex: &str) -> Result<ResponseInfo, RpcError> {
        self.submit_blocks(&[block_blob_hex]).await
    }

    pub async fn submit_blocks(&self, block_blobs_hex: &[&str]) -> Result<ResponseInfo, RpcError> {
        let tagged: Tagged<Ack> = self.call("submit_block", Some(json!(block_blobs_hex))).await?;
        Ok(tagged.info)
    }

    pub async fn get_alternate_chains(&self) -> Result<Tagged<Vec<AltChain>>, RpcError> {
        let val = self.client.call("get_alternate_chains", None).await?;
        // An empty list is omitted from the response entirely.
        if val.get("chains").is_none() {
            return decode::<Ack>("get_alternate_chains", val).map(|t| t.map(|_| Vec::new()));
        }
        decode_field("get_alternate_chains", val, "chains")
    }

    pub async fn get_alt_blocks_hashes(&self) -> Result<Tagged<Vec<String>>, RpcError> {
        let val = self.client.send_path_request("get_alt_blocks_hashes", None).await?;
        if val.get("blks_hashes").is_none() {
            return decode::<Ack>("get_alt_blocks_hashes", val).map(|t| t.map(|_| Vec::new()));
        }
        decode_field("get_alt_blocks_hashes", val, "blks_hashes")
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Get transactions by hash. Unknown hashes are listed in `missed_tx`.
    pub async fn get_transactions(
        &self,
        tx_hashes: &[&str],
        decode_as_json: bool,
        prune: bool,
    ) -> Result<Tagged<TransactionsResult>, RpcError> {
        self.path(
            "get_transactions",
            Some(json!({ "txs_hashes": tx_hashes, "decode_as_json": decode_as_json, "prune": prune })),
        )
        .await
    }

    /// Submit a raw transaction. Rejections come back in the flags with
    /// a non-`OK` status, so they are returned rather than raised.
    pub async fn send_raw_transaction(&self, tx_as_hex: &str, do_not_relay: bool) -> Result<Tagged<SendRawTxResult>, RpcError> {
        let val = self
            .client
            .send_path_request(
                "send_raw_transaction",
                Some(json!({ "tx_as_hex": tx_as_hex, "do_not_relay": do_not_relay })),
            )
            .await?;
        let info = ResponseInfo::from_json(&val);
        let value: SendRawTxResult = serde_json::from_value(val)?;
        Ok(Tagged { info, value })
    }

    /// Relay transactions previously submitted with `do_not_relay`.
    pub async fn relay_tx(&self, txids: &[&str]) -> Result<ResponseInfo, RpcError> {
        let tagged: Tagged<Ack> = self.call("relay_tx", Some(json!({ "txids": txids }))).await?;
        Ok(tagged.info)
    }

    pub async fn get_transaction_pool(&self) -> Result<Tagged<TxPool>, RpcError> {
        self.path("get_transaction_pool", None).await
    }

    pub async fn get_transaction_pool_hashes(&self) -> Result<Tagged<Vec<String>>, RpcError> {
        let val = self.client.send_path_request("get_transaction_pool_hashes", None).await?;
        if val.get("tx_hashes").is_none() {
            return decode::<Ack>("get_transaction_pool_hashes", val).map(|t| t.map(|_| Vec::new()));
        }
        decode_field("get_transaction_pool_hashes", val, "tx_hashes")
    }

    pub async fn get_transaction_pool_stats(&self) -> Result<Tagged<TxPoolStats>, RpcError> {
        let val = self.client.send_path_request("get_transaction_pool_stats", None).await?;
        decode_field("get_transaction_pool_stats", val, "pool_stats")
    }

    /// Remove transactions from the pool; all of them when `txids` is empty.
    pub async fn flush_txpool(&self, txids: &[&str]) -> Result<ResponseInfo, RpcError> {
        let params = (!txids.is_empty()).then(|| json!({ "txids": txids }));
        let tagged: Tagged<Ack> = self.call("flush_txpool", params).await?;
        Ok(tagged.info)
    }

    /// Spent status of each key image, in request order.
    pub async fn is_key_image_spent(&self, key_images: &[&str]) -> Result<Tagged<Vec<KeyImageSpentStatus>>, RpcError> {
        let val = self
            .client
            .send_path_request("is_key_image_spent", Some(json!({ "key_images": key_images })))
            .await?;
        let tagged: Tagged<Vec<u64>> = decode_field("is_key_image_spent", val, "spent_status")?;
        let statuses = tagged
            .value
            .iter()
            .map(|&code| {
                KeyImageSpentStatus::from_code(code).ok_or_else(|| RpcError::Status {
                    method: "is_key_image_spent".into(),
                    status: format!("unknown spent status {}", code),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Tagged { info: tagged.info, value: statuses })
    }

    /// The `get_txpool_backlog` response packs entries into a binary
    /// string the JSON decoder cannot map.
    pub async fn get_tx_pool_backlog(&self) -> Result<Tagged<Vec<Value>>, RpcError> {
        Err(RpcError::NotImplemented("get_txpool_backlog"))
    }

    // =========================================================================
    // Output Operations
    // =========================================================================

    /// Global output indices of a transaction's outputs (`/get_o_indexes.bin`).
    pub async fn get_output_indices(&self, tx_hash: &str) -> Result<Tagged<Vec<u64>>, RpcError> {
        let txid = hex::decode(tx_hash).map_err(|e| RpcError::PortableStorage(format!("tx hash: {e}")))?;
        let mut params = PsMap::new();
        params.insert("txid".into(), PsValue::String(txid));

        let (info, body) = self.binary("get_o_indexes.bin", &params).await?;
        let indices = body
            .get("o_indexes")
            .and_then(PsValue::as_array)
            .map(|arr| arr.iter().filter_map(PsValue::as_u64).collect())
            .unwrap_or_default();
        Ok(Tagged { info, value: indices })
    }

    /// Output keys and commitments via the binary endpoint (`/get_outs.bin`).
    pub async fn get_outs_bin(&self, outputs: &[OutputRequest], get_txid: bool) -> Result<Tagged<Vec<OutputInfo>>, RpcError> {
        let requests = outputs
            .iter()
            .map(|o| {
                let mut entry = PsMap::new();
                entry.insert("amount".into(), PsValue::Uint64(o.amount));
                entry.insert("index".into(), PsValue::Uint64(o.index));
                PsValue::Object(entry)
            })
            .collect();
        let mut params = PsMap::new();
        params.insert("outputs".into(), PsValue::Array(requests));
        params.insert("get_txid".into(), PsValue::Bool(get_txid));

        let (info, body) = self.binary("get_outs.bin", &params).await?;
        let outs = body
            .get("outs")
            .and_then(PsValue::as_array)
            .map(|arr| arr.iter().map(output_info_from_portable).collect::<Result<Vec<_>, _>>())
            .transpose()?
            .unwrap_or_default();
        Ok(Tagged { info, value: outs })
    }

    /// Output keys and commitments via the JSON endpoint (`/get_outs`).
    pub async fn get_outs(&self, outputs: &[OutputRequest], get_txid: bool) -> Result<Tagged<Vec<OutputInfo>>, RpcError> {
        let val = self
            .client
            .send_path_request("get_outs", Some(json!({ "outputs": outputs, "get_txid": get_txid })))
            .await?;
        decode_field("get_outs", val, "outs")
    }

    /// Output distribution for decoy selection, requested in its JSON form.
    pub async fn get_output_distribution(
        &self,
        amounts: &[u64],
        from_height: u64,
        to_height: u64,
        cumulative: bool,
    ) -> Result<Tagged<Vec<OutputDistribution>>, RpcError> {
        self.call_field(
            "get_output_distribution",
            Some(json!({
                "amounts": amounts,
                "from_height": from_height,
                "to_height": to_height,
                "cumulative": cumulative,
                "binary": false,
            })),
            "distributions",
        )
        .await
    }

    pub async fn get_output_histogram(
        &self,
        amounts: &[u64],
        min_count: u64,
        max_count: u64,
        unlocked: bool,
        recent_cutoff: u64,
    ) -> Result<Tagged<Vec<HistogramEntry>>, RpcError> {
        let val = self
            .client
            .call(
                "get_output_histogram",
                Some(json!({
                    "amounts": amounts,
                    "min_count": min_count,
                    "max_count": max_count,
                    "unlocked": unlocked,
                    "recent_cutoff": recent_cutoff,
                })),
            )
            .await?;
        if val.get("histogram").is_none() {
            return decode::<Ack>("get_output_histogram", val).map(|t| t.map(|_| Vec::new()));
        }
        decode_field("get_output_histogram", val, "histogram")
    }

    pub async fn get_coinbase_tx_sum(&self, height: u64, count: u64) -> Result<Tagged<CoinbaseTxSum>, RpcError> {
        self.call("get_coinbase_tx_sum", Some(json!({ "height": height, "count": count })))
            .await
    }

    pub async fn get_fee_estimate(&self, grace_blocks: u64) -> Result<Tagged<FeeEstimate>, RpcError> {
        self.call("get_fee_estimate", Some(json!({ "grace_blocks": grace_blocks }))).await
    }

    // =========================================================================
    // Mining Control
    // =========================================================================

    pub async fn start_mining(
        &self,
        miner_address: &str,
        threads_count: u64,
        do_background_mining: bool,
        ignore_battery: bool,
    ) -> Result<ResponseInfo, RpcError> {
        let tagged: Tagged<Ack> = self
            .path(
                "start_mining",
                Some(json!({
                    "miner_address": miner_address,
                    "threads_count": threads_count,
                    "do_background_mining": do_background_mining,
                    "ignore_battery": ignore_battery,
                })),
            )
            .await?;
        Ok(tagged.info)
    }

    pub async fn stop_mining(&self) -> Result<ResponseInfo, RpcError> {
        let tagged: Tagged<Ack> = self.path("stop_mining", None).await?;
        Ok(tagged.info)
    }

    pub async fn mining_status(&self) -> Result<Tagged<MiningStatus>, RpcError> {
        self.path("mining_status", None).await
    }

    // =========================================================================
    // Peers / Bandwidth / Bans
    // =========================================================================

    pub async fn get_connections(&self) -> Result<Tagged<Vec<ConnectionInfo>>, RpcError> {
        let val = self.client.call("get_connections", None).await?;
        if val.get("connections").is_none() {
            return decode::<Ack>("get_connections", val).map(|t| t.map(|_| Vec::new()));
        }
        decode_field("get_connections", val, "connections")
    }

    pub async fn get_peer_list(&self) -> Result<Tagged<PeerList>, RpcError> {
        self.path("get_peer_list", None).await
    }

    pub async fn get_limit(&self) -> Result<Tagged<LimitInfo>, RpcError> {
        self.path("get_limit", None).await
    }

    /// Set bandwidth limits in kB/s; -1 resets to default, 0 leaves unchanged.
    pub async fn set_limit(&self, limit_down: i64, limit_up: i64) -> Result<Tagged<LimitInfo>, RpcError> {
        self.path("set_limit", Some(json!({ "limit_down": limit_down, "limit_up": limit_up })))
            .await
    }

    pub async fn out_peers(&self, out_peers: u64) -> Result<ResponseInfo, RpcError> {
        let tagged: Tagged<Ack> = self.path("out_peers", Some(json!({ "out_peers": out_peers }))).await?;
        Ok(tagged.info)
    }

    pub async fn in_peers(&self, in_peers: u64) -> Result<ResponseInfo, RpcError> {
        let tagged: Tagged<Ack> = self.path("in_peers", Some(json!({ "in_peers": in_peers }))).await?;
        Ok(tagged.info)
    }

    pub async fn set_bans(&self, bans: &[BanEntry]) -> Result<ResponseInfo, RpcError> {
        let tagged: Tagged<Ack> = self.call("set_bans", Some(json!({ "bans": bans }))).await?;
        Ok(tagged.info)
    }

    pub async fn get_bans(&self) -> Result<Tagged<Vec<BanInfo>>, RpcError> {
        let val = self.client.call("get_bans", None).await?;
        if val.get("bans").is_none() {
            return decode::<Ack>("get_bans", val).map(|t| t.map(|_| Vec::new()));
        }
        decode_field("get_bans", val, "bans")
    }

    // =========================================================================
    // Admin
    // =========================================================================

    pub async fn save_bc(&self) -> Result<ResponseInfo, RpcError> {
        let tagged: Tagged<Ack> = self.path("save_bc", None).await?;
        Ok(tagged.info)
    }

    pub async fn stop_daemon(&self) -> Result<ResponseInfo, RpcError> {
        let tagged: Tagged<Ack> = self.path("stop_daemon", None).await?;
        Ok(tagged.info)
    }

    pub async fn check_for_update(&self) -> Result<Tagged<Value>, RpcError> {
        Err(RpcError::NotImplemented("check_for_update"))
    }
}

fn output_info_from_portable(value: &PsValue) -> Result<OutputInfo, RpcError> {
    let field = |name: &str| {
        value
            .get(name)
            .ok_or_else(|| RpcError::PortableStorage(format!("get_outs.bin: missing {name}")))
    };
    let bytes_hex = |name: &str| -> Result<String, RpcError> {
        field(name)?
            .as_bytes()
            .map(hex::encode)
            .ok_or_else(|| RpcError::PortableStorage(format!("get_outs.bin: {name} is not a string")))
    };
    let txid = match value.get("txid").and_then(PsValue::as_bytes) {
        Some(b) if !b.is_empty() => Some(hex::encode(b)),
        _ => None,
    };
    Ok(OutputInfo {
        key: bytes_hex("key")?,
        mask: bytes_hex("mask")?,
        unlocked: field("unlocked")?.as_bool().unwrap_or(false),
        height: field("height")?.as_u64().unwrap_or(0),
        txid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_rpc_creation() {
        let daemon = DaemonRpc::new("http://localhost:18081").unwrap();
        assert_eq!(daemon.client().url(), "http://localhost:18081");
    }

    #[test]
    fn test_response_info() {
        let info = ResponseInfo::from_json(&json!({"status": "OK", "untrusted": false}));
        assert_eq!(info, ResponseInfo { status: "OK".into(), is_trusted: true });

        let untrusted = ResponseInfo::from_json(&json!({"status": "OK", "untrusted": true}));
        assert!(!untrusted.is_trusted);

        let busy = ResponseInfo::from_json(&json!({"status": "BUSY"}));
        assert!(busy.check("get_info").unwrap_err().is_transient());
        assert!(ResponseInfo::default().check("on_get_block_hash").is_ok());
    }

    #[test]
    fn test_daemon_info_decode() {
        let body = json!({
            "height": 12345,
            "target_height": 12345,
            "difficulty": 1000000,
            "tx_count": 500,
            "tx_pool_size": 3,
            "synchronized": true,
            "stagenet": true,
            "nettype": "stagenet",
            "some_new_field": 7,
            "status": "OK",
            "untrusted": true
        });
        let info: Tagged<DaemonInfo> = decode("get_info", body).unwrap();
        assert_eq!(info.height, 12345);
        assert!(info.synchronized);
        assert_eq!(info.network(), Network::Stagenet);
        assert!(!info.info.is_trusted);
        assert_eq!(info.info.status, "OK");
        assert!(info.extra.contains_key("some_new_field"));
    }

    #[test]
    fn test_failed_status_is_error() {
        let body = json!({"height": 1, "status": "Failed"});
        let err = decode::<DaemonInfo>("get_info", body).unwrap_err();
        assert!(matches!(err, RpcError::Status { ref status, .. } if status == "Failed"));
    }

    #[test]
    fn test_block_header_field() {
        let body = json!({
            "block_header": {
                "major_version": 16,
                "minor_version": 16,
                "timestamp": 1700000000,
                "prev_hash": "abcd",
                "nonce": 12345,
                "height": 100,
                "hash": "efgh",
                "difficulty": 500000,
                "reward": 600000000000_u64,
                "block_weight": 1234,
                "num_txes": 5,
                "block_size": 1234
            },
            "status": "OK",
            "untrusted": false
        });
        let header: Tagged<BlockHeader> = decode_field("get_last_block_header", body, "block_header").unwrap();
        assert_eq!(header.major_version, 16);
        assert_eq!(header.height, 100);
        assert!(header.info.is_trusted);
    }

    #[test]
    fn test_missing_field_is_no_result() {
        let err = decode_field::<BlockHeader>("get_last_block_header", json!({"status": "OK"}), "block_header")
            .unwrap_err();
        assert!(matches!(err, RpcError::NoResult { .. }));
    }

    #[test]
    fn test_block_count_field() {
        let count: Tagged<u64> = decode_field("get_block_count", json!({"count": 993163, "status": "OK"}), "count").unwrap();
        assert_eq!(*count, 993163);
    }

    #[test]
    fn test_large_amounts() {
        let sum: Tagged<CoinbaseTxSum> = decode(
            "get_coinbase_tx_sum",
            json!({
                "emission_amount": 18446744073709551615_u64,
                "fee_amount": 500000000,
                "emission_amount_top64": 1,
                "fee_amount_top64": 0,
                "status": "OK"
            }),
        )
        .unwrap();
        assert_eq!(sum.emission_amount, u64::MAX);
        assert_eq!(sum.total_emission(), (1u128 << 64) | u64::MAX as u128);
        assert_eq!(sum.total_fees(), 500000000);
    }

    #[test]
    fn test_send_raw_tx_result() {
        let result: SendRawTxResult = serde_json::from_value(json!({
            "status": "Failed",
            "double_spend": true,
            "fee_too_low": false,
            "not_relayed": false,
            "reason": "double spend"
        }))
        .unwrap();
        assert!(result.is_rejected());
        assert_eq!(result.reason, "double spend");
    }

    #[test]
    fn test_ban_entry_serialize() {
        let ban = BanEntry {
            host: "192.168.1.100".to_string(),
            ip: None,
            ban: true,
            seconds: 3600,
        };
        assert_eq!(
            serde_json::to_value(&ban).unwrap(),
            json!({"host": "192.168.1.100", "ban": true, "seconds": 3600})
        );
    }

    #[test]
    fn test_output_info_from_portable() {
        let mut entry = PsMap::new();
        entry.insert("key".into(), PsValue::String(vec![0xAB; 32]));
        entry.insert("mask".into(), PsValue::String(vec![0xCD; 32]));
        entry.insert("unlocked".into(), PsValue::Bool(true));
        entry.insert("height".into(), PsValue::Uint64(1234));
        entry.insert("txid".into(), PsValue::String(vec![]));
        let out = output_info_from_portable(&PsValue::Object(entry)).unwrap();
        assert_eq!(out.key, "ab".repeat(32));
        assert_eq!(out.mask, "cd".repeat(32));
        assert!(out.unlocked);
        assert_eq!(out.height, 1234);
        assert_eq!(out.txid, None);
    }

    #[test]
    fn test_key_image_status_codes() {
        assert_eq!(KeyImageSpentStatus::from_code(0), Some(KeyImageSpentStatus::NotSpent));
        assert_eq!(KeyImageSpentStatus::from_code(2), Some(KeyImageSpentStatus::TxPool));
        assert_eq!(KeyImageSpentStatus::from_code(3), None);
    }

    #[tokio::test]
    async fn test_not_implemented_is_deterministic() {
        let daemon = DaemonRpc::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(daemon.get_tx_pool_backlog().await, Err(RpcError::NotImplemented("get_txpool_backlog"))));
        assert!(matches!(daemon.check_for_update().await, Err(RpcError::NotImplemented(_))));
    }
}
