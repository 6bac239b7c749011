//! Wallet RPC client.
//!
//! Typed async methods for the Monero wallet service (`monero-wallet-rpc`).
//! Covers wallet files, balance, accounts and subaddresses, transfers and
//! sweeps, key management, proofs, notes, the address book and URIs.
//!
//! Reference: monero/src/wallet/wallet_rpc_server_commands_defs.h

use crate::client::{RpcClient, RpcConfig};
use crate::error::RpcError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// =============================================================================
// Response Types
// =============================================================================

/// Balance info from `get_balance`.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceInfo {
    pub balance: u64,
    pub unlocked_balance: u64,
    #[serde(default)]
    pub blocks_to_unlock: u64,
    #[serde(default)]
    pub per_subaddress: Vec<SubaddressBalance>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-subaddress balance.
#[derive(Debug, Clone, Deserialize)]
pub struct SubaddressBalance {
    #[serde(default)]
    pub account_index: u32,
    #[serde(default)]
    pub address_index: u32,
    pub address: String,
    pub balance: u64,
    pub unlocked_balance: u64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub num_unspent_outputs: u64,
}

/// Address info from `get_address`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressResult {
    pub address: String,
    #[serde(default)]
    pub addresses: Vec<AddressEntry>,
}

/// Single address entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressEntry {
    pub address: String,
    #[serde(default)]
    pub address_index: u32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub used: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Account info from `get_accounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountsResult {
    pub total_balance: u64,
    pub total_unlocked_balance: u64,
    #[serde(default)]
    pub subaddress_accounts: Vec<AccountEntry>,
}

/// Single account entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountEntry {
    pub account_index: u32,
    pub base_address: String,
    pub balance: u64,
    pub unlocked_balance: u64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub tag: String,
}

/// Transfer result from `transfer` / `sweep_single`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferResult {
    #[serde(default)]
    pub tx_hash: String,
    #[serde(default)]
    pub tx_key: String,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub weight: u64,
    #[serde(default)]
    pub tx_blob: String,
    #[serde(default)]
    pub tx_metadata: String,
    #[serde(default)]
    pub unsigned_txset: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result from `transfer_split` and the sweep methods.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferSplitResult {
    #[serde(default)]
    pub tx_hash_list: Vec<String>,
    #[serde(default)]
    pub tx_key_list: Vec<String>,
    #[serde(default)]
    pub amount_list: Vec<u64>,
    #[serde(default)]
    pub fee_list: Vec<u64>,
    #[serde(default)]
    pub weight_list: Vec<u64>,
    #[serde(default)]
    pub tx_blob_list: Vec<String>,
    #[serde(default)]
    pub tx_metadata_list: Vec<String>,
    #[serde(default)]
    pub unsigned_txset: String,
}

impl TransferSplitResult {
    /// Split the parallel lists into one [`TransferResult`] per transaction.
    pub fn into_transfers(self) -> Vec<TransferResult> {
        let pick = |list: &[String], i: usize| list.get(i).cloned().unwrap_or_default();
        (0..self.tx_hash_list.len())
            .map(|i| TransferResult {
                tx_hash: self.tx_hash_list[i].clone(),
                tx_key: pick(&self.tx_key_list, i),
                amount: self.amount_list.get(i).copied().unwrap_or(0),
                fee: self.fee_list.get(i).copied().unwrap_or(0),
                weight: self.weight_list.get(i).copied().unwrap_or(0),
                tx_blob: pick(&self.tx_blob_list, i),
                tx_metadata: pick(&self.tx_metadata_list, i),
                unsigned_txset: self.unsigned_txset.clone(),
                extra: Map::new(),
            })
            .collect()
    }
}

/// Destination recorded on an outgoing transfer.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferDestination {
    pub address: String,
    pub amount: u64,
}

/// Transfer entry from `get_transfers` / `get_transfer_by_txid`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferEntry {
    pub txid: String,
    #[serde(default)]
    pub payment_id: String,
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub destinations: Vec<TransferDestination>,
    #[serde(rename = "type")]
    #[serde(default)]
    pub transfer_type: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub unlock_time: u64,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub double_spend_seen: bool,
    #[serde(default)]
    pub subaddr_index: SubaddrIndex,
    #[serde(default)]
    pub subaddr_indices: Vec<SubaddrIndex>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Subaddress index pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubaddrIndex {
    pub major: u32,
    pub minor: u32,
}

/// Transfer history grouped by category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransfersResult {
    #[serde(rename = "in")]
    #[serde(default)]
    pub incoming: Vec<TransferEntry>,
    #[serde(default)]
    pub out: Vec<TransferEntry>,
    #[serde(default)]
    pub pending: Vec<TransferEntry>,
    #[serde(default)]
    pub failed: Vec<TransferEntry>,
    #[serde(default)]
    pub pool: Vec<TransferEntry>,
}

impl TransfersResult {
    /// Every entry regardless of category.
    pub fn all(&self) -> impl Iterator<Item = &TransferEntry> {
        self.incoming
            .iter()
            .chain(&self.out)
            .chain(&self.pending)
            .chain(&self.failed)
            .chain(&self.pool)
    }
}

/// Categories and filters for `get_transfers`.
#[derive(Debug, Clone, Serialize)]
pub struct TransfersFilter {
    #[serde(rename = "in")]
    pub incoming: bool,
    pub out: bool,
    pub pending: bool,
    pub failed: bool,
    pub pool: bool,
    pub account_index: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subaddr_indices: Vec<u32>,
    pub all_accounts: bool,
    pub filter_by_height: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u64>,
}

impl Default for TransfersFilter {
    fn default() -> Self {
        Self {
            incoming: true,
            out: true,
            pending: true,
            failed: true,
            pool: true,
            account_index: 0,
            subaddr_indices: Vec::new(),
            all_accounts: false,
            filter_by_height: false,
            min_height: None,
            max_height: None,
        }
    }
}

/// Validate address result.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateAddressResult {
    pub valid: bool,
    #[serde(default)]
    pub integrated: bool,
    #[serde(default)]
    pub subaddress: bool,
    #[serde(default)]
    pub nettype: String,
    #[serde(default)]
    pub openalias_address: Option<String>,
}

/// Refresh result.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResult {
    pub blocks_fetched: u64,
    pub received_money: bool,
}

/// Incoming transfer (owned output) from `incoming_transfers`.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingTransfer {
    pub amount: u64,
    pub spent: bool,
    #[serde(default)]
    pub global_index: u64,
    pub tx_hash: String,
    #[serde(default)]
    pub subaddr_index: SubaddrIndex,
    #[serde(default)]
    pub key_image: String,
    #[serde(default)]
    pub pubkey: String,
    #[serde(default)]
    pub block_height: u64,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub unlocked: bool,
}

// =============================================================================
// Transfer Requests
// =============================================================================

/// Destination for a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub address: String,
    pub amount: u64,
}

/// Transfer priority levels.
pub mod priority {
    pub const DEFAULT: u32 = 0;
    pub const UNIMPORTANT: u32 = 1;
    pub const NORMAL: u32 = 2;
    pub const ELEVATED: u32 = 3;
}

/// Parameters shared by `transfer` and `transfer_split`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferParams {
    pub destinations: Vec<Destination>,
    pub account_index: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subaddr_indices: Vec<u32>,
    pub priority: u32,
    pub ring_size: u32,
    pub unlock_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub do_not_relay: bool,
}

/// Parameters for `sweep_all`, `sweep_single` and `sweep_dust`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepParams {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub address: String,
    pub account_index: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subaddr_indices: Vec<u32>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key_image: String,
    pub priority: u32,
    pub ring_size: u32,
    pub unlock_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub below_amount: Option<u64>,
    pub do_not_relay: bool,
}

/// Merge `params` with the flags asking for tx keys, blobs and metadata.
fn with_tx_flags<T: Serialize>(params: &T) -> Result<Value, RpcError> {
    let mut val = serde_json::to_value(params)?;
    if let Some(obj) = val.as_object_mut() {
        for flag in ["get_tx_key", "get_tx_keys", "get_tx_hex", "get_tx_metadata"] {
            obj.insert(flag.into(), Value::Bool(true));
        }
    }
    Ok(val)
}

// =============================================================================
// Other Response Types
// =============================================================================

/// Address index result from `get_address_index`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressIndexResult {
    pub index: SubaddrIndex,
}

/// Result from `create_account`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountResult {
    pub account_index: u32,
    pub address: String,
}

/// Result from `create_address`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAddressResult {
    pub address: String,
    pub address_index: u32,
}

/// Account tag entry from `get_account_tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountTag {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub accounts: Vec<u32>,
}

/// Address book entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressBookEntry {
    pub index: u64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payment_id: String,
}

/// Result from `sign_transfer`.
#[derive(Debug, Clone, Deserialize)]
pub struct SignTransferResult {
    #[serde(default)]
    pub signed_txset: String,
    #[serde(default)]
    pub tx_hash_list: Vec<String>,
    #[serde(default)]
    pub tx_raw_list: Vec<String>,
}

/// Payment entry from `get_payments` / `get_bulk_payments`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntry {
    #[serde(default)]
    pub payment_id: String,
    #[serde(default)]
    pub tx_hash: String,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub block_height: u64,
    #[serde(default)]
    pub unlock_time: u64,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub subaddr_index: SubaddrIndex,
    #[serde(default)]
    pub address: String,
}

/// Result from `check_tx_key`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckTxKeyResult {
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub received: u64,
    #[serde(default)]
    pub in_pool: bool,
}

/// Result from `check_tx_proof`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckTxProofResult {
    #[serde(default)]
    pub good: bool,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub received: u64,
    #[serde(default)]
    pub in_pool: bool,
}

/// Result from `check_reserve_proof`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckReserveProofResult {
    #[serde(default)]
    pub good: bool,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub spent: u64,
}

/// Result from `make_integrated_address`.
#[derive(Debug, Clone, Deserialize)]
pub struct IntegratedAddressResult {
    pub integrated_address: String,
    pub payment_id: String,
}

/// Result from `split_integrated_address`.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitIntegratedAddressResult {
    pub standard_address: String,
    pub payment_id: String,
    #[serde(default)]
    pub is_subaddress: bool,
}

/// Parsed URI from `parse_uri`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParsedUri {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub payment_id: String,
    #[serde(default)]
    pub recipient_name: String,
    #[serde(default)]
    pub tx_description: String,
}

/// Key image entry for import/export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyImageEntry {
    pub key_image: String,
    pub signature: String,
}

/// Result of key image import.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyImageImportResult {
    pub height: u64,
    pub spent: u64,
    pub unspent: u64,
}

// =============================================================================
// WalletRpc
// =============================================================================

/// Async RPC client for the Monero wallet service.
#[derive(Debug, Clone)]
pub struct WalletRpc {
    client: RpcClient,
}

impl WalletRpc {
    /// Create a wallet RPC client connected to the given URL.
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

    /// Get the underlying RPC client.
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let val = self.client.call(method, Some(params)).await?;
        Ok(serde_json::from_value(val)?)
    }

    async fn call_unit(&self, method: &str, params: Value) -> Result<(), RpcError> {
        self.client.call(method, Some(params)).await?;
        Ok(())
    }

    /// Call and extract one member, which must be present.
    async fn call_field<T: DeserializeOwned>(&self, method: &str, params: Value, field: &str) -> Result<T, RpcError> {
        let mut val = self.client.call(method, Some(params)).await?;
        let member = val
            .get_mut(field)
            .map(Value::take)
            .ok_or_else(|| RpcError::NoResult {
                context: format!("{}({})", method, field),
            })?;
        Ok(serde_json::from_value(member)?)
    }

    /// Call and extract a list member; the service omits empty lists.
    async fn call_list<T: DeserializeOwned>(&self, method: &str, params: Value, field: &str) -> Result<Vec<T>, RpcError> {
        let mut val = self.client.call(method, Some(params)).await?;
        match val.get_mut(field).map(Value::take) {
            Some(list) => Ok(serde_json::from_value(list)?),
            None => Ok(Vec::new()),
        }
    }

    // =========================================================================
    // Wallet Management
    // =========================================================================

    /// Open a wallet file.
    pub async fn open_wallet(&self, filename: &str, password: &str) -> Result<(), RpcError> {
        self.call_unit("open_wallet", json!({ "filename": filename, "password": password }))
            .await
    }

    /// Close the current wallet, saving it first when `autosave` is set.
    pub async fn close_wallet(&self, autosave: bool) -> Result<(), RpcError> {
        self.call_unit("close_wallet", json!({ "autosave_current": autosave })).await
    }

    /// Save the wallet and shut the service down.
    pub async fn stop_wallet(&self) -> Result<(), RpcError> {
        self.call_unit("stop_wallet", json!({})).await
    }

    /// Create a new wallet.
    pub async fn create_wallet(&self, filename: &str, password: &str, language: &str) -> Result<(), RpcError> {
        self.call_unit(
            "create_wallet",
            json!({ "filename": filename, "password": password, "language": language }),
        )
        .await
    }

    /// Restore a wallet from mnemonic seed. Returns the primary address.
    pub async fn restore_deterministic_wallet(
        &self,
        filename: &str,
        seed: &str,
        password: &str,
        restore_height: u64,
        language: &str,
    ) -> Result<String, RpcError> {
        self.call_field(
            "restore_deterministic_wallet",
            json!({
                "filename": filename,
                "seed": seed,
                "password": password,
                "restore_height": restore_height,
                "language": language,
            }),
            "address",
        )
        .await
    }

    /// Generate a wallet from keys. An empty `spendkey` makes a view-only wallet.
    pub async fn generate_from_keys(
        &self,
        filename: &str,
        address: &str,
        spendkey: &str,
        viewkey: &str,
        password: &str,
        restore_height: u64,
    ) -> Result<String, RpcError> {
        self.call_field(
            "generate_from_keys",
            json!({
                "filename": filename,
                "address": address,
                "spendkey": spendkey,
                "viewkey": viewkey,
                "password": password,
                "restore_height": restore_height,
            }),
            "address",
        )
        .await
    }

    pub async fn change_wallet_password(&self, old_password: &str, new_password: &str) -> Result<(), RpcError> {
        self.call_unit(
            "change_wallet_password",
            json!({ "old_password": old_password, "new_password": new_password }),
        )
        .await
    }

    /// Get available languages for mnemonic seed.
    pub async fn get_languages(&self) -> Result<Vec<String>, RpcError> {
        self.call_list("get_languages", json!({}), "languages").await
    }

    /// Save the wallet to disk.
    pub async fn store(&self) -> Result<(), RpcError> {
        self.call_unit("store", json!({})).await
    }

    // =========================================================================
    // Balance & Address
    // =========================================================================

    /// Balance of an account, optionally restricted to some subaddresses.
    pub async fn get_balance(&self, account_index: u32, address_indices: &[u32]) -> Result<BalanceInfo, RpcError> {
        self.call(
            "get_balance",
            json!({ "account_index": account_index, "address_indices": address_indices }),
        )
        .await
    }

    /// Addresses of an account; all of them when `address_indices` is empty.
    pub async fn get_address(&self, account_index: u32, address_indices: &[u32]) -> Result<AddressResult, RpcError> {
        self.call(
            "get_address",
            json!({ "account_index": account_index, "address_index": address_indices }),
        )
        .await
    }

    /// Create a new subaddress.
    pub async fn create_address(&self, account_index: u32, label: &str) -> Result<CreateAddressResult, RpcError> {
        self.call("create_address", json!({ "account_index": account_index, "label": label }))
            .await
    }

    /// Get all accounts, optionally only those with `tag`.
    pub async fn get_accounts(&self, tag: Option<&str>) -> Result<AccountsResult, RpcError> {
        let params = match tag {
            Some(t) => json!({ "tag": t }),
            None => json!({}),
        };
        self.call("get_accounts", params).await
    }

    pub async fn validate_address(&self, address: &str) -> Result<ValidateAddressResult, RpcError> {
        self.call("validate_address", json!({ "address": address })).await
    }

    /// Get the wallet's current height.
    pub async fn get_height(&self) -> Result<u64, RpcError> {
        self.call_field("get_height", json!({}), "height").await
    }

    /// Get the index of a subaddress given its address string.
    pub async fn get_address_index(&self, address: &str) -> Result<SubaddrIndex, RpcError> {
        let res: AddressIndexResult = self.call("get_address_index", json!({ "address": address })).await?;
        Ok(res.index)
    }

    pub async fn label_address(&self, account_index: u32, address_index: u32, label: &str) -> Result<(), RpcError> {
        self.call_unit(
            "label_address",
            json!({
                "index": { "major": account_index, "minor": address_index },
                "label": label,
            }),
        )
        .await
    }

    // =========================================================================
    // Account Management
    // =========================================================================

    /// Create a new account with an optional label.
    pub async fn create_account(&self, label: &str) -> Result<CreateAccountResult, RpcError> {
        self.call("create_account", json!({ "label": label })).await
    }

    pub async fn label_account(&self, account_index: u32, label: &str) -> Result<(), RpcError> {
        self.call_unit("label_account", json!({ "account_index": account_index, "label": label }))
            .await
    }

    pub async fn get_account_tags(&self) -> Result<Vec<AccountTag>, RpcError> {
        self.call_list("get_account_tags", json!({}), "account_tags").await
    }

    pub async fn tag_accounts(&self, tag: &str, accounts: &[u32]) -> Result<(), RpcError> {
        self.call_unit("tag_accounts", json!({ "tag": tag, "accounts": accounts })).await
    }

    pub async fn untag_accounts(&self, accounts: &[u32]) -> Result<(), RpcError> {
        self.call_unit("untag_accounts", json!({ "accounts": accounts })).await
    }

    pub async fn set_account_tag_description(&self, tag: &str, description: &str) -> Result<(), RpcError> {
        self.call_unit(
            "set_account_tag_description",
            json!({ "tag": tag, "description": description }),
        )
        .await
    }

    // =========================================================================
    // Address Book
    // =========================================================================

    /// Address book entries; all of them when `entries` is empty.
    pub async fn get_address_book(&self, entries: &[u64]) -> Result<Vec<AddressBookEntry>, RpcError> {
        self.call_list("get_address_book", json!({ "entries": entries }), "entries").await
    }

    /// Add an entry to the address book. Returns its index.
    pub async fn add_address_book(&self, address: &str, description: &str) -> Result<u64, RpcError> {
        self.call_field(
            "add_address_book",
            json!({ "address": address, "description": description }),
            "index",
        )
        .await
    }

    pub async fn edit_address_book(&self, index: u64, address: &str, description: &str) -> Result<(), RpcError> {
        self.call_unit(
            "edit_address_book",
            json!({
                "index": index,
                "set_address": true,
                "address": address,
                "set_description": true,
                "description": description,
            }),
        )
        .await
    }

    pub async fn delete_address_book(&self, index: u64) -> Result<(), RpcError> {
        self.call_unit("delete_address_book", json!({ "index": index })).await
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Create a single transaction; relayed unless `do_not_relay` is set.
    pub async fn transfer(&self, params: &TransferParams) -> Result<TransferResult, RpcError> {
        self.call("transfer", with_tx_flags(params)?).await
    }

    /// Create one or more transactions covering the destinations.
    pub async fn transfer_split(&self, params: &TransferParams) -> Result<TransferSplitResult, RpcError> {
        self.call("transfer_split", with_tx_flags(params)?).await
    }

    /// Sweep all unlocked balance to an address.
    pub async fn sweep_all(&self, params: &SweepParams) -> Result<TransferSplitResult, RpcError> {
        self.call("sweep_all", with_tx_flags(params)?).await
    }

    /// Sweep unmixable (dust) outputs.
    pub async fn sweep_dust(&self, do_not_relay: bool) -> Result<TransferSplitResult, RpcError> {
        let params = SweepParams {
            do_not_relay,
            ..Default::default()
        };
        self.call("sweep_dust", with_tx_flags(&params)?).await
    }

    /// Sweep a single output identified by its key image.
    pub async fn sweep_single(&self, params: &SweepParams) -> Result<TransferResult, RpcError> {
        self.call("sweep_single", with_tx_flags(params)?).await
    }

    /// Relay a transaction previously created with `do_not_relay`.
    pub async fn relay_tx(&self, metadata_hex: &str) -> Result<String, RpcError> {
        self.call_field("relay_tx", json!({ "hex": metadata_hex }), "tx_hash").await
    }

    /// Sign an unsigned transaction set (cold-signing workflow).
    pub async fn sign_transfer(&self, unsigned_txset: &str) -> Result<SignTransferResult, RpcError> {
        self.call("sign_transfer", json!({ "unsigned_txset": unsigned_txset })).await
    }

    /// Submit a previously signed transaction set.
    pub async fn submit_transfer(&self, tx_data_hex: &str) -> Result<Vec<String>, RpcError> {
        self.call_list("submit_transfer", json!({ "tx_data_hex": tx_data_hex }), "tx_hash_list")
            .await
    }

    // =========================================================================
    // Payments & History
    // =========================================================================

    pub async fn get_payments(&self, payment_id: &str) -> Result<Vec<PaymentEntry>, RpcError> {
        self.call_list("get_payments", json!({ "payment_id": payment_id }), "payments")
            .await
    }

    pub async fn get_bulk_payments(&self, payment_ids: &[&str], min_block_height: u64) -> Result<Vec<PaymentEntry>, RpcError> {
        self.call_list(
            "get_bulk_payments",
            json!({ "payment_ids": payment_ids, "min_block_height": min_block_height }),
            "payments",
        )
        .await
    }

    /// Get transfer history.
    pub async fn get_transfers(&self, filter: &TransfersFilter) -> Result<TransfersResult, RpcError> {
        self.call("get_transfers", serde_json::to_value(filter)?).await
    }

    /// Every transfer belonging to a transaction.
    pub async fn get_transfer_by_txid(&self, txid: &str, account_index: Option<u32>) -> Result<Vec<TransferEntry>, RpcError> {
        let mut params = json!({ "txid": txid });
        if let Some(idx) = account_index {
            params["account_index"] = json!(idx);
        }
        self.call_list("get_transfer_by_txid", params, "transfers").await
    }

    /// Owned outputs. `transfer_type` is `"all"`, `"available"` or `"unavailable"`.
    pub async fn incoming_transfers(
        &self,
        transfer_type: &str,
        account_index: u32,
        subaddr_indices: &[u32],
    ) -> Result<Vec<IncomingTransfer>, RpcError> {
        self.call_list(
            "incoming_transfers",
            json!({
                "transfer_type": transfer_type,
                "account_index": account_index,
                "subaddr_indices": subaddr_indices,
                "verbose": true,
            }),
            "transfers",
        )
        .await
    }

    // =========================================================================
    // Key Management
    // =========================================================================

    /// Query a key: `"mnemonic"`, `"view_key"` or `"spend_key"`.
    pub async fn query_key(&self, key_type: &str) -> Result<String, RpcError> {
        self.call_field("query_key", json!({ "key_type": key_type }), "key").await
    }

    /// Export signed key images; only those new since the last export unless `all`.
    pub async fn export_key_images(&self, all: bool) -> Result<Vec<KeyImageEntry>, RpcError> {
        self.call_list("export_key_images", json!({ "all": all }), "signed_key_images")
            .await
    }

    pub async fn import_key_images(&self, signed_key_images: &[KeyImageEntry]) -> Result<KeyImageImportResult, RpcError> {
        self.call(
            "import_key_images",
            json!({ "signed_key_images": signed_key_images }),
        )
        .await
    }

    /// Export outputs as hex data.
    pub async fn export_outputs(&self, all: bool) -> Result<String, RpcError> {
        self.call_field("export_outputs", json!({ "all": all }), "outputs_data_hex")
            .await
    }

    /// Import outputs from hex data. Returns the number imported.
    pub async fn import_outputs(&self, outputs_data_hex: &str) -> Result<u64, RpcError> {
        self.call_field(
            "import_outputs",
            json!({ "outputs_data_hex": outputs_data_hex }),
            "num_imported",
        )
        .await
    }

    // =========================================================================
    // Wallet Operations
    // =========================================================================

    /// Refresh the wallet (scan for new transactions).
    pub async fn refresh(&self, start_height: Option<u64>) -> Result<RefreshResult, RpcError> {
        let params = match start_height {
            Some(h) => json!({ "start_height": h }),
            None => json!({}),
        };
        self.call("refresh", params).await
    }

    /// Enable or disable the service's background refresh.
    pub async fn auto_refresh(&self, enable: bool, period: Option<u64>) -> Result<(), RpcError> {
        let mut params = json!({ "enable": enable });
        if let Some(p) = period {
            params["period"] = json!(p);
        }
        self.call_unit("auto_refresh", params).await
    }

    pub async fn rescan_blockchain(&self) -> Result<(), RpcError> {
        self.call_unit("rescan_blockchain", json!({})).await
    }

    pub async fn rescan_spent(&self) -> Result<(), RpcError> {
        self.call_unit("rescan_spent", json!({})).await
    }

    pub async fn get_version(&self) -> Result<u32, RpcError> {
        self.call_field("get_version", json!({}), "version").await
    }

    pub async fn set_daemon(&self, address: &str, trusted: bool, username: Option<&str>, password: Option<&str>) -> Result<(), RpcError> {
        let mut params = json!({ "address": address, "trusted": trusted });
        if let (Some(u), Some(p)) = (username, password) {
            params["username"] = json!(u);
            params["password"] = json!(p);
        }
        self.call_unit("set_daemon", params).await
    }

    pub async fn start_mining(&self, threads_count: u64, do_background_mining: bool, ignore_battery: bool) -> Result<(), RpcError> {
        self.call_unit(
            "start_mining",
            json!({
                "threads_count": threads_count,
                "do_background_mining": do_background_mining,
                "ignore_battery": ignore_battery,
            }),
        )
        .await
    }

    pub async fn stop_mining(&self) -> Result<(), RpcError> {
        self.call_unit("stop_mining", json!({})).await
    }

    // =========================================================================
    // Signing & Proofs
    // =========================================================================

    /// Sign arbitrary data with the wallet's spend key.
    pub async fn sign(&self, data: &str) -> Result<String, RpcError> {
        self.call_field("sign", json!({ "data": data }), "signature").await
    }

    pub async fn verify(&self, data: &str, address: &str, signature: &str) -> Result<bool, RpcError> {
        let val = self
            .client
            .call(
                "verify",
                Some(json!({ "data": data, "address": address, "signature": signature })),
            )
            .await?;
        Ok(val.get("good").and_then(Value::as_bool).unwrap_or(false))
    }

    pub async fn get_tx_key(&self, txid: &str) -> Result<String, RpcError> {
        self.call_field("get_tx_key", json!({ "txid": txid }), "tx_key").await
    }

    pub async fn check_tx_key(&self, txid: &str, tx_key: &str, address: &str) -> Result<CheckTxKeyResult, RpcError> {
        self.call(
            "check_tx_key",
            json!({ "txid": txid, "tx_key": tx_key, "address": address }),
        )
        .await
    }

    pub async fn get_tx_proof(&self, txid: &str, address: &str, message: &str) -> Result<String, RpcError> {
        self.call_field(
            "get_tx_proof",
            json!({ "txid": txid, "address": address, "message": message }),
            "signature",
        )
        .await
    }

    pub async fn check_tx_proof(
        &self,
        txid: &str,
        address: &str,
        message: &str,
        signature: &str,
    ) -> Result<CheckTxProofResult, RpcError> {
        self.call(
            "check_tx_proof",
            json!({ "txid": txid, "address": address, "message": message, "signature": signature }),
        )
        .await
    }

    pub async fn get_spend_proof(&self, txid: &str, message: &str) -> Result<String, RpcError> {
        self.call_field(
            "get_spend_proof",
            json!({ "txid": txid, "message": message }),
            "signature",
        )
        .await
    }

    pub async fn check_spend_proof(&self, txid: &str, message: &str, signature: &str) -> Result<bool, RpcError> {
        let val = self
            .client
            .call(
                "check_spend_proof",
                Some(json!({ "txid": txid, "message": message, "signature": signature })),
            )
            .await?;
        Ok(val.get("good").and_then(Value::as_bool).unwrap_or(false))
    }

    /// Reserve proof for the whole wallet (`amount == None`) or one account.
    pub async fn get_reserve_proof(&self, account_index: u32, amount: Option<u64>, message: &str) -> Result<String, RpcError> {
        let params = match amount {
            None => json!({ "all": true, "message": message }),
            Some(a) => json!({
                "all": false,
                "account_index": account_index,
                "amount": a,
                "message": message,
            }),
        };
        self.call_field("get_reserve_proof", params, "signature").await
    }

    pub async fn check_reserve_proof(&self, address: &str, message: &str, signature: &str) -> Result<CheckReserveProofResult, RpcError> {
        self.call(
            "check_reserve_proof",
            json!({ "address": address, "message": message, "signature": signature }),
        )
        .await
    }

    // =========================================================================
    // Notes & Attributes
    // =========================================================================

    pub async fn set_tx_notes(&self, txids: &[&str], notes: &[&str]) -> Result<(), RpcError> {
        self.call_unit("set_tx_notes", json!({ "txids": txids, "notes": notes })).await
    }

    pub async fn get_tx_notes(&self, txids: &[&str]) -> Result<Vec<String>, RpcError> {
        self.call_list("get_tx_notes", json!({ "txids": txids }), "notes").await
    }

    pub async fn set_attribute(&self, key: &str, value: &str) -> Result<(), RpcError> {
        self.call_unit("set_attribute", json!({ "key": key, "value": value })).await
    }

    pub async fn get_attribute(&self, key: &str) -> Result<String, RpcError> {
        self.call_field("get_attribute", json!({ "key": key }), "value").await
    }

    // =========================================================================
    // Integrated Addresses & URIs
    // =========================================================================

    pub async fn make_integrated_address(&self, standard_address: &str, payment_id: &str) -> Result<IntegratedAddressResult, RpcError> {
        self.call(
            "make_integrated_address",
            json!({ "standard_address": standard_address, "payment_id": payment_id }),
        )
        .await
    }

    pub async fn split_integrated_address(&self, integrated_address: &str) -> Result<SplitIntegratedAddressResult, RpcError> {
        self.call(
            "split_integrated_address",
            json!({ "integrated_address": integrated_address }),
        )
        .await
    }

    /// Create a `monero:` payment URI.
    pub async fn make_uri(&self, uri: &ParsedUri) -> Result<String, RpcError> {
        self.call_field(
            "make_uri",
            json!({
                "address": uri.address,
                "amount": uri.amount,
                "payment_id": uri.payment_id,
                "recipient_name": uri.recipient_name,
                "tx_description": uri.tx_description,
            }),
            "uri",
        )
        .await
    }

    pub async fn parse_uri(&self, uri: &str) -> Result<ParsedUri, RpcError> {
        self.call_field("parse_uri", json!({ "uri": uri }), "uri").await
    }

    // =========================================================================
    // Output Freeze/Thaw
    // =========================================================================

    pub async fn freeze(&self, key_image: &str) -> Result<(), RpcError> {
        self.call_unit("freeze", json!({ "key_image": key_image })).await
    }

    pub async fn thaw(&self, key_image: &str) -> Result<(), RpcError> {
        self.call_unit("thaw", json!({ "key_image": key_image })).await
    }

    pub async fn frozen(&self, key_image: &str) -> Result<bool, RpcError> {
        self.call_field("frozen", json!({ "key_image": key_image }), "frozen").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "4AYjQM9HoAFNUeC3cvSfgeAN9c3Z8nS3dLM2dCA8shsiQEB3jbxQUEjRmKDoZZG2ubXsxtiE9vZGiu5wPpSV9YSE3FVZcSu";

    #[test]
    fn test_wallet_rpc_creation() {
        let wallet = WalletRpc::new("http://localhost:18083").unwrap();
        assert_eq!(wallet.client().url(), "http://localhost:18083");
    }

    #[test]
    fn test_transfer_params_serialize() {
        let params = TransferParams {
            destinations: vec![Destination { address: ADDR.into(), amount: 100_000_000 }],
            account_index: 0,
            priority: priority::NORMAL,
            ring_size: 16,
            do_not_relay: true,
            ..Default::default()
        };
        let val = with_tx_flags(&params).unwrap();
        assert_eq!(val["destinations"][0]["amount"], 100_000_000);
        assert_eq!(val["priority"], 2);
        assert_eq!(val["do_not_relay"], true);
        assert_eq!(val["get_tx_metadata"], true);
        assert!(val.get("payment_id").is_none());
        assert!(val.get("subaddr_indices").is_none());
    }

    #[test]
    fn test_sweep_params_serialize() {
        let params = SweepParams {
            address: ADDR.into(),
            account_index: 1,
            below_amount: Some(5),
            ..Default::default()
        };
        let val = serde_json::to_value(&params).unwrap();
        assert_eq!(val["below_amount"], 5);
        assert!(val.get("key_image").is_none());
    }

    #[test]
    fn test_transfers_filter_serialize() {
        let filter = TransfersFilter {
            pool: false,
            min_height: Some(10),
            filter_by_height: true,
            ..Default::default()
        };
        let val = serde_json::to_value(&filter).unwrap();
        assert_eq!(val["in"], true);
        assert_eq!(val["pool"], false);
        assert_eq!(val["min_height"], 10);
        assert!(val.get("max_height").is_none());
    }

    #[test]
    fn test_balance_info_deserialize() {
        let json = json!({
            "balance": 500_000_000,
            "unlocked_balance": 400_000_000,
            "per_subaddress": [{
                "account_index": 0,
                "address_index": 1,
                "address": ADDR,
                "balance": 500_000_000,
                "unlocked_balance": 400_000_000,
                "num_unspent_outputs": 2
            }]
        });
        let info: BalanceInfo = serde_json::from_value(json).unwrap();
        assert_eq!(info.balance, 500_000_000);
        assert_eq!(info.per_subaddress[0].address_index, 1);
        assert_eq!(info.per_subaddress[0].num_unspent_outputs, 2);
    }

    #[test]
    fn test_transfers_result_deserialize() {
        let json = json!({
            "in": [{
                "txid": "abc123",
                "payment_id": "0000000000000000",
                "height": 100,
                "timestamp": 1700000000,
                "amount": 50_000_000,
                "fee": 0,
                "type": "in",
                "confirmations": 10,
                "address": ADDR,
                "subaddr_index": { "major": 0, "minor": 2 }
            }],
            "out": [{
                "txid": "def456",
                "amount": 7,
                "fee": 3,
                "type": "out",
                "destinations": [{ "address": ADDR, "amount": 7 }],
                "subaddr_indices": [{ "major": 0, "minor": 0 }]
            }]
        });
        let result: TransfersResult = serde_json::from_value(json).unwrap();
        assert_eq!(result.incoming[0].subaddr_index, SubaddrIndex { major: 0, minor: 2 });
        assert_eq!(result.out[0].destinations[0].amount, 7);
        assert_eq!(result.all().count(), 2);
    }

    #[test]
    fn test_split_result_into_transfers() {
        let split: TransferSplitResult = serde_json::from_value(json!({
            "tx_hash_list": ["aa", "bb"],
            "tx_key_list": ["k1", "k2"],
            "amount_list": [10, 20],
            "fee_list": [1, 2],
            "tx_metadata_list": ["m1", "m2"]
        }))
        .unwrap();
        let txs = split.into_transfers();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[1].tx_hash, "bb");
        assert_eq!(txs[1].fee, 2);
        assert_eq!(txs[1].tx_metadata, "m2");
        assert_eq!(txs[1].tx_blob, "");
    }

    #[test]
    fn test_check_tx_proof_result_deserialize() {
        let result: CheckTxProofResult = serde_json::from_value(json!({
            "good": true,
            "confirmations": 42,
            "received": 1_000_000_000,
            "in_pool": false
        }))
        .unwrap();
        assert!(result.good);
        assert_eq!(result.confirmations, 42);
        assert_eq!(result.received, 1_000_000_000);
    }

    #[test]
    fn test_incoming_transfer_deserialize() {
        let out: IncomingTransfer = serde_json::from_value(json!({
            "amount": 60000000000000_u64,
            "spent": false,
            "global_index": 122405,
            "tx_hash": "ff",
            "key_image": "ee",
            "subaddr_index": { "major": 1, "minor": 0 },
            "unlocked": true
        }))
        .unwrap();
        assert_eq!(out.subaddr_index.major, 1);
        assert!(out.unlocked && !out.frozen);
    }
}
