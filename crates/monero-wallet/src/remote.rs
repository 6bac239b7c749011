//! Wallet backed by a remote wallet service (`monero-wallet-rpc`).
//!
//! Every operation is one or more JSON-RPC round trips; the service owns
//! the wallet file. Responses are mapped into the domain model here and
//! duplicate observations of a transaction are merged before returning.

use crate::account::{Account, AccountTag, AddressBookEntry, Subaddress};
use crate::check::{CheckReserve, CheckTx};
use crate::error::WalletError;
use crate::listener::{self, WalletListener};
use crate::output::{KeyImage, KeyImageImportResult, Output};
use crate::query::{OutputQuery, TxQuery};
use crate::reconcile::MergeRules;
use crate::send::SendRequest;
use crate::tx::{merge_txs, Destination, Transfer, Tx};
use crate::wallet::{MoneroWallet, SyncResult};
use async_trait::async_trait;
use log::{debug, info};
use monero_rpc::error::codes;
use monero_rpc::wallet_rpc::{
    self, IncomingTransfer, KeyImageEntry, ParsedUri, SweepParams, TransferEntry, TransferParams,
    TransferResult, TransfersFilter,
};
use monero_rpc::{RpcConfig, RpcConnection, RpcError, WalletRpc};
use monero_types::Network;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A wallet opened in a remote wallet service.
#[derive(Debug)]
pub struct RemoteWallet {
    rpc: WalletRpc,
    network: Option<Network>,
    closed: AtomicBool,
    /// metadata -> tx id of transactions relayed through this client.
    relayed: Mutex<HashMap<String, String>>,
}

impl RemoteWallet {
    /// Wrap a service that already has a wallet open.
    pub fn new(rpc: WalletRpc) -> Self {
        Self {
            rpc,
            network: None,
            closed: AtomicBool::new(false),
            relayed: Mutex::new(HashMap::new()),
        }
    }

    pub fn connect(config: RpcConfig) -> Result<Self, WalletError> {
        Ok(Self::new(WalletRpc::with_config(config)?))
    }

    /// Restrict destination validation to `network`.
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    /// Open `filename` in the service.
    pub async fn open(rpc: WalletRpc, filename: &str, password: &str) -> Result<Self, WalletError> {
        rpc.open_wallet(filename, password).await.map_err(|e| match e.rpc_code() {
            Some(codes::WALLET_UNKNOWN_ERROR) | Some(codes::WALLET_NOT_OPEN) => {
                WalletError::WalletNotFound(filename.to_string())
            }
            _ => e.into(),
        })?;
        info!("opened remote wallet {}", filename);
        Ok(Self::new(rpc))
    }

    /// Create `filename` in the service and leave it open.
    pub async fn create(rpc: WalletRpc, filename: &str, password: &str, language: &str) -> Result<Self, WalletError> {
        rpc.create_wallet(filename, password, language).await.map_err(|e| match e.rpc_code() {
            Some(codes::WALLET_ALREADY_EXISTS) => WalletError::WalletAlreadyExists(filename.to_string()),
            _ => e.into(),
        })?;
        info!("created remote wallet {}", filename);
        Ok(Self::new(rpc))
    }

    pub fn rpc(&self) -> &WalletRpc {
        &self.rpc
    }

    /// Point the service at a daemon.
    pub async fn set_daemon_connection(&self, connection: &RpcConnection, trusted: bool) -> Result<(), WalletError> {
        self.ensure_open()?;
        self.rpc
            .set_daemon(
                &connection.uri,
                trusted,
                connection.username.as_deref(),
                connection.password.as_deref(),
            )
            .await?;
        Ok(())
    }

    /// Sign an unsigned transaction set. Returns the signed set.
    pub async fn sign_txs(&self, unsigned_txset: &str) -> Result<String, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.sign_transfer(unsigned_txset).await?.signed_txset)
    }

    /// Submit a signed transaction set. Returns the tx ids.
    pub async fn submit_txs(&self, signed_txset: &str) -> Result<Vec<String>, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.submit_transfer(signed_txset).await?)
    }

    fn ensure_open(&self) -> Result<(), WalletError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WalletError::WalletClosed);
        }
        Ok(())
    }

    async fn account_indices(&self) -> Result<Vec<u32>, WalletError> {
        Ok(self
            .rpc
            .get_accounts(None)
            .await?
            .subaddress_accounts
            .iter()
            .map(|a| a.account_index)
            .collect())
    }

    async fn fetch_outputs(&self, account_index: Option<u32>, subaddress_indices: &[u32]) -> Result<Vec<Output>, WalletError> {
        let accounts = match account_index {
            Some(a) => vec![a],
            None => self.account_indices().await?,
        };
        let mut outputs = Vec::new();
        for account in accounts {
            let transfers = self.rpc.incoming_transfers("all", account, subaddress_indices).await?;
            outputs.extend(transfers.iter().map(output_from_incoming));
        }
        Ok(outputs)
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// The service reports "no payment id" as an empty or all-zero string.
fn payment_id(s: &str) -> Option<String> {
    (!s.is_empty() && s.bytes().any(|b| b != b'0')).then(|| s.to_string())
}

/// Map one `get_transfers` entry to a transaction observation.
pub(crate) fn tx_from_entry(entry: &TransferEntry) -> Tx {
    let mut tx = Tx::new(entry.txid.clone());
    tx.fee = Some(entry.fee);
    tx.unlock_time = Some(entry.unlock_time);
    tx.payment_id = payment_id(&entry.payment_id);
    tx.note = non_empty(&entry.note);
    tx.is_double_spend = Some(entry.double_spend_seen);

    let kind = entry.transfer_type.as_str();
    match kind {
        "in" | "out" | "block" => {
            tx.is_confirmed = Some(true);
            tx.in_pool = Some(false);
            tx.is_relayed = Some(true);
            tx.is_failed = Some(false);
            tx.height = Some(entry.height);
            tx.num_confirmations = Some(entry.confirmations);
            tx.timestamp = Some(entry.timestamp);
        }
        "pool" | "pending" => {
            tx.is_confirmed = Some(false);
            tx.in_pool = Some(true);
            tx.is_relayed = Some(true);
            tx.is_failed = Some(false);
            tx.num_confirmations = Some(0);
            tx.received_timestamp = Some(entry.timestamp);
        }
        "failed" => {
            tx.is_confirmed = Some(false);
            tx.in_pool = Some(false);
            tx.is_failed = Some(true);
            tx.received_timestamp = Some(entry.timestamp);
        }
        other => debug!("unknown transfer type {:?} for {}", other, entry.txid),
    }
    tx.is_miner_tx = Some(kind == "block");

    let account = entry.subaddr_index.major;
    if matches!(kind, "in" | "pool" | "block") {
        let mut transfer = Transfer::incoming(&entry.txid, account, entry.subaddr_index.minor, entry.amount);
        transfer.address = non_empty(&entry.address);
        tx.incoming_transfers.push(transfer);
    } else {
        let mut indices: Vec<u32> = entry.subaddr_indices.iter().map(|i| i.minor).collect();
        indices.sort_unstable();
        indices.dedup();
        let destinations = entry
            .destinations
            .iter()
            .map(|d| Destination::new(d.address.clone(), d.amount))
            .collect();
        let mut transfer = Transfer::outgoing(&entry.txid, account, indices, destinations);
        transfer.amount = Some(entry.amount);
        tx.outgoing_transfer = Some(transfer);
    }
    tx
}

pub(crate) fn output_from_incoming(t: &IncomingTransfer) -> Output {
    Output {
        tx_id: t.tx_hash.clone(),
        account_index: t.subaddr_index.major,
        subaddress_index: t.subaddr_index.minor,
        amount: t.amount,
        key_image: non_empty(&t.key_image).map(KeyImage::new),
        is_spent: Some(t.spent),
        is_frozen: Some(t.frozen),
        is_unlocked: Some(t.unlocked),
        stealth_public_key: non_empty(&t.pubkey),
        global_index: Some(t.global_index),
        index_in_tx: None,
    }
}

/// Distribute `destinations` over transactions carrying `amounts`, in order.
/// A destination may be split across two transactions; the last transaction
/// takes whatever remains.
pub(crate) fn split_destinations(destinations: &[Destination], amounts: &[u64]) -> Vec<Vec<Destination>> {
    let mut out = vec![Vec::new(); amounts.len()];
    let mut remaining: Vec<Destination> = destinations.to_vec();
    remaining.reverse();
    for (i, &capacity) in amounts.iter().enumerate() {
        let last = i + 1 == amounts.len();
        let mut left = capacity;
        while let Some(mut d) = remaining.pop() {
            if last || d.amount <= left {
                left = left.saturating_sub(d.amount);
                out[i].push(d);
                continue;
            }
            if left > 0 {
                out[i].push(Destination::new(d.address.clone(), left));
                d.amount -= left;
            }
            remaining.push(d);
            break;
        }
    }
    out
}

/// Build the created transactions of a send from the service's results.
pub(crate) fn txs_from_send(results: Vec<TransferResult>, request: &SendRequest) -> Vec<Tx> {
    let amounts: Vec<u64> = results.iter().map(|r| r.amount).collect();
    let per_tx = if results.len() == 1 {
        vec![request.destinations.clone()]
    } else {
        split_destinations(&request.destinations, &amounts)
    };
    let relayed = !request.do_not_relay;
    results
        .into_iter()
        .zip(per_tx)
        .map(|(r, destinations)| {
            let mut transfer = Transfer::outgoing(&r.tx_hash, request.account_index, request.subaddress_indices.clone(), destinations);
            transfer.amount = Some(r.amount);
            Tx {
                is_confirmed: Some(false),
                is_relayed: Some(relayed),
                in_pool: Some(relayed),
                is_failed: Some(false),
                num_confirmations: Some(0),
                unlock_time: Some(request.unlock_time),
                ring_size: Some(request.ring_size),
                fee: Some(r.fee),
                weight: Some(r.weight),
                key: non_empty(&r.tx_key),
                blob: non_empty(&r.tx_blob),
                metadata: non_empty(&r.tx_metadata),
                payment_id: request.payment_id.clone(),
                outgoing_transfer: Some(transfer),
                ..Tx::new(r.tx_hash)
            }
        })
        .collect()
}

fn sweep_txs(results: Vec<TransferResult>, request: &SendRequest, address: &str) -> Vec<Tx> {
    let mut txs = txs_from_send(results, request);
    for tx in &mut txs {
        if let Some(t) = tx.outgoing_transfer.as_mut() {
            t.destinations = vec![Destination::new(address, t.amount.unwrap_or(0))];
        }
    }
    txs
}

fn transfer_params(request: &SendRequest) -> TransferParams {
    TransferParams {
        destinations: request
            .destinations
            .iter()
            .map(|d| wallet_rpc::Destination {
                address: d.address.clone(),
                amount: d.amount,
            })
            .collect(),
        account_index: request.account_index,
        subaddr_indices: request.subaddress_indices.clone(),
        priority: request.priority.as_u32(),
        ring_size: request.ring_size,
        unlock_time: request.unlock_time,
        payment_id: request.payment_id.clone(),
        do_not_relay: request.do_not_relay,
    }
}

fn sweep_params(request: &SendRequest, address: &str, subaddress_indices: Vec<u32>) -> SweepParams {
    SweepParams {
        address: address.to_string(),
        account_index: request.account_index,
        subaddr_indices: subaddress_indices,
        key_image: request.key_image.clone().unwrap_or_default(),
        priority: request.priority.as_u32(),
        ring_size: request.ring_size,
        unlock_time: request.unlock_time,
        payment_id: request.payment_id.clone(),
        below_amount: request.below_amount,
        do_not_relay: request.do_not_relay,
    }
}

fn str_refs(v: &[String]) -> Vec<&str> {
    v.iter().map(String::as_str).collect()
}

#[async_trait]
impl MoneroWallet for RemoteWallet {
    async fn get_address(&self, account_index: u32, subaddress_index: u32) -> Result<String, WalletError> {
        self.ensure_open()?;
        let res = self.rpc.get_address(account_index, &[subaddress_index]).await?;
        Ok(res
            .addresses
            .into_iter()
            .find(|a| a.address_index == subaddress_index)
            .map(|a| a.address)
            .unwrap_or(res.address))
    }

    async fn get_address_index(&self, address: &str) -> Result<Subaddress, WalletError> {
        self.ensure_open()?;
        let index = self.rpc.get_address_index(address).await?;
        Ok(Subaddress::new(index.major, index.minor, address.to_string()))
    }

    async fn get_integrated_address(
        &self,
        standard_address: Option<&str>,
        payment_id: Option<&str>,
    ) -> Result<String, WalletError> {
        self.ensure_open()?;
        let res = self
            .rpc
            .make_integrated_address(standard_address.unwrap_or(""), payment_id.unwrap_or(""))
            .await?;
        Ok(res.integrated_address)
    }

    async fn get_mnemonic(&self) -> Result<String, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.query_key("mnemonic").await?)
    }

    async fn get_private_view_key(&self) -> Result<String, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.query_key("view_key").await?)
    }

    async fn get_private_spend_key(&self) -> Result<String, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.query_key("spend_key").await?)
    }

    async fn get_height(&self) -> Result<u64, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.get_height().await?)
    }

    /// The service scans on its own; the listener gets one final progress
    /// call when blocks were fetched.
    async fn sync(
        &self,
        start_height: Option<u64>,
        listener: Option<Arc<dyn WalletListener>>,
    ) -> Result<SyncResult, WalletError> {
        self.ensure_open()?;
        let res = self.rpc.refresh(start_height).await?;
        if let Some(l) = listener.filter(|_| res.blocks_fetched > 0) {
            let height = self.rpc.get_height().await?;
            let start = start_height.unwrap_or_else(|| height.saturating_sub(res.blocks_fetched));
            listener::deliver(|| l.on_sync_progress(height.saturating_sub(1), start, height, 1.0, "Synchronized"));
        }
        Ok(SyncResult {
            num_blocks_fetched: res.blocks_fetched,
            received_money: res.received_money,
        })
    }

    async fn start_syncing(&self, interval: Option<Duration>) -> Result<(), WalletError> {
        self.ensure_open()?;
        self.rpc.auto_refresh(true, interval.map(|d| d.as_secs().max(1))).await?;
        Ok(())
    }

    async fn stop_syncing(&self) -> Result<(), WalletError> {
        self.ensure_open()?;
        self.rpc.auto_refresh(false, None).await?;
        Ok(())
    }

    async fn rescan_spent(&self) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.rescan_spent().await?)
    }

    async fn rescan_blockchain(&self) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.rescan_blockchain().await?)
    }

    async fn get_balance(&self, account_index: Option<u32>, subaddress_index: Option<u32>) -> Result<u64, WalletError> {
        self.ensure_open()?;
        match (account_index, subaddress_index) {
            (None, None) => Ok(self.rpc.get_accounts(None).await?.total_balance),
            (None, Some(_)) => Err(WalletError::InvalidArgument("subaddress index without account index".into())),
            (Some(a), None) => Ok(self.rpc.get_balance(a, &[]).await?.balance),
            (Some(a), Some(s)) => Ok(self
                .rpc
                .get_balance(a, &[s])
                .await?
                .per_subaddress
                .iter()
                .find(|b| b.address_index == s)
                .map_or(0, |b| b.balance)),
        }
    }

    async fn get_unlocked_balance(
        &self,
        account_index: Option<u32>,
        subaddress_index: Option<u32>,
    ) -> Result<u64, WalletError> {
        self.ensure_open()?;
        match (account_index, subaddress_index) {
            (None, None) => Ok(self.rpc.get_accounts(None).await?.total_unlocked_balance),
            (None, Some(_)) => Err(WalletError::InvalidArgument("subaddress index without account index".into())),
            (Some(a), None) => Ok(self.rpc.get_balance(a, &[]).await?.unlocked_balance),
            (Some(a), Some(s)) => Ok(self
                .rpc
                .get_balance(a, &[s])
                .await?
                .per_subaddress
                .iter()
                .find(|b| b.address_index == s)
                .map_or(0, |b| b.unlocked_balance)),
        }
    }

    async fn get_accounts(&self, include_subaddresses: bool, tag: Option<&str>) -> Result<Vec<Account>, WalletError> {
        self.ensure_open()?;
        let res = self.rpc.get_accounts(tag).await?;
        let mut accounts = Vec::with_capacity(res.subaddress_accounts.len());
        for entry in res.subaddress_accounts {
            let subaddresses = if include_subaddresses {
                self.get_subaddresses(entry.account_index, &[]).await?
            } else {
                Vec::new()
            };
            accounts.push(Account {
                index: entry.account_index,
                primary_address: entry.base_address,
                balance: entry.balance,
                unlocked_balance: entry.unlocked_balance,
                label: non_empty(&entry.label),
                tag: non_empty(&entry.tag),
                subaddresses,
            });
        }
        Ok(accounts)
    }

    async fn create_account(&self, label: Option<&str>) -> Result<Account, WalletError> {
        self.ensure_open()?;
        let res = self.rpc.create_account(label.unwrap_or("")).await?;
        let mut primary = Subaddress::new(res.account_index, 0, res.address.clone());
        primary.label = label.map(str::to_string);
        Ok(Account {
            index: res.account_index,
            primary_address: res.address,
            label: label.map(str::to_string),
            subaddresses: vec![primary],
            ..Default::default()
        })
    }

    async fn get_subaddresses(&self, account_index: u32, subaddress_indices: &[u32]) -> Result<Vec<Subaddress>, WalletError> {
        self.ensure_open()?;
        let addresses = self.rpc.get_address(account_index, subaddress_indices).await?;
        let balances = self.rpc.get_balance(account_index, subaddress_indices).await?;
        let mut subaddresses: Vec<Subaddress> = addresses
            .addresses
            .into_iter()
            .map(|a| {
                let mut sub = Subaddress::new(account_index, a.address_index, a.address);
                sub.label = non_empty(&a.label);
                sub.is_used = a.used;
                if let Some(b) = balances.per_subaddress.iter().find(|b| b.address_index == a.address_index) {
                    sub.set_balances(b.balance, b.unlocked_balance, b.num_unspent_outputs);
                }
                sub
            })
            .collect();
        subaddresses.sort_by_key(|s| s.subaddress_index);
        Ok(subaddresses)
    }

    async fn create_subaddress(&self, account_index: u32, label: Option<&str>) -> Result<Subaddress, WalletError> {
        self.ensure_open()?;
        let res = self.rpc.create_address(account_index, label.unwrap_or("")).await?;
        let mut sub = Subaddress::new(account_index, res.address_index, res.address);
        sub.label = label.map(str::to_string);
        Ok(sub)
    }

    async fn set_subaddress_label(&self, account_index: u32, subaddress_index: u32, label: &str) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.label_address(account_index, subaddress_index, label).await?)
    }

    async fn get_txs(&self, query: &TxQuery) -> Result<Vec<Tx>, WalletError> {
        self.ensure_open()?;
        let filter = TransfersFilter {
            all_accounts: true,
            ..Default::default()
        };
        let transfers = self.rpc.get_transfers(&filter).await?;
        let mut txs = merge_txs(transfers.all().map(tx_from_entry), &MergeRules::default())?;

        if query.output_query.is_some() {
            for output in self.fetch_outputs(None, &[]).await? {
                if let Some(tx) = txs.iter_mut().find(|t| t.id == output.tx_id) {
                    tx.outputs.push(output);
                }
            }
        }
        txs.retain(|tx| query.matches(tx));
        Ok(txs)
    }

    async fn get_outputs(&self, query: &OutputQuery) -> Result<Vec<Output>, WalletError> {
        self.ensure_open()?;
        let mut outputs = self.fetch_outputs(query.account_index, &query.subaddress_indices).await?;
        outputs.retain(|o| query.matches_output(o));
        if let Some(tx_query) = &query.tx_query {
            let txs = self.get_txs(&TxQuery::default()).await?;
            outputs.retain(|o| txs.iter().any(|t| t.id == o.tx_id && tx_query.matches(t)));
        }
        Ok(outputs)
    }

    async fn get_outputs_hex(&self) -> Result<String, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.export_outputs(true).await?)
    }

    async fn import_outputs_hex(&self, outputs_hex: &str) -> Result<u64, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.import_outputs(outputs_hex).await?)
    }

    async fn get_key_images(&self) -> Result<Vec<KeyImage>, WalletError> {
        self.ensure_open()?;
        Ok(self
            .rpc
            .export_key_images(true)
            .await?
            .into_iter()
            .map(|e| KeyImage {
                hex: e.key_image,
                signature: Some(e.signature),
            })
            .collect())
    }

    async fn get_new_key_images_from_last_import(&self) -> Result<Vec<KeyImage>, WalletError> {
        self.ensure_open()?;
        Ok(self
            .rpc
            .export_key_images(false)
            .await?
            .into_iter()
            .map(|e| KeyImage {
                hex: e.key_image,
                signature: Some(e.signature),
            })
            .collect())
    }

    async fn import_key_images(&self, key_images: &[KeyImage]) -> Result<KeyImageImportResult, WalletError> {
        self.ensure_open()?;
        let entries = key_images
            .iter()
            .map(|k| {
                let signature = k
                    .signature
                    .clone()
                    .ok_or_else(|| WalletError::InvalidArgument(format!("key image {} has no signature", k.hex)))?;
                Ok(KeyImageEntry {
                    key_image: k.hex.clone(),
                    signature,
                })
            })
            .collect::<Result<Vec<_>, WalletError>>()?;
        let res = self.rpc.import_key_images(&entries).await?;
        Ok(KeyImageImportResult {
            height: res.height,
            spent_amount: res.spent,
            unspent_amount: res.unspent,
        })
    }

    async fn freeze_output(&self, key_image: &str) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.freeze(key_image).await?)
    }

    async fn thaw_output(&self, key_image: &str) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.thaw(key_image).await?)
    }

    async fn is_output_frozen(&self, key_image: &str) -> Result<bool, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.frozen(key_image).await?)
    }

    async fn create_txs(&self, request: &SendRequest) -> Result<Vec<Tx>, WalletError> {
        self.ensure_open()?;
        request.validate(self.network)?;
        let params = transfer_params(request);
        let results = if request.can_split {
            self.rpc.transfer_split(&params).await?.into_transfers()
        } else {
            vec![self.rpc.transfer(&params).await?]
        };
        let txs = txs_from_send(results, request);
        debug!("created {} tx(s), relayed: {}", txs.len(), !request.do_not_relay);
        Ok(txs)
    }

    async fn sweep_unlocked(&self, request: &SendRequest) -> Result<Vec<Tx>, WalletError> {
        self.ensure_open()?;
        request.validate_sweep(self.network)?;
        let address = request.sweep_address()?;
        let groups: Vec<Vec<u32>> = if request.sweep_each_subaddress == Some(true) {
            let subs = if request.subaddress_indices.is_empty() {
                self.get_subaddresses(request.account_index, &[]).await?
            } else {
                self.get_subaddresses(request.account_index, &request.subaddress_indices).await?
            };
            subs.into_iter()
                .filter(|s| s.unlocked_balance > 0)
                .map(|s| vec![s.subaddress_index])
                .collect()
        } else {
            vec![request.subaddress_indices.clone()]
        };
        let mut txs = Vec::new();
        for indices in groups {
            let params = sweep_params(request, address, indices);
            let results = self.rpc.sweep_all(&params).await?.into_transfers();
            txs.extend(sweep_txs(results, request, address));
        }
        Ok(txs)
    }

    async fn sweep_output(&self, request: &SendRequest) -> Result<Tx, WalletError> {
        self.ensure_open()?;
        request.validate_sweep(self.network)?;
        if request.key_image.is_none() {
            return Err(WalletError::InvalidArgument("sweep_output needs a key image".into()));
        }
        let address = request.sweep_address()?;
        let result = self.rpc.sweep_single(&sweep_params(request, address, Vec::new())).await?;
        sweep_txs(vec![result], request, address)
            .pop()
            .ok_or_else(|| WalletError::InvalidArgument("sweep created no transaction".into()))
    }

    async fn sweep_dust(&self, do_not_relay: bool) -> Result<Vec<Tx>, WalletError> {
        self.ensure_open()?;
        let request = SendRequest::new(0).do_not_relay(do_not_relay);
        let results = self.rpc.sweep_dust(do_not_relay).await?.into_transfers();
        Ok(txs_from_send(results, &request))
    }

    async fn relay_txs(&self, metadatas: &[String]) -> Result<Vec<String>, WalletError> {
        self.ensure_open()?;
        let mut ids = Vec::with_capacity(metadatas.len());
        for metadata in metadatas {
            let known = self
                .relayed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(metadata)
                .cloned();
            let id = match known {
                Some(id) => id,
                None => {
                    let id = self.rpc.relay_tx(metadata).await.map_err(relay_error)?;
                    self.relayed
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(metadata.clone(), id.clone());
                    id
                }
            };
            ids.push(id);
        }
        Ok(ids)
    }

    async fn sign_message(&self, message: &str) -> Result<String, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.sign(message).await?)
    }

    async fn verify_message(&self, message: &str, address: &str, signature: &str) -> Result<bool, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.verify(message, address, signature).await?)
    }

    async fn get_tx_key(&self, tx_id: &str) -> Result<String, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.get_tx_key(tx_id).await?)
    }

    async fn check_tx_key(&self, tx_id: &str, tx_key: &str, address: &str) -> Result<CheckTx, WalletError> {
        self.ensure_open()?;
        let res = self.rpc.check_tx_key(tx_id, tx_key, address).await?;
        Ok(CheckTx::good(res.confirmations, res.in_pool, res.received))
    }

    async fn get_tx_proof(&self, tx_id: &str, address: &str, message: Option<&str>) -> Result<String, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.get_tx_proof(tx_id, address, message.unwrap_or("")).await?)
    }

    async fn check_tx_proof(
        &self,
        tx_id: &str,
        address: &str,
        message: Option<&str>,
        signature: &str,
    ) -> Result<CheckTx, WalletError> {
        self.ensure_open()?;
        let res = self
            .rpc
            .check_tx_proof(tx_id, address, message.unwrap_or(""), signature)
            .await?;
        Ok(if res.good {
            CheckTx::good(res.confirmations, res.in_pool, res.received)
        } else {
            CheckTx::bad()
        })
    }

    async fn get_spend_proof(&self, tx_id: &str, message: Option<&str>) -> Result<String, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.get_spend_proof(tx_id, message.unwrap_or("")).await?)
    }

    async fn check_spend_proof(&self, tx_id: &str, message: Option<&str>, signature: &str) -> Result<bool, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.check_spend_proof(tx_id, message.unwrap_or(""), signature).await?)
    }

    async fn get_reserve_proof_wallet(&self, message: &str) -> Result<String, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.get_reserve_proof(0, None, message).await?)
    }

    async fn get_reserve_proof_account(&self, account_index: u32, amount: u64, message: &str) -> Result<String, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.get_reserve_proof(account_index, Some(amount), message).await?)
    }

    async fn check_reserve_proof(&self, address: &str, message: &str, signature: &str) -> Result<CheckReserve, WalletError> {
        self.ensure_open()?;
        let res = self.rpc.check_reserve_proof(address, message, signature).await?;
        Ok(if res.good {
            CheckReserve::good(res.total, res.spent)
        } else {
            CheckReserve::bad()
        })
    }

    async fn get_tx_notes(&self, tx_ids: &[String]) -> Result<Vec<String>, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.get_tx_notes(&str_refs(tx_ids)).await?)
    }

    async fn set_tx_notes(&self, tx_ids: &[String], notes: &[String]) -> Result<(), WalletError> {
        self.ensure_open()?;
        if tx_ids.len() != notes.len() {
            return Err(WalletError::InvalidArgument(format!(
                "{} tx ids but {} notes",
                tx_ids.len(),
                notes.len()
            )));
        }
        Ok(self.rpc.set_tx_notes(&str_refs(tx_ids), &str_refs(notes)).await?)
    }

    async fn get_attribute(&self, key: &str) -> Result<Option<String>, WalletError> {
        self.ensure_open()?;
        match self.rpc.get_attribute(key).await {
            Ok(value) => Ok(Some(value)),
            Err(RpcError::Rpc { code, .. }) if code == codes::WALLET_ATTRIBUTE_NOT_FOUND => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_attribute(&self, key: &str, value: &str) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.set_attribute(key, value).await?)
    }

    async fn get_address_book_entries(&self, indices: &[u64]) -> Result<Vec<AddressBookEntry>, WalletError> {
        self.ensure_open()?;
        Ok(self
            .rpc
            .get_address_book(indices)
            .await?
            .into_iter()
            .map(|e| AddressBookEntry {
                index: e.index,
                address: e.address,
                description: non_empty(&e.description),
                payment_id: payment_id(&e.payment_id),
            })
            .collect())
    }

    async fn add_address_book_entry(&self, address: &str, description: Option<&str>) -> Result<u64, WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.add_address_book(address, description.unwrap_or("")).await?)
    }

    async fn delete_address_book_entry(&self, index: u64) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.delete_address_book(index).await?)
    }

    async fn tag_accounts(&self, tag: &str, account_indices: &[u32]) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.tag_accounts(tag, account_indices).await?)
    }

    async fn untag_accounts(&self, account_indices: &[u32]) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.untag_accounts(account_indices).await?)
    }

    async fn get_account_tags(&self) -> Result<Vec<AccountTag>, WalletError> {
        self.ensure_open()?;
        Ok(self
            .rpc
            .get_account_tags()
            .await?
            .into_iter()
            .map(|t| AccountTag {
                tag: t.tag,
                label: non_empty(&t.label),
                account_indices: t.accounts,
            })
            .collect())
    }

    async fn set_account_tag_label(&self, tag: &str, label: &str) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.set_account_tag_description(tag, label).await?)
    }

    async fn create_payment_uri(&self, request: &SendRequest) -> Result<String, WalletError> {
        self.ensure_open()?;
        let [dest] = request.destinations.as_slice() else {
            return Err(WalletError::InvalidArgument("payment URI needs exactly one destination".into()));
        };
        let uri = ParsedUri {
            address: dest.address.clone(),
            amount: dest.amount,
            payment_id: request.payment_id.clone().unwrap_or_default(),
            ..Default::default()
        };
        Ok(self.rpc.make_uri(&uri).await?)
    }

    async fn parse_payment_uri(&self, uri: &str) -> Result<SendRequest, WalletError> {
        self.ensure_open()?;
        let parsed = self.rpc.parse_uri(uri).await?;
        let mut request = SendRequest::new(0).destination(&parsed.address, parsed.amount);
        request.payment_id = payment_id(&parsed.payment_id);
        Ok(request)
    }

    async fn start_mining(&self, num_threads: u64, background: bool, ignore_battery: bool) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.start_mining(num_threads, background, ignore_battery).await?)
    }

    async fn stop_mining(&self) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.stop_mining().await?)
    }

    async fn change_password(&self, old_password: &str, new_password: &str) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.change_wallet_password(old_password, new_password).await?)
    }

    async fn save(&self) -> Result<(), WalletError> {
        self.ensure_open()?;
        Ok(self.rpc.store().await?)
    }

    async fn close(&self, save: bool) -> Result<(), WalletError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.relayed.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.rpc.close_wallet(save).await?;
        info!("closed remote wallet");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// The service refuses a relay whose inputs the daemon already saw spent.
fn relay_error(e: RpcError) -> WalletError {
    match e {
        RpcError::Rpc { ref message, .. } if is_double_spend(message) => WalletError::TxAlreadyRelayed(message.clone()),
        other => other.into(),
    }
}

fn is_double_spend(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("double spend") || message.contains("double_spend") || message.contains("already")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TransferQuery;
    use serde_json::json;

    fn entry(v: serde_json::Value) -> TransferEntry {
        serde_json::from_value(v).unwrap()
    }

    #[tokio::test]
    async fn test_close_forgets_relayed_txs() {
        let w = RemoteWallet::new(WalletRpc::new("http://127.0.0.1:1").unwrap());
        w.relayed.lock().unwrap().insert("meta".into(), "id".into());
        // The service is unreachable, but the cache is dropped first.
        assert!(w.close(false).await.unwrap_err().is_network());
        assert!(w.relayed.lock().unwrap().is_empty());
        assert!(w.is_closed());
    }

    #[test]
    fn test_relay_error_mapping() {
        let rejected = RpcError::Rpc {
            code: -4,
            message: "Transaction was rejected by daemon with status: Failed. Reason: double spend".into(),
            method: "relay_tx".into(),
        };
        assert!(matches!(relay_error(rejected), WalletError::TxAlreadyRelayed(_)));

        let bad_metadata = RpcError::Rpc {
            code: -27,
            message: "Failed to parse tx metadata".into(),
            method: "relay_tx".into(),
        };
        assert!(matches!(relay_error(bad_metadata), WalletError::Rpc { code: -27, .. }));
    }

    #[test]
    fn test_incoming_entry() {
        let tx = tx_from_entry(&entry(json!({
            "txid": "aa", "type": "in", "amount": 500, "fee": 30, "height": 1200,
            "confirmations": 11, "timestamp": 1_700_000_000u64, "unlock_time": 0,
            "payment_id": "0000000000000000", "subaddr_index": {"major": 1, "minor": 4},
            "address": "addr", "double_spend_seen": false
        })));
        assert_eq!(tx.state(), crate::tx::TxState::Confirmed);
        assert_eq!(tx.payment_id, None);
        assert_eq!(tx.height, Some(1200));
        let t = &tx.incoming_transfers[0];
        assert_eq!((t.account_index, t.subaddress_index, t.amount), (1, Some(4), Some(500)));
        assert!(tx.outgoing_transfer.is_none());
    }

    #[test]
    fn test_pool_and_confirmed_views_merge() {
        let pool = tx_from_entry(&entry(json!({
            "txid": "bb", "type": "pending", "amount": 100, "fee": 7, "timestamp": 10,
            "destinations": [{"address": "d", "amount": 100}],
            "subaddr_index": {"major": 0, "minor": 0},
            "subaddr_indices": [{"major": 0, "minor": 2}, {"major": 0, "minor": 1}]
        })));
        let out = tx_from_entry(&entry(json!({
            "txid": "bb", "type": "out", "amount": 100, "fee": 7, "height": 50, "timestamp": 20,
            "confirmations": 3, "destinations": [{"address": "d", "amount": 100}],
            "subaddr_index": {"major": 0, "minor": 0},
            "subaddr_indices": [{"major": 0, "minor": 1}, {"major": 0, "minor": 2}]
        })));
        let change = tx_from_entry(&entry(json!({
            "txid": "bb", "type": "in", "amount": 40, "fee": 7, "height": 50, "timestamp": 20,
            "confirmations": 3, "subaddr_index": {"major": 0, "minor": 0}
        })));
        let merged = merge_txs(vec![pool, out, change], &MergeRules::default()).unwrap();
        assert_eq!(merged.len(), 1);
        let tx = &merged[0];
        assert_eq!(tx.in_pool, Some(false));
        assert_eq!(tx.is_confirmed, Some(true));
        assert_eq!(tx.received_timestamp, Some(10));
        assert_eq!(tx.outgoing_transfer.as_ref().unwrap().subaddress_indices, vec![1, 2]);
        assert_eq!(tx.incoming_amount(), 40);
        assert_eq!(crate::query::filter_transfers(&merged, &TransferQuery::default()).len(), 2);
    }

    #[test]
    fn test_output_from_incoming() {
        let t: IncomingTransfer = serde_json::from_value(json!({
            "amount": 9, "spent": false, "global_index": 77, "tx_hash": "cc",
            "subaddr_index": {"major": 0, "minor": 3}, "key_image": "", "unlocked": true
        }))
        .unwrap();
        let o = output_from_incoming(&t);
        assert!(o.key_image.is_none());
        assert_eq!(o.subaddress_index, 3);
        assert_eq!(o.global_index, Some(77));
        assert!(o.is_available());
    }

    #[test]
    fn test_split_destinations() {
        let dests = vec![Destination::new("a", 60), Destination::new("b", 40)];
        let split = split_destinations(&dests, &[50, 50]);
        assert_eq!(split[0], vec![Destination::new("a", 50)]);
        assert_eq!(split[1], vec![Destination::new("a", 10), Destination::new("b", 40)]);
        let total: u64 = split.iter().flatten().map(|d| d.amount).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_txs_from_send() {
        let request = SendRequest::payment(0, "dest", 100, crate::send::SendPriority::Normal).do_not_relay(true);
        let result = TransferResult {
            tx_hash: "dd".into(),
            tx_key: "kk".into(),
            amount: 100,
            fee: 12,
            tx_metadata: "meta".into(),
            ..Default::default()
        };
        let txs = txs_from_send(vec![result], &request);
        let tx = &txs[0];
        assert_eq!(tx.state(), crate::tx::TxState::NotRelayed);
        assert_eq!(tx.metadata.as_deref(), Some("meta"));
        assert_eq!(tx.height, None);
        assert_eq!(tx.unlock_time, Some(0));
        assert_eq!(tx.ring_size, Some(request.ring_size));
        assert_eq!(tx.outgoing_transfer.as_ref().unwrap().destinations, request.destinations);
    }

    #[tokio::test]
    async fn test_closed_wallet_rejects_calls() {
        let wallet = RemoteWallet::new(WalletRpc::new("http://127.0.0.1:1").unwrap());
        wallet.closed.store(true, Ordering::Release);
        assert!(wallet.is_closed());
        assert!(matches!(wallet.get_height().await, Err(WalletError::WalletClosed)));
        assert!(wallet.close(true).await.is_ok());
    }
}
