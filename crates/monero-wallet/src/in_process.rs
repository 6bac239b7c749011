//! Wallet that keeps its own state and talks to a daemon directly.
//!
//! Chain data comes from a [`BlockSource`]; output recognition and
//! transaction construction are delegated to a [`KeyEngine`]. The wallet
//! owns everything else: the sync state machine, balances, files,
//! listener delivery and the create/relay pipeline.
//!
//! Foreground operations that mutate the wallet serialize on an async
//! operation lock. Read-only queries only take the state lock briefly and
//! may run while a sync is in flight.

use crate::account::{Account, AccountTag, AddressBookEntry, Subaddress};
use crate::engine::{BlockScan, BlockSource, ChainBlock, KeyEngine};
use crate::error::WalletError;
use crate::listener::{self, check_reentrancy, ListenerBus, WalletListener};
use crate::output::{KeyImage, Output};
use crate::query::TxQuery;
use crate::reconcile::{Merge, MergeRules};
use crate::send::SendRequest;
use crate::store::{KeysDocument, SubaddressRecord, WalletCache, WalletFiles};
use crate::tx::{Transfer, Tx};
use crate::wallet::{MoneroWallet, SyncResult};
use async_trait::async_trait;
use log::{debug, info, trace, warn};
use monero_rpc::{DaemonRpc, RpcConfig};
use monero_types::constants::DEFAULT_SPENDABLE_AGE;
use monero_types::{make_integrated_address, validate_address, validate_payment_id, Network};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Unlock times below this are block heights, above it unix timestamps.
const UNLOCK_TIME_HEIGHT_LIMIT: u64 = 500_000_000;

/// First retry delay of the background sync after a network failure.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

// ─── Configuration ──────────────────────────────────────────────────────────

/// How to create or open an in-process wallet.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Wallet file path. Empty for an in-memory wallet that cannot be saved.
    pub path: PathBuf,
    pub password: String,
    pub network: Network,
    pub daemon: Option<RpcConfig>,
    /// First block to scan. Not persisted; 0 when reopening.
    pub restore_height: u64,
    /// Period of the background sync.
    pub sync_interval: Duration,
}

impl WalletConfig {
    pub fn new(path: impl Into<PathBuf>, password: &str, network: Network) -> Self {
        Self {
            path: path.into(),
            password: password.to_string(),
            network,
            daemon: None,
            restore_height: 0,
            sync_interval: crate::library_config().sync_interval,
        }
    }

    /// An in-memory wallet.
    pub fn in_memory(network: Network) -> Self {
        Self::new(PathBuf::new(), "", network)
    }

    pub fn with_daemon(mut self, daemon: RpcConfig) -> Self {
        self.daemon = Some(daemon);
        self
    }

    /// Daemon at `url` with the process-wide RPC timeout.
    pub fn with_daemon_url(self, url: &str) -> Self {
        self.with_daemon(RpcConfig {
            url: url.to_string(),
            timeout: crate::library_config().rpc_timeout,
            ..Default::default()
        })
    }

    pub fn with_restore_height(mut self, height: u64) -> Self {
        self.restore_height = height;
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    fn files(&self) -> Option<WalletFiles> {
        (!self.path.as_os_str().is_empty()).then(|| WalletFiles::new(self.path.clone()))
    }
}

// ─── Relay metadata ─────────────────────────────────────────────────────────

/// What a metadata blob carries: enough to relay the tx later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TxMetadata {
    id: String,
    blob: String,
    spent_key_images: Vec<String>,
}

impl TxMetadata {
    fn encode(&self) -> Result<String, WalletError> {
        Ok(hex::encode(serde_json::to_vec(self)?))
    }

    fn decode(metadata: &str) -> Result<Self, WalletError> {
        let bytes = hex::decode(metadata)
            .map_err(|e| WalletError::InvalidArgument(format!("tx metadata is not hex: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| WalletError::InvalidArgument(format!("malformed tx metadata: {}", e)))
    }
}

// ─── State ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct State {
    restore_height: u64,
    cache: WalletCache,
    /// Sticky: once a session completes it stays true until close.
    synced: bool,
    /// metadata -> tx id for transactions relayed in this session.
    relayed: HashMap<String, String>,
    /// Key images spent by relayed but unconfirmed transactions.
    pending_spent: HashSet<String>,
}

impl State {
    fn num_accounts(&self) -> u32 {
        self.cache
            .subaddresses
            .iter()
            .map(|s| s.account_index + 1)
            .max()
            .unwrap_or(0)
    }

    fn record(&self, account_index: u32, subaddress_index: u32) -> Option<&SubaddressRecord> {
        self.cache
            .subaddresses
            .iter()
            .find(|s| s.account_index == account_index && s.subaddress_index == subaddress_index)
    }

    fn record_mut(&mut self, account_index: u32, subaddress_index: u32) -> Option<&mut SubaddressRecord> {
        self.cache
            .subaddresses
            .iter_mut()
            .find(|s| s.account_index == account_index && s.subaddress_index == subaddress_index)
    }

    fn ensure_account(&self, account_index: u32) -> Result<(), WalletError> {
        if account_index >= self.num_accounts() {
            return Err(WalletError::InvalidArgument(format!("account {} does not exist", account_index)));
        }
        Ok(())
    }

    fn subaddress(&self, record: &SubaddressRecord) -> Subaddress {
        let mut sub = Subaddress::new(record.account_index, record.subaddress_index, record.address.clone());
        sub.label = record.label.clone();
        let mine = self
            .cache
            .outputs
            .iter()
            .filter(|o| o.account_index == record.account_index && o.subaddress_index == record.subaddress_index);
        let (mut balance, mut unlocked, mut unspent, mut used) = (0u64, 0u64, 0u64, false);
        for o in mine {
            used = true;
            if o.is_spent == Some(true) || o.is_frozen == Some(true) {
                continue;
            }
            balance += o.amount;
            unspent += 1;
            if o.is_unlocked == Some(true) {
                unlocked += o.amount;
            }
        }
        sub.set_balances(balance, unlocked, unspent);
        sub.is_used |= used;
        sub
    }

    fn subaddresses(&self, account_index: u32) -> Vec<Subaddress> {
        let mut subs: Vec<Subaddress> = self
            .cache
            .subaddresses
            .iter()
            .filter(|r| r.account_index == account_index)
            .map(|r| self.subaddress(r))
            .collect();
        subs.sort_by_key(|s| s.subaddress_index);
        subs
    }

    fn account(&self, account_index: u32) -> Account {
        let subs = self.subaddresses(account_index);
        let primary = subs.first().map(|s| s.address.clone()).unwrap_or_default();
        let mut account = Account::from_subaddresses(account_index, primary, subs);
        account.tag = self.cache.account_tag_of.get(&account_index).cloned();
        account
    }

    /// Unspent, unfrozen and unlocked outputs of `account_index`, optionally
    /// restricted to `subaddress_indices`.
    fn spendable(&self, account_index: u32, subaddress_indices: &[u32]) -> Vec<Output> {
        self.cache
            .outputs
            .iter()
            .filter(|o| o.account_index == account_index)
            .filter(|o| subaddress_indices.is_empty() || subaddress_indices.contains(&o.subaddress_index))
            .filter(|o| o.is_available())
            .cloned()
            .collect()
    }

    fn tx_mut(&mut self, id: &str) -> Option<&mut Tx> {
        self.cache.txs.iter_mut().find(|t| t.id == id)
    }

    /// Merge `tx` into the stored history. A conflicting observation
    /// replaces the stored one.
    fn upsert_tx(&mut self, tx: Tx) {
        match self.cache.txs.iter_mut().find(|t| t.id == tx.id) {
            Some(existing) => {
                if let Err(e) = existing.merge_with(tx.clone(), &MergeRules::default()) {
                    warn!("replacing tx {} after merge conflict: {}", tx.id, e);
                    *existing = tx;
                }
            }
            None => self.cache.txs.push(tx),
        }
    }

    fn output_by_key_image_mut(&mut self, key_image: &str) -> Option<&mut Output> {
        self.cache
            .outputs
            .iter_mut()
            .find(|o| o.key_image.as_ref().is_some_and(|k| k.hex == key_image))
    }

    /// Recompute `is_unlocked` of every output for a chain of `chain_height` blocks.
    fn refresh_unlocks(&mut self, chain_height: u64) {
        let now = unix_now();
        let heights: HashMap<&str, (Option<u64>, u64)> = self
            .cache
            .txs
            .iter()
            .map(|t| (t.id.as_str(), (t.height, t.unlock_time.unwrap_or(0))))
            .collect();
        let unlocked: Vec<bool> = self
            .cache
            .outputs
            .iter()
            .map(|o| match heights.get(o.tx_id.as_str()) {
                Some((Some(h), unlock_time)) => {
                    chain_height >= h + DEFAULT_SPENDABLE_AGE && unlock_time_reached(*unlock_time, chain_height, now)
                }
                _ => false,
            })
            .collect();
        for (o, u) in self.cache.outputs.iter_mut().zip(unlocked) {
            o.is_unlocked = Some(u);
        }
    }
}

fn unlock_time_reached(unlock_time: u64, chain_height: u64, now: u64) -> bool {
    if unlock_time < UNLOCK_TIME_HEIGHT_LIMIT {
        chain_height >= unlock_time
    } else {
        now >= unlock_time
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Events produced by applying one block.
#[derive(Default)]
struct BlockEvents {
    received: Vec<Output>,
    spent: Vec<Output>,
}

// ─── Wallet ─────────────────────────────────────────────────────────────────

struct AutoSync {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    engine: Arc<dyn KeyEngine>,
    network: Network,
    source: RwLock<Option<Arc<dyn BlockSource>>>,
    state: RwLock<State>,
    /// Serializes operations that mutate the wallet or talk to the chain.
    op_lock: tokio::sync::Mutex<()>,
    listeners: ListenerBus,
    closed: AtomicBool,
    files: RwLock<Option<WalletFiles>>,
    password: RwLock<String>,
    sync_interval: Duration,
    auto_sync: Mutex<Option<AutoSync>>,
}

/// A wallet whose state lives in this process.
#[derive(Clone)]
pub struct InProcessWallet {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for InProcessWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessWallet")
            .field("network", &self.inner.network)
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

impl InProcessWallet {
    /// Create a new wallet. Fails with `WalletAlreadyExists` when files are
    /// already present at `config.path`.
    pub async fn create(config: WalletConfig, engine: Arc<dyn KeyEngine>) -> Result<Self, WalletError> {
        if engine.network() != config.network {
            return Err(WalletError::InvalidArgument(format!(
                "engine is for {} but the wallet is for {}",
                engine.network(),
                config.network
            )));
        }
        let files = config.files();
        if let Some(f) = &files {
            if f.path().exists() || f.keys_path().exists() {
                return Err(WalletError::WalletAlreadyExists(f.path().display().to_string()));
            }
        }
        let primary = engine.address(0, 0)?;
        let cache = WalletCache {
            subaddresses: vec![SubaddressRecord {
                account_index: 0,
                subaddress_index: 0,
                address: primary,
                label: None,
            }],
            ..Default::default()
        };
        let wallet = Self::assemble(&config, engine, files, cache)?;
        if wallet.inner.files_snapshot().is_some() {
            wallet.inner.save_files()?;
        }
        info!("created {} wallet at {:?}", config.network, config.path);
        Ok(wallet)
    }

    /// Open an existing wallet. `restore` rebuilds the key engine from the
    /// key material saved in the keys file.
    pub async fn open<F>(config: WalletConfig, restore: F) -> Result<Self, WalletError>
    where
        F: FnOnce(Network, &[u8]) -> Result<Arc<dyn KeyEngine>, WalletError>,
    {
        let files = config
            .files()
            .ok_or_else(|| WalletError::InvalidArgument("cannot open a wallet without a path".into()))?;
        let (keys, cache) = files.load(&config.password)?;
        if keys.network != config.network {
            return Err(WalletError::InvalidArgument(format!(
                "wallet is for {} but {} was requested",
                keys.network, config.network
            )));
        }
        let material = hex::decode(&keys.key_material)
            .map_err(|e| WalletError::InvalidFile(format!("key material: {}", e)))?;
        let engine = restore(keys.network, &material)?;
        if engine.address(0, 0)? != keys.primary_address {
            return Err(WalletError::InvalidFile("key material does not match the primary address".into()));
        }
        let wallet = Self::assemble(&config, engine, Some(files), cache)?;
        info!("opened {} wallet at {:?}", config.network, config.path);
        Ok(wallet)
    }

    fn assemble(
        config: &WalletConfig,
        engine: Arc<dyn KeyEngine>,
        files: Option<WalletFiles>,
        cache: WalletCache,
    ) -> Result<Self, WalletError> {
        let source: Option<Arc<dyn BlockSource>> = match &config.daemon {
            Some(c) => Some(Arc::new(DaemonRpc::with_config(c.clone())?)),
            None => None,
        };
        let state = State {
            restore_height: config.restore_height,
            cache,
            ..Default::default()
        };
        Ok(Self {
            inner: Arc::new(Inner {
                engine,
                network: config.network,
                source: RwLock::new(source),
                state: RwLock::new(state),
                op_lock: tokio::sync::Mutex::new(()),
                listeners: ListenerBus::new(),
                closed: AtomicBool::new(false),
                files: RwLock::new(files),
                password: RwLock::new(config.password.clone()),
                sync_interval: config.sync_interval,
                auto_sync: Mutex::new(None),
            }),
        })
    }

    pub fn network(&self) -> Network {
        self.inner.network
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.files_snapshot().map(|f| f.path().to_path_buf())
    }

    /// Connect to a daemon, or disconnect with `None`.
    pub fn set_daemon_connection(&self, config: Option<RpcConfig>) -> Result<(), WalletError> {
        let source: Option<Arc<dyn BlockSource>> = match config {
            Some(c) => Some(Arc::new(DaemonRpc::with_config(c)?)),
            None => None,
        };
        self.set_block_source(source)
    }

    /// Use `source` for chain access.
    pub fn set_block_source(&self, source: Option<Arc<dyn BlockSource>>) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        *self.inner.source.write().unwrap_or_else(|e| e.into_inner()) = source;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.source.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    pub fn restore_height(&self) -> u64 {
        self.inner.state().restore_height
    }

    pub fn set_restore_height(&self, height: u64) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        self.inner.state_mut().restore_height = height;
        Ok(())
    }

    /// Chain height according to the daemon.
    pub async fn get_daemon_height(&self) -> Result<u64, WalletError> {
        self.inner.ensure_open()?;
        self.inner.source()?.chain_height().await
    }

    /// Save to `path` from now on. Nothing is written until the next save.
    pub fn move_to(&self, path: impl Into<PathBuf>) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        let files = WalletFiles::new(path);
        if files.path().exists() || files.keys_path().exists() {
            return Err(WalletError::WalletAlreadyExists(files.path().display().to_string()));
        }
        *self.inner.files.write().unwrap_or_else(|e| e.into_inner()) = Some(files);
        Ok(())
    }
}

/// True iff both the wallet file and its keys file exist at `path`.
pub fn wallet_exists(path: impl Into<PathBuf>) -> bool {
    WalletFiles::new(path).exists()
}

pub async fn create_wallet(config: WalletConfig, engine: Arc<dyn KeyEngine>) -> Result<InProcessWallet, WalletError> {
    InProcessWallet::create(config, engine).await
}

pub async fn open_wallet<F>(config: WalletConfig, restore: F) -> Result<InProcessWallet, WalletError>
where
    F: FnOnce(Network, &[u8]) -> Result<Arc<dyn KeyEngine>, WalletError>,
{
    InProcessWallet::open(config, restore).await
}

impl Inner {
    fn state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn files_snapshot(&self) -> Option<WalletFiles> {
        self.files.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn ensure_open(&self) -> Result<(), WalletError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WalletError::WalletClosed);
        }
        Ok(())
    }

    /// Entry check for operations that take the operation lock.
    fn enter(&self) -> Result<(), WalletError> {
        check_reentrancy()?;
        self.ensure_open()
    }

    fn source(&self) -> Result<Arc<dyn BlockSource>, WalletError> {
        self.source
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(WalletError::NotConnected)
    }

    fn save_files(&self) -> Result<(), WalletError> {
        let password = self.password.read().unwrap_or_else(|e| e.into_inner()).clone();
        self.save_files_with(&password)
    }

    fn save_files_with(&self, password: &str) -> Result<(), WalletError> {
        let files = self
            .files_snapshot()
            .ok_or_else(|| WalletError::InvalidArgument("in-memory wallet cannot be saved".into()))?;
        let keys = KeysDocument {
            network: self.network,
            primary_address: self.engine.address(0, 0)?,
            key_material: hex::encode(self.engine.export_keys()?),
        };
        let cache = self.state().cache.clone();
        files.save(password, &keys, &cache)
    }

    // ─── Sync ───────────────────────────────────────────────────────────────

    /// One sync session. `cancel` is checked between blocks.
    async fn sync_session(
        &self,
        start_height: Option<u64>,
        listener: Option<&Arc<dyn WalletListener>>,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<SyncResult, WalletError> {
        let source = self.source()?;
        let _guard = self.op_lock.lock().await;
        self.ensure_open()?;

        let start = {
            let state = self.state();
            start_height
                .unwrap_or_else(|| state.restore_height.max(state.cache.synced_height))
                .max(1)
        };
        let mut end = source.chain_height().await?;
        info!("sync session from {} to {}", start, end);

        let progress = |height: u64, end: u64, percent: f64, message: &str| {
            if let Some(l) = listener {
                listener::deliver(|| l.on_sync_progress(height, start, end, percent, message));
            }
            self.listeners.sync_progress(height, start, end, percent, message);
        };

        // Nothing to fetch: no progress is reported.
        if start >= end {
            self.finish_session(end);
            return Ok(SyncResult::default());
        }

        let mut result = SyncResult::default();
        let mut height = start;
        loop {
            self.ensure_open()?;
            if cancel.is_some_and(|c| *c.borrow()) {
                info!("sync cancelled at height {}", height);
                return Err(WalletError::Cancelled);
            }

            let block = source.block(height).await?;
            let scan = self.engine.scan_block(&block).await?;
            let events = self.apply_block(&block, scan);
            result.num_blocks_fetched += 1;
            result.received_money |= !events.received.is_empty();

            self.listeners.new_block(height);
            for o in &events.received {
                self.listeners.output_received(o);
            }
            for o in &events.spent {
                self.listeners.output_spent(o);
            }

            if height + 1 == end {
                // The chain may have grown while scanning.
                end = end.max(source.chain_height().await?);
            }
            if height + 1 >= end {
                self.finish_session(end);
                progress(height, end, 1.0, "Synchronized");
                break;
            }
            let percent = (height - start + 1) as f64 / (end - start) as f64;
            trace!("synced block {} ({:.1}%)", height, percent * 100.0);
            progress(height, end, percent, "Synchronizing");
            height += 1;
        }
        info!(
            "sync session done: {} block(s), received money: {}",
            result.num_blocks_fetched, result.received_money
        );
        Ok(result)
    }

    fn finish_session(&self, end: u64) {
        let mut state = self.state_mut();
        state.cache.synced_height = state.cache.synced_height.max(end);
        state.synced = true;
        state.refresh_unlocks(end);
    }

    /// Fold one scanned block into the state and return the events it produced.
    fn apply_block(&self, block: &ChainBlock, scan: BlockScan) -> BlockEvents {
        let mut events = BlockEvents::default();
        let mut state = self.state_mut();

        for mut tx in scan.txs {
            tx.confirm(block.height, Some(block.timestamp));
            tx.outputs.clear();
            state.upsert_tx(tx);
        }

        let mut derived: BTreeMap<(String, u32, u32), u64> = BTreeMap::new();
        for mut output in scan.received {
            let key = output.key();
            if state.cache.outputs.iter().any(|o| o.key() == key) {
                continue;
            }
            output.is_spent.get_or_insert(false);
            output.is_frozen.get_or_insert(false);
            output.is_unlocked = Some(false);
            *derived
                .entry((output.tx_id.clone(), output.account_index, output.subaddress_index))
                .or_default() += output.amount;

            if state.record(output.account_index, output.subaddress_index).is_none() {
                match self.engine.address(output.account_index, output.subaddress_index) {
                    Ok(address) => state.cache.subaddresses.push(SubaddressRecord {
                        account_index: output.account_index,
                        subaddress_index: output.subaddress_index,
                        address,
                        label: None,
                    }),
                    Err(e) => warn!(
                        "no address for subaddress {}/{}: {}",
                        output.account_index, output.subaddress_index, e
                    ),
                }
            }
            events.received.push(output.clone());
            state.cache.outputs.push(output);
        }

        // Incoming transfers for txs the engine reported without them.
        for ((tx_id, account, sub), amount) in derived {
            if state.tx_mut(&tx_id).is_none() {
                let mut tx = Tx::new(tx_id.clone());
                tx.confirm(block.height, Some(block.timestamp));
                state.cache.txs.push(tx);
            }
            if let Some(tx) = state.tx_mut(&tx_id) {
                if tx.incoming_transfers.iter().any(|t| t.account_index == account && t.subaddress_index == Some(sub)) {
                    continue;
                }
                if let Err(e) = tx.add_incoming(Transfer::incoming(&tx_id, account, sub, amount), &MergeRules::default()) {
                    warn!("incoming transfer for {}: {}", tx_id, e);
                }
            }
        }

        for ki in scan.spent_key_images {
            let was_pending = state.pending_spent.remove(&ki);
            if let Some(o) = state.output_by_key_image_mut(&ki) {
                if o.is_spent != Some(true) || was_pending {
                    o.is_spent = Some(true);
                    events.spent.push(o.clone());
                }
            }
        }

        state.cache.synced_height = state.cache.synced_height.max(block.height + 1);
        debug!(
            "block {}: {} received, {} spent",
            block.height,
            events.received.len(),
            events.spent.len()
        );
        events
    }

    // ─── Send ───────────────────────────────────────────────────────────────

    /// Build one tx from `inputs` and relay it unless the request says not to.
    async fn build(&self, request: &SendRequest, inputs: &[Output]) -> Result<Tx, WalletError> {
        let built = self.engine.build_tx(request, inputs).await?;
        let mut tx = built.tx;
        let metadata = TxMetadata {
            id: tx.id.clone(),
            blob: tx.blob.clone().unwrap_or_default(),
            spent_key_images: built.spent_key_images.clone(),
        }
        .encode()?;
        tx.metadata = Some(metadata.clone());
        tx.is_confirmed = Some(false);
        tx.is_failed = Some(false);
        tx.is_relayed = Some(false);
        tx.in_pool = Some(false);
        tx.height = None;
        tx.num_confirmations = Some(0);
        tx.unlock_time = Some(request.unlock_time);
        tx.ring_size = Some(request.ring_size);
        if tx.payment_id.is_none() {
            tx.payment_id = request.payment_id.clone();
        }
        tx.inputs = built.spent_key_images.iter().map(|k| KeyImage::new(k.as_str())).collect();

        if !request.do_not_relay {
            let id = self.relay_one(&metadata).await?;
            debug!("relayed {}", id);
            tx.is_relayed = Some(true);
            tx.in_pool = Some(true);
            let now = unix_now();
            tx.received_timestamp = Some(now);
            tx.last_relayed_timestamp = Some(now);
        }
        self.state_mut().upsert_tx(tx.clone());
        Ok(tx)
    }

    /// Relay one metadata blob. Relaying a blob twice returns the same id.
    async fn relay_one(&self, metadata: &str) -> Result<String, WalletError> {
        if let Some(id) = self.state().relayed.get(metadata) {
            return Ok(id.clone());
        }
        let meta = TxMetadata::decode(metadata)?;
        self.source()?.submit_tx(&meta.blob).await?;

        let now = unix_now();
        let mut state = self.state_mut();
        state.relayed.insert(metadata.to_string(), meta.id.clone());
        for ki in &meta.spent_key_images {
            if let Some(o) = state.output_by_key_image_mut(ki) {
                o.is_spent = Some(true);
                state.pending_spent.insert(ki.clone());
            }
        }
        if let Some(tx) = state.tx_mut(&meta.id) {
            tx.is_relayed = Some(true);
            tx.in_pool = Some(true);
            tx.received_timestamp.get_or_insert(now);
            tx.last_relayed_timestamp = Some(now);
        }
        Ok(meta.id)
    }

    fn stop_auto_sync(&self, abort: bool) {
        let running = self.auto_sync.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(auto) = running {
            let _ = auto.cancel.send(true);
            if abort {
                auto.handle.abort();
            }
        }
    }
}

/// Background sync: one session per interval while the chain grows.
async fn auto_sync_loop(inner: Weak<Inner>, mut cancel: watch::Receiver<bool>, interval: Duration) {
    let mut backoff = INITIAL_BACKOFF.min(interval);
    loop {
        if *cancel.borrow() {
            break;
        }
        let Some(wallet) = inner.upgrade() else {
            break;
        };
        let outcome = match wallet.source() {
            Ok(source) => match source.chain_height().await {
                Ok(h) => {
                    let synced_height = wallet.state().cache.synced_height;
                    if h > synced_height {
                        wallet.sync_session(None, None, Some(&cancel)).await.map(|_| ())
                    } else {
                        Ok(())
                    }
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        let delay = match outcome {
            Ok(()) => {
                backoff = INITIAL_BACKOFF.min(interval);
                interval
            }
            Err(WalletError::Cancelled) | Err(WalletError::WalletClosed) => break,
            Err(e) if e.is_network() => {
                warn!("background sync failed, retrying in {:?}: {}", backoff, e);
                let d = backoff;
                backoff = (backoff * 2).min(interval);
                d
            }
            Err(e) => {
                warn!("background sync error: {}", e);
                wallet.listeners.sync_error(&e);
                interval
            }
        };
        drop(wallet);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
        }
    }
    debug!("background sync stopped");
}

fn random_payment_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[async_trait]
impl MoneroWallet for InProcessWallet {
    async fn get_address(&self, account_index: u32, subaddress_index: u32) -> Result<String, WalletError> {
        self.inner.ensure_open()?;
        self.inner
            .state()
            .record(account_index, subaddress_index)
            .map(|r| r.address.clone())
            .ok_or_else(|| {
                WalletError::InvalidArgument(format!("subaddress {}/{} does not exist", account_index, subaddress_index))
            })
    }

    async fn get_address_index(&self, address: &str) -> Result<Subaddress, WalletError> {
        self.inner.ensure_open()?;
        validate_address(address, Some(self.inner.network))?;
        let state = self.inner.state();
        state
            .cache
            .subaddresses
            .iter()
            .find(|r| r.address == address)
            .map(|r| state.subaddress(r))
            .ok_or_else(|| WalletError::InvalidArgument(format!("address {} is not in this wallet", address)))
    }

    async fn get_integrated_address(
        &self,
        standard_address: Option<&str>,
        payment_id: Option<&str>,
    ) -> Result<String, WalletError> {
        self.inner.ensure_open()?;
        let standard = match standard_address {
            Some(a) => {
                validate_address(a, Some(self.inner.network))?;
                a.to_string()
            }
            None => self.primary_address().await?,
        };
        let pid = match payment_id {
            Some(p) => {
                validate_payment_id(p)?;
                p.to_string()
            }
            None => random_payment_id(),
        };
        Ok(make_integrated_address(&standard, &pid)?)
    }

    async fn get_height(&self) -> Result<u64, WalletError> {
        self.inner.ensure_open()?;
        Ok(self.inner.state().cache.synced_height)
    }

    async fn sync(
        &self,
        start_height: Option<u64>,
        listener: Option<Arc<dyn WalletListener>>,
    ) -> Result<SyncResult, WalletError> {
        self.inner.enter()?;
        self.inner.sync_session(start_height, listener.as_ref(), None).await
    }

    async fn start_syncing(&self, interval: Option<Duration>) -> Result<(), WalletError> {
        self.inner.enter()?;
        self.inner.source()?;
        let mut slot = self.inner.auto_sync.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|a| !a.handle.is_finished()) {
            return Ok(());
        }
        let interval = interval.unwrap_or(self.inner.sync_interval);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(auto_sync_loop(Arc::downgrade(&self.inner), rx, interval));
        *slot = Some(AutoSync { cancel: tx, handle });
        info!("background sync started every {:?}", interval);
        Ok(())
    }

    async fn stop_syncing(&self) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        self.inner.stop_auto_sync(false);
        Ok(())
    }

    async fn is_synced(&self) -> Result<bool, WalletError> {
        self.inner.ensure_open()?;
        Ok(self.inner.state().synced)
    }

    /// Forget all scanned history and scan again from the restore height.
    async fn rescan_blockchain(&self) -> Result<(), WalletError> {
        self.inner.enter()?;
        self.inner.source()?;
        {
            let _guard = self.inner.op_lock.lock().await;
            let mut state = self.inner.state_mut();
            state.cache.txs.clear();
            state.cache.outputs.clear();
            state.cache.synced_height = 0;
            state.pending_spent.clear();
        }
        self.inner.sync_session(None, None, None).await.map(|_| ())
    }

    fn add_listener(&self, listener: Arc<dyn WalletListener>) -> Result<bool, WalletError> {
        self.inner.ensure_open()?;
        Ok(self.inner.listeners.add(listener))
    }

    fn remove_listener(&self, listener: &Arc<dyn WalletListener>) -> Result<bool, WalletError> {
        self.inner.ensure_open()?;
        Ok(self.inner.listeners.remove(listener))
    }

    async fn get_balance(&self, account_index: Option<u32>, subaddress_index: Option<u32>) -> Result<u64, WalletError> {
        self.inner.ensure_open()?;
        let state = self.inner.state();
        match (account_index, subaddress_index) {
            (None, None) => Ok((0..state.num_accounts()).map(|a| state.account(a).balance).sum()),
            (None, Some(_)) => Err(WalletError::InvalidArgument("subaddress index without account index".into())),
            (Some(a), None) => {
                state.ensure_account(a)?;
                Ok(state.account(a).balance)
            }
            (Some(a), Some(s)) => state
                .record(a, s)
                .map(|r| state.subaddress(r).balance)
                .ok_or_else(|| WalletError::InvalidArgument(format!("subaddress {}/{} does not exist", a, s))),
        }
    }

    async fn get_unlocked_balance(
        &self,
        account_index: Option<u32>,
        subaddress_index: Option<u32>,
    ) -> Result<u64, WalletError> {
        self.inner.ensure_open()?;
        let state = self.inner.state();
        match (account_index, subaddress_index) {
            (None, None) => Ok((0..state.num_accounts()).map(|a| state.account(a).unlocked_balance).sum()),
            (None, Some(_)) => Err(WalletError::InvalidArgument("subaddress index without account index".into())),
            (Some(a), None) => {
                state.ensure_account(a)?;
                Ok(state.account(a).unlocked_balance)
            }
            (Some(a), Some(s)) => state
                .record(a, s)
                .map(|r| state.subaddress(r).unlocked_balance)
                .ok_or_else(|| WalletError::InvalidArgument(format!("subaddress {}/{} does not exist", a, s))),
        }
    }

    async fn get_accounts(&self, include_subaddresses: bool, tag: Option<&str>) -> Result<Vec<Account>, WalletError> {
        self.inner.ensure_open()?;
        let state = self.inner.state();
        Ok((0..state.num_accounts())
            .map(|a| state.account(a))
            .filter(|a| tag.is_none() || a.tag.as_deref() == tag)
            .map(|mut a| {
                if !include_subaddresses {
                    a.subaddresses.clear();
                }
                a
            })
            .collect())
    }

    async fn create_account(&self, label: Option<&str>) -> Result<Account, WalletError> {
        self.inner.ensure_open()?;
        let mut state = self.inner.state_mut();
        let index = state.num_accounts();
        let address = self.inner.engine.address(index, 0)?;
        state.cache.subaddresses.push(SubaddressRecord {
            account_index: index,
            subaddress_index: 0,
            address,
            label: label.map(str::to_string),
        });
        debug!("created account {}", index);
        Ok(state.account(index))
    }

    async fn get_subaddresses(&self, account_index: u32, subaddress_indices: &[u32]) -> Result<Vec<Subaddress>, WalletError> {
        self.inner.ensure_open()?;
        let state = self.inner.state();
        state.ensure_account(account_index)?;
        if subaddress_indices.is_empty() {
            return Ok(state.subaddresses(account_index));
        }
        subaddress_indices
            .iter()
            .map(|&s| {
                state.record(account_index, s).map(|r| state.subaddress(r)).ok_or_else(|| {
                    WalletError::InvalidArgument(format!("subaddress {}/{} does not exist", account_index, s))
                })
            })
            .collect()
    }

    async fn create_subaddress(&self, account_index: u32, label: Option<&str>) -> Result<Subaddress, WalletError> {
        self.inner.ensure_open()?;
        let mut state = self.inner.state_mut();
        state.ensure_account(account_index)?;
        let index = state
            .cache
            .subaddresses
            .iter()
            .filter(|r| r.account_index == account_index)
            .map(|r| r.subaddress_index + 1)
            .max()
            .unwrap_or(0);
        let record = SubaddressRecord {
            account_index,
            subaddress_index: index,
            address: self.inner.engine.address(account_index, index)?,
            label: label.map(str::to_string),
        };
        let sub = state.subaddress(&record);
        state.cache.subaddresses.push(record);
        Ok(sub)
    }

    async fn set_subaddress_label(&self, account_index: u32, subaddress_index: u32, label: &str) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        let mut state = self.inner.state_mut();
        let record = state.record_mut(account_index, subaddress_index).ok_or_else(|| {
            WalletError::InvalidArgument(format!("subaddress {}/{} does not exist", account_index, subaddress_index))
        })?;
        record.label = Some(label.to_string());
        Ok(())
    }

    async fn get_txs(&self, query: &TxQuery) -> Result<Vec<Tx>, WalletError> {
        self.inner.ensure_open()?;
        let state = self.inner.state();
        let height = state.cache.synced_height;
        let mut txs: Vec<Tx> = state
            .cache
            .txs
            .iter()
            .map(|t| {
                let mut tx = t.clone();
                if let Some(h) = tx.height {
                    tx.num_confirmations = Some(height.saturating_sub(h));
                }
                if let Some(note) = state.cache.tx_notes.get(&tx.id) {
                    tx.note = Some(note.clone());
                }
                tx.outputs = state.cache.outputs.iter().filter(|o| o.tx_id == tx.id).cloned().collect();
                tx
            })
            .collect();
        txs.retain(|t| query.matches(t));
        Ok(txs)
    }

    async fn get_key_images(&self) -> Result<Vec<KeyImage>, WalletError> {
        self.inner.ensure_open()?;
        Ok(self
            .inner
            .state()
            .cache
            .outputs
            .iter()
            .filter_map(|o| o.key_image.clone())
            .collect())
    }

    async fn get_new_key_images_from_last_import(&self) -> Result<Vec<KeyImage>, WalletError> {
        self.inner.ensure_open()?;
        let mut state = self.inner.state_mut();
        let known: HashSet<&String> = state.cache.last_key_image_import.iter().collect();
        let new: Vec<KeyImage> = state
            .cache
            .outputs
            .iter()
            .filter_map(|o| o.key_image.clone())
            .filter(|k| !known.contains(&k.hex))
            .collect();
        state
            .cache
            .last_key_image_import
            .extend(new.iter().map(|k| k.hex.clone()));
        Ok(new)
    }

    async fn freeze_output(&self, key_image: &str) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        let mut state = self.inner.state_mut();
        let o = state
            .output_by_key_image_mut(key_image)
            .ok_or_else(|| WalletError::InvalidArgument(format!("no output with key image {}", key_image)))?;
        o.is_frozen = Some(true);
        Ok(())
    }

    async fn thaw_output(&self, key_image: &str) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        let mut state = self.inner.state_mut();
        let o = state
            .output_by_key_image_mut(key_image)
            .ok_or_else(|| WalletError::InvalidArgument(format!("no output with key image {}", key_image)))?;
        o.is_frozen = Some(false);
        Ok(())
    }

    async fn is_output_frozen(&self, key_image: &str) -> Result<bool, WalletError> {
        self.inner.ensure_open()?;
        let state = self.inner.state();
        state
            .cache
            .outputs
            .iter()
            .find(|o| o.key_image.as_ref().is_some_and(|k| k.hex == key_image))
            .map(|o| o.is_frozen == Some(true))
            .ok_or_else(|| WalletError::InvalidArgument(format!("no output with key image {}", key_image)))
    }

    async fn create_txs(&self, request: &SendRequest) -> Result<Vec<Tx>, WalletError> {
        self.inner.enter()?;
        request.validate(Some(self.inner.network))?;
        if !request.do_not_relay {
            self.inner.source()?;
        }
        let _guard = self.inner.op_lock.lock().await;
        self.inner.ensure_open()?;
        let inputs = {
            let state = self.inner.state();
            state.ensure_account(request.account_index)?;
            state.spendable(request.account_index, &request.subaddress_indices)
        };
        let available: u64 = inputs.iter().map(|o| o.amount).sum();
        let total = request.total_amount()?;
        if total > available {
            return Err(WalletError::InvalidArgument(format!(
                "amount {} exceeds unlocked balance {}",
                total, available
            )));
        }
        Ok(vec![self.inner.build(request, &inputs).await?])
    }

    async fn sweep_unlocked(&self, request: &SendRequest) -> Result<Vec<Tx>, WalletError> {
        self.inner.enter()?;
        request.validate_sweep(Some(self.inner.network))?;
        if !request.do_not_relay {
            self.inner.source()?;
        }
        let _guard = self.inner.op_lock.lock().await;
        self.inner.ensure_open()?;
        let mut inputs = {
            let state = self.inner.state();
            state.ensure_account(request.account_index)?;
            state.spendable(request.account_index, &request.subaddress_indices)
        };
        if let Some(below) = request.below_amount {
            inputs.retain(|o| o.amount < below);
        }
        if inputs.is_empty() {
            return Err(WalletError::InvalidArgument("no unlocked funds to sweep".into()));
        }

        let groups: Vec<(SendRequest, Vec<Output>)> = if request.sweep_each_subaddress == Some(true) {
            let mut by_sub: BTreeMap<u32, Vec<Output>> = BTreeMap::new();
            for o in inputs {
                by_sub.entry(o.subaddress_index).or_default().push(o);
            }
            by_sub
                .into_iter()
                .map(|(s, outs)| (request.clone().from_subaddresses(&[s]), outs))
                .collect()
        } else {
            vec![(request.clone(), inputs)]
        };
        let mut txs = Vec::with_capacity(groups.len());
        for (req, outs) in groups {
            txs.push(self.inner.build(&req, &outs).await?);
        }
        Ok(txs)
    }

    async fn sweep_output(&self, request: &SendRequest) -> Result<Tx, WalletError> {
        self.inner.enter()?;
        request.validate_sweep(Some(self.inner.network))?;
        let key_image = request
            .key_image
            .as_deref()
            .ok_or_else(|| WalletError::InvalidArgument("sweep_output needs a key image".into()))?;
        if !request.do_not_relay {
            self.inner.source()?;
        }
        let _guard = self.inner.op_lock.lock().await;
        self.inner.ensure_open()?;
        let output = self
            .inner
            .state()
            .cache
            .outputs
            .iter()
            .find(|o| o.key_image.as_ref().is_some_and(|k| k.hex == key_image))
            .cloned()
            .ok_or_else(|| WalletError::InvalidArgument(format!("no output with key image {}", key_image)))?;
        if !output.is_available() {
            return Err(WalletError::InvalidArgument(format!("output {} is not spendable", key_image)));
        }
        self.inner.build(request, &[output]).await
    }

    async fn relay_txs(&self, metadatas: &[String]) -> Result<Vec<String>, WalletError> {
        self.inner.enter()?;
        self.inner.source()?;
        let _guard = self.inner.op_lock.lock().await;
        self.inner.ensure_open()?;
        let mut ids = Vec::with_capacity(metadatas.len());
        for m in metadatas {
            ids.push(self.inner.relay_one(m).await?);
        }
        Ok(ids)
    }

    async fn get_tx_notes(&self, tx_ids: &[String]) -> Result<Vec<String>, WalletError> {
        self.inner.ensure_open()?;
        let state = self.inner.state();
        Ok(tx_ids
            .iter()
            .map(|id| state.cache.tx_notes.get(id).cloned().unwrap_or_default())
            .collect())
    }

    async fn set_tx_notes(&self, tx_ids: &[String], notes: &[String]) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        if tx_ids.len() != notes.len() {
            return Err(WalletError::InvalidArgument(format!(
                "{} tx ids but {} notes",
                tx_ids.len(),
                notes.len()
            )));
        }
        let mut state = self.inner.state_mut();
        for (id, note) in tx_ids.iter().zip(notes) {
            state.cache.tx_notes.insert(id.clone(), note.clone());
        }
        Ok(())
    }

    async fn get_attribute(&self, key: &str) -> Result<Option<String>, WalletError> {
        self.inner.ensure_open()?;
        Ok(self.inner.state().cache.attributes.get(key).cloned())
    }

    async fn set_attribute(&self, key: &str, value: &str) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        self.inner
            .state_mut()
            .cache
            .attributes
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_address_book_entries(&self, indices: &[u64]) -> Result<Vec<AddressBookEntry>, WalletError> {
        self.inner.ensure_open()?;
        let state = self.inner.state();
        let book = &state.cache.address_book;
        if indices.is_empty() {
            return Ok(book.clone());
        }
        indices
            .iter()
            .map(|i| {
                book.iter()
                    .find(|e| e.index == *i)
                    .cloned()
                    .ok_or_else(|| WalletError::InvalidArgument(format!("no address book entry {}", i)))
            })
            .collect()
    }

    async fn add_address_book_entry(&self, address: &str, description: Option<&str>) -> Result<u64, WalletError> {
        self.inner.ensure_open()?;
        let parsed = validate_address(address, Some(self.inner.network))?;
        let mut state = self.inner.state_mut();
        let index = state.cache.next_address_book_index;
        state.cache.next_address_book_index += 1;
        state.cache.address_book.push(AddressBookEntry {
            index,
            address: address.to_string(),
            description: description.map(str::to_string),
            payment_id: parsed.payment_id.map(hex::encode),
        });
        Ok(index)
    }

    async fn delete_address_book_entry(&self, index: u64) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        let mut state = self.inner.state_mut();
        let before = state.cache.address_book.len();
        state.cache.address_book.retain(|e| e.index != index);
        if state.cache.address_book.len() == before {
            return Err(WalletError::InvalidArgument(format!("no address book entry {}", index)));
        }
        Ok(())
    }

    async fn tag_accounts(&self, tag: &str, account_indices: &[u32]) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        if tag.is_empty() {
            return Err(WalletError::InvalidArgument("empty account tag".into()));
        }
        let mut state = self.inner.state_mut();
        for &a in account_indices {
            state.ensure_account(a)?;
        }
        for &a in account_indices {
            state.cache.account_tag_of.insert(a, tag.to_string());
        }
        if !state.cache.account_tags.iter().any(|t| t.tag == tag) {
            state.cache.account_tags.push(AccountTag {
                tag: tag.to_string(),
                ..Default::default()
            });
        }
        Ok(())
    }

    async fn untag_accounts(&self, account_indices: &[u32]) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        let mut state = self.inner.state_mut();
        for a in account_indices {
            state.cache.account_tag_of.remove(a);
        }
        Ok(())
    }

    async fn get_account_tags(&self) -> Result<Vec<AccountTag>, WalletError> {
        self.inner.ensure_open()?;
        let state = self.inner.state();
        Ok(state
            .cache
            .account_tags
            .iter()
            .map(|t| AccountTag {
                tag: t.tag.clone(),
                label: t.label.clone(),
                account_indices: state
                    .cache
                    .account_tag_of
                    .iter()
                    .filter(|(_, tag)| **tag == t.tag)
                    .map(|(a, _)| *a)
                    .collect(),
            })
            .filter(|t| !t.account_indices.is_empty())
            .collect())
    }

    async fn set_account_tag_label(&self, tag: &str, label: &str) -> Result<(), WalletError> {
        self.inner.ensure_open()?;
        let mut state = self.inner.state_mut();
        let entry = state
            .cache
            .account_tags
            .iter_mut()
            .find(|t| t.tag == tag)
            .ok_or_else(|| WalletError::InvalidArgument(format!("unknown account tag {}", tag)))?;
        entry.label = Some(label.to_string());
        Ok(())
    }

    async fn change_password(&self, old_password: &str, new_password: &str) -> Result<(), WalletError> {
        self.inner.enter()?;
        let _guard = self.inner.op_lock.lock().await;
        if *self.inner.password.read().unwrap_or_else(|e| e.into_inner()) != old_password {
            return Err(WalletError::InvalidArgument("wrong password".into()));
        }
        // The new password takes effect only once the files are rewritten with it.
        if self.inner.files_snapshot().is_some() {
            self.inner.save_files_with(new_password)?;
        }
        *self.inner.password.write().unwrap_or_else(|e| e.into_inner()) = new_password.to_string();
        Ok(())
    }

    async fn save(&self) -> Result<(), WalletError> {
        self.inner.enter()?;
        let _guard = self.inner.op_lock.lock().await;
        self.inner.ensure_open()?;
        self.inner.save_files()
    }

    async fn close(&self, save: bool) -> Result<(), WalletError> {
        check_reentrancy()?;
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.stop_auto_sync(true);
        // Wait for an in-flight operation to observe the closed flag.
        let _guard = self.inner.op_lock.lock().await;
        let saved = if save && self.inner.files_snapshot().is_some() {
            self.inner.save_files()
        } else {
            Ok(())
        };
        self.inner.listeners.clear();
        info!("closed wallet");
        saved
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_round_trip() {
        let meta = TxMetadata {
            id: "aa".into(),
            blob: "0102".into(),
            spent_key_images: vec!["ki".into()],
        };
        let hex = meta.encode().unwrap();
        assert_eq!(TxMetadata::decode(&hex).unwrap(), meta);
        assert!(matches!(TxMetadata::decode("zz"), Err(WalletError::InvalidArgument(_))));
        assert!(matches!(TxMetadata::decode("00"), Err(WalletError::InvalidArgument(_))));
    }

    #[test]
    fn test_unlock_time() {
        assert!(unlock_time_reached(0, 5, 0));
        assert!(!unlock_time_reached(100, 99, 0));
        assert!(unlock_time_reached(100, 100, 0));
        assert!(!unlock_time_reached(UNLOCK_TIME_HEIGHT_LIMIT + 10, 1_000_000, UNLOCK_TIME_HEIGHT_LIMIT));
    }

    #[test]
    fn test_refresh_unlocks_uses_spendable_age() {
        let mut state = State::default();
        let mut tx = Tx::new("t");
        tx.confirm(100, None);
        state.cache.txs.push(tx);
        state.cache.outputs.push(Output {
            tx_id: "t".into(),
            amount: 5,
            ..Default::default()
        });
        state.refresh_unlocks(100 + DEFAULT_SPENDABLE_AGE - 1);
        assert_eq!(state.cache.outputs[0].is_unlocked, Some(false));
        state.refresh_unlocks(100 + DEFAULT_SPENDABLE_AGE);
        assert_eq!(state.cache.outputs[0].is_unlocked, Some(true));
    }

    #[test]
    fn test_balances_follow_outputs() {
        let mut state = State::default();
        state.cache.subaddresses.push(SubaddressRecord {
            account_index: 0,
            subaddress_index: 0,
            address: "a".into(),
            label: None,
        });
        let out = |amount, spent, unlocked| Output {
            tx_id: "t".into(),
            amount,
            is_spent: Some(spent),
            is_unlocked: Some(unlocked),
            ..Default::default()
        };
        state.cache.outputs = vec![out(10, false, true), out(5, false, false), out(7, true, true)];
        let account = state.account(0);
        assert_eq!((account.balance, account.unlocked_balance), (15, 10));
        assert!(account.subaddresses[0].is_used);
        account.check_balances().unwrap();
        assert_eq!(state.spendable(0, &[]).len(), 1);
        assert!(state.ensure_account(1).is_err());
    }
}
