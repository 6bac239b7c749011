//! Seams for the in-process wallet.
//!
//! The in-process wallet owns state, files, sync and event delivery. Chain
//! access goes through a [`BlockSource`] and every piece of cryptography
//! (output recognition, key images, subaddress derivation, transaction
//! construction) goes through a [`KeyEngine`].

use crate::error::WalletError;
use crate::output::Output;
use crate::send::SendRequest;
use crate::tx::Tx;
use async_trait::async_trait;
use monero_rpc::DaemonRpc;
use monero_types::Network;
use serde::{Deserialize, Serialize};

/// A block and the blobs of its non-miner transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBlock {
    pub height: u64,
    pub hash: String,
    pub timestamp: u64,
    /// Block blob, hex.
    pub blob: String,
    pub miner_tx_hash: String,
    pub tx_hashes: Vec<String>,
    /// Transaction blobs in `tx_hashes` order, hex.
    pub tx_blobs: Vec<String>,
}

/// What a [`KeyEngine`] found in one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockScan {
    /// Owned outputs created in the block.
    pub received: Vec<Output>,
    /// Key images spent by the block's inputs. Unknown images are ignored
    /// by the wallet.
    pub spent_key_images: Vec<String>,
    /// Transactions of the block that touch the wallet, with their
    /// incoming/outgoing transfers filled in.
    pub txs: Vec<Tx>,
}

/// A transaction built by a [`KeyEngine`] but not yet submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTx {
    /// Tx with id, blob, key, fee, weight and outgoing transfer set.
    pub tx: Tx,
    /// Key images of the inputs it spends.
    pub spent_key_images: Vec<String>,
}

/// Chain access for the in-process wallet.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Number of blocks in the chain; the top block is `chain_height - 1`.
    async fn chain_height(&self) -> Result<u64, WalletError>;

    async fn block(&self, height: u64) -> Result<ChainBlock, WalletError>;

    /// Submit a raw transaction for relay.
    async fn submit_tx(&self, tx_hex: &str) -> Result<(), WalletError>;
}

/// Wallet cryptography delegated out of the library.
#[async_trait]
pub trait KeyEngine: Send + Sync {
    fn network(&self) -> Network;

    /// Address of `(account_index, subaddress_index)`; `(0, 0)` is the
    /// primary address.
    fn address(&self, account_index: u32, subaddress_index: u32) -> Result<String, WalletError>;

    /// Recognize owned outputs and spent key images in `block`.
    async fn scan_block(&self, block: &ChainBlock) -> Result<BlockScan, WalletError>;

    /// Build one transaction paying `request` from `inputs`. The engine
    /// picks change, decoys and the fee.
    async fn build_tx(&self, request: &SendRequest, inputs: &[Output]) -> Result<BuiltTx, WalletError>;

    /// Key material to persist in the keys file. Sealed by the wallet.
    fn export_keys(&self) -> Result<Vec<u8>, WalletError>;
}

#[async_trait]
impl BlockSource for DaemonRpc {
    async fn chain_height(&self) -> Result<u64, WalletError> {
        Ok(self.get_height().await?)
    }

    async fn block(&self, height: u64) -> Result<ChainBlock, WalletError> {
        let block = self.get_block_by_height(height).await?.into_inner();
        let tx_blobs = if block.tx_hashes.is_empty() {
            Vec::new()
        } else {
            let hashes: Vec<&str> = block.tx_hashes.iter().map(String::as_str).collect();
            let res = self.get_transactions(&hashes, false, false).await?.into_inner();
            if !res.missed_tx.is_empty() {
                return Err(WalletError::Rpc {
                    code: 0,
                    message: format!("daemon missed {} tx(s) of block {}", res.missed_tx.len(), height),
                });
            }
            res.txs.into_iter().map(|t| t.as_hex).collect()
        };
        Ok(ChainBlock {
            height,
            hash: block.block_header.hash,
            timestamp: block.block_header.timestamp,
            blob: block.blob,
            miner_tx_hash: block.miner_tx_hash,
            tx_hashes: block.tx_hashes,
            tx_blobs,
        })
    }

    async fn submit_tx(&self, tx_hex: &str) -> Result<(), WalletError> {
        let res = self.send_raw_transaction(tx_hex, false).await?;
        if res.value.double_spend {
            return Err(WalletError::TxAlreadyRelayed(res.value.reason));
        }
        if res.value.is_rejected() || !res.info.is_ok() {
            return Err(WalletError::Rpc {
                code: 0,
                message: format!("transaction rejected: {} {}", res.info.status, res.value.reason),
            });
        }
        Ok(())
    }
}
