//! The wallet interface shared by the remote and in-process backends.
//!
//! Operations a backend does not support keep the default body, which fails
//! with [`WalletError::NotImplemented`] naming the operation.

use crate::account::{Account, AccountTag, AddressBookEntry, Subaddress};
use crate::check::{CheckReserve, CheckTx};
use crate::error::WalletError;
use crate::listener::WalletListener;
use crate::output::{KeyImage, KeyImageImportResult, Output};
use crate::query::{filter_outputs, filter_transfers, OutputQuery, TransferQuery, TxQuery};
use crate::send::SendRequest;
use crate::tx::{Transfer, Tx};
use async_trait::async_trait;
use monero_types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one sync session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub num_blocks_fetched: u64,
    pub received_money: bool,
}

#[async_trait]
pub trait MoneroWallet: Send + Sync {
    // ─── Identity ───────────────────────────────────────────────────────────

    async fn primary_address(&self) -> Result<String, WalletError> {
        self.get_address(0, 0).await
    }

    async fn get_address(&self, account_index: u32, subaddress_index: u32) -> Result<String, WalletError>;

    /// Account and subaddress index of one of this wallet's addresses.
    async fn get_address_index(&self, address: &str) -> Result<Subaddress, WalletError>;

    /// Integrated address for `standard_address` (default: primary) and
    /// `payment_id` (default: random).
    async fn get_integrated_address(
        &self,
        _standard_address: Option<&str>,
        _payment_id: Option<&str>,
    ) -> Result<String, WalletError> {
        Err(WalletError::NotImplemented("get_integrated_address"))
    }

    async fn decode_integrated_address(&self, integrated_address: &str) -> Result<Address, WalletError> {
        Ok(monero_types::decode_integrated_address(integrated_address)?)
    }

    async fn get_mnemonic(&self) -> Result<String, WalletError> {
        Err(WalletError::NotImplemented("get_mnemonic"))
    }

    async fn get_private_view_key(&self) -> Result<String, WalletError> {
        Err(WalletError::NotImplemented("get_private_view_key"))
    }

    async fn get_private_spend_key(&self) -> Result<String, WalletError> {
        Err(WalletError::NotImplemented("get_private_spend_key"))
    }

    // ─── Sync ───────────────────────────────────────────────────────────────

    /// Height the wallet has scanned to.
    async fn get_height(&self) -> Result<u64, WalletError>;

    async fn sync(
        &self,
        start_height: Option<u64>,
        listener: Option<Arc<dyn WalletListener>>,
    ) -> Result<SyncResult, WalletError>;

    /// Sync in the background every `interval` (default: configured interval).
    async fn start_syncing(&self, interval: Option<Duration>) -> Result<(), WalletError>;

    async fn stop_syncing(&self) -> Result<(), WalletError>;

    async fn is_synced(&self) -> Result<bool, WalletError> {
        Err(WalletError::NotImplemented("is_synced"))
    }

    async fn rescan_spent(&self) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("rescan_spent"))
    }

    async fn rescan_blockchain(&self) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("rescan_blockchain"))
    }

    fn add_listener(&self, _listener: Arc<dyn WalletListener>) -> Result<bool, WalletError> {
        Err(WalletError::NotImplemented("add_listener"))
    }

    fn remove_listener(&self, _listener: &Arc<dyn WalletListener>) -> Result<bool, WalletError> {
        Err(WalletError::NotImplemented("remove_listener"))
    }

    // ─── Accounts and balances ──────────────────────────────────────────────

    /// Balance of the wallet, an account, or one subaddress of an account.
    async fn get_balance(&self, account_index: Option<u32>, subaddress_index: Option<u32>) -> Result<u64, WalletError>;

    async fn get_unlocked_balance(
        &self,
        account_index: Option<u32>,
        subaddress_index: Option<u32>,
    ) -> Result<u64, WalletError>;

    async fn get_accounts(&self, include_subaddresses: bool, tag: Option<&str>) -> Result<Vec<Account>, WalletError>;

    async fn get_account(&self, account_index: u32, include_subaddresses: bool) -> Result<Account, WalletError> {
        self.get_accounts(include_subaddresses, None)
            .await?
            .into_iter()
            .find(|a| a.index == account_index)
            .ok_or_else(|| WalletError::InvalidArgument(format!("account {} does not exist", account_index)))
    }

    async fn create_account(&self, label: Option<&str>) -> Result<Account, WalletError>;

    /// Subaddresses of an account; empty `subaddress_indices` means all.
    async fn get_subaddresses(&self, account_index: u32, subaddress_indices: &[u32]) -> Result<Vec<Subaddress>, WalletError>;

    async fn create_subaddress(&self, account_index: u32, label: Option<&str>) -> Result<Subaddress, WalletError>;

    async fn set_subaddress_label(&self, _account_index: u32, _subaddress_index: u32, _label: &str) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("set_subaddress_label"))
    }

    // ─── History ────────────────────────────────────────────────────────────

    /// Transactions matching `query`, one per tx id.
    async fn get_txs(&self, query: &TxQuery) -> Result<Vec<Tx>, WalletError>;

    async fn get_transfers(&self, query: &TransferQuery) -> Result<Vec<Transfer>, WalletError> {
        let txs = self.get_txs(&TxQuery::default()).await?;
        Ok(filter_transfers(&txs, query))
    }

    async fn get_outputs(&self, query: &OutputQuery) -> Result<Vec<Output>, WalletError> {
        let txs = self.get_txs(&TxQuery::default()).await?;
        Ok(filter_outputs(&txs, query))
    }

    async fn get_outputs_hex(&self) -> Result<String, WalletError> {
        Err(WalletError::NotImplemented("get_outputs_hex"))
    }

    /// Returns the number of outputs imported.
    async fn import_outputs_hex(&self, _outputs_hex: &str) -> Result<u64, WalletError> {
        Err(WalletError::NotImplemented("import_outputs_hex"))
    }

    async fn get_key_images(&self) -> Result<Vec<KeyImage>, WalletError> {
        Err(WalletError::NotImplemented("get_key_images"))
    }

    async fn get_new_key_images_from_last_import(&self) -> Result<Vec<KeyImage>, WalletError> {
        Err(WalletError::NotImplemented("get_new_key_images_from_last_import"))
    }

    async fn import_key_images(&self, _key_images: &[KeyImage]) -> Result<KeyImageImportResult, WalletError> {
        Err(WalletError::NotImplemented("import_key_images"))
    }

    async fn freeze_output(&self, _key_image: &str) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("freeze_output"))
    }

    async fn thaw_output(&self, _key_image: &str) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("thaw_output"))
    }

    async fn is_output_frozen(&self, _key_image: &str) -> Result<bool, WalletError> {
        Err(WalletError::NotImplemented("is_output_frozen"))
    }

    // ─── Sending ────────────────────────────────────────────────────────────

    /// Create (and unless `do_not_relay`, relay) the transactions for a payment.
    async fn create_txs(&self, request: &SendRequest) -> Result<Vec<Tx>, WalletError>;

    /// Create exactly one transaction.
    async fn create_tx(&self, request: &SendRequest) -> Result<Tx, WalletError> {
        let request = SendRequest {
            can_split: false,
            ..request.clone()
        };
        let mut txs = self.create_txs(&request).await?;
        match txs.len() {
            1 => Ok(txs.remove(0)),
            n => Err(WalletError::InvalidArgument(format!("expected one transaction, wallet created {}", n))),
        }
    }

    /// Sweep the unlocked balance of the request's account to its single destination.
    async fn sweep_unlocked(&self, request: &SendRequest) -> Result<Vec<Tx>, WalletError>;

    /// Sweep the output named by `request.key_image`.
    async fn sweep_output(&self, _request: &SendRequest) -> Result<Tx, WalletError> {
        Err(WalletError::NotImplemented("sweep_output"))
    }

    async fn sweep_dust(&self, _do_not_relay: bool) -> Result<Vec<Tx>, WalletError> {
        Err(WalletError::NotImplemented("sweep_dust"))
    }

    /// Relay previously created transactions by metadata. Returns their ids.
    async fn relay_txs(&self, metadatas: &[String]) -> Result<Vec<String>, WalletError>;

    async fn relay_tx(&self, metadata: &str) -> Result<String, WalletError> {
        self.relay_txs(&[metadata.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| WalletError::InvalidArgument("relay returned no tx id".into()))
    }

    // ─── Messages and proofs ────────────────────────────────────────────────

    async fn sign_message(&self, _message: &str) -> Result<String, WalletError> {
        Err(WalletError::NotImplemented("sign_message"))
    }

    async fn verify_message(&self, _message: &str, _address: &str, _signature: &str) -> Result<bool, WalletError> {
        Err(WalletError::NotImplemented("verify_message"))
    }

    async fn get_tx_key(&self, _tx_id: &str) -> Result<String, WalletError> {
        Err(WalletError::NotImplemented("get_tx_key"))
    }

    async fn check_tx_key(&self, _tx_id: &str, _tx_key: &str, _address: &str) -> Result<CheckTx, WalletError> {
        Err(WalletError::NotImplemented("check_tx_key"))
    }

    async fn get_tx_proof(&self, _tx_id: &str, _address: &str, _message: Option<&str>) -> Result<String, WalletError> {
        Err(WalletError::NotImplemented("get_tx_proof"))
    }

    async fn check_tx_proof(
        &self,
        _tx_id: &str,
        _address: &str,
        _message: Option<&str>,
        _signature: &str,
    ) -> Result<CheckTx, WalletError> {
        Err(WalletError::NotImplemented("check_tx_proof"))
    }

    async fn get_spend_proof(&self, _tx_id: &str, _message: Option<&str>) -> Result<String, WalletError> {
        Err(WalletError::NotImplemented("get_spend_proof"))
    }

    async fn check_spend_proof(&self, _tx_id: &str, _message: Option<&str>, _signature: &str) -> Result<bool, WalletError> {
        Err(WalletError::NotImplemented("check_spend_proof"))
    }

    async fn get_reserve_proof_wallet(&self, _message: &str) -> Result<String, WalletError> {
        Err(WalletError::NotImplemented("get_reserve_proof_wallet"))
    }

    async fn get_reserve_proof_account(&self, _account_index: u32, _amount: u64, _message: &str) -> Result<String, WalletError> {
        Err(WalletError::NotImplemented("get_reserve_proof_account"))
    }

    async fn check_reserve_proof(&self, _address: &str, _message: &str, _signature: &str) -> Result<CheckReserve, WalletError> {
        Err(WalletError::NotImplemented("check_reserve_proof"))
    }

    // ─── Notes, attributes, address book, tags ──────────────────────────────

    async fn get_tx_notes(&self, _tx_ids: &[String]) -> Result<Vec<String>, WalletError> {
        Err(WalletError::NotImplemented("get_tx_notes"))
    }

    /// Set one note per tx id. All or nothing.
    async fn set_tx_notes(&self, _tx_ids: &[String], _notes: &[String]) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("set_tx_notes"))
    }

    async fn get_attribute(&self, _key: &str) -> Result<Option<String>, WalletError> {
        Err(WalletError::NotImplemented("get_attribute"))
    }

    async fn set_attribute(&self, _key: &str, _value: &str) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("set_attribute"))
    }

    /// Entries at `indices`, or all entries when empty.
    async fn get_address_book_entries(&self, _indices: &[u64]) -> Result<Vec<AddressBookEntry>, WalletError> {
        Err(WalletError::NotImplemented("get_address_book_entries"))
    }

    async fn add_address_book_entry(&self, _address: &str, _description: Option<&str>) -> Result<u64, WalletError> {
        Err(WalletError::NotImplemented("add_address_book_entry"))
    }

    async fn delete_address_book_entry(&self, _index: u64) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("delete_address_book_entry"))
    }

    async fn tag_accounts(&self, _tag: &str, _account_indices: &[u32]) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("tag_accounts"))
    }

    async fn untag_accounts(&self, _account_indices: &[u32]) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("untag_accounts"))
    }

    async fn get_account_tags(&self) -> Result<Vec<AccountTag>, WalletError> {
        Err(WalletError::NotImplemented("get_account_tags"))
    }

    async fn set_account_tag_label(&self, _tag: &str, _label: &str) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("set_account_tag_label"))
    }

    // ─── Payment URIs ───────────────────────────────────────────────────────

    async fn create_payment_uri(&self, request: &SendRequest) -> Result<String, WalletError> {
        request.to_uri()
    }

    async fn parse_payment_uri(&self, uri: &str) -> Result<SendRequest, WalletError> {
        SendRequest::from_uri(uri)
    }

    // ─── Mining ─────────────────────────────────────────────────────────────

    async fn start_mining(&self, _num_threads: u64, _background: bool, _ignore_battery: bool) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("start_mining"))
    }

    async fn stop_mining(&self) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("stop_mining"))
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    async fn change_password(&self, _old_password: &str, _new_password: &str) -> Result<(), WalletError> {
        Err(WalletError::NotImplemented("change_password"))
    }

    async fn save(&self) -> Result<(), WalletError>;

    /// Close the wallet, saving first if `save`. Later calls fail `WalletClosed`.
    async fn close(&self, save: bool) -> Result<(), WalletError>;

    fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A wallet implementing only the required operations.
    struct Minimal;

    #[async_trait]
    impl MoneroWallet for Minimal {
        async fn get_address(&self, a: u32, s: u32) -> Result<String, WalletError> {
            Ok(format!("{}/{}", a, s))
        }
        async fn get_address_index(&self, _address: &str) -> Result<Subaddress, WalletError> {
            Ok(Subaddress::default())
        }
        async fn get_height(&self) -> Result<u64, WalletError> {
            Ok(1)
        }
        async fn sync(&self, _s: Option<u64>, _l: Option<Arc<dyn WalletListener>>) -> Result<SyncResult, WalletError> {
            Ok(SyncResult::default())
        }
        async fn start_syncing(&self, _i: Option<Duration>) -> Result<(), WalletError> {
            Ok(())
        }
        async fn stop_syncing(&self) -> Result<(), WalletError> {
            Ok(())
        }
        async fn get_balance(&self, _a: Option<u32>, _s: Option<u32>) -> Result<u64, WalletError> {
            Ok(0)
        }
        async fn get_unlocked_balance(&self, _a: Option<u32>, _s: Option<u32>) -> Result<u64, WalletError> {
            Ok(0)
        }
        async fn get_accounts(&self, _i: bool, _t: Option<&str>) -> Result<Vec<Account>, WalletError> {
            Ok(vec![Account { index: 0, ..Default::default() }])
        }
        async fn create_account(&self, _l: Option<&str>) -> Result<Account, WalletError> {
            Ok(Account::default())
        }
        async fn get_subaddresses(&self, _a: u32, _i: &[u32]) -> Result<Vec<Subaddress>, WalletError> {
            Ok(vec![])
        }
        async fn create_subaddress(&self, _a: u32, _l: Option<&str>) -> Result<Subaddress, WalletError> {
            Ok(Subaddress::default())
        }
        async fn get_txs(&self, _q: &TxQuery) -> Result<Vec<Tx>, WalletError> {
            Ok(vec![])
        }
        async fn create_txs(&self, r: &SendRequest) -> Result<Vec<Tx>, WalletError> {
            let n = if r.can_split { 2 } else { 1 };
            Ok((0..n).map(|i| Tx::new(i.to_string())).collect())
        }
        async fn sweep_unlocked(&self, _r: &SendRequest) -> Result<Vec<Tx>, WalletError> {
            Ok(vec![])
        }
        async fn relay_txs(&self, m: &[String]) -> Result<Vec<String>, WalletError> {
            Ok(m.iter().map(|s| format!("id-{}", s)).collect())
        }
        async fn save(&self) -> Result<(), WalletError> {
            Ok(())
        }
        async fn close(&self, _save: bool) -> Result<(), WalletError> {
            Ok(())
        }
        fn is_closed(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_defaults() {
        let w = Minimal;
        assert_eq!(w.primary_address().await.unwrap(), "0/0");
        assert!(matches!(w.get_mnemonic().await, Err(WalletError::NotImplemented("get_mnemonic"))));
        assert!(matches!(w.sweep_dust(false).await, Err(WalletError::NotImplemented(_))));
        assert_eq!(w.relay_tx("m").await.unwrap(), "id-m");
        assert_eq!(w.create_tx(&SendRequest::new(0)).await.unwrap().id, "0");
        assert!(w.get_account(0, false).await.is_ok());
        assert!(matches!(w.get_account(3, false).await, Err(WalletError::InvalidArgument(_))));
        assert!(w.get_transfers(&TransferQuery::default()).await.unwrap().is_empty());
    }
}
