//! Wallet transactions and transfers.
//!
//! A [`Tx`] owns its transfers and outputs. Transfers and outputs refer
//! back to their transaction by id only.

use crate::error::WalletError;
use crate::output::{KeyImage, Output};
use crate::reconcile::{merge_opt, reconcile_value, Merge, MergeRules};
use serde::{Deserialize, Serialize};

/// Lifecycle of a transaction as seen by the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxState {
    /// Constructed, relay not yet decided.
    New,
    /// Constructed with `do_not_relay`.
    NotRelayed,
    /// Relayed and waiting in the pool.
    Pending,
    Confirmed,
    Failed,
}

/// A payment to one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    pub amount: u64,
}

impl Destination {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

/// Funds moving into or out of the wallet within one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub tx_id: String,
    pub is_incoming: bool,
    pub account_index: u32,
    /// Receiving subaddress (incoming only).
    pub subaddress_index: Option<u32>,
    /// Spending subaddresses (outgoing only).
    pub subaddress_indices: Vec<u32>,
    pub amount: Option<u64>,
    pub address: Option<String>,
    /// Payments made (outgoing only).
    pub destinations: Vec<Destination>,
}

impl Transfer {
    pub fn incoming(tx_id: &str, account_index: u32, subaddress_index: u32, amount: u64) -> Self {
        Self {
            tx_id: tx_id.to_string(),
            is_incoming: true,
            account_index,
            subaddress_index: Some(subaddress_index),
            amount: Some(amount),
            ..Default::default()
        }
    }

    pub fn outgoing(tx_id: &str, account_index: u32, subaddress_indices: Vec<u32>, destinations: Vec<Destination>) -> Self {
        let amount = destinations.iter().map(|d| d.amount).sum();
        Self {
            tx_id: tx_id.to_string(),
            is_incoming: false,
            account_index,
            subaddress_indices,
            amount: Some(amount),
            destinations,
            ..Default::default()
        }
    }

    fn same_slot(&self, other: &Self) -> bool {
        self.is_incoming == other.is_incoming
            && self.account_index == other.account_index
            && self.subaddress_index == other.subaddress_index
    }
}

impl Merge for Transfer {
    fn absorb(&mut self, mut other: Self, rules: &MergeRules) -> Result<(), WalletError> {
        if self.is_incoming != other.is_incoming || self.account_index != other.account_index {
            return Err(WalletError::InvalidArgument(format!(
                "cannot merge transfers of {} from different accounts or directions",
                self.tx_id
            )));
        }
        if self.tx_id.is_empty() {
            self.tx_id = std::mem::take(&mut other.tx_id);
        }
        merge_opt!(self, other, rules, subaddress_index, amount, address);
        if self.subaddress_indices.is_empty() {
            self.subaddress_indices = other.subaddress_indices;
        } else if !other.subaddress_indices.is_empty() {
            let mut merged = std::mem::take(&mut self.subaddress_indices);
            for idx in other.subaddress_indices {
                if !merged.contains(&idx) {
                    merged.push(idx);
                }
            }
            merged.sort_unstable();
            self.subaddress_indices = merged;
        }
        if self.destinations.is_empty() {
            self.destinations = other.destinations;
        } else if !other.destinations.is_empty() {
            self.destinations = reconcile_value(
                "destinations",
                std::mem::take(&mut self.destinations),
                other.destinations,
                &rules.policy("destinations"),
            )?;
        }
        Ok(())
    }
}

/// A wallet transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    /// 64-hex transaction hash.
    pub id: String,
    pub is_confirmed: Option<bool>,
    pub is_relayed: Option<bool>,
    pub is_failed: Option<bool>,
    pub in_pool: Option<bool>,
    pub is_double_spend: Option<bool>,
    pub is_miner_tx: Option<bool>,
    pub height: Option<u64>,
    pub num_confirmations: Option<u64>,
    pub unlock_time: Option<u64>,
    pub fee: Option<u64>,
    pub ring_size: Option<u32>,
    /// Transaction secret key (sender only).
    pub key: Option<String>,
    /// Hex blob of the full transaction.
    pub blob: Option<String>,
    /// Opaque relay blob of a constructed, unrelayed transaction.
    pub metadata: Option<String>,
    pub payment_id: Option<String>,
    pub size: Option<u64>,
    pub weight: Option<u64>,
    /// Block timestamp when confirmed.
    pub timestamp: Option<u64>,
    pub received_timestamp: Option<u64>,
    pub last_relayed_timestamp: Option<u64>,
    pub extra: Option<String>,
    pub note: Option<String>,
    pub incoming_transfers: Vec<Transfer>,
    pub outgoing_transfer: Option<Transfer>,
    /// Key images spent by this transaction.
    pub inputs: Vec<KeyImage>,
    /// Outputs received by this wallet.
    pub outputs: Vec<Output>,
}

impl Tx {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn state(&self) -> TxState {
        if self.is_failed == Some(true) {
            TxState::Failed
        } else if self.is_confirmed == Some(true) {
            TxState::Confirmed
        } else if self.in_pool == Some(true) {
            TxState::Pending
        } else if self.is_relayed == Some(false) {
            TxState::NotRelayed
        } else {
            TxState::New
        }
    }

    pub fn is_incoming(&self) -> bool {
        !self.incoming_transfers.is_empty()
    }

    pub fn is_outgoing(&self) -> bool {
        self.outgoing_transfer.is_some()
    }

    /// Sum of incoming transfer amounts.
    pub fn incoming_amount(&self) -> u64 {
        self.incoming_transfers.iter().filter_map(|t| t.amount).sum()
    }

    pub fn outgoing_amount(&self) -> u64 {
        self.outgoing_transfer.as_ref().and_then(|t| t.amount).unwrap_or(0)
    }

    /// All transfers, outgoing first.
    pub fn transfers(&self) -> impl Iterator<Item = &Transfer> {
        self.outgoing_transfer.iter().chain(&self.incoming_transfers)
    }

    /// Mark as confirmed at `height`, out of the pool.
    pub fn confirm(&mut self, height: u64, timestamp: Option<u64>) {
        self.is_confirmed = Some(true);
        self.in_pool = Some(false);
        self.is_relayed = Some(true);
        self.is_failed = Some(false);
        self.height = Some(height);
        if timestamp.is_some() {
            self.timestamp = timestamp;
        }
    }

    /// Add an incoming transfer, merging into an existing one for the same subaddress.
    pub fn add_incoming(&mut self, transfer: Transfer, rules: &MergeRules) -> Result<(), WalletError> {
        match self.incoming_transfers.iter_mut().find(|t| t.same_slot(&transfer)) {
            Some(existing) => existing.merge_with(transfer, rules)?,
            None => {
                self.incoming_transfers.push(transfer);
                self.incoming_transfers
                    .sort_by_key(|t| (t.account_index, t.subaddress_index));
            }
        }
        Ok(())
    }
}

impl Merge for Tx {
    fn absorb(&mut self, mut other: Self, rules: &MergeRules) -> Result<(), WalletError> {
        if self.id != other.id {
            return Err(WalletError::InvalidArgument(format!(
                "cannot merge tx {} with {}",
                self.id, other.id
            )));
        }
        merge_opt!(
            self,
            other,
            rules,
            is_confirmed,
            is_relayed,
            is_failed,
            in_pool,
            is_double_spend,
            is_miner_tx,
            height,
            num_confirmations,
            unlock_time,
            fee,
            ring_size,
            key,
            blob,
            metadata,
            payment_id,
            size,
            weight,
            timestamp,
            received_timestamp,
            last_relayed_timestamp,
            extra,
            note,
        );
        // A confirmed transaction is no longer in the pool.
        if self.is_confirmed == Some(true) {
            self.in_pool = Some(false);
        }

        for transfer in std::mem::take(&mut other.incoming_transfers) {
            match self.incoming_transfers.iter_mut().find(|t| t.same_slot(&transfer)) {
                Some(existing) => existing.absorb(transfer, rules)?,
                None => self.incoming_transfers.push(transfer),
            }
        }
        self.incoming_transfers
            .sort_by_key(|t| (t.account_index, t.subaddress_index));
        self.outgoing_transfer = match (self.outgoing_transfer.take(), other.outgoing_transfer) {
            (Some(mut mine), Some(theirs)) => {
                mine.absorb(theirs, rules)?;
                Some(mine)
            }
            (mine, theirs) => mine.or(theirs),
        };

        for ki in other.inputs {
            if !self.inputs.iter().any(|k| k.hex == ki.hex) {
                self.inputs.push(ki);
            }
        }
        for output in other.outputs {
            match self.outputs.iter_mut().find(|o| o.key() == output.key()) {
                Some(existing) => existing.absorb(output, rules)?,
                None => self.outputs.push(output),
            }
        }
        Ok(())
    }
}

/// Merge any number of observations into one `Tx` per id, in first-seen order.
pub fn merge_txs(txs: impl IntoIterator<Item = Tx>, rules: &MergeRules) -> Result<Vec<Tx>, WalletError> {
    let mut merged: Vec<Tx> = Vec::new();
    for tx in txs {
        match merged.iter_mut().find(|t| t.id == tx.id) {
            Some(existing) => existing.merge_with(tx, rules)?,
            None => merged.push(tx),
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_tx(id: &str) -> Tx {
        Tx {
            in_pool: Some(true),
            is_confirmed: Some(false),
            is_relayed: Some(true),
            num_confirmations: Some(0),
            received_timestamp: Some(1_700_000_100),
            ..Tx::new(id)
        }
    }

    #[test]
    fn test_state() {
        assert_eq!(Tx::new("a").state(), TxState::New);
        assert_eq!(pool_tx("a").state(), TxState::Pending);
        let mut tx = pool_tx("a");
        tx.confirm(100, Some(1_700_000_000));
        assert_eq!(tx.state(), TxState::Confirmed);
        let unrelayed = Tx { is_relayed: Some(false), ..Tx::new("b") };
        assert_eq!(unrelayed.state(), TxState::NotRelayed);
    }

    #[test]
    fn test_merge_pool_then_confirmed() {
        let mut seen_in_pool = pool_tx("aa");
        seen_in_pool.fee = Some(30_000_000);

        let mut confirmed = Tx::new("aa");
        confirmed.confirm(3000, Some(1_700_000_500));
        confirmed.num_confirmations = Some(5);
        confirmed.received_timestamp = Some(1_700_000_200);

        seen_in_pool.merge(confirmed).unwrap();
        assert_eq!(seen_in_pool.state(), TxState::Confirmed);
        assert_eq!(seen_in_pool.in_pool, Some(false));
        assert_eq!(seen_in_pool.num_confirmations, Some(5));
        assert_eq!(seen_in_pool.received_timestamp, Some(1_700_000_100));
        assert_eq!(seen_in_pool.fee, Some(30_000_000));
        assert_eq!(seen_in_pool.height, Some(3000));
    }

    #[test]
    fn test_merge_conflicting_fee_fails() {
        let mut a = Tx { fee: Some(1), ..Tx::new("aa") };
        let b = Tx { fee: Some(2), ..Tx::new("aa") };
        assert!(matches!(a.merge(b), Err(WalletError::Reconcile { ref field, .. }) if field == "fee"));

        let mut a = Tx { fee: Some(1), ..Tx::new("aa") };
        let b = Tx { fee: Some(2), ..Tx::new("aa") };
        let lenient = MergeRules::default().with("fee", crate::reconcile::ReconcilePolicy::max());
        a.merge_with(b, &lenient).unwrap();
        assert_eq!(a.fee, Some(2));
    }

    #[test]
    fn test_failed_merge_leaves_tx_unchanged() {
        let mut a = pool_tx("aa");
        a.fee = Some(1);
        a.note = Some("rent".into());
        a.incoming_transfers.push(Transfer::incoming("aa", 0, 1, 100));
        let before = a.clone();

        // height and in_pool merge cleanly before fee conflicts
        let mut b = Tx { fee: Some(2), ..Tx::new("aa") };
        b.confirm(3000, None);
        b.incoming_transfers.push(Transfer::incoming("aa", 0, 4, 50));
        assert!(matches!(a.merge(b), Err(WalletError::Reconcile { ref field, .. }) if field == "fee"));
        assert_eq!(a, before);

        let c = Tx { fee: Some(2), ..Tx::new("aa") };
        assert!(merge_txs(vec![a, c], &MergeRules::default()).is_err());
    }

    #[test]
    fn test_merge_incoming_and_outgoing_views() {
        let mut incoming_view = Tx::new("bb");
        incoming_view
            .add_incoming(Transfer::incoming("bb", 0, 2, 500), &MergeRules::default())
            .unwrap();

        let mut outgoing_view = Tx::new("bb");
        outgoing_view.outgoing_transfer = Some(Transfer::outgoing(
            "bb",
            0,
            vec![0],
            vec![Destination::new("addr", 500)],
        ));
        outgoing_view
            .add_incoming(Transfer::incoming("bb", 0, 1, 100), &MergeRules::default())
            .unwrap();

        incoming_view.merge(outgoing_view).unwrap();
        assert!(incoming_view.is_incoming() && incoming_view.is_outgoing());
        let subs: Vec<_> = incoming_view.incoming_transfers.iter().map(|t| t.subaddress_index).collect();
        assert_eq!(subs, vec![Some(1), Some(2)]);
        assert_eq!(incoming_view.incoming_amount(), 600);
        assert_eq!(incoming_view.outgoing_amount(), 500);
    }

    #[test]
    fn test_merge_txs_dedupes_in_order() {
        let txs = vec![pool_tx("c"), Tx::new("a"), Tx { fee: Some(9), ..Tx::new("c") }, Tx::new("b")];
        let merged = merge_txs(txs, &MergeRules::default()).unwrap();
        let ids: Vec<&str> = merged.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(merged[0].fee, Some(9));
        assert_eq!(merged[0].in_pool, Some(true));
    }

    #[test]
    fn test_merge_different_ids_rejected() {
        let mut a = Tx::new("a");
        assert!(matches!(a.merge(Tx::new("b")), Err(WalletError::InvalidArgument(_))));
    }
}
