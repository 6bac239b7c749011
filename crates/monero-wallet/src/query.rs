//! Query-by-example filters for transactions, transfers and outputs.
//!
//! A query is a partially populated description of the wanted entity: every
//! field that is set must match, unset fields match anything. Set-valued
//! fields (`ids`, `subaddress_indices`, ...) match when they contain the
//! candidate's value. A [`TxQuery`] can embed a [`TransferQuery`] and an
//! [`OutputQuery`]; the tx then matches only if one of its transfers (or
//! outputs) matches too.

use crate::output::Output;
use crate::tx::{Transfer, Tx};
use monero_types::payment_ids_equal;
use serde::{Deserialize, Serialize};

fn opt_eq<T: PartialEq>(want: &Option<T>, have: Option<T>) -> bool {
    match want {
        None => true,
        Some(w) => have.as_ref() == Some(w),
    }
}

fn set_contains<T: PartialEq>(set: &[T], have: Option<&T>) -> bool {
    set.is_empty() || have.is_some_and(|h| set.contains(h))
}

// ─── Transaction queries ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxQuery {
    /// Match any of these tx ids.
    pub ids: Vec<String>,
    pub is_confirmed: Option<bool>,
    pub in_pool: Option<bool>,
    pub is_relayed: Option<bool>,
    pub is_failed: Option<bool>,
    pub is_incoming: Option<bool>,
    pub is_outgoing: Option<bool>,
    pub height: Option<u64>,
    pub min_height: Option<u64>,
    pub max_height: Option<u64>,
    /// Match any of these payment ids (short ids match their zero-padded long form).
    pub payment_ids: Vec<String>,
    pub has_payment_id: Option<bool>,
    pub transfer_query: Option<TransferQuery>,
    pub output_query: Option<OutputQuery>,
}

impl TxQuery {
    pub fn matches(&self, tx: &Tx) -> bool {
        if !set_contains(&self.ids, Some(&tx.id)) {
            return false;
        }
        if !opt_eq(&self.is_confirmed, Some(tx.is_confirmed == Some(true)))
            || !opt_eq(&self.in_pool, Some(tx.in_pool == Some(true)))
            || !opt_eq(&self.is_relayed, tx.is_relayed)
            || !opt_eq(&self.is_failed, Some(tx.is_failed == Some(true)))
            || !opt_eq(&self.is_incoming, Some(tx.is_incoming()))
            || !opt_eq(&self.is_outgoing, Some(tx.is_outgoing()))
        {
            return false;
        }
        if self.height.is_some() && tx.height != self.height {
            return false;
        }
        if let Some(min) = self.min_height {
            if tx.height.map_or(true, |h| h < min) {
                return false;
            }
        }
        if let Some(max) = self.max_height {
            if tx.height.is_some_and(|h| h > max) {
                return false;
            }
        }
        if let Some(has) = self.has_payment_id {
            if tx.payment_id.is_some() != has {
                return false;
            }
        }
        if !self.payment_ids.is_empty() {
            let Some(pid) = tx.payment_id.as_deref() else {
                return false;
            };
            if !self.payment_ids.iter().any(|p| payment_ids_equal(p, pid)) {
                return false;
            }
        }
        if let Some(tq) = &self.transfer_query {
            if !tx.transfers().any(|t| tq.matches_transfer(t)) {
                return false;
            }
        }
        if let Some(oq) = &self.output_query {
            if !tx.outputs.iter().any(|o| oq.matches_output(o)) {
                return false;
            }
        }
        true
    }

    pub fn by_id(id: &str) -> Self {
        Self {
            ids: vec![id.to_string()],
            ..Default::default()
        }
    }

    /// Transactions that received funds.
    pub fn incoming() -> Self {
        Self {
            is_incoming: Some(true),
            ..Default::default()
        }
    }

    pub fn outgoing() -> Self {
        Self {
            is_outgoing: Some(true),
            ..Default::default()
        }
    }

    /// Relayed and waiting in the pool.
    pub fn pending() -> Self {
        Self {
            in_pool: Some(true),
            is_confirmed: Some(false),
            ..Default::default()
        }
    }

    pub fn confirmed() -> Self {
        Self {
            is_confirmed: Some(true),
            ..Default::default()
        }
    }

    pub fn failed() -> Self {
        Self {
            is_failed: Some(true),
            ..Default::default()
        }
    }

    /// Confirmed within `[min, max]`.
    pub fn in_height_range(min: u64, max: u64) -> Self {
        Self {
            is_confirmed: Some(true),
            min_height: Some(min),
            max_height: Some(max),
            ..Default::default()
        }
    }
}

// ─── Transfer queries ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferQuery {
    pub is_incoming: Option<bool>,
    pub account_index: Option<u32>,
    /// Receiving subaddress of an incoming transfer.
    pub subaddress_index: Option<u32>,
    /// Match transfers touching any of these subaddresses.
    pub subaddress_indices: Vec<u32>,
    pub address: Option<String>,
    pub amount: Option<u64>,
    pub has_destinations: Option<bool>,
    pub tx_query: Option<Box<TxQuery>>,
}

impl TransferQuery {
    /// Match against a transfer and its owning transaction.
    pub fn matches(&self, transfer: &Transfer, tx: &Tx) -> bool {
        self.matches_transfer(transfer) && self.tx_query.as_ref().map_or(true, |q| q.matches(tx))
    }

    /// Match the transfer's own fields, ignoring `tx_query`.
    pub fn matches_transfer(&self, t: &Transfer) -> bool {
        if !opt_eq(&self.is_incoming, Some(t.is_incoming))
            || !opt_eq(&self.account_index, Some(t.account_index))
            || !opt_eq(&self.amount, t.amount)
            || !opt_eq(&self.has_destinations, Some(!t.destinations.is_empty()))
        {
            return false;
        }
        if self.subaddress_index.is_some() && t.subaddress_index != self.subaddress_index {
            return false;
        }
        if !self.subaddress_indices.is_empty() {
            let touches = match t.subaddress_index {
                Some(i) => self.subaddress_indices.contains(&i),
                None => t.subaddress_indices.iter().any(|i| self.subaddress_indices.contains(i)),
            };
            if !touches {
                return false;
            }
        }
        if let Some(addr) = &self.address {
            if t.address.as_ref() != Some(addr) {
                return false;
            }
        }
        true
    }

    pub fn incoming() -> Self {
        Self {
            is_incoming: Some(true),
            ..Default::default()
        }
    }

    pub fn outgoing() -> Self {
        Self {
            is_incoming: Some(false),
            ..Default::default()
        }
    }

    pub fn by_subaddress(account_index: u32, subaddress_index: u32) -> Self {
        Self {
            is_incoming: Some(true),
            account_index: Some(account_index),
            subaddress_index: Some(subaddress_index),
            ..Default::default()
        }
    }
}

// ─── Output queries ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputQuery {
    pub account_index: Option<u32>,
    pub subaddress_indices: Vec<u32>,
    pub is_spent: Option<bool>,
    pub is_frozen: Option<bool>,
    pub is_unlocked: Option<bool>,
    pub key_image: Option<String>,
    pub min_amount: Option<u64>,
    pub max_amount: Option<u64>,
    pub tx_query: Option<Box<TxQuery>>,
}

impl OutputQuery {
    pub fn matches(&self, output: &Output, tx: &Tx) -> bool {
        self.matches_output(output) && self.tx_query.as_ref().map_or(true, |q| q.matches(tx))
    }

    /// Match the output's own fields, ignoring `tx_query`.
    pub fn matches_output(&self, o: &Output) -> bool {
        if !opt_eq(&self.account_index, Some(o.account_index))
            || !set_contains(&self.subaddress_indices, Some(&o.subaddress_index))
            || !opt_eq(&self.is_spent, Some(o.is_spent == Some(true)))
            || !opt_eq(&self.is_frozen, Some(o.is_frozen == Some(true)))
            || !opt_eq(&self.is_unlocked, o.is_unlocked)
        {
            return false;
        }
        if let Some(ki) = &self.key_image {
            if o.key_image.as_ref().map(|k| &k.hex) != Some(ki) {
                return false;
            }
        }
        if self.min_amount.is_some_and(|min| o.amount < min) || self.max_amount.is_some_and(|max| o.amount > max) {
            return false;
        }
        true
    }

    /// Unspent, unfrozen outputs.
    pub fn unspent() -> Self {
        Self {
            is_spent: Some(false),
            is_frozen: Some(false),
            ..Default::default()
        }
    }

    pub fn spent() -> Self {
        Self {
            is_spent: Some(true),
            ..Default::default()
        }
    }

    /// Unspent outputs that can be spent now.
    pub fn spendable() -> Self {
        Self {
            is_spent: Some(false),
            is_frozen: Some(false),
            is_unlocked: Some(true),
            ..Default::default()
        }
    }

    pub fn frozen() -> Self {
        Self {
            is_frozen: Some(true),
            ..Default::default()
        }
    }

    pub fn by_key_image(key_image: &str) -> Self {
        Self {
            key_image: Some(key_image.to_string()),
            ..Default::default()
        }
    }

    pub fn in_range(min: u64, max: u64) -> Self {
        Self {
            min_amount: Some(min),
            max_amount: Some(max),
            ..Default::default()
        }
    }
}

// ─── Filtering ──────────────────────────────────────────────────────────────

/// Transactions matching `query`, in input order.
pub fn filter_txs<'a>(txs: impl IntoIterator<Item = &'a Tx>, query: &TxQuery) -> Vec<Tx> {
    txs.into_iter().filter(|tx| query.matches(tx)).cloned().collect()
}

/// Transfers matching `query`, outgoing first within each transaction.
pub fn filter_transfers<'a>(txs: impl IntoIterator<Item = &'a Tx>, query: &TransferQuery) -> Vec<Transfer> {
    txs.into_iter()
        .flat_map(|tx| tx.transfers().filter(move |t| query.matches(t, tx)))
        .cloned()
        .collect()
}

pub fn filter_outputs<'a>(txs: impl IntoIterator<Item = &'a Tx>, query: &OutputQuery) -> Vec<Output> {
    txs.into_iter()
        .flat_map(|tx| tx.outputs.iter().filter(move |o| query.matches(o, tx)))
        .cloned()
        .collect()
}
