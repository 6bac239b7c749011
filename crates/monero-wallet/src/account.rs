//! Accounts, subaddresses, account tags and address book entries.
//!
//! Each account has a major index and a set of subaddresses (minor
//! indices). An account's balances are the sums of its subaddresses'.

use crate::error::WalletError;
use crate::reconcile::{merge_opt, reconcile_value, Merge, MergeRules};
use serde::{Deserialize, Serialize};

/// A subaddress of an account. Minor index 0 is the account's primary address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subaddress {
    pub account_index: u32,
    pub subaddress_index: u32,
    pub address: String,
    pub label: Option<String>,
    pub balance: u64,
    pub unlocked_balance: u64,
    pub num_unspent_outputs: u64,
    /// Whether the subaddress has ever received funds.
    pub is_used: bool,
}

impl Subaddress {
    pub fn new(account_index: u32, subaddress_index: u32, address: String) -> Self {
        Self {
            account_index,
            subaddress_index,
            address,
            ..Default::default()
        }
    }

    /// Record funds on this subaddress. Marks it used.
    pub fn set_balances(&mut self, balance: u64, unlocked_balance: u64, num_unspent_outputs: u64) {
        self.balance = balance;
        self.unlocked_balance = unlocked_balance;
        self.num_unspent_outputs = num_unspent_outputs;
        if balance > 0 {
            self.is_used = true;
        }
    }
}

impl Merge for Subaddress {
    fn absorb(&mut self, mut other: Self, rules: &MergeRules) -> Result<(), WalletError> {
        if (self.account_index, self.subaddress_index) != (other.account_index, other.subaddress_index) {
            return Err(WalletError::InvalidArgument(format!(
                "cannot merge subaddress {}/{} with {}/{}",
                self.account_index, self.subaddress_index, other.account_index, other.subaddress_index
            )));
        }
        if self.address.is_empty() {
            self.address = std::mem::take(&mut other.address);
        } else if !other.address.is_empty() {
            self.address = reconcile_value("address", std::mem::take(&mut self.address), other.address, &rules.policy("address"))?;
        }
        merge_opt!(self, other, rules, label);
        self.balance = reconcile_value("balance", self.balance, other.balance, &rules.policy("balance"))?;
        self.unlocked_balance = reconcile_value(
            "unlocked_balance",
            self.unlocked_balance,
            other.unlocked_balance,
            &rules.policy("unlocked_balance"),
        )?;
        self.num_unspent_outputs = reconcile_value(
            "num_unspent_outputs",
            self.num_unspent_outputs,
            other.num_unspent_outputs,
            &rules.policy("num_unspent_outputs"),
        )?;
        self.is_used = reconcile_value("is_used", self.is_used, other.is_used, &rules.policy("is_used"))?;
        Ok(())
    }
}

/// A wallet account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account major index (0 = primary).
    pub index: u32,
    pub primary_address: String,
    pub balance: u64,
    pub unlocked_balance: u64,
    pub label: Option<String>,
    pub tag: Option<String>,
    /// Subaddresses ordered by minor index. May be empty when not requested.
    pub subaddresses: Vec<Subaddress>,
}

impl Account {
    /// Build an account whose balances are the sums of its subaddresses.
    pub fn from_subaddresses(index: u32, primary_address: String, subaddresses: Vec<Subaddress>) -> Self {
        let balance = subaddresses.iter().map(|s| s.balance).sum();
        let unlocked_balance = subaddresses.iter().map(|s| s.unlocked_balance).sum();
        Self {
            index,
            primary_address,
            balance,
            unlocked_balance,
            label: subaddresses.first().and_then(|s| s.label.clone()),
            tag: None,
            subaddresses,
        }
    }

    /// Check the balance invariants against the subaddress list.
    pub fn check_balances(&self) -> Result<(), WalletError> {
        if self.unlocked_balance > self.balance {
            return Err(WalletError::InvalidArgument(format!(
                "account {}: unlocked balance {} exceeds balance {}",
                self.index, self.unlocked_balance, self.balance
            )));
        }
        if self.subaddresses.is_empty() {
            return Ok(());
        }
        let sum: u64 = self.subaddresses.iter().map(|s| s.balance).sum();
        let unlocked: u64 = self.subaddresses.iter().map(|s| s.unlocked_balance).sum();
        if sum != self.balance || unlocked != self.unlocked_balance {
            return Err(WalletError::InvalidArgument(format!(
                "account {}: subaddress balances {}/{} do not sum to {}/{}",
                self.index, sum, unlocked, self.balance, self.unlocked_balance
            )));
        }
        Ok(())
    }

    pub fn subaddress(&self, index: u32) -> Option<&Subaddress> {
        self.subaddresses.iter().find(|s| s.subaddress_index == index)
    }
}

impl Merge for Account {
    fn absorb(&mut self, mut other: Self, rules: &MergeRules) -> Result<(), WalletError> {
        if self.index != other.index {
            return Err(WalletError::InvalidArgument(format!(
                "cannot merge account {} with {}",
                self.index, other.index
            )));
        }
        if self.primary_address.is_empty() {
            self.primary_address = std::mem::take(&mut other.primary_address);
        }
        merge_opt!(self, other, rules, label, tag);
        self.balance = reconcile_value("balance", self.balance, other.balance, &rules.policy("balance"))?;
        self.unlocked_balance = reconcile_value(
            "unlocked_balance",
            self.unlocked_balance,
            other.unlocked_balance,
            &rules.policy("unlocked_balance"),
        )?;
        for sub in other.subaddresses {
            match self
                .subaddresses
                .iter_mut()
                .find(|s| s.subaddress_index == sub.subaddress_index)
            {
                Some(existing) => existing.absorb(sub, rules)?,
                None => self.subaddresses.push(sub),
            }
        }
        self.subaddresses.sort_by_key(|s| s.subaddress_index);
        Ok(())
    }
}

/// A named group of accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTag {
    pub tag: String,
    pub label: Option<String>,
    pub account_indices: Vec<u32>,
}

/// A saved recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBookEntry {
    pub index: u64,
    pub address: String,
    pub description: Option<String>,
    pub payment_id: Option<String>,
}
